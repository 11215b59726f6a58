//! Party membership: matchmaking into public parties, joins and departures.
use serde_json::Value;

use crate::constants::DEFAULT_PARTY_NAME_SUFFIX;
use crate::error::{EngineError, RecordKind};
use crate::state::{
    MemberRecord, MemberStats, PartyRecord, UserRecord, decode, encode, fields, load, read,
    read_all, require,
};
use crate::store::{DocPath, DocumentStore, PARTIES, Patch, members_collection};
use crate::{Clock, StudyQuestEngine};

/// Attempts at joining an open party before falling back to a new one.
const ASSIGN_JOIN_ATTEMPTS: usize = 3;

impl<S: DocumentStore, C: Clock> StudyQuestEngine<S, C> {
    /// First active, public party with a free seat.
    ///
    /// # Errors
    ///
    /// Returns an error if the parties cannot be read or decoded.
    pub fn find_available_party(&self) -> Result<Option<PartyRecord>, EngineError> {
        let capacity = self.config.schedule.max_party_members;
        for (id, value) in self.store.list(PARTIES)? {
            let party: PartyRecord = decode(&DocPath::party(&id), value)?;
            if party.has_room(capacity) {
                return Ok(Some(party));
            }
        }
        Ok(None)
    }

    /// Create a party led by `leader_id`, with the first boss at full health.
    ///
    /// # Errors
    ///
    /// Returns an error if the party cannot be written.
    pub fn create_new_party(
        &self,
        leader_id: &str,
        display_name: &str,
        stats: &MemberStats,
    ) -> Result<PartyRecord, EngineError> {
        let now = self.now();
        let party_id = self.store.allocate_id(PARTIES);
        let party = PartyRecord {
            id: party_id.clone(),
            name: format!("{display_name}{DEFAULT_PARTY_NAME_SUFFIX}"),
            leader_id: leader_id.to_string(),
            member_count: 1,
            is_active: true,
            is_public: true,
            current_boss: self.config.roster.spawn(1, now),
            next_boss_spawns_at: None,
            last_boss_results: None,
            bosses_defeated: 0,
            created_at: now,
        };
        let member = MemberRecord::from_stats(leader_id, display_name, stats, now);
        let party_path = DocPath::party(&party_id);
        let member_path = DocPath::member(&party_id, leader_id);
        let party_doc = encode(&party_path, &party)?;
        let member_doc = encode(&member_path, &member)?;

        self.store.run_transaction(|tx| {
            tx.set(&party_path, party_doc.clone());
            tx.set(&member_path, member_doc.clone());
            Ok::<_, EngineError>(())
        })?;
        log::info!("{leader_id} founded party {party_id}");
        Ok(party)
    }

    /// Seat `user_id` in `party_id`.
    ///
    /// Joining a party one already belongs to is a no-op. Joining an inactive
    /// party reactivates it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PartyFull`] when no seat is left,
    /// [`EngineError::NotFound`] for an unknown party, or a store error.
    pub fn add_user_to_party(
        &self,
        party_id: &str,
        user_id: &str,
        display_name: &str,
        stats: &MemberStats,
    ) -> Result<(), EngineError> {
        let now = self.now();
        let capacity = self.config.schedule.max_party_members;
        let party_path = DocPath::party(party_id);
        let member_path = DocPath::member(party_id, user_id);
        let member_doc = encode(
            &member_path,
            &MemberRecord::from_stats(user_id, display_name, stats, now),
        )?;

        let joined = self.store.run_transaction(|tx| {
            let party: PartyRecord = require(tx, &party_path, RecordKind::Party)?;
            let existing: Option<MemberRecord> = read(tx, &member_path)?;
            if existing.is_some() {
                return Ok(false);
            }
            if party.member_count >= capacity {
                return Err(EngineError::PartyFull {
                    party_id: party_id.to_string(),
                    capacity,
                });
            }
            let mut patch = Patch::new().increment(fields::MEMBER_COUNT, 1);
            if !party.is_active {
                patch = patch
                    .set(fields::IS_ACTIVE, true)
                    .set(fields::LEADER_ID, user_id);
            }
            tx.update(&party_path, patch);
            tx.set(&member_path, member_doc.clone());
            Ok(true)
        })?;

        if joined {
            log::info!("{user_id} joined party {party_id}");
        } else {
            log::debug!("{user_id} is already in party {party_id}");
        }
        Ok(())
    }

    /// Put a party-less player into an open party, founding one if needed.
    ///
    /// Returns the id of the player's party.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn assign_user_to_party(&self, user_id: &str) -> Result<String, EngineError> {
        let user_path = DocPath::user(user_id);
        let user: UserRecord = load(&self.store, &user_path)?
            .ok_or_else(|| EngineError::not_found(RecordKind::User, user_id))?;
        if let Some(party_id) = user.current_party_id {
            return Ok(party_id);
        }

        let stats = user.stats();
        let mut seated = None;
        for _ in 0..ASSIGN_JOIN_ATTEMPTS {
            let Some(party) = self.find_available_party()? else {
                break;
            };
            match self.add_user_to_party(&party.id, user_id, &user.display_name, &stats) {
                Ok(()) => {
                    seated = Some(party.id);
                    break;
                }
                Err(EngineError::PartyFull { party_id, .. }) => {
                    log::warn!("party {party_id} filled up while {user_id} was joining; retrying");
                }
                Err(err) => return Err(err),
            }
        }
        let party_id = match seated {
            Some(party_id) => party_id,
            None => self.create_new_party(user_id, &user.display_name, &stats)?.id,
        };

        self.store
            .update(&user_path, Patch::new().set(fields::CURRENT_PARTY_ID, party_id.as_str()))?;
        Ok(party_id)
    }

    /// Remove a player from their party.
    ///
    /// Leadership passes to the longest-standing remaining member; a party
    /// left empty is deactivated. Returns the party that was left.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn leave_party(&self, user_id: &str) -> Result<Option<String>, EngineError> {
        let user_path = DocPath::user(user_id);
        let left = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let Some(party_id) = user.current_party_id else {
                return Ok(None);
            };
            let party_path = DocPath::party(&party_id);
            let Some(party) = read::<PartyRecord>(tx, &party_path)? else {
                tx.update(&user_path, Patch::new().set(fields::CURRENT_PARTY_ID, Value::Null));
                return Ok(None);
            };
            let members: Vec<MemberRecord> = read_all(tx, &members_collection(&party_id))?;
            let was_member = members.iter().any(|member| member.user_id == user_id);
            let mut remaining: Vec<&MemberRecord> = members
                .iter()
                .filter(|member| member.user_id != user_id)
                .collect();
            remaining.sort_by(|a, b| {
                a.joined_at
                    .cmp(&b.joined_at)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });

            let mut patch = Patch::new();
            if was_member {
                patch = patch.set(fields::MEMBER_COUNT, party.member_count.saturating_sub(1));
            }
            match remaining.first() {
                None => patch = patch.set(fields::IS_ACTIVE, false),
                Some(successor) if party.leader_id == user_id => {
                    patch = patch.set(fields::LEADER_ID, successor.user_id.as_str());
                }
                Some(_) => {}
            }
            if !patch.is_empty() {
                tx.update(&party_path, patch);
            }
            if was_member {
                tx.delete(&DocPath::member(&party_id, user_id));
            }
            tx.update(&user_path, Patch::new().set(fields::CURRENT_PARTY_ID, Value::Null));
            Ok::<_, EngineError>(Some(party_id))
        })?;

        if let Some(party_id) = &left {
            log::info!("{user_id} left party {party_id}");
        }
        Ok(left)
    }

    /// Move a player into `party_id`: leave the current party, then join.
    ///
    /// The two steps are separate transactions; if the join fails the player
    /// ends up without a party.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PartyFull`] when the target has no seat left,
    /// [`EngineError::NotFound`] for an unknown user or party, or a store error.
    pub fn transfer_to_party(&self, user_id: &str, party_id: &str) -> Result<(), EngineError> {
        let user_path = DocPath::user(user_id);
        let user: UserRecord = load(&self.store, &user_path)?
            .ok_or_else(|| EngineError::not_found(RecordKind::User, user_id))?;
        if user.current_party_id.as_deref() == Some(party_id) {
            return Ok(());
        }
        self.leave_party(user_id)?;
        self.add_user_to_party(party_id, user_id, &user.display_name, &user.stats())?;
        self.store
            .update(&user_path, Patch::new().set(fields::CURRENT_PARTY_ID, party_id))?;
        Ok(())
    }
}
