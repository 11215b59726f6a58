//! The engine facade: a document store, a clock and the balance tables.
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::award::{AppliedRewards, StudyOutcome};
use crate::boss::{BossState, DeathPenalty, IdleAttackOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{EngineError, RecordKind};
use crate::loot::SessionRewards;
use crate::progression::{ExpProgress, exp_progress};
use crate::state::{MemberRecord, PartyRecord, UserRecord, decode, encode, load};
use crate::store::{DocPath, DocumentStore, members_collection};

/// What happened when a player logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReport {
    pub party_id: String,
    pub joined_party: bool,
    pub boss_spawned: Option<BossState>,
    pub idle_attack: IdleAttackOutcome,
    pub death: Option<DeathPenalty>,
    pub boosters_expired: bool,
}

/// Everything a finished study session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub study: StudyOutcome,
    pub rewards: SessionRewards,
    pub applied: AppliedRewards,
}

/// Progression and boss-battle engine over a [`DocumentStore`].
///
/// Every state transition is driven by a player request; nothing runs in the
/// background.
pub struct StudyQuestEngine<S, C = SystemClock>
where
    S: DocumentStore,
    C: Clock,
{
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) config: EngineConfig,
}

impl<S: DocumentStore> StudyQuestEngine<S, SystemClock> {
    /// Engine on wall-clock time with the embedded configuration.
    #[must_use]
    pub fn with_system_clock(store: S) -> Self {
        Self::new(store, SystemClock)
    }
}

impl<S, C> StudyQuestEngine<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    /// Engine with the embedded configuration.
    #[must_use]
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            config: EngineConfig::default_config().clone(),
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if `config` fails validation.
    pub fn with_config(store: S, clock: C, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store a new player record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn register_user(&self, user: &UserRecord) -> Result<(), EngineError> {
        let path = DocPath::user(&user.id);
        self.store.set(&path, encode(&path, user)?)?;
        log::debug!("registered player {}", user.id);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user.
    pub fn user(&self, user_id: &str) -> Result<UserRecord, EngineError> {
        load(&self.store, &DocPath::user(user_id))?
            .ok_or_else(|| EngineError::not_found(RecordKind::User, user_id))
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown party.
    pub fn party(&self, party_id: &str) -> Result<PartyRecord, EngineError> {
        load(&self.store, &DocPath::party(party_id))?
            .ok_or_else(|| EngineError::not_found(RecordKind::Party, party_id))
    }

    /// Members of `party_id`, ordered by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the member records cannot be read or decoded.
    pub fn members(&self, party_id: &str) -> Result<Vec<MemberRecord>, EngineError> {
        let collection = members_collection(party_id);
        self.store
            .list(&collection)?
            .into_iter()
            .map(|(id, value)| decode(&DocPath::member(party_id, &id), value))
            .collect()
    }

    /// Progress through the player's current level.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user.
    pub fn progress(&self, user_id: &str) -> Result<ExpProgress, EngineError> {
        let user = self.user(user_id)?;
        Ok(exp_progress(user.exp, user.level))
    }

    /// Apply every lazy transition that concerns a player at login: party
    /// assignment, boss respawn, idle attack, death penalty, booster expiry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or the first
    /// error raised by any step.
    pub fn on_login(&self, user_id: &str) -> Result<LoginReport, EngineError> {
        let user = self.user(user_id)?;
        let joined_party = user.current_party_id.is_none();
        let party_id = match user.current_party_id {
            Some(party_id) => party_id,
            None => self.assign_user_to_party(user_id)?,
        };
        let boss_spawned = self.check_boss_spawn(&party_id)?;
        let idle_attack = self.apply_idle_attack(user_id)?;
        // Guarded by stored health, so a penalty missed by an earlier login is
        // applied here too.
        let death = self.apply_death_penalty(user_id)?;
        let boosters_expired = self.expire_boosters(user_id)?;
        Ok(LoginReport {
            party_id,
            joined_party,
            boss_spawned,
            idle_attack,
            death,
            boosters_expired,
        })
    }

    /// Record a session, roll its loot and apply the rewards.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn finish_study_session<R>(
        &self,
        user_id: &str,
        minutes: u32,
        cards: u32,
        rng: &mut R,
    ) -> Result<SessionSummary, EngineError>
    where
        R: Rng + ?Sized,
    {
        let study = self.record_study_session(user_id, u64::from(minutes), u64::from(cards))?;
        let user = self.user(user_id)?;
        let rewards =
            self.config
                .rewards
                .session_rewards(minutes, &user.collection(), user.is_pro(), rng);
        let applied = self.apply_session_rewards(user_id, &rewards)?;
        Ok(SessionSummary {
            study,
            rewards,
            applied,
        })
    }
}
