//! Cooperative damage and the defeat rollup.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::boss::schedule::{format_fight_duration, next_spawn_time};
use crate::boss::{BossResults, BossState, RankingEntry};
use crate::error::{EngineError, RecordKind};
use crate::numbers::u64_to_i64_saturating;
use crate::state::{MemberRecord, PartyRecord, encode, fields, read_all, require};
use crate::store::{DocPath, DocumentStore, Patch, members_collection};
use crate::{Clock, StudyQuestEngine};

/// What a single damage event did to the party boss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageOutcome {
    pub damage_dealt: u64,
    pub boss_health: u64,
    pub defeated: bool,
    /// Set only on the event that landed the killing blow.
    pub results: Option<BossResults>,
}

impl DamageOutcome {
    fn ignored(boss: &BossState) -> Self {
        Self {
            damage_dealt: 0,
            boss_health: boss.current_health,
            defeated: false,
            results: None,
        }
    }
}

/// Contributions ranked by damage, highest first.
///
/// `dealer` contributes `dealer_damage` / `dealer_minutes` instead of its
/// stored totals, since the killing blow is not yet persisted. Ties keep the
/// order of `members`.
#[must_use]
pub fn rank_contributions(
    members: &[MemberRecord],
    dealer: &str,
    dealer_damage: u64,
    dealer_minutes: u64,
) -> Vec<RankingEntry> {
    let mut rankings: Vec<RankingEntry> = members
        .iter()
        .map(|member| {
            let (damage, study_minutes) = if member.user_id == dealer {
                (dealer_damage, dealer_minutes)
            } else {
                (member.current_boss_damage, member.current_boss_study_minutes)
            };
            RankingEntry {
                user_id: member.user_id.clone(),
                display_name: member.display_name.clone(),
                damage,
                study_minutes,
            }
        })
        .collect();
    rankings.sort_by(|a, b| b.damage.cmp(&a.damage));
    rankings
}

pub(crate) fn defeat_results(
    boss: &BossState,
    rankings: Vec<RankingEntry>,
    now: DateTime<Utc>,
) -> BossResults {
    BossResults {
        boss_number: boss.boss_number,
        boss_name: boss.name.clone(),
        total_damage: rankings.iter().map(|entry| entry.damage).sum(),
        rankings,
        fight_duration: format_fight_duration(boss.created_at, now),
        defeated_at: now,
    }
}

impl<S: DocumentStore, C: Clock> StudyQuestEngine<S, C> {
    /// Apply `damage` from `user_id` to the party boss.
    ///
    /// While the boss survives, its health and the member's contribution move
    /// by `damage`. The blow that brings health to zero instead defeats the
    /// boss: rankings, fight duration, respawn time and the reset of every
    /// member's contribution are written in the same transaction. Damage to a
    /// boss that is already dead changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the party or the member record is
    /// missing, or a store error.
    pub fn deal_boss_damage(
        &self,
        party_id: &str,
        user_id: &str,
        damage: u64,
        study_minutes: u64,
    ) -> Result<DamageOutcome, EngineError> {
        let now = self.now();
        let schedule = &self.config.schedule;
        let party_path = DocPath::party(party_id);
        let member_path = DocPath::member(party_id, user_id);
        let members_path = members_collection(party_id);

        let outcome = self.store.run_transaction(|tx| {
            let party: PartyRecord = require(tx, &party_path, RecordKind::Party)?;
            let member: MemberRecord = require(tx, &member_path, RecordKind::Member)?;
            let boss = &party.current_boss;
            if !boss.is_alive || (damage == 0 && study_minutes == 0) {
                return Ok::<_, EngineError>(DamageOutcome::ignored(boss));
            }

            if damage < boss.current_health {
                tx.update(
                    &party_path,
                    Patch::new().increment(fields::BOSS_HEALTH, -u64_to_i64_saturating(damage)),
                );
                tx.update(
                    &member_path,
                    Patch::new()
                        .increment(fields::BOSS_DAMAGE, u64_to_i64_saturating(damage))
                        .increment(fields::BOSS_STUDY_MINUTES, u64_to_i64_saturating(study_minutes))
                        .set(fields::LAST_DAMAGE_AT, now.to_rfc3339()),
                );
                return Ok(DamageOutcome {
                    damage_dealt: damage,
                    boss_health: boss.current_health - damage,
                    defeated: false,
                    results: None,
                });
            }

            let members: Vec<MemberRecord> = read_all(tx, &members_path)?;
            let rankings = rank_contributions(
                &members,
                user_id,
                member.current_boss_damage.saturating_add(damage),
                member
                    .current_boss_study_minutes
                    .saturating_add(study_minutes),
            );
            let results = defeat_results(boss, rankings, now);
            let spawns_at = next_spawn_time(
                now,
                Duration::hours(schedule.respawn_cooldown_hours),
                &schedule.spawn_hours_utc,
            );

            tx.update(
                &party_path,
                Patch::new()
                    .set(fields::BOSS_HEALTH, 0)
                    .set(fields::BOSS_IS_ALIVE, false)
                    .set(fields::BOSS_DEFEATED_AT, now.to_rfc3339())
                    .set(fields::LAST_BOSS_RESULTS, encode(&party_path, &results)?)
                    .set(fields::NEXT_BOSS_SPAWNS_AT, spawns_at.to_rfc3339())
                    .increment(fields::BOSSES_DEFEATED, 1),
            );
            for other in &members {
                let mut reset = Patch::new()
                    .set(fields::BOSS_DAMAGE, 0)
                    .set(fields::BOSS_STUDY_MINUTES, 0);
                if other.user_id == user_id {
                    reset = reset.set(fields::LAST_DAMAGE_AT, now.to_rfc3339());
                }
                tx.update(&DocPath::member(party_id, &other.user_id), reset);
            }
            Ok(DamageOutcome {
                damage_dealt: boss.current_health,
                boss_health: 0,
                defeated: true,
                results: Some(results),
            })
        })?;

        if let Some(results) = &outcome.results {
            log::info!(
                "party {party_id} defeated boss #{} {} in {} (top: {})",
                results.boss_number,
                results.boss_name,
                results.fight_duration,
                results
                    .rankings
                    .first()
                    .map_or("nobody", |entry| entry.display_name.as_str())
            );
        } else if outcome.damage_dealt == 0 {
            log::debug!("damage from {user_id} to party {party_id} ignored");
        }
        Ok(outcome)
    }
}
