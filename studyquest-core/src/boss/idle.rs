//! Passive boss attacks on players who stay away, and the death penalty.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::constants::{DEATH_CAUSE_BOSS_ATTACK, MAX_HEALTH};
use crate::error::{EngineError, RecordKind};
use crate::progression::death_penalty_exp;
use crate::state::{
    DeathRecord, MemberRecord, PartyRecord, UserRecord, encode, fields, read, require,
};
use crate::store::{DocPath, DocumentStore, Patch};
use crate::{Clock, StudyQuestEngine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IdleAttackOutcome {
    NoParty,
    NoBoss,
    /// Account is inside its new-player grace window.
    Immune,
    /// Less than a full day since the last attack.
    NotDue,
    Attacked {
        days: u32,
        damage: u32,
        health: u32,
    },
}

impl IdleAttackOutcome {
    #[must_use]
    pub const fn killed(&self) -> bool {
        matches!(self, Self::Attacked { health: 0, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathPenalty {
    pub level: u32,
    pub exp_before: u64,
    pub exp_after: u64,
    pub revive_count: u32,
}

impl DeathPenalty {
    #[must_use]
    pub const fn exp_lost(&self) -> u64 {
        self.exp_before.saturating_sub(self.exp_after)
    }
}

/// Whether an idle attack is owed at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAttackDue {
    /// The account is still inside its new-player window.
    Immune,
    NotYet,
    /// Whole days of damage owed.
    Days(u32),
}

#[must_use]
pub fn idle_attack_days(
    created_at: DateTime<Utc>,
    last_attack_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    schedule: &ScheduleConfig,
) -> IdleAttackDue {
    if now < created_at + Duration::hours(schedule.immunity_hours) {
        return IdleAttackDue::Immune;
    }
    let Some(last) = last_attack_at else {
        return IdleAttackDue::Days(1);
    };
    let interval = schedule.idle_attack_interval_hours.max(1);
    let hours = (now - last).num_hours();
    if hours < interval {
        return IdleAttackDue::NotYet;
    }
    IdleAttackDue::Days(u32::try_from(hours / interval).unwrap_or(u32::MAX))
}

impl<S: DocumentStore, C: Clock> StudyQuestEngine<S, C> {
    /// Let the party boss hit a player for every full day since its last attack.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn apply_idle_attack(&self, user_id: &str) -> Result<IdleAttackOutcome, EngineError> {
        let now = self.now();
        let config = &self.config;
        let user_path = DocPath::user(user_id);

        let outcome = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let Some(party_id) = user.current_party_id.clone() else {
                return Ok::<_, EngineError>(IdleAttackOutcome::NoParty);
            };
            let party_path = DocPath::party(&party_id);
            let member_path = DocPath::member(&party_id, user_id);
            let Some(party) = read::<PartyRecord>(tx, &party_path)? else {
                return Ok(IdleAttackOutcome::NoParty);
            };
            let member: Option<MemberRecord> = read(tx, &member_path)?;
            if !party.current_boss.is_alive {
                return Ok(IdleAttackOutcome::NoBoss);
            }
            let days = match idle_attack_days(
                user.created_at,
                user.last_boss_attack_at,
                now,
                &config.schedule,
            ) {
                IdleAttackDue::Immune => return Ok(IdleAttackOutcome::Immune),
                IdleAttackDue::NotYet => return Ok(IdleAttackOutcome::NotDue),
                IdleAttackDue::Days(days) => days,
            };

            let per_day = config.roster.damage_per_day(party.current_boss.boss_number);
            let damage = per_day.saturating_mul(days);
            let health = user.health.saturating_sub(damage);
            tx.update(
                &user_path,
                Patch::new()
                    .set(fields::HEALTH, health)
                    .set(fields::LAST_BOSS_ATTACK_AT, now.to_rfc3339()),
            );
            if member.is_some() {
                tx.update(&member_path, Patch::new().set(fields::HEALTH, health));
            }
            Ok(IdleAttackOutcome::Attacked {
                days,
                damage,
                health,
            })
        })?;

        match &outcome {
            IdleAttackOutcome::Attacked {
                days,
                damage,
                health,
            } => log::info!(
                "boss hit idle player {user_id} for {damage} ({days} day(s)); health now {health}"
            ),
            other => log::debug!("no idle attack on {user_id}: {other:?}"),
        }
        Ok(outcome)
    }

    /// Revive a player whose health reached zero.
    ///
    /// Health returns to full, experience earned inside the current level is
    /// forfeited, and the revive counter and cause of death are recorded. The
    /// penalty is guarded by the stored health, so it applies at most once per
    /// death.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn apply_death_penalty(&self, user_id: &str) -> Result<Option<DeathPenalty>, EngineError> {
        let now = self.now();
        let loss_fraction = self.config.schedule.death_exp_loss_fraction;
        let user_path = DocPath::user(user_id);

        let penalty = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let member_path = user
                .current_party_id
                .as_deref()
                .map(|party_id| DocPath::member(party_id, user_id));
            let member_exists = match &member_path {
                Some(path) => read::<MemberRecord>(tx, path)?.is_some(),
                None => false,
            };
            if user.health > 0 {
                return Ok::<_, EngineError>(None);
            }

            let exp_after = death_penalty_exp(user.exp, user.level, loss_fraction);
            let death = DeathRecord {
                cause: DEATH_CAUSE_BOSS_ATTACK.to_string(),
                at: now,
            };
            tx.update(
                &user_path,
                Patch::new()
                    .set(fields::HEALTH, MAX_HEALTH)
                    .set(fields::EXP, exp_after)
                    .increment(fields::REVIVE_COUNT, 1)
                    .set(fields::LAST_DEATH, encode(&user_path, &death)?),
            );
            if let Some(path) = member_path.filter(|_| member_exists) {
                tx.update(
                    &path,
                    Patch::new()
                        .set(fields::HEALTH, MAX_HEALTH)
                        .set(fields::EXP, exp_after),
                );
            }
            Ok(Some(DeathPenalty {
                level: user.level,
                exp_before: user.exp,
                exp_after,
                revive_count: user.revive_count.saturating_add(1),
            }))
        })?;

        if let Some(penalty) = &penalty {
            log::info!(
                "player {user_id} died at level {} and lost {} exp",
                penalty.level,
                penalty.exp_lost()
            );
        }
        Ok(penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn new_accounts_are_immune() {
        let schedule = ScheduleConfig::default();
        let now = created() + Duration::hours(23);
        assert_eq!(
            idle_attack_days(created(), None, now, &schedule),
            IdleAttackDue::Immune
        );
    }

    #[test]
    fn immunity_outranks_a_stale_last_attack() {
        let schedule = ScheduleConfig::default();
        let last = created() - Duration::days(5);
        let now = created() + Duration::hours(12);
        assert_eq!(
            idle_attack_days(created(), Some(last), now, &schedule),
            IdleAttackDue::Immune
        );
    }

    #[test]
    fn first_attack_deals_one_day() {
        let schedule = ScheduleConfig::default();
        let now = created() + Duration::days(10);
        assert_eq!(
            idle_attack_days(created(), None, now, &schedule),
            IdleAttackDue::Days(1)
        );
    }

    #[test]
    fn later_attacks_count_whole_days() {
        let schedule = ScheduleConfig::default();
        let last = created() + Duration::days(2);
        assert_eq!(
            idle_attack_days(created(), Some(last), last + Duration::hours(23), &schedule),
            IdleAttackDue::NotYet
        );
        assert_eq!(
            idle_attack_days(created(), Some(last), last + Duration::hours(24), &schedule),
            IdleAttackDue::Days(1)
        );
        assert_eq!(
            idle_attack_days(created(), Some(last), last + Duration::hours(71), &schedule),
            IdleAttackDue::Days(2)
        );
    }

    #[test]
    fn only_lethal_attacks_report_a_kill() {
        let lethal = IdleAttackOutcome::Attacked {
            days: 3,
            damage: 30,
            health: 0,
        };
        let wound = IdleAttackOutcome::Attacked {
            days: 1,
            damage: 10,
            health: 20,
        };
        assert!(lethal.killed());
        assert!(!wound.killed());
        assert!(!IdleAttackOutcome::NotDue.killed());
    }
}
