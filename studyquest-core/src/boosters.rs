//! XP boosters: saved slots, activation and expiry.
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::config::ScheduleConfig;
use crate::error::{EngineError, RecordKind};
use crate::loot::BoosterGrant;
use crate::state::{ActiveBooster, SavedBooster, UserRecord, encode, fields, require};
use crate::store::{DocPath, DocumentStore, Patch};
use crate::{Clock, StudyQuestEngine};

/// What happened to a booster grant offered to the saved slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoosterSave {
    Saved,
    /// Every slot was taken; the grant became bonus XP.
    Converted { xp: u64 },
}

/// Drop saved boosters that expired; returns how many were removed.
pub fn prune_expired(saved: &mut Vec<SavedBooster>, now: DateTime<Utc>) -> usize {
    let before = saved.len();
    saved.retain(|booster| !booster.is_expired(now));
    before - saved.len()
}

/// Offer `grant` to the saved slots, evicting expired boosters first.
pub fn save_booster(
    saved: &mut Vec<SavedBooster>,
    grant: BoosterGrant,
    now: DateTime<Utc>,
    schedule: &ScheduleConfig,
) -> BoosterSave {
    prune_expired(saved, now);
    if saved.len() >= schedule.max_saved_boosters {
        return BoosterSave::Converted {
            xp: schedule.booster_overflow_xp,
        };
    }
    saved.push(SavedBooster {
        multiplier: grant.multiplier,
        duration_minutes: grant.duration_minutes,
        earned_at: now,
        expires_at: now + Duration::days(schedule.saved_booster_expiry_days),
    });
    BoosterSave::Saved
}

impl<S: DocumentStore, C: Clock> StudyQuestEngine<S, C> {
    /// Start saved booster `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BoosterAlreadyActive`] while another booster
    /// runs, [`EngineError::BoosterUnavailable`] when the slot is empty,
    /// [`EngineError::BoosterExpired`] when the saved booster lapsed, and
    /// [`EngineError::NotFound`] for an unknown user.
    pub fn activate_booster(&self, user_id: &str, index: usize) -> Result<ActiveBooster, EngineError> {
        let now = self.now();
        let user_path = DocPath::user(user_id);
        let active = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            if let Some(active) = user.active_booster.as_ref().filter(|b| b.is_running(now)) {
                return Err(EngineError::BoosterAlreadyActive {
                    ends_at: active.ends_at.to_rfc3339(),
                });
            }
            let mut saved = user.saved_boosters;
            let Some(booster) = saved.get(index).cloned() else {
                return Err(EngineError::BoosterUnavailable { index });
            };
            if booster.is_expired(now) {
                return Err(EngineError::BoosterExpired {
                    index,
                    expired_at: booster.expires_at.to_rfc3339(),
                });
            }
            saved.remove(index);
            let active = ActiveBooster {
                multiplier: booster.multiplier,
                started_at: now,
                ends_at: now + Duration::minutes(i64::from(booster.duration_minutes)),
            };
            tx.update(
                &user_path,
                Patch::new()
                    .set(fields::SAVED_BOOSTERS, encode(&user_path, &saved)?)
                    .set(fields::ACTIVE_BOOSTER, encode(&user_path, &active)?),
            );
            Ok(active)
        })?;
        log::info!(
            "{user_id} activated a {}x booster until {}",
            active.multiplier,
            active.ends_at
        );
        Ok(active)
    }

    /// Clear a finished active booster and drop lapsed saved ones.
    ///
    /// Returns `true` when anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn expire_boosters(&self, user_id: &str) -> Result<bool, EngineError> {
        let now = self.now();
        let user_path = DocPath::user(user_id);
        self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let active_done = user
                .active_booster
                .as_ref()
                .is_some_and(|booster| !booster.is_running(now));
            let mut saved = user.saved_boosters;
            let pruned = prune_expired(&mut saved, now);
            if !active_done && pruned == 0 {
                return Ok(false);
            }
            let mut patch = Patch::new();
            if active_done {
                patch = patch.set(fields::ACTIVE_BOOSTER, Value::Null);
            }
            if pruned > 0 {
                patch = patch.set(fields::SAVED_BOOSTERS, encode(&user_path, &saved)?);
            }
            tx.update(&user_path, patch);
            log::debug!("expired boosters for {user_id} (active: {active_done}, saved: {pruned})");
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GRANT: BoosterGrant = BoosterGrant {
        multiplier: 2,
        duration_minutes: 20,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn saved_boosters_expire_after_a_week() {
        let schedule = ScheduleConfig::default();
        let mut saved = Vec::new();
        assert_eq!(save_booster(&mut saved, GRANT, now(), &schedule), BoosterSave::Saved);
        assert_eq!(saved[0].expires_at, now() + Duration::days(7));
        assert!(!saved[0].is_expired(now() + Duration::days(6)));
        assert!(saved[0].is_expired(now() + Duration::days(7)));
    }

    #[test]
    fn full_slots_convert_to_xp() {
        let schedule = ScheduleConfig::default();
        let mut saved = Vec::new();
        for _ in 0..3 {
            save_booster(&mut saved, GRANT, now(), &schedule);
        }
        assert_eq!(
            save_booster(&mut saved, GRANT, now(), &schedule),
            BoosterSave::Converted { xp: 100 }
        );
        assert_eq!(saved.len(), 3);
    }

    #[test]
    fn expired_slots_are_reclaimed_before_converting() {
        let schedule = ScheduleConfig::default();
        let mut saved = Vec::new();
        let old = now() - Duration::days(8);
        for _ in 0..3 {
            save_booster(&mut saved, GRANT, old, &schedule);
        }
        assert_eq!(save_booster(&mut saved, GRANT, now(), &schedule), BoosterSave::Saved);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].earned_at, now());
    }
}
