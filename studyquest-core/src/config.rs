//! Engine configuration: data tables plus schedule and pacing knobs.
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::boss::BossRoster;
use crate::constants::{
    BOOSTER_OVERFLOW_XP, BOSS_RESPAWN_COOLDOWN_HOURS, BOSS_SPAWN_HOURS_UTC, DAMAGE_PER_CARD,
    DAMAGE_PER_STUDY_MINUTE, DEATH_EXP_LOSS_FRACTION, IDLE_ATTACK_INTERVAL_HOURS,
    MAX_PARTY_MEMBERS, MAX_SAVED_BOOSTERS, NEW_ACCOUNT_IMMUNITY_HOURS, SAVED_BOOSTER_EXPIRY_DAYS,
};
use crate::error::ErrorKind;
use crate::loot::RewardsCatalog;

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("loot bands must start at 0 (first band starts at {start:.2})")]
    BandsStartLate { start: f64 },
    #[error("loot band {index} starts at {start:.2} but the previous band ends at {expected:.2}")]
    BandDiscontinuity {
        index: usize,
        expected: f64,
        start: f64,
    },
    #[error("loot band {index} is empty ({start:.2}..{end:.2})")]
    BandEmpty { index: usize, start: f64, end: f64 },
    #[error("loot bands must end at {expected:.2} (last band ends at {end:.2})")]
    BandsEndEarly { expected: f64, end: f64 },
    #[error("bonus XP tier weights must sum to 100 (got {total})")]
    TierWeights { total: u32 },
    #[error("boss roster is empty")]
    EmptyRoster,
    #[error("boss {boss_number} is not tougher than the boss before it")]
    RosterOrder { boss_number: u32 },
    #[error("boss {boss_number} deals less daily damage than the boss before it")]
    RosterDamage { boss_number: u32 },
    #[error("spawn schedule has no hours")]
    NoSpawnHours,
    #[error("spawn hour {hour} is outside 0..24")]
    SpawnHour { hour: u32 },
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}

impl ConfigError {
    /// Configuration problems are never caused by the caller's request.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Pacing and capacity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    pub spawn_hours_utc: Vec<u32>,
    pub respawn_cooldown_hours: i64,
    pub immunity_hours: i64,
    pub idle_attack_interval_hours: i64,
    pub death_exp_loss_fraction: f64,
    pub damage_per_study_minute: u64,
    pub damage_per_card: u64,
    pub max_party_members: u32,
    pub max_saved_boosters: usize,
    pub saved_booster_expiry_days: i64,
    pub booster_overflow_xp: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            spawn_hours_utc: BOSS_SPAWN_HOURS_UTC.to_vec(),
            respawn_cooldown_hours: BOSS_RESPAWN_COOLDOWN_HOURS,
            immunity_hours: NEW_ACCOUNT_IMMUNITY_HOURS,
            idle_attack_interval_hours: IDLE_ATTACK_INTERVAL_HOURS,
            death_exp_loss_fraction: DEATH_EXP_LOSS_FRACTION,
            damage_per_study_minute: DAMAGE_PER_STUDY_MINUTE,
            damage_per_card: DAMAGE_PER_CARD,
            max_party_members: MAX_PARTY_MEMBERS,
            max_saved_boosters: MAX_SAVED_BOOSTERS,
            saved_booster_expiry_days: SAVED_BOOSTER_EXPIRY_DAYS,
            booster_overflow_xp: BOOSTER_OVERFLOW_XP,
        }
    }
}

impl ScheduleConfig {
    /// Boss damage dealt by one study session.
    #[must_use]
    pub fn session_damage(&self, minutes: u64, cards: u64) -> u64 {
        minutes
            .saturating_mul(self.damage_per_study_minute)
            .saturating_add(cards.saturating_mul(self.damage_per_card))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.spawn_hours_utc.is_empty() {
            return Err(ConfigError::NoSpawnHours);
        }
        if let Some(hour) = self.spawn_hours_utc.iter().find(|hour| **hour >= 24) {
            return Err(ConfigError::SpawnHour { hour: *hour });
        }
        if !(0.0..=1.0).contains(&self.death_exp_loss_fraction) {
            return Err(ConfigError::RangeViolation {
                field: "death_exp_loss_fraction",
                min: 0.0,
                max: 1.0,
                value: self.death_exp_loss_fraction,
            });
        }
        if self.max_party_members == 0 {
            return Err(ConfigError::RangeViolation {
                field: "max_party_members",
                min: 1.0,
                max: f64::from(u32::MAX),
                value: 0.0,
            });
        }
        if self.idle_attack_interval_hours <= 0 {
            return Err(ConfigError::RangeViolation {
                field: "idle_attack_interval_hours",
                min: 1.0,
                max: f64::from(u32::MAX),
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Everything the engine needs besides its store and clock.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub roster: BossRoster,
    pub rewards: RewardsCatalog,
    pub schedule: ScheduleConfig,
}

impl EngineConfig {
    /// Configuration built from the embedded data tables.
    #[must_use]
    pub fn load_from_static() -> Self {
        Self {
            roster: BossRoster::load_from_static(),
            rewards: RewardsCatalog::load_from_static(),
            schedule: ScheduleConfig::default(),
        }
    }

    #[must_use]
    pub fn default_config() -> &'static Self {
        static CONFIG: OnceLock<EngineConfig> = OnceLock::new();
        CONFIG.get_or_init(Self::load_from_static)
    }

    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when any table or field violates its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.roster.validate()?;
        self.rewards.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}
