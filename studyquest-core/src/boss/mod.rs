//! Party boss fights.
//!
//! A party's boss is either alive (taking damage from study sessions and
//! attacking idle members) or defeated and waiting for the next slot of the
//! spawn schedule. Every transition is applied lazily by whichever request
//! first observes it.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::config::ConfigError;

pub mod battle;
pub mod idle;
pub mod schedule;

pub use battle::{DamageOutcome, rank_contributions};
pub use idle::{DeathPenalty, IdleAttackDue, IdleAttackOutcome, idle_attack_days};
pub use schedule::{format_fight_duration, next_spawn_time};

const DEFAULT_BOSS_DATA: &str = include_str!("../../assets/data/bosses.json");

/// Roster entry describing one boss of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossDef {
    pub name: String,
    pub max_health: u64,
    pub damage_per_day: u32,
}

/// Ordered boss cycle; boss numbers are 1-based positions in `bosses`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BossRoster {
    #[serde(default)]
    pub bosses: Vec<BossDef>,
}

impl BossRoster {
    #[must_use]
    pub fn load_from_static() -> Self {
        serde_json::from_str(DEFAULT_BOSS_DATA).unwrap_or_default()
    }

    #[must_use]
    pub fn default_roster() -> &'static Self {
        static ROSTER: OnceLock<BossRoster> = OnceLock::new();
        ROSTER.get_or_init(Self::load_from_static)
    }

    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a roster.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        u32::try_from(self.bosses.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bosses.is_empty()
    }

    #[must_use]
    pub fn get(&self, boss_number: u32) -> Option<&BossDef> {
        let index = usize::try_from(boss_number.checked_sub(1)?).ok()?;
        self.bosses.get(index)
    }

    /// Boss that follows `current` in the cycle.
    #[must_use]
    pub fn next_number(&self, current: u32) -> u32 {
        match self.len() {
            0 => 1,
            len => (current % len) + 1,
        }
    }

    /// Fresh boss `boss_number` at full health.
    #[must_use]
    pub fn spawn(&self, boss_number: u32, now: DateTime<Utc>) -> BossState {
        let (name, max_health) = self.get(boss_number).map_or_else(
            || (format!("Boss {boss_number}"), 1),
            |def| (def.name.clone(), def.max_health.max(1)),
        );
        BossState {
            boss_number,
            name,
            max_health,
            current_health: max_health,
            is_alive: true,
            created_at: now,
            defeated_at: None,
        }
    }

    /// Idle damage per day for `boss_number`; unknown bosses deal none.
    #[must_use]
    pub fn damage_per_day(&self, boss_number: u32) -> u32 {
        self.get(boss_number).map_or(0, |def| def.damage_per_day)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` when the roster is empty, its bosses do not get
    /// strictly tougher, or a boss hits idle players softer than its
    /// predecessor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bosses.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        for (position, pair) in self.bosses.windows(2).enumerate() {
            let boss_number = u32::try_from(position + 2).unwrap_or(u32::MAX);
            if pair[1].max_health <= pair[0].max_health {
                return Err(ConfigError::RosterOrder { boss_number });
            }
            if pair[1].damage_per_day < pair[0].damage_per_day {
                return Err(ConfigError::RosterDamage { boss_number });
            }
        }
        Ok(())
    }
}

/// Boss embedded in a party record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossState {
    pub boss_number: u32,
    pub name: String,
    pub max_health: u64,
    pub current_health: u64,
    pub is_alive: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub defeated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: String,
    pub display_name: String,
    pub damage: u64,
    pub study_minutes: u64,
}

/// Summary written when a boss falls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossResults {
    pub boss_number: u32,
    pub boss_name: String,
    pub rankings: Vec<RankingEntry>,
    pub fight_duration: String,
    pub total_damage: u64,
    pub defeated_at: DateTime<Utc>,
}
