//! Stored records and typed access helpers.
//!
//! Records are JSON documents with camelCase field names. Patches address
//! fields by the names in [`fields`], so a rename here must be mirrored there.
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::boss::{BossResults, BossState};
use crate::constants::{MAX_HEALTH, MAX_MANA};
use crate::error::{EngineError, RecordKind};
use crate::store::{DocPath, DocumentStore, Transaction};

/// Field names used in patches.
pub(crate) mod fields {
    // User
    pub const EXP: &str = "exp";
    pub const LEVEL: &str = "level";
    pub const COINS: &str = "coins";
    pub const HEALTH: &str = "health";
    pub const CURRENT_PARTY_ID: &str = "currentPartyId";
    pub const LAST_BOSS_ATTACK_AT: &str = "lastBossAttackAt";
    pub const UNLOCKED_TITLES: &str = "unlockedTitles";
    pub const UNLOCKED_AVATARS: &str = "unlockedAvatars";
    pub const SAVED_BOOSTERS: &str = "savedBoosters";
    pub const ACTIVE_BOOSTER: &str = "activeBooster";
    pub const STREAK: &str = "streak";
    pub const LAST_STUDY_DAY: &str = "lastStudyDay";
    pub const REVIVE_COUNT: &str = "reviveCount";
    pub const LAST_DEATH: &str = "lastDeath";
    pub const UPDATED_AT: &str = "updatedAt";

    // Party
    pub const MEMBER_COUNT: &str = "memberCount";
    pub const LEADER_ID: &str = "leaderId";
    pub const IS_ACTIVE: &str = "isActive";
    pub const CURRENT_BOSS: &str = "currentBoss";
    pub const BOSS_HEALTH: &str = "currentBoss.currentHealth";
    pub const BOSS_IS_ALIVE: &str = "currentBoss.isAlive";
    pub const BOSS_DEFEATED_AT: &str = "currentBoss.defeatedAt";
    pub const NEXT_BOSS_SPAWNS_AT: &str = "nextBossSpawnsAt";
    pub const LAST_BOSS_RESULTS: &str = "lastBossResults";
    pub const BOSSES_DEFEATED: &str = "bossesDefeated";

    // Member
    pub const BOSS_DAMAGE: &str = "currentBossDamage";
    pub const BOSS_STUDY_MINUTES: &str = "currentBossStudyMinutes";
    pub const LAST_DAMAGE_AT: &str = "lastDamageAt";

    // Daily session
    pub const DATE: &str = "date";
    pub const MINUTES_STUDIED: &str = "minutesStudied";
    pub const CARDS_REVIEWED: &str = "cardsReviewed";
    pub const EXP_EARNED: &str = "expEarned";

    // Leaderboard
    pub const USER_ID: &str = "userId";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const AVATAR: &str = "avatar";
    pub const IS_PRO: &str = "isPro";
    pub const TITLE: &str = "title";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub tier: SubscriptionTier,
}

/// A booster waiting in one of the saved slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBooster {
    pub multiplier: u32,
    pub duration_minutes: u32,
    pub earned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SavedBooster {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBooster {
    pub multiplier: u32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl ActiveBooster {
    #[must_use]
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    pub cause: String,
    pub at: DateTime<Utc>,
}

/// Cosmetics a player already owns; duplicates are detected against it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default)]
    pub titles: BTreeSet<String>,
    #[serde(default)]
    pub avatars: BTreeSet<String>,
}

/// Snapshot of the stats mirrored into a party member record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    pub level: u32,
    pub exp: u64,
    pub health: u32,
    pub mana: u32,
    pub avatar: String,
}

impl Default for MemberStats {
    fn default() -> Self {
        Self {
            level: 1,
            exp: 0,
            health: MAX_HEALTH,
            mana: MAX_MANA,
            avatar: String::new(),
        }
    }
}

const fn default_level() -> u32 {
    1
}

const fn default_health() -> u32 {
    MAX_HEALTH
}

const fn default_mana() -> u32 {
    MAX_MANA
}

const fn default_true() -> bool {
    true
}

/// `users/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub exp: u64,
    #[serde(default)]
    pub coins: u64,
    #[serde(default = "default_health")]
    pub health: u32,
    #[serde(default = "default_mana")]
    pub mana: u32,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub current_party_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_boss_attack_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unlocked_titles: BTreeSet<String>,
    #[serde(default)]
    pub unlocked_avatars: BTreeSet<String>,
    #[serde(default)]
    pub equipped_title: Option<String>,
    #[serde(default)]
    pub saved_boosters: Vec<SavedBooster>,
    #[serde(default)]
    pub active_booster: Option<ActiveBooster>,
    #[serde(default)]
    pub subscription: Subscription,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_study_day: Option<NaiveDate>,
    #[serde(default)]
    pub revive_count: u32,
    #[serde(default)]
    pub last_death: Option<DeathRecord>,
}

impl UserRecord {
    /// Fresh level-1 player at full vitals.
    #[must_use]
    pub fn new(id: &str, display_name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            level: 1,
            exp: 0,
            coins: 0,
            health: MAX_HEALTH,
            mana: MAX_MANA,
            avatar: String::new(),
            current_party_id: None,
            created_at,
            last_boss_attack_at: None,
            unlocked_titles: BTreeSet::new(),
            unlocked_avatars: BTreeSet::new(),
            equipped_title: None,
            saved_boosters: Vec::new(),
            active_booster: None,
            subscription: Subscription::default(),
            streak: 0,
            last_study_day: None,
            revive_count: 0,
            last_death: None,
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier: SubscriptionTier) -> Self {
        self.subscription.tier = tier;
        self
    }

    #[must_use]
    pub fn is_pro(&self) -> bool {
        self.subscription.tier == SubscriptionTier::Pro
    }

    #[must_use]
    pub fn collection(&self) -> Collection {
        Collection {
            titles: self.unlocked_titles.clone(),
            avatars: self.unlocked_avatars.clone(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> MemberStats {
        MemberStats {
            level: self.level,
            exp: self.exp,
            health: self.health,
            mana: self.mana,
            avatar: self.avatar.clone(),
        }
    }

    /// Booster multiplier in effect at `now` (1 when none is running).
    #[must_use]
    pub fn booster_multiplier(&self, now: DateTime<Utc>) -> u32 {
        self.active_booster
            .as_ref()
            .filter(|booster| booster.is_running(now))
            .map_or(1, |booster| booster.multiplier.max(1))
    }
}

/// `parties/{partyId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyRecord {
    pub id: String,
    pub name: String,
    pub leader_id: String,
    pub member_count: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
    pub current_boss: BossState,
    #[serde(default)]
    pub next_boss_spawns_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_boss_results: Option<BossResults>,
    #[serde(default)]
    pub bosses_defeated: u32,
    pub created_at: DateTime<Utc>,
}

impl PartyRecord {
    #[must_use]
    pub fn has_room(&self, capacity: u32) -> bool {
        self.is_active && self.is_public && self.member_count < capacity
    }
}

/// `parties/{partyId}/members/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub user_id: String,
    pub display_name: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub exp: u64,
    #[serde(default = "default_health")]
    pub health: u32,
    #[serde(default = "default_mana")]
    pub mana: u32,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub current_boss_damage: u64,
    #[serde(default)]
    pub current_boss_study_minutes: u64,
    #[serde(default)]
    pub last_damage_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl MemberRecord {
    #[must_use]
    pub fn from_stats(
        user_id: &str,
        display_name: &str,
        stats: &MemberStats,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            level: stats.level,
            exp: stats.exp,
            health: stats.health,
            mana: stats.mana,
            avatar: stats.avatar.clone(),
            current_boss_damage: 0,
            current_boss_study_minutes: 0,
            last_damage_at: None,
            joined_at,
        }
    }
}

/// `users/{uid}/dailySessions/{YYYY-MM-DD}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySession {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub minutes_studied: u64,
    #[serde(default)]
    pub cards_reviewed: u64,
    #[serde(default)]
    pub exp_earned: u64,
}

/// `leaderboards/{weekly|monthly}/{periodId}/{uid}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    #[serde(default)]
    pub exp: u64,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub(crate) fn decode<T: DeserializeOwned>(path: &DocPath, value: Value) -> Result<T, EngineError> {
    serde_json::from_value(value).map_err(|source| EngineError::Decode {
        path: path.to_string(),
        source,
    })
}

pub(crate) fn encode<T: Serialize>(path: &DocPath, record: &T) -> Result<Value, EngineError> {
    serde_json::to_value(record).map_err(|source| EngineError::Encode {
        path: path.to_string(),
        source,
    })
}

pub(crate) fn read<T: DeserializeOwned>(
    tx: &mut dyn Transaction,
    path: &DocPath,
) -> Result<Option<T>, EngineError> {
    tx.get(path)?.map(|value| decode(path, value)).transpose()
}

pub(crate) fn require<T: DeserializeOwned>(
    tx: &mut dyn Transaction,
    path: &DocPath,
    kind: RecordKind,
) -> Result<T, EngineError> {
    read(tx, path)?.ok_or_else(|| EngineError::not_found(kind, path.id()))
}

pub(crate) fn read_all<T: DeserializeOwned>(
    tx: &mut dyn Transaction,
    collection: &str,
) -> Result<Vec<T>, EngineError> {
    tx.list(collection)?
        .into_iter()
        .map(|(id, value)| decode(&DocPath::new(format!("{collection}/{id}")), value))
        .collect()
}

/// Non-transactional typed read.
pub(crate) fn load<S, T>(store: &S, path: &DocPath) -> Result<Option<T>, EngineError>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    store.get(path)?.map(|value| decode(path, value)).transpose()
}
