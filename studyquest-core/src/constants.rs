//! Centralized balance and tuning constants for StudyQuest progression.
//!
//! These values define the deterministic math for levels, party limits, boss
//! pacing and reward conversion. Keeping them together ensures that balance
//! can only be adjusted via code changes reviewed in version control, rather
//! than through external JSON assets. Data tables (bosses, cosmetics, loot
//! bands) live in `assets/data` instead.

// Progression ----------------------------------------------------------------
pub const BASE_EXP: u64 = 100;
pub const GROWTH_RATE: f64 = 1.15;
pub const LEVEL_UP_COIN_BONUS: u64 = 50;
/// Hard ceiling for the level curve; keeps the exponential cost inside `u64`.
pub const MAX_LEVEL: u32 = 200;

// Player vitals --------------------------------------------------------------
pub const MAX_HEALTH: u32 = 100;
pub const MAX_MANA: u32 = 100;

// Parties --------------------------------------------------------------------
pub const MAX_PARTY_MEMBERS: u32 = 6;
pub(crate) const DEFAULT_PARTY_NAME_SUFFIX: &str = "'s Party";

// Boss pacing ----------------------------------------------------------------
pub(crate) const BOSS_SPAWN_HOURS_UTC: [u32; 4] = [0, 6, 12, 18];
pub(crate) const BOSS_RESPAWN_COOLDOWN_HOURS: i64 = 4;
pub(crate) const NEW_ACCOUNT_IMMUNITY_HOURS: i64 = 24;
pub(crate) const IDLE_ATTACK_INTERVAL_HOURS: i64 = 24;
pub(crate) const DEATH_EXP_LOSS_FRACTION: f64 = 1.0;
pub(crate) const DAMAGE_PER_STUDY_MINUTE: u64 = 10;
pub(crate) const DAMAGE_PER_CARD: u64 = 2;
pub(crate) const DEATH_CAUSE_BOSS_ATTACK: &str = "boss_attack";

// Boosters -------------------------------------------------------------------
pub const MAX_SAVED_BOOSTERS: usize = 3;
pub(crate) const SAVED_BOOSTER_EXPIRY_DAYS: i64 = 7;
pub(crate) const BOOSTER_OVERFLOW_XP: u64 = 100;

// Session rewards ------------------------------------------------------------
/// Minimum session length (minutes) paired with the number of loot rolls.
pub(crate) const SESSION_ROLL_BREAKPOINTS: [(u32, u32); 3] = [(60, 4), (45, 3), (25, 2)];
pub(crate) const ROLL_SPACE: f64 = 100.0;

// Store ----------------------------------------------------------------------
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

// Logging keys ---------------------------------------------------------------
pub(crate) const DEBUG_ENV_VAR: &str = "STUDYQUEST_DEBUG_LOGS";
