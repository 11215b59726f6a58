//! StudyQuest progression engine
//!
//! Player progression and cooperative boss battles for a gamified flashcard
//! app: the level curve, transactional experience awards, party matchmaking,
//! the boss lifecycle and end-of-session loot. Persistence goes through the
//! [`DocumentStore`] seam; [`MemoryStore`] is the in-process implementation.

pub mod award;
pub mod boosters;
pub mod boss;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod loot;
pub mod numbers;
pub mod party;
pub mod progression;
pub mod state;
pub mod store;

// Re-export commonly used types
pub use award::{AppliedRewards, AwardResult, StudyOutcome};
pub use boosters::{BoosterSave, prune_expired, save_booster};
pub use boss::{
    BossDef, BossResults, BossRoster, BossState, DamageOutcome, DeathPenalty, IdleAttackDue,
    IdleAttackOutcome, RankingEntry, format_fight_duration, idle_attack_days, next_spawn_time,
    rank_contributions,
};
pub use calendar::{day_key, month_id, next_streak, week_id};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, ScheduleConfig};
pub use engine::{LoginReport, SessionSummary, StudyQuestEngine};
pub use error::{EngineError, ErrorKind, RecordKind};
pub use loot::{
    BandReward, BoosterGrant, Cosmetic, CosmeticKind, LootBand, LootReward, Rarity,
    RewardsCatalog, SessionRewards, generate_reward, get_session_rewards, roll_count,
};
pub use progression::{
    ExpProgress, LevelUpResult, death_penalty_exp, exp_progress, exp_required_for_level,
    level_from_total_exp, level_up_result, total_exp_for_level,
};
pub use state::{
    ActiveBooster, Collection, DailySession, DeathRecord, LeaderboardEntry, MemberRecord,
    MemberStats, PartyRecord, SavedBooster, Subscription, SubscriptionTier, UserRecord,
};
pub use store::{
    DocPath, DocumentStore, FieldWrite, MemoryStore, PARTIES, Patch, StoreError, Transaction,
    USERS, members_collection,
};
