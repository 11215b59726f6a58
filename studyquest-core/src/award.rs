//! Experience awards, study sessions and reward application.
//!
//! [`StudyQuestEngine::award_xp`] is the only path that raises a player's
//! experience. It keeps the player record, the party member mirror, the daily
//! session aggregate and both leaderboard periods in step within one
//! transaction.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::boosters::{BoosterSave, save_booster};
use crate::boss::DamageOutcome;
use crate::calendar::{day_key, month_id, next_streak, week_id};
use crate::error::{EngineError, RecordKind};
use crate::loot::{Cosmetic, SessionRewards};
use crate::numbers::u64_to_i64_saturating;
use crate::progression::{LevelUpResult, level_up_result};
use crate::state::{DailySession, MemberRecord, UserRecord, encode, fields, read, require};
use crate::store::{DocPath, DocumentStore, Patch};
use crate::{Clock, StudyQuestEngine};

/// Result of [`StudyQuestEngine::award_xp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardResult {
    pub success: bool,
    /// Experience actually granted, after any booster multiplier.
    pub xp_gain: u64,
    pub multiplier: u32,
    pub leveled_up: bool,
    pub new_level: u32,
    pub levels_gained: u32,
    pub coin_bonus: u64,
    /// Milestone titles unlocked by this level-up.
    pub unlocked_titles: Vec<String>,
}

/// Result of [`StudyQuestEngine::apply_session_rewards`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppliedRewards {
    pub unlocked: Vec<Cosmetic>,
    pub boosters_saved: u32,
    pub boosters_converted: u32,
    pub duplicates_converted: u32,
    pub bonus_xp: u64,
    pub award: Option<AwardResult>,
}

/// Result of [`StudyQuestEngine::record_study_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyOutcome {
    pub streak: u32,
    pub damage: Option<DamageOutcome>,
}

struct Granted {
    old_level: u32,
    xp_gain: u64,
    multiplier: u32,
    level: LevelUpResult,
}

impl<S: DocumentStore, C: Clock> StudyQuestEngine<S, C> {
    /// Grant `amount` experience to `user_id`, multiplied by a running booster.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user (nothing is
    /// written), or a store error.
    pub fn award_xp(&self, user_id: &str, amount: u64) -> Result<AwardResult, EngineError> {
        let now = self.now();
        let user_path = DocPath::user(user_id);
        let day_path = DocPath::daily_session(user_id, &day_key(now));
        let weekly_path = DocPath::weekly_entry(&week_id(now), user_id);
        let monthly_path = DocPath::monthly_entry(&month_id(now), user_id);

        let granted = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let _day: Option<DailySession> = read(tx, &day_path)?;
            let member_path = user
                .current_party_id
                .as_deref()
                .map(|party_id| DocPath::member(party_id, user_id));
            let member: Option<MemberRecord> = match &member_path {
                Some(path) => read(tx, path)?,
                None => None,
            };

            let multiplier = user.booster_multiplier(now);
            let xp_gain = amount.saturating_mul(u64::from(multiplier));
            let new_exp = user.exp.saturating_add(xp_gain);
            let level = level_up_result(user.exp, new_exp, user.level);
            let delta = u64_to_i64_saturating(xp_gain);

            let mut user_patch = Patch::new()
                .increment(fields::EXP, delta)
                .set(fields::LEVEL, level.new_level);
            if level.leveled_up {
                user_patch =
                    user_patch.increment(fields::COINS, u64_to_i64_saturating(level.coin_bonus));
            }
            tx.update(&user_path, user_patch);

            if let (Some(path), Some(_)) = (&member_path, &member) {
                tx.update(
                    path,
                    Patch::new()
                        .increment(fields::EXP, delta)
                        .set(fields::LEVEL, level.new_level),
                );
            }

            tx.merge(
                &day_path,
                Patch::new()
                    .set(fields::DATE, day_key(now))
                    .increment(fields::EXP_EARNED, delta),
            );

            let title = user
                .equipped_title
                .as_deref()
                .map_or(Value::Null, Value::from);
            let entry = Patch::new()
                .set(fields::USER_ID, user_id)
                .increment(fields::EXP, delta)
                .set(fields::LEVEL, level.new_level)
                .set(fields::DISPLAY_NAME, user.display_name.as_str())
                .set(fields::AVATAR, user.avatar.as_str())
                .set(fields::IS_PRO, user.is_pro())
                .set(fields::STREAK, user.streak)
                .set(fields::TITLE, title)
                .server_timestamp(fields::UPDATED_AT);
            tx.merge(&weekly_path, entry.clone());
            tx.merge(&monthly_path, entry);

            Ok::<_, EngineError>(Granted {
                old_level: user.level,
                xp_gain,
                multiplier,
                level,
            })
        })?;

        let unlocked_titles = if granted.level.leveled_up {
            log::info!(
                "{user_id} reached level {} (+{} coins)",
                granted.level.new_level,
                granted.level.coin_bonus
            );
            self.unlock_milestone_titles(user_id, granted.old_level, granted.level.new_level)?
        } else {
            Vec::new()
        };

        Ok(AwardResult {
            success: true,
            xp_gain: granted.xp_gain,
            multiplier: granted.multiplier,
            leveled_up: granted.level.leveled_up,
            new_level: granted.level.new_level,
            levels_gained: granted.level.levels_gained,
            coin_bonus: granted.level.coin_bonus,
            unlocked_titles,
        })
    }

    /// Unlock milestone titles for levels in `(old_level, new_level]`.
    fn unlock_milestone_titles(
        &self,
        user_id: &str,
        old_level: u32,
        new_level: u32,
    ) -> Result<Vec<String>, EngineError> {
        let pending: Vec<String> = self
            .config
            .rewards
            .milestones_between(old_level, new_level)
            .map(|milestone| milestone.title_id.clone())
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let user_path = DocPath::user(user_id);
        let unlocked = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let mut titles = user.unlocked_titles;
            let fresh: Vec<String> = pending
                .iter()
                .filter(|title| titles.insert((*title).clone()))
                .cloned()
                .collect();
            if !fresh.is_empty() {
                tx.update(
                    &user_path,
                    Patch::new().set(fields::UNLOCKED_TITLES, encode(&user_path, &titles)?),
                );
            }
            Ok::<_, EngineError>(fresh)
        })?;
        for title in &unlocked {
            log::info!("{user_id} unlocked milestone title {title}");
        }
        Ok(unlocked)
    }

    /// Persist session loot: new cosmetics, saved boosters, then bonus XP.
    ///
    /// Cosmetics are checked against the stored collection again, so one
    /// unlocked in the meantime pays its duplicate XP instead. Boosters that
    /// find every slot taken pay overflow XP.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn apply_session_rewards(
        &self,
        user_id: &str,
        rewards: &SessionRewards,
    ) -> Result<AppliedRewards, EngineError> {
        let now = self.now();
        let config = &self.config;
        let user_path = DocPath::user(user_id);

        let mut applied = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let mut collection = user.collection();
            let mut saved = user.saved_boosters;
            let mut applied = AppliedRewards {
                bonus_xp: rewards.bonus_xp,
                duplicates_converted: rewards.duplicates_converted,
                ..AppliedRewards::default()
            };

            for cosmetic in &rewards.cosmetics {
                if cosmetic.add_to(&mut collection) {
                    applied.unlocked.push(cosmetic.clone());
                } else {
                    let rule = config.rewards.rule(cosmetic.rarity);
                    applied.duplicates_converted += 1;
                    applied.bonus_xp = applied
                        .bonus_xp
                        .saturating_sub(rule.bonus_xp)
                        .saturating_add(rule.duplicate_xp);
                }
            }
            for grant in &rewards.boosters {
                match save_booster(&mut saved, *grant, now, &config.schedule) {
                    BoosterSave::Saved => applied.boosters_saved += 1,
                    BoosterSave::Converted { xp } => {
                        applied.boosters_converted += 1;
                        applied.bonus_xp = applied.bonus_xp.saturating_add(xp);
                    }
                }
            }

            if !applied.unlocked.is_empty() || !rewards.boosters.is_empty() {
                tx.update(
                    &user_path,
                    Patch::new()
                        .set(fields::UNLOCKED_TITLES, encode(&user_path, &collection.titles)?)
                        .set(fields::UNLOCKED_AVATARS, encode(&user_path, &collection.avatars)?)
                        .set(fields::SAVED_BOOSTERS, encode(&user_path, &saved)?),
                );
            }
            Ok::<_, EngineError>(applied)
        })?;

        if applied.bonus_xp > 0 {
            applied.award = Some(self.award_xp(user_id, applied.bonus_xp)?);
        }
        log::debug!(
            "{user_id} received {} cosmetic(s), {} booster(s) and {} bonus xp",
            applied.unlocked.len(),
            applied.boosters_saved,
            applied.bonus_xp
        );
        Ok(applied)
    }

    /// Log a study session: daily totals, streak, and boss damage for the
    /// player's party.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown user, or a store error.
    pub fn record_study_session(
        &self,
        user_id: &str,
        minutes: u64,
        cards: u64,
    ) -> Result<StudyOutcome, EngineError> {
        let now = self.now();
        let today = now.date_naive();
        let user_path = DocPath::user(user_id);
        let day_path = DocPath::daily_session(user_id, &day_key(now));

        let (streak, party_id) = self.store.run_transaction(|tx| {
            let user: UserRecord = require(tx, &user_path, RecordKind::User)?;
            let _day: Option<DailySession> = read(tx, &day_path)?;
            let streak = next_streak(user.last_study_day, today, user.streak);
            tx.update(
                &user_path,
                Patch::new()
                    .set(fields::STREAK, streak)
                    .set(fields::LAST_STUDY_DAY, today.to_string()),
            );
            tx.merge(
                &day_path,
                Patch::new()
                    .set(fields::DATE, day_key(now))
                    .increment(fields::MINUTES_STUDIED, u64_to_i64_saturating(minutes))
                    .increment(fields::CARDS_REVIEWED, u64_to_i64_saturating(cards)),
            );
            Ok::<_, EngineError>((streak, user.current_party_id))
        })?;

        let damage = match party_id {
            Some(party_id) => {
                let amount = self.config.schedule.session_damage(minutes, cards);
                Some(self.deal_boss_damage(&party_id, user_id, amount, minutes)?)
            }
            None => None,
        };
        Ok(StudyOutcome { streak, damage })
    }
}
