//! End-of-session loot.
//!
//! Each roll lands in one band of `[0, 100)`: bonus XP, a booster, or a
//! cosmetic of some rarity. Cosmetics the player already owns convert to the
//! rarity's duplicate XP.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config::ConfigError;
use crate::constants::{ROLL_SPACE, SESSION_ROLL_BREAKPOINTS};
use crate::state::Collection;

const DEFAULT_REWARDS_DATA: &str = include_str!("../assets/data/rewards.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Uncommon,
    Rare,
    Legendary,
    /// Granted for reaching a level; never dropped as loot.
    Milestone,
}

impl Rarity {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Legendary => "legendary",
            Self::Milestone => "milestone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandReward {
    FlatXp,
    Booster,
    Cosmetic { rarity: Rarity },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootBand {
    pub start: f64,
    pub end: f64,
    pub reward: BandReward,
}

impl LootBand {
    #[must_use]
    pub fn contains(&self, roll: f64) -> bool {
        (self.start..self.end).contains(&roll)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpTier {
    pub name: String,
    pub weight: u32,
    pub xp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterGrant {
    pub multiplier: u32,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityRule {
    #[serde(default)]
    pub bonus_xp: u64,
    #[serde(default)]
    pub duplicate_xp: u64,
    #[serde(default)]
    pub booster: Option<BoosterGrant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CosmeticKind {
    Title,
    Avatar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmeticDef {
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub pro_only: bool,
}

/// A cosmetic handed to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosmetic {
    pub kind: CosmeticKind,
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
}

impl Cosmetic {
    fn from_def(kind: CosmeticKind, def: &CosmeticDef) -> Self {
        Self {
            kind,
            id: def.id.clone(),
            name: def.name.clone(),
            rarity: def.rarity,
        }
    }

    #[must_use]
    pub fn is_owned(&self, collection: &Collection) -> bool {
        match self.kind {
            CosmeticKind::Title => collection.titles.contains(&self.id),
            CosmeticKind::Avatar => collection.avatars.contains(&self.id),
        }
    }

    /// Add to `collection`; returns `false` if it was already owned.
    pub fn add_to(&self, collection: &mut Collection) -> bool {
        match self.kind {
            CosmeticKind::Title => collection.titles.insert(self.id.clone()),
            CosmeticKind::Avatar => collection.avatars.insert(self.id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneTitle {
    pub level: u32,
    pub title_id: String,
}

/// Loot tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsCatalog {
    #[serde(default)]
    pub bands: Vec<LootBand>,
    #[serde(default)]
    pub xp_tiers: Vec<XpTier>,
    #[serde(default)]
    pub rarities: BTreeMap<Rarity, RarityRule>,
    pub session_booster: BoosterGrant,
    #[serde(default = "RewardsCatalog::default_boosters_enabled")]
    pub boosters_enabled: bool,
    #[serde(default)]
    pub titles: Vec<CosmeticDef>,
    #[serde(default)]
    pub avatars: Vec<CosmeticDef>,
    #[serde(default)]
    pub milestone_titles: Vec<MilestoneTitle>,
}

impl Default for RewardsCatalog {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            xp_tiers: Vec::new(),
            rarities: BTreeMap::new(),
            session_booster: BoosterGrant {
                multiplier: 2,
                duration_minutes: 20,
            },
            boosters_enabled: Self::default_boosters_enabled(),
            titles: Vec::new(),
            avatars: Vec::new(),
            milestone_titles: Vec::new(),
        }
    }
}

impl RewardsCatalog {
    const fn default_boosters_enabled() -> bool {
        true
    }

    #[must_use]
    pub fn load_from_static() -> Self {
        serde_json::from_str(DEFAULT_REWARDS_DATA).unwrap_or_default()
    }

    #[must_use]
    pub fn default_catalog() -> &'static Self {
        static CATALOG: OnceLock<RewardsCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::load_from_static)
    }

    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a rewards catalog.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` when the bands do not partition `[0, 100)` or the
    /// XP tier weights do not sum to 100.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut expected = 0.0_f64;
        for (index, band) in self.bands.iter().enumerate() {
            if index == 0 && band.start > 0.0 {
                return Err(ConfigError::BandsStartLate { start: band.start });
            }
            if (band.start - expected).abs() > f64::EPSILON {
                return Err(ConfigError::BandDiscontinuity {
                    index,
                    expected,
                    start: band.start,
                });
            }
            if band.end <= band.start {
                return Err(ConfigError::BandEmpty {
                    index,
                    start: band.start,
                    end: band.end,
                });
            }
            expected = band.end;
        }
        if (expected - ROLL_SPACE).abs() > f64::EPSILON {
            return Err(ConfigError::BandsEndEarly {
                expected: ROLL_SPACE,
                end: expected,
            });
        }
        let total: u32 = self.xp_tiers.iter().map(|tier| tier.weight).sum();
        if total != 100 {
            return Err(ConfigError::TierWeights { total });
        }
        Ok(())
    }

    #[must_use]
    pub fn band_for(&self, roll: f64) -> Option<&LootBand> {
        self.bands.iter().find(|band| band.contains(roll))
    }

    #[must_use]
    pub fn rule(&self, rarity: Rarity) -> RarityRule {
        self.rarities.get(&rarity).copied().unwrap_or_default()
    }

    /// Milestone titles for levels in `(old_level, new_level]`.
    pub fn milestones_between(
        &self,
        old_level: u32,
        new_level: u32,
    ) -> impl Iterator<Item = &MilestoneTitle> {
        self.milestone_titles
            .iter()
            .filter(move |milestone| milestone.level > old_level && milestone.level <= new_level)
    }

    fn roll_flat_xp<R>(&self, rng: &mut R) -> u64
    where
        R: Rng + ?Sized,
    {
        let total: u32 = self.xp_tiers.iter().map(|tier| tier.weight).sum();
        if total == 0 {
            return 0;
        }
        let mut pick = rng.gen_range(0..total);
        for tier in &self.xp_tiers {
            if pick < tier.weight {
                return tier.xp;
            }
            pick -= tier.weight;
        }
        0
    }

    fn roll_cosmetic<R>(&self, rarity: Rarity, is_pro: bool, rng: &mut R) -> Option<Cosmetic>
    where
        R: Rng + ?Sized,
    {
        let titles: Vec<&CosmeticDef> = self
            .titles
            .iter()
            .filter(|def| def.rarity == rarity && (is_pro || !def.pro_only))
            .collect();
        let avatars: Vec<&CosmeticDef> = self
            .avatars
            .iter()
            .filter(|def| def.rarity == rarity && (is_pro || !def.pro_only))
            .collect();

        let wants_avatar = rng.gen_bool(0.5);
        let (kind, pool) = if wants_avatar && !avatars.is_empty() {
            (CosmeticKind::Avatar, avatars)
        } else if !titles.is_empty() {
            (CosmeticKind::Title, titles)
        } else if !avatars.is_empty() {
            (CosmeticKind::Avatar, avatars)
        } else {
            log::warn!("no {} cosmetics available", rarity.key());
            return None;
        };
        let def = pool[rng.gen_range(0..pool.len())];
        Some(Cosmetic::from_def(kind, def))
    }

    /// One loot roll for a player owning `collection`.
    #[must_use]
    pub fn roll_reward<R>(&self, collection: &Collection, is_pro: bool, rng: &mut R) -> LootReward
    where
        R: Rng + ?Sized,
    {
        let roll = rng.gen_range(0.0..ROLL_SPACE);
        let reward = self
            .band_for(roll)
            .map_or(BandReward::FlatXp, |band| band.reward);
        match reward {
            BandReward::FlatXp => LootReward::xp(roll, self.roll_flat_xp(rng)),
            BandReward::Booster if self.boosters_enabled => LootReward {
                booster: Some(self.session_booster),
                ..LootReward::xp(roll, 0)
            },
            BandReward::Booster => LootReward::xp(roll, self.roll_flat_xp(rng)),
            BandReward::Cosmetic { rarity } => {
                let rule = self.rule(rarity);
                let booster = rule.booster.filter(|_| self.boosters_enabled);
                let Some(cosmetic) = self.roll_cosmetic(rarity, is_pro, rng) else {
                    return LootReward {
                        rarity: Some(rarity),
                        booster,
                        ..LootReward::xp(roll, rule.duplicate_xp)
                    };
                };
                let duplicate = cosmetic.is_owned(collection);
                LootReward {
                    roll,
                    rarity: Some(rarity),
                    bonus_xp: if duplicate {
                        rule.duplicate_xp
                    } else {
                        rule.bonus_xp
                    },
                    cosmetic: Some(cosmetic),
                    booster,
                    duplicate,
                }
            }
        }
    }

    /// All loot for a session of `duration_minutes`.
    ///
    /// Cosmetics won by earlier rolls count as owned for later ones.
    #[must_use]
    pub fn session_rewards<R>(
        &self,
        duration_minutes: u32,
        collection: &Collection,
        is_pro: bool,
        rng: &mut R,
    ) -> SessionRewards
    where
        R: Rng + ?Sized,
    {
        let mut owned = collection.clone();
        let mut summary = SessionRewards::default();
        for _ in 0..roll_count(duration_minutes) {
            let reward = self.roll_reward(&owned, is_pro, rng);
            summary.bonus_xp = summary.bonus_xp.saturating_add(reward.bonus_xp);
            if let Some(booster) = reward.booster {
                summary.boosters.push(booster);
            }
            if reward.duplicate {
                summary.duplicates_converted += 1;
            } else if let Some(cosmetic) = &reward.cosmetic {
                cosmetic.add_to(&mut owned);
                summary.cosmetics.push(cosmetic.clone());
            }
            summary.rolls += 1;
            summary.rewards.push(reward);
        }
        summary
    }
}

/// Outcome of a single roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootReward {
    pub roll: f64,
    pub rarity: Option<Rarity>,
    pub bonus_xp: u64,
    pub cosmetic: Option<Cosmetic>,
    pub booster: Option<BoosterGrant>,
    /// The cosmetic was already owned and paid out as XP instead.
    pub duplicate: bool,
}

impl LootReward {
    const fn xp(roll: f64, bonus_xp: u64) -> Self {
        Self {
            roll,
            rarity: None,
            bonus_xp,
            cosmetic: None,
            booster: None,
            duplicate: false,
        }
    }
}

/// Aggregate of every roll of a session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionRewards {
    pub rolls: u32,
    pub bonus_xp: u64,
    pub cosmetics: Vec<Cosmetic>,
    pub boosters: Vec<BoosterGrant>,
    pub duplicates_converted: u32,
    pub rewards: Vec<LootReward>,
}

/// Loot rolls earned by a session of `duration_minutes`.
#[must_use]
pub fn roll_count(duration_minutes: u32) -> u32 {
    SESSION_ROLL_BREAKPOINTS
        .iter()
        .find(|(minimum, _)| duration_minutes >= *minimum)
        .map_or(1, |(_, rolls)| *rolls)
}

/// One roll against the embedded rewards catalog.
#[must_use]
pub fn generate_reward<R>(collection: &Collection, is_pro: bool, rng: &mut R) -> LootReward
where
    R: Rng + ?Sized,
{
    RewardsCatalog::default_catalog().roll_reward(collection, is_pro, rng)
}

/// Session loot against the embedded rewards catalog.
#[must_use]
pub fn get_session_rewards<R>(
    duration_minutes: u32,
    collection: &Collection,
    is_pro: bool,
    rng: &mut R,
) -> SessionRewards
where
    R: Rng + ?Sized,
{
    RewardsCatalog::default_catalog().session_rewards(duration_minutes, collection, is_pro, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn catalog() -> &'static RewardsCatalog {
        RewardsCatalog::default_catalog()
    }

    #[test]
    fn embedded_bands_partition_roll_space() {
        catalog().validate().unwrap();
        for tenth in 0..1000 {
            let roll = f64::from(tenth) / 10.0;
            let hits = catalog().bands.iter().filter(|band| band.contains(roll)).count();
            assert_eq!(hits, 1, "roll {roll}");
        }
        assert!(catalog().band_for(100.0).is_none());
    }

    #[test]
    fn gaps_and_overlaps_are_rejected() {
        let mut gap = catalog().clone();
        gap.bands[1].start = 57.0;
        assert!(matches!(
            gap.validate(),
            Err(ConfigError::BandDiscontinuity { index: 1, .. })
        ));

        let mut short = catalog().clone();
        short.bands.pop();
        assert!(matches!(
            short.validate(),
            Err(ConfigError::BandsEndEarly { .. })
        ));

        let mut weights = catalog().clone();
        weights.xp_tiers[0].weight = 59;
        assert_eq!(weights.validate(), Err(ConfigError::TierWeights { total: 99 }));
    }

    #[test]
    fn roll_counts_follow_session_length() {
        assert_eq!(roll_count(0), 1);
        assert_eq!(roll_count(24), 1);
        assert_eq!(roll_count(25), 2);
        assert_eq!(roll_count(45), 3);
        assert_eq!(roll_count(59), 3);
        assert_eq!(roll_count(60), 4);
        assert_eq!(roll_count(240), 4);
    }

    #[test]
    fn hour_long_session_rolls_four_times() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let rewards = get_session_rewards(60, &Collection::default(), false, &mut rng);
        assert_eq!(rewards.rolls, 4);
        assert_eq!(rewards.rewards.len(), 4);
        let summed: u64 = rewards.rewards.iter().map(|reward| reward.bonus_xp).sum();
        assert_eq!(rewards.bonus_xp, summed);
    }

    #[test]
    fn owned_cosmetics_convert_to_duplicate_xp() {
        let mut everything = Collection::default();
        for def in &catalog().titles {
            everything.titles.insert(def.id.clone());
        }
        for def in &catalog().avatars {
            everything.avatars.insert(def.id.clone());
        }
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for _ in 0..2_000 {
            let reward = catalog().roll_reward(&everything, true, &mut rng);
            if let Some(rarity) = reward.rarity {
                assert!(reward.duplicate);
                assert_eq!(reward.bonus_xp, catalog().rule(rarity).duplicate_xp);
            }
        }
    }

    #[test]
    fn session_never_awards_the_same_cosmetic_twice() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for _ in 0..500 {
            let rewards = catalog().session_rewards(60, &Collection::default(), false, &mut rng);
            let mut seen = Collection::default();
            for cosmetic in &rewards.cosmetics {
                assert!(cosmetic.add_to(&mut seen), "repeat {}", cosmetic.id);
            }
        }
    }

    #[test]
    fn free_players_never_receive_pro_avatars() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        for _ in 0..5_000 {
            let reward = catalog().roll_reward(&Collection::default(), false, &mut rng);
            if let Some(cosmetic) = reward.cosmetic.filter(|c| c.kind == CosmeticKind::Avatar) {
                let def = catalog()
                    .avatars
                    .iter()
                    .find(|def| def.id == cosmetic.id)
                    .unwrap();
                assert!(!def.pro_only, "{}", def.id);
            }
        }
    }

    #[test]
    fn legendary_drops_carry_a_booster() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let mut seen = 0;
        for _ in 0..20_000 {
            let reward = catalog().roll_reward(&Collection::default(), false, &mut rng);
            if reward.rarity == Some(Rarity::Legendary) {
                seen += 1;
                assert_eq!(
                    reward.booster,
                    Some(BoosterGrant {
                        multiplier: 3,
                        duration_minutes: 30
                    })
                );
                let cosmetic = reward.cosmetic.unwrap();
                // Free players have no legendary avatar, so the pool falls back to titles.
                assert_eq!(cosmetic.kind, CosmeticKind::Title);
                assert_eq!(reward.bonus_xp, 250);
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn disabled_boosters_pay_flat_xp() {
        let mut no_boosters = catalog().clone();
        no_boosters.boosters_enabled = false;
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        for _ in 0..5_000 {
            let reward = no_boosters.roll_reward(&Collection::default(), true, &mut rng);
            assert!(reward.booster.is_none());
            if (56.0..70.0).contains(&reward.roll) {
                assert!([50, 100, 250].contains(&reward.bonus_xp));
            }
        }
    }

    #[test]
    fn milestones_cover_crossed_levels_only() {
        let ids: Vec<&str> = catalog()
            .milestones_between(4, 10)
            .map(|milestone| milestone.title_id.as_str())
            .collect();
        assert_eq!(ids, vec!["title_apprentice", "title_adept"]);
        assert_eq!(catalog().milestones_between(5, 9).count(), 0);
    }
}
