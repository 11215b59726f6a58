//! Level curve and experience bookkeeping.
//!
//! Levels are always derived from the cumulative experience total; the stored
//! `level` field on a player is only a cache of [`level_from_total_exp`].
use serde::{Deserialize, Serialize};

use crate::constants::{BASE_EXP, GROWTH_RATE, LEVEL_UP_COIN_BONUS, MAX_LEVEL};
use crate::numbers::{floor_f64_to_u64, percentage, u64_to_f64};

/// Absorbs binary rounding so that `100 * 1.15` floors to 115, not 114.
const CURVE_EPSILON: f64 = 1e-7;

/// Experience needed to go from `level - 1` to `level`.
#[must_use]
pub fn exp_required_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let exponent = i32::try_from(level.min(MAX_LEVEL) - 2).unwrap_or(i32::MAX);
    floor_f64_to_u64(u64_to_f64(BASE_EXP) * GROWTH_RATE.powi(exponent) + CURVE_EPSILON)
}

/// Cumulative experience at which `target_level` is reached.
#[must_use]
pub fn total_exp_for_level(target_level: u32) -> u64 {
    (2..=target_level.min(MAX_LEVEL))
        .map(exp_required_for_level)
        .fold(0_u64, u64::saturating_add)
}

/// Level reached with `total_exp` cumulative experience.
#[must_use]
pub fn level_from_total_exp(total_exp: u64) -> u32 {
    let mut level = 1;
    let mut threshold = 0_u64;
    while level < MAX_LEVEL {
        threshold = threshold.saturating_add(exp_required_for_level(level + 1));
        if total_exp < threshold {
            break;
        }
        level += 1;
    }
    level
}

/// Progress through the current level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpProgress {
    pub current: u64,
    pub required: u64,
    pub percentage: f64,
}

#[must_use]
pub fn exp_progress(total_exp: u64, current_level: u32) -> ExpProgress {
    let floor = total_exp_for_level(current_level);
    let ceiling = total_exp_for_level(current_level.saturating_add(1));
    let current = total_exp.saturating_sub(floor);
    let required = ceiling.saturating_sub(floor).max(BASE_EXP);
    ExpProgress {
        current,
        required,
        percentage: percentage(current, required),
    }
}

/// Outcome of moving a player from `old_exp` to `new_exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpResult {
    pub new_level: u32,
    pub leveled_up: bool,
    pub levels_gained: u32,
    pub coin_bonus: u64,
}

#[must_use]
pub fn level_up_result(_old_exp: u64, new_exp: u64, old_level: u32) -> LevelUpResult {
    let new_level = level_from_total_exp(new_exp);
    let levels_gained = new_level.saturating_sub(old_level);
    LevelUpResult {
        new_level,
        leveled_up: new_level > old_level,
        levels_gained,
        coin_bonus: u64::from(levels_gained) * LEVEL_UP_COIN_BONUS,
    }
}

/// Experience left after a death: loses `loss_fraction` of the progress made
/// inside `level`, never dropping below the level's floor.
#[must_use]
pub fn death_penalty_exp(exp: u64, level: u32, loss_fraction: f64) -> u64 {
    let floor = total_exp_for_level(level);
    if exp <= floor {
        return exp;
    }
    let progress = exp - floor;
    let loss = floor_f64_to_u64(u64_to_f64(progress) * loss_fraction.clamp(0.0, 1.0));
    exp.saturating_sub(loss.min(progress)).max(floor)
}
