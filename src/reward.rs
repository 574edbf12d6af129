//! Reward Calculator: turns a completed action into an XP amount.
//!
//! Pure and deterministic — all multiplier math is chained in per-mille
//! fixed point (u128 accumulator) and rounded to an integer exactly once at
//! the end, so the same inputs produce the same XP on every platform. The
//! anti-cheat validator relies on this to recompute expected values.

use crate::tables::MAX_LEVEL;
use crate::types::{ActionType, Difficulty};

/// XP granted when an action is malformed (unknown difficulty, out-of-range
/// level). Kept for backward compatibility with untyped legacy actions.
pub const SAFE_DEFAULT_XP: u32 = 10;

/// Fixed-point scale: 1000 = 1.0x.
pub const PERMILLE: u64 = 1000;

#[derive(Debug, Clone, Copy)]
pub struct RewardInput {
    pub action_type: ActionType,
    /// `None` means the client sent a difficulty we don't recognize; the
    /// calculator degrades to the safe default instead of failing.
    pub difficulty: Option<Difficulty>,
    pub user_level: u32,
    pub streak_days: u32,
    pub time_bonus: bool,
    pub perfect_score: bool,
    /// Level-up reward bonus from the Progression Tracker, per-mille.
    /// 1000 for users who have never leveled up.
    pub progression_bonus_permille: u64,
}

/// Base XP per action type. Unknown types earn the flat legacy default.
pub fn base_xp(action: ActionType) -> u32 {
    match action {
        ActionType::MealLog => 15,
        ActionType::Exercise => 25,
        ActionType::GoalAchievement => 50,
        ActionType::WaterIntake => 5,
        ActionType::WeightCheckIn => 20,
        ActionType::SocialInteraction => 10,
        ActionType::ChallengeCompletion => 40,
        ActionType::Unknown => SAFE_DEFAULT_XP,
    }
}

fn difficulty_permille(difficulty: Difficulty) -> u64 {
    match difficulty {
        Difficulty::Easy => 1000,
        Difficulty::Medium => 1500,
        Difficulty::Hard => 2000,
        Difficulty::Expert => 3000,
    }
}

/// Streak bonus bands, evaluated highest-first. No interpolation.
pub fn streak_bonus_permille(streak_days: u32) -> u64 {
    match streak_days {
        d if d >= 100 => 5000,
        d if d >= 60 => 4000,
        d if d >= 30 => 3000,
        d if d >= 14 => 2000,
        d if d >= 7 => 1500,
        d if d >= 3 => 1200,
        _ => 1000,
    }
}

/// Higher-level users earn proportionally less per action:
/// `max(0.6, 1 − level·0.008)`, floored at 60%.
fn level_dampener_permille(level: u32) -> u64 {
    let reduced = 1000u64.saturating_sub(level as u64 * 8);
    reduced.max(600)
}

/// Compute the XP for a completed action.
///
/// Never fails: invalid input falls back to [`SAFE_DEFAULT_XP`] with an
/// audit log line, so a malformed action can't block reward delivery
/// mid-transaction.
pub fn compute_reward(input: RewardInput) -> u32 {
    let difficulty = match input.difficulty {
        Some(d) => d,
        None => {
            tracing::warn!(
                action = ?input.action_type,
                "reward input missing or unknown difficulty, using safe default"
            );
            return SAFE_DEFAULT_XP;
        }
    };

    if input.user_level < 1 || input.user_level > MAX_LEVEL {
        tracing::warn!(
            level = input.user_level,
            "reward input with out-of-range level, using safe default"
        );
        return SAFE_DEFAULT_XP;
    }

    if input.progression_bonus_permille < PERMILLE {
        tracing::warn!(
            bonus = input.progression_bonus_permille,
            "reward input with sub-1.0 progression bonus, using safe default"
        );
        return SAFE_DEFAULT_XP;
    }

    let time_permille: u64 = if input.time_bonus { 1250 } else { 1000 };
    let perfect_permille: u64 = if input.perfect_score { 1500 } else { 1000 };

    // One u128 product of all per-mille factors, rounded half-up once.
    let acc = base_xp(input.action_type) as u128
        * difficulty_permille(difficulty) as u128
        * streak_bonus_permille(input.streak_days) as u128
        * time_permille as u128
        * perfect_permille as u128
        * level_dampener_permille(input.user_level) as u128
        * input.progression_bonus_permille as u128;

    let scale = (PERMILLE as u128).pow(6);
    ((acc + scale / 2) / scale) as u32
}
