//! Progression Tracker: the single writer for per-user level/XP/coin state.

use chrono::{DateTime, Utc};

use super::AppState;
use crate::tables::MAX_LEVEL;
use crate::types::{ActionType, UserId, UserProgress};

/// Virtual-economy conversion: coins per XP, per-mille (floor at the end).
const COIN_RATE_PERMILLE: u64 = 300;

/// Outcome of applying one XP delta to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub new_level: u32,
    pub leveled_up: bool,
    /// Cumulative across all levels crossed by this delta.
    pub bonus_coins: u64,
    /// Union of unlocks across all levels crossed.
    pub unlocked_features: Vec<String>,
    pub new_title: String,
    /// Coins from the XP conversion alone, excluding level-up bonuses.
    pub coins_earned: u64,
    pub total_xp: u64,
}

impl AppState {
    /// Ensure a progress record exists (created on the user's first action).
    pub async fn ensure_user(&self, user_id: &str, now: DateTime<Utc>) -> UserProgress {
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id.to_string(), now))
            .clone()
    }

    /// Apply an XP delta: advance `total_xp`, re-derive level from the
    /// table, award coins, and collect everything unlocked on the way.
    ///
    /// A single large delta that crosses several levels is processed
    /// atomically: only the final level is reported, bonus coins accumulate
    /// across every intermediate level, and feature unlocks are unioned.
    ///
    /// Callers must hold the user's lock.
    pub async fn apply_reward(
        &self,
        user_id: &UserId,
        xp_delta: u32,
        action_type: ActionType,
        now: DateTime<Utc>,
    ) -> ApplyOutcome {
        let mut users = self.users.write().await;
        let user = users
            .entry(user_id.clone())
            .or_insert_with(|| UserProgress::new(user_id.clone(), now));

        let old_level = user.level;

        user.total_xp += xp_delta as u64;
        user.period_points.add(now, xp_delta as u64);
        user.last_activity = now;
        if action_type == ActionType::MealLog {
            user.meals_logged += 1;
        }

        let new_level = self.tables.level_for(user.total_xp);
        let leveled_up = new_level > old_level;

        let coins_earned = xp_delta as u64 * COIN_RATE_PERMILLE / 1000;
        let mut bonus_coins = 0u64;
        let mut unlocked_features = Vec::new();

        if leveled_up {
            for level in (old_level + 1)..=new_level {
                bonus_coins += 50 + level as u64 * 10;
            }
            unlocked_features = self.tables.features_unlocked_between(old_level, new_level);
            // Applied to future rewards, stacks with the streak multiplier
            user.reward_bonus_permille = 1000 + new_level as u64 * 10;
            tracing::info!(
                user_id = user_id.as_str(),
                old_level,
                new_level,
                bonus_coins,
                "level up"
            );
        }

        user.level = new_level;
        user.current_xp = user.total_xp - self.tables.requirement(new_level);
        user.coins += coins_earned + bonus_coins;

        ApplyOutcome {
            new_level,
            leveled_up,
            bonus_coins,
            unlocked_features,
            new_title: self.tables.title_for(new_level).to_string(),
            coins_earned,
            total_xp: user.total_xp,
        }
    }

    /// Fraction of the way to the next level, for progress bars. Pinned to
    /// 1.0 at the level cap.
    pub async fn level_progress(&self, user_id: &str) -> Option<f64> {
        let users = self.users.read().await;
        let user = users.get(user_id)?;
        if user.level >= MAX_LEVEL {
            return Some(1.0);
        }
        let current_req = self.tables.requirement(user.level);
        let next_req = self.tables.requirement(user.level + 1);
        Some((user.total_xp - current_req) as f64 / (next_req - current_req) as f64)
    }
}
