//! The action-processing pipeline.
//!
//! One inbound action event flows anti-cheat → reward → streak → progression
//! → achievements, entirely under the owning user's lock so rapid retries
//! and duplicate taps can't race each other. State is mutated before the
//! success response is built — a user never sees a reward that wasn't
//! applied.

use crate::anticheat::{ClaimContext, Verdict};
use crate::error::EngineError;
use crate::protocol::{ActionEvent, LevelUp, RewardResult, StreakUpdate};
use crate::reward::{compute_reward, RewardInput};
use crate::types::{ActionType, Difficulty, ScoreDimension, StreakType};

use super::AppState;

impl AppState {
    /// Process one action event end to end.
    ///
    /// Anti-cheat rejections do not fail the call: the reward is silently
    /// clamped to the engine-computed value (zero for rate-limited spam) and
    /// the claim is logged to the audit trail, so detection thresholds stay
    /// invisible to the client.
    pub async fn process_action(&self, event: ActionEvent) -> Result<RewardResult, EngineError> {
        if event.user_id.is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".into()));
        }
        if event.idempotency_key.is_empty() {
            return Err(EngineError::Validation(
                "idempotency_key must not be empty".into(),
            ));
        }

        let lock = self.user_lock(&event.user_id).await;
        let _guard = lock.lock().await;

        if self.is_processed(&event.idempotency_key).await {
            return Err(EngineError::AlreadyProcessed(event.idempotency_key));
        }

        let now = event.timestamp;
        let user = self.ensure_user(&event.user_id, now).await;

        // Streak first: the reward multiplier depends on the streak this
        // action produces.
        let streak_type = StreakType::for_action(event.action_type);
        let streak_update = self
            .record_activity(&event.user_id, streak_type, now)
            .await;
        let streak_days = match &streak_update {
            StreakUpdate::Continued {
                new_streak_count, ..
            } => *new_streak_count,
            StreakUpdate::Reset { .. } => 0,
        };

        let difficulty = match &event.difficulty {
            Some(raw) => Difficulty::parse(raw), // None = unknown, safe default
            None => Some(Difficulty::Easy),
        };
        let expected_xp = compute_reward(RewardInput {
            action_type: event.action_type,
            difficulty,
            user_level: user.level,
            streak_days,
            time_bonus: event.time_bonus,
            perfect_score: event.perfect_score,
            progression_bonus_permille: user.reward_bonus_permille,
        });

        let verdict = self
            .anticheat
            .validate(
                &event.user_id,
                now,
                ClaimContext {
                    expected_xp,
                    claimed_xp: event.client_claimed_xp,
                    computed_streak: streak_days,
                    claimed_streak: event.client_claimed_streak,
                },
            )
            .await;

        let xp_earned = match &verdict {
            Verdict::Accept => expected_xp,
            Verdict::Flag { reason, confidence } => {
                tracing::debug!(
                    user_id = event.user_id.as_str(),
                    reason = reason.as_str(),
                    confidence,
                    "action flagged"
                );
                self.record_flag(&event.user_id, reason, now).await;
                expected_xp
            }
            Verdict::HardReject { reason } => {
                self.record_flag(&event.user_id, reason, now).await;
                // Rate-limited spam earns nothing; inflated claims are
                // clamped to the computed value.
                if reason == "rate_limit_exceeded" {
                    0
                } else {
                    expected_xp
                }
            }
        };

        let outcome = self
            .apply_reward(&event.user_id, xp_earned, event.action_type, now)
            .await;
        let achievements_unlocked = self.evaluate_achievements(&event.user_id, now).await;

        self.mark_processed(&event.idempotency_key).await;

        // Targeted invalidation: only the dimensions this action touched.
        let mut dims = vec![ScoreDimension::Streak];
        if xp_earned > 0 {
            dims.push(ScoreDimension::Points);
        }
        if event.action_type == ActionType::MealLog {
            dims.push(ScoreDimension::Meals);
        }
        if !achievements_unlocked.is_empty() {
            dims.push(ScoreDimension::Achievements);
        }
        for dim in &dims {
            self.leaderboards.invalidate_dimension(*dim).await;
        }
        self.mark_boards_dirty(&dims, &event.user_id).await;

        Ok(RewardResult {
            user_id: event.user_id,
            xp_earned,
            coins_earned: outcome.coins_earned,
            level_up: outcome.leveled_up.then(|| LevelUp {
                new_level: outcome.new_level,
                bonus_coins: outcome.bonus_coins,
                unlocked_features: outcome.unlocked_features.clone(),
                title: outcome.new_title.clone(),
            }),
            achievements_unlocked,
            streak_update,
            total_xp: outcome.total_xp,
            level: outcome.new_level,
        })
    }
}
