//! Streak Manager: continuity decisions per (user, streak type).
//!
//! Continuity window is 48 hours — deliberately generous so timezones and
//! late-night logging don't eat streaks. Within a rolling 24 hours of the
//! last qualifying activity nothing increments, so a streak advances at most
//! once per period. The dedup window is anchored on the last activity that
//! advanced or reset the streak, consistent with the 48h gap rule.

use chrono::{DateTime, Utc};

use super::AppState;
use crate::protocol::StreakUpdate;
use crate::reward::{streak_bonus_permille, PERMILLE};
use crate::types::{StreakRecord, StreakType};

/// Continuity window: gaps beyond this reset the streak.
const CONTINUITY_HOURS: i64 = 48;
/// Rolling dedup window: activity inside it does not re-increment.
const PERIOD_HOURS: i64 = 24;

/// Celebratory milestones, distinct consumers from the XP bonus bands.
pub const STREAK_MILESTONES: [u32; 6] = [3, 7, 14, 30, 60, 100];

fn milestone_for(count: u32) -> Option<u32> {
    STREAK_MILESTONES.contains(&count).then_some(count)
}

impl AppState {
    /// Record a qualifying activity and decide continuation vs. reset.
    ///
    /// Callers must hold the user's lock; this only touches the streak map.
    pub async fn record_activity(
        &self,
        user_id: &str,
        streak_type: StreakType,
        now: DateTime<Utc>,
    ) -> StreakUpdate {
        let mut streaks = self.streaks.write().await;
        let key = (user_id.to_string(), streak_type);

        let record = streaks.entry(key).or_insert_with(|| StreakRecord {
            user_id: user_id.to_string(),
            streak_type,
            current_streak: 0,
            longest_streak: 0,
            last_activity: now,
            bonus_multiplier_permille: PERMILLE,
        });

        // Fresh record: this is the first qualifying activity.
        if record.longest_streak == 0 && record.current_streak == 0 && record.last_activity == now {
            record.current_streak = 1;
            record.longest_streak = 1;
            record.bonus_multiplier_permille = streak_bonus_permille(1);
            return StreakUpdate::Continued {
                new_streak_count: 1,
                bonus_multiplier: record.bonus_multiplier_permille as f64 / PERMILLE as f64,
                milestone_reached: milestone_for(1),
            };
        }

        let gap = now - record.last_activity;

        if gap > chrono::Duration::hours(CONTINUITY_HOURS) {
            let previous = record.current_streak;
            record.current_streak = 0;
            record.last_activity = now;
            record.bonus_multiplier_permille = streak_bonus_permille(0);
            tracing::debug!(user_id, ?streak_type, previous, "streak reset");
            return StreakUpdate::Reset {
                previous_streak: previous,
                new_streak_count: 0,
            };
        }

        if gap <= chrono::Duration::hours(PERIOD_HOURS) {
            // Same period: no double increment. The anchor stays put so a
            // chain of sub-24h activities can't slide the window forever.
            return StreakUpdate::Continued {
                new_streak_count: record.current_streak,
                bonus_multiplier: record.bonus_multiplier_permille as f64 / PERMILLE as f64,
                milestone_reached: None,
            };
        }

        record.current_streak += 1;
        record.longest_streak = record.longest_streak.max(record.current_streak);
        record.last_activity = now;
        record.bonus_multiplier_permille = streak_bonus_permille(record.current_streak);

        StreakUpdate::Continued {
            new_streak_count: record.current_streak,
            bonus_multiplier: record.bonus_multiplier_permille as f64 / PERMILLE as f64,
            milestone_reached: milestone_for(record.current_streak),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
    }

    fn hours(h: i64) -> chrono::Duration {
        chrono::Duration::hours(h)
    }

    #[tokio::test]
    async fn test_first_activity_starts_streak_at_one() {
        let state = AppState::new();
        let update = state
            .record_activity("u1", StreakType::MealLogging, t0())
            .await;
        assert_eq!(
            update,
            StreakUpdate::Continued {
                new_streak_count: 1,
                bonus_multiplier: 1.0,
                milestone_reached: None,
            }
        );
    }

    #[tokio::test]
    async fn test_same_period_does_not_double_increment() {
        let state = AppState::new();
        state.record_activity("u1", StreakType::MealLogging, t0()).await;
        // Three more logs within 24h of the anchor
        for h in [2, 10, 23] {
            let update = state
                .record_activity("u1", StreakType::MealLogging, t0() + hours(h))
                .await;
            assert_eq!(
                update,
                StreakUpdate::Continued {
                    new_streak_count: 1,
                    bonus_multiplier: 1.0,
                    milestone_reached: None,
                }
            );
        }
        let record = state
            .get_streak("u1", StreakType::MealLogging)
            .await
            .unwrap();
        assert_eq!(record.current_streak, 1);
    }

    #[tokio::test]
    async fn test_next_day_increments() {
        let state = AppState::new();
        state.record_activity("u1", StreakType::MealLogging, t0()).await;
        let update = state
            .record_activity("u1", StreakType::MealLogging, t0() + hours(25))
            .await;
        assert_eq!(
            update,
            StreakUpdate::Continued {
                new_streak_count: 2,
                bonus_multiplier: 1.0,
                milestone_reached: None,
            }
        );
    }

    #[tokio::test]
    async fn test_47_hour_gap_still_continues() {
        let state = AppState::new();
        state.record_activity("u1", StreakType::MealLogging, t0()).await;
        let update = state
            .record_activity("u1", StreakType::MealLogging, t0() + hours(47))
            .await;
        assert!(matches!(
            update,
            StreakUpdate::Continued {
                new_streak_count: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_50_hour_gap_resets_but_keeps_longest() {
        let state = AppState::new();
        // Build a 3-day streak
        for day in 0..3 {
            state
                .record_activity("u1", StreakType::MealLogging, t0() + hours(day * 25))
                .await;
        }
        let before = state
            .get_streak("u1", StreakType::MealLogging)
            .await
            .unwrap();
        assert_eq!(before.current_streak, 3);

        let update = state
            .record_activity(
                "u1",
                StreakType::MealLogging,
                before.last_activity + hours(50),
            )
            .await;
        assert_eq!(
            update,
            StreakUpdate::Reset {
                previous_streak: 3,
                new_streak_count: 0,
            }
        );

        let after = state
            .get_streak("u1", StreakType::MealLogging)
            .await
            .unwrap();
        assert_eq!(after.current_streak, 0);
        assert_eq!(after.longest_streak, 3);
    }

    #[tokio::test]
    async fn test_milestones_fire_at_thresholds() {
        let state = AppState::new();
        let mut milestones = Vec::new();
        for day in 0..30 {
            let update = state
                .record_activity("u1", StreakType::Exercise, t0() + hours(day * 25))
                .await;
            if let StreakUpdate::Continued {
                milestone_reached: Some(m),
                ..
            } = update
            {
                milestones.push(m);
            }
        }
        assert_eq!(milestones, vec![3, 7, 14, 30]);
    }

    #[tokio::test]
    async fn test_bonus_multiplier_tracks_bands() {
        let state = AppState::new();
        for day in 0..7 {
            state
                .record_activity("u1", StreakType::Exercise, t0() + hours(day * 25))
                .await;
        }
        let record = state.get_streak("u1", StreakType::Exercise).await.unwrap();
        assert_eq!(record.current_streak, 7);
        assert_eq!(record.bonus_multiplier_permille, 1500);
    }

    #[tokio::test]
    async fn test_streak_types_are_independent() {
        let state = AppState::new();
        state.record_activity("u1", StreakType::MealLogging, t0()).await;
        state
            .record_activity("u1", StreakType::Exercise, t0() + hours(1))
            .await;

        let meal = state
            .get_streak("u1", StreakType::MealLogging)
            .await
            .unwrap();
        let exercise = state.get_streak("u1", StreakType::Exercise).await.unwrap();
        assert_eq!(meal.current_streak, 1);
        assert_eq!(exercise.current_streak, 1);
    }
}
