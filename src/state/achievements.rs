//! Achievement unlock evaluation against the immutable catalog.
//!
//! Unlocks are write-once per (user, achievement): re-evaluating after the
//! criterion is long met never duplicates a record.

use chrono::{DateTime, Utc};

use super::AppState;
use crate::types::{AchievementCriterion, AchievementId, UserAchievement};

impl AppState {
    /// Evaluate the whole catalog for one user, unlocking anything newly
    /// earned. Returns the ids unlocked by this pass, in catalog order.
    ///
    /// Callers must hold the user's lock.
    pub async fn evaluate_achievements(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<AchievementId> {
        let progress = match self.get_user_progress(user_id).await {
            Some(p) => p,
            None => return Vec::new(),
        };

        let streaks = self.streaks.read().await;
        let mut unlocked = self.unlocked.write().await;
        let existing = unlocked.entry(user_id.to_string()).or_default();

        let mut newly_unlocked = Vec::new();
        for def in self.tables.achievements() {
            if existing.iter().any(|ua| ua.achievement_id == def.id) {
                continue;
            }

            let triggering_value = match def.criterion {
                AchievementCriterion::StreakReached { streak_type, days } => {
                    let longest = streaks
                        .get(&(user_id.to_string(), streak_type))
                        .map(|r| r.longest_streak)
                        .unwrap_or(0);
                    (longest >= days).then_some(longest as u64)
                }
                AchievementCriterion::LevelReached { level } => {
                    (progress.level >= level).then_some(progress.level as u64)
                }
                AchievementCriterion::TotalXpReached { xp } => {
                    (progress.total_xp >= xp).then_some(progress.total_xp)
                }
                AchievementCriterion::MealsLogged { count } => {
                    (progress.meals_logged >= count).then_some(progress.meals_logged)
                }
            };

            if let Some(value) = triggering_value {
                existing.push(UserAchievement {
                    id: ulid::Ulid::new().to_string(),
                    user_id: user_id.to_string(),
                    achievement_id: def.id.clone(),
                    unlocked_at: now,
                    triggering_value: value,
                });
                tracing::info!(user_id, achievement = def.id.as_str(), "achievement unlocked");
                newly_unlocked.push(def.id.clone());
            }
        }

        newly_unlocked
    }
}
