//! Load-once progression tables.
//!
//! Level requirements, titles, feature unlocks and the achievement catalog
//! are immutable data built once at startup and shared read-only across
//! tasks. Keeping them as tables (rather than branching logic) keeps the
//! 100-level curve testable in isolation.

use crate::types::{AchievementCriterion, AchievementDef, StreakType};

pub const MAX_LEVEL: u32 = 100;

/// Sparse title table. Levels without an entry inherit the most recent named
/// title below them; level 1 predates the first entry and reports "Unknown".
const TITLES: &[(u32, &str)] = &[
    (2, "Novice"),
    (5, "Apprentice"),
    (10, "Enthusiast"),
    (15, "Regular"),
    (20, "Committed"),
    (30, "Veteran"),
    (40, "Expert"),
    (50, "Master"),
    (65, "Grandmaster"),
    (80, "Champion"),
    (100, "Legend"),
];

/// Feature unlocks keyed by the level that grants them.
const FEATURE_UNLOCKS: &[(u32, &[&str])] = &[
    (2, &["custom_avatar"]),
    (3, &["streak_freeze"]),
    (5, &["weekly_challenges", "coin_shop"]),
    (8, &["custom_meal_templates"]),
    (10, &["friend_duels"]),
    (15, &["premium_badges"]),
    (20, &["advanced_stats"]),
    (30, &["coach_marketplace"]),
    (50, &["legacy_vault"]),
    (75, &["hall_of_fame"]),
];

/// Immutable progression reference data, built once and shared.
#[derive(Debug, Clone)]
pub struct GameTables {
    /// Total XP required to reach level `index + 1`. Index 0 (level 1) is 0.
    level_requirements: Vec<u64>,
    achievements: Vec<AchievementDef>,
}

impl GameTables {
    pub fn standard() -> Self {
        // Quadratic curve: requirement(L) = 25·L·(L+1) − 50.
        // Gives 0 / 100 / 250 / 450 / 700 / ... and 252,450 at level 100.
        let level_requirements = (1..=MAX_LEVEL)
            .map(|l| {
                let l = l as u64;
                25 * l * (l + 1) - 50
            })
            .collect();

        Self {
            level_requirements,
            achievements: standard_achievements(),
        }
    }

    /// Total XP required to reach `level`. Levels above the cap clamp to the
    /// cap's requirement.
    pub fn requirement(&self, level: u32) -> u64 {
        let idx = level.clamp(1, MAX_LEVEL) as usize - 1;
        self.level_requirements[idx]
    }

    /// Largest level whose requirement is satisfied by `total_xp`.
    pub fn level_for(&self, total_xp: u64) -> u32 {
        let idx = self.level_requirements.partition_point(|&req| req <= total_xp);
        // partition_point is at least 1 because requirement(1) == 0
        idx as u32
    }

    /// Title for a level: the most recent named title at or below it,
    /// "Unknown" when no entry precedes it.
    pub fn title_for(&self, level: u32) -> &'static str {
        TITLES
            .iter()
            .rev()
            .find(|(threshold, _)| *threshold <= level)
            .map(|(_, title)| *title)
            .unwrap_or("Unknown")
    }

    /// Features granted strictly above `old_level` up to and including
    /// `new_level` — the union across every traversed level.
    pub fn features_unlocked_between(&self, old_level: u32, new_level: u32) -> Vec<String> {
        FEATURE_UNLOCKS
            .iter()
            .filter(|(threshold, _)| *threshold > old_level && *threshold <= new_level)
            .flat_map(|(_, features)| features.iter().map(|f| f.to_string()))
            .collect()
    }

    /// All features available at `level`.
    pub fn features_at(&self, level: u32) -> Vec<String> {
        self.features_unlocked_between(0, level)
    }

    pub fn achievements(&self) -> &[AchievementDef] {
        &self.achievements
    }
}

fn streak_achievement(id: &str, name: &str, days: u32) -> AchievementDef {
    AchievementDef {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("Log meals {} days in a row", days),
        criterion: AchievementCriterion::StreakReached {
            streak_type: StreakType::MealLogging,
            days,
        },
    }
}

fn standard_achievements() -> Vec<AchievementDef> {
    let mut defs = vec![
        streak_achievement("streak_3", "Getting Started", 3),
        streak_achievement("streak_7", "One Week Strong", 7),
        streak_achievement("streak_14", "Fortnight Fighter", 14),
        streak_achievement("streak_30", "Monthly Master", 30),
        streak_achievement("streak_60", "Habit Machine", 60),
        streak_achievement("streak_100", "Century Club", 100),
    ];
    defs.push(AchievementDef {
        id: "level_5".to_string(),
        name: "Apprentice".to_string(),
        description: "Reach level 5".to_string(),
        criterion: AchievementCriterion::LevelReached { level: 5 },
    });
    defs.push(AchievementDef {
        id: "level_10".to_string(),
        name: "Double Digits".to_string(),
        description: "Reach level 10".to_string(),
        criterion: AchievementCriterion::LevelReached { level: 10 },
    });
    defs.push(AchievementDef {
        id: "level_50".to_string(),
        name: "Halfway There".to_string(),
        description: "Reach level 50".to_string(),
        criterion: AchievementCriterion::LevelReached { level: 50 },
    });
    defs.push(AchievementDef {
        id: "xp_10k".to_string(),
        name: "Point Collector".to_string(),
        description: "Earn 10,000 lifetime XP".to_string(),
        criterion: AchievementCriterion::TotalXpReached { xp: 10_000 },
    });
    defs.push(AchievementDef {
        id: "meals_100".to_string(),
        name: "Meal Historian".to_string(),
        description: "Log 100 meals".to_string(),
        criterion: AchievementCriterion::MealsLogged { count: 100 },
    });
    defs.push(AchievementDef {
        id: "meals_1000".to_string(),
        name: "Food Librarian".to_string(),
        description: "Log 1,000 meals".to_string(),
        criterion: AchievementCriterion::MealsLogged { count: 1000 },
    });
    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_requirements_match_curve() {
        let tables = GameTables::standard();
        assert_eq!(tables.requirement(1), 0);
        assert_eq!(tables.requirement(2), 100);
        assert_eq!(tables.requirement(3), 250);
        assert_eq!(tables.requirement(4), 450);
        assert_eq!(tables.requirement(5), 700);
    }

    #[test]
    fn test_requirements_strictly_increasing() {
        let tables = GameTables::standard();
        for level in 2..=MAX_LEVEL {
            assert!(tables.requirement(level) > tables.requirement(level - 1));
        }
    }

    #[test]
    fn test_level_for_is_consistent_with_requirements() {
        let tables = GameTables::standard();
        for level in 1..=MAX_LEVEL {
            let req = tables.requirement(level);
            assert_eq!(tables.level_for(req), level, "at requirement of {level}");
            if level > 1 {
                assert_eq!(tables.level_for(req - 1), level - 1);
            }
        }
        // XP past the cap stays at the cap
        assert_eq!(tables.level_for(tables.requirement(MAX_LEVEL) + 999_999), 100);
    }

    #[test]
    fn test_level_for_scenario_values() {
        let tables = GameTables::standard();
        assert_eq!(tables.level_for(500), 4);
        assert_eq!(tables.level_for(533), 4);
        assert_eq!(tables.level_for(750), 5);
    }

    #[test]
    fn test_titles_sparse_lookup() {
        let tables = GameTables::standard();
        // No entry at or below level 1
        assert_eq!(tables.title_for(1), "Unknown");
        assert_eq!(tables.title_for(2), "Novice");
        // Intermediate levels inherit the last named title
        assert_eq!(tables.title_for(4), "Novice");
        assert_eq!(tables.title_for(7), "Apprentice");
        assert_eq!(tables.title_for(100), "Legend");
    }

    #[test]
    fn test_feature_union_across_levels() {
        let tables = GameTables::standard();
        let unlocked = tables.features_unlocked_between(1, 5);
        assert!(unlocked.contains(&"custom_avatar".to_string()));
        assert!(unlocked.contains(&"streak_freeze".to_string()));
        assert!(unlocked.contains(&"weekly_challenges".to_string()));
        assert!(unlocked.contains(&"coin_shop".to_string()));
        assert!(!unlocked.contains(&"friend_duels".to_string()));

        // Nothing new when no threshold is crossed
        assert!(tables.features_unlocked_between(5, 7).is_empty());
    }

    #[test]
    fn test_achievement_catalog_ids_unique() {
        let tables = GameTables::standard();
        let mut ids: Vec<_> = tables.achievements().iter().map(|a| &a.id).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
