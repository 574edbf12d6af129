use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type UserId = String;
pub type AchievementId = String;
pub type IdempotencyKey = String;

/// The kinds of actions the surrounding app reports to the engine.
///
/// Legacy clients still send untyped actions; those deserialize to `Unknown`
/// and earn the flat default reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    MealLog,
    Exercise,
    GoalAchievement,
    WaterIntake,
    WeightCheckIn,
    SocialInteraction,
    ChallengeCompletion,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Parse a client-supplied difficulty string. Unknown strings return
    /// `None` so the reward path can degrade to the safe default instead of
    /// failing the whole action.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            "expert" => Some(Difficulty::Expert),
            _ => None,
        }
    }
}

/// Streak dimensions tracked independently per user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreakType {
    MealLogging,
    Exercise,
    Engagement,
}

impl StreakType {
    /// Which streak dimension an action feeds.
    pub fn for_action(action: ActionType) -> Self {
        match action {
            ActionType::MealLog | ActionType::WaterIntake => StreakType::MealLogging,
            ActionType::Exercise | ActionType::WeightCheckIn => StreakType::Exercise,
            _ => StreakType::Engagement,
        }
    }
}

/// Anchored counters for period-scoped leaderboard points.
///
/// Each window keeps its anchor (day / ISO-week Monday / first of month) and
/// rolls to zero when a write or read lands in a later window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodPoints {
    pub day_anchor: NaiveDate,
    pub daily: u64,
    pub week_anchor: NaiveDate,
    pub weekly: u64,
    pub month_anchor: NaiveDate,
    pub monthly: u64,
}

fn week_anchor_of(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn month_anchor_of(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

impl PeriodPoints {
    pub fn new(now: DateTime<Utc>) -> Self {
        let date = now.date_naive();
        Self {
            day_anchor: date,
            daily: 0,
            week_anchor: week_anchor_of(date),
            weekly: 0,
            month_anchor: month_anchor_of(date),
            monthly: 0,
        }
    }

    /// Roll any window whose anchor is older than `now`'s window.
    pub fn roll(&mut self, now: DateTime<Utc>) {
        let date = now.date_naive();
        if date != self.day_anchor {
            self.day_anchor = date;
            self.daily = 0;
        }
        let week = week_anchor_of(date);
        if week != self.week_anchor {
            self.week_anchor = week;
            self.weekly = 0;
        }
        let month = month_anchor_of(date);
        if month != self.month_anchor {
            self.month_anchor = month;
            self.monthly = 0;
        }
    }

    pub fn add(&mut self, now: DateTime<Utc>, xp: u64) {
        self.roll(now);
        self.daily += xp;
        self.weekly += xp;
        self.monthly += xp;
    }

    /// Points in the current daily window, 0 if the window has rolled over.
    pub fn daily_at(&self, now: DateTime<Utc>) -> u64 {
        if now.date_naive() == self.day_anchor {
            self.daily
        } else {
            0
        }
    }

    pub fn weekly_at(&self, now: DateTime<Utc>) -> u64 {
        if week_anchor_of(now.date_naive()) == self.week_anchor {
            self.weekly
        } else {
            0
        }
    }

    pub fn monthly_at(&self, now: DateTime<Utc>) -> u64 {
        if month_anchor_of(now.date_naive()) == self.month_anchor {
            self.monthly
        } else {
            0
        }
    }
}

/// Per-user progression state. Owned exclusively by the Progression Tracker;
/// all mutation goes through `AppState::apply_reward` under the user's lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProgress {
    pub user_id: UserId,
    pub level: u32,
    /// XP within the current level (`total_xp - requirement(level)`).
    pub current_xp: u64,
    /// Lifetime XP, monotonically non-decreasing. Single source of truth
    /// for `level`.
    pub total_xp: u64,
    pub coins: u64,
    /// Multiplier applied to future rewards, in per-mille (1000 = 1.0x).
    /// Raised on each level-up.
    pub reward_bonus_permille: u64,
    pub meals_logged: u64,
    pub period_points: PeriodPoints,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserProgress {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            level: 1,
            current_xp: 0,
            total_xp: 0,
            coins: 0,
            reward_bonus_permille: 1000,
            meals_logged: 0,
            period_points: PeriodPoints::new(now),
            joined_at: now,
            last_activity: now,
        }
    }
}

/// Per-user, per-streak-type state. Owned by the Streak Manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreakRecord {
    pub user_id: UserId,
    pub streak_type: StreakType,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity: DateTime<Utc>,
    /// Per-mille bonus multiplier, pure function of `current_streak`.
    pub bonus_multiplier_permille: u64,
}

/// Immutable catalog entry describing when an achievement unlocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementDef {
    pub id: AchievementId,
    pub name: String,
    pub description: String,
    pub criterion: AchievementCriterion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AchievementCriterion {
    StreakReached { streak_type: StreakType, days: u32 },
    LevelReached { level: u32 },
    TotalXpReached { xp: u64 },
    MealsLogged { count: u64 },
}

/// Write-once unlock record, keyed by (user, achievement).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAchievement {
    pub id: String,
    pub user_id: UserId,
    pub achievement_id: AchievementId,
    pub unlocked_at: DateTime<Utc>,
    /// Snapshot of the progress value that triggered the unlock.
    pub triggering_value: u64,
}

/// Derived ranking row. Never persisted as source of truth — always
/// recomputed from progress/streak/achievement aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: UserId,
    pub score: u64,
    /// Positive = moved up since the previous computation, 0 if unseen.
    pub rank_change: i64,
}

/// Append-only audit trail entry for the account-risk tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspiciousActivityFlag {
    pub id: String,
    pub user_id: UserId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    TotalPoints,
    WeeklyPoints,
    MonthlyPoints,
    DailyPoints,
    CurrentStreak,
    LongestStreak,
    Achievements,
    MealsLogged,
}

impl ScoreType {
    pub const ALL: [ScoreType; 8] = [
        ScoreType::TotalPoints,
        ScoreType::WeeklyPoints,
        ScoreType::MonthlyPoints,
        ScoreType::DailyPoints,
        ScoreType::CurrentStreak,
        ScoreType::LongestStreak,
        ScoreType::Achievements,
        ScoreType::MealsLogged,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Total,
}

impl Period {
    pub const ALL: [Period; 4] = [
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
        Period::Total,
    ];
}

/// Score dimensions a write can touch, used for targeted cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDimension {
    Points,
    Streak,
    Achievements,
    Meals,
}

impl ScoreDimension {
    /// The score types whose cached boards a write to this dimension stales.
    pub fn affected_score_types(self) -> &'static [ScoreType] {
        match self {
            ScoreDimension::Points => &[
                ScoreType::TotalPoints,
                ScoreType::WeeklyPoints,
                ScoreType::MonthlyPoints,
                ScoreType::DailyPoints,
            ],
            ScoreDimension::Streak => &[ScoreType::CurrentStreak, ScoreType::LongestStreak],
            ScoreDimension::Achievements => &[ScoreType::Achievements],
            ScoreDimension::Meals => &[ScoreType::MealsLogged],
        }
    }
}
