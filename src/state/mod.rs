mod achievements;
mod pipeline;
mod progress;
mod streak;

pub use progress::ApplyOutcome;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::anticheat::{AntiCheatConfig, AntiCheatValidator};
use crate::leaderboard::{BoardKey, InMemoryCache, LeaderboardEngine, UserScoreRow};
use crate::protocol::ServerMessage;
use crate::types::*;

/// Shared application state.
///
/// Progress and streak records have a single writer per user: every mutation
/// runs under that user's entry in `user_locks`. Leaderboards only ever read
/// this state and own nothing but their cache.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<RwLock<HashMap<UserId, UserProgress>>>,
    pub streaks: Arc<RwLock<HashMap<(UserId, StreakType), StreakRecord>>>,
    pub unlocked: Arc<RwLock<HashMap<UserId, Vec<UserAchievement>>>>,
    /// Append-only audit trail consumed by account-risk tooling.
    pub flags: Arc<RwLock<Vec<SuspiciousActivityFlag>>>,
    processed: Arc<RwLock<HashSet<IdempotencyKey>>>,
    user_locks: Arc<RwLock<HashMap<UserId, Arc<Mutex<()>>>>>,
    pub anticheat: Arc<AntiCheatValidator>,
    pub leaderboards: Arc<LeaderboardEngine>,
    pub tables: Arc<crate::tables::GameTables>,
    /// Fan-out channel for the live feed.
    pub feed: broadcast::Sender<ServerMessage>,
    /// Boards staled by recent writes, drained by the background refresher.
    dirty_boards: Arc<RwLock<HashSet<BoardKey>>>,
    last_updated_user: Arc<RwLock<Option<UserId>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(AntiCheatConfig::default())
    }

    pub fn with_config(anticheat: AntiCheatConfig) -> Self {
        Self::with_parts(anticheat, Arc::new(InMemoryCache::default()))
    }

    /// Build with an injected leaderboard cache (e.g. a distributed cache,
    /// or an instrumented one in tests).
    pub fn with_parts(
        anticheat: AntiCheatConfig,
        cache: Arc<dyn crate::leaderboard::LeaderboardCache>,
    ) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            streaks: Arc::new(RwLock::new(HashMap::new())),
            unlocked: Arc::new(RwLock::new(HashMap::new())),
            flags: Arc::new(RwLock::new(Vec::new())),
            processed: Arc::new(RwLock::new(HashSet::new())),
            user_locks: Arc::new(RwLock::new(HashMap::new())),
            anticheat: Arc::new(AntiCheatValidator::new(anticheat)),
            leaderboards: Arc::new(LeaderboardEngine::new(cache)),
            tables: Arc::new(crate::tables::GameTables::standard()),
            feed: tx,
            dirty_boards: Arc::new(RwLock::new(HashSet::new())),
            last_updated_user: Arc::new(RwLock::new(None)),
        }
    }

    /// The serialization point for one user's mutations. Cross-user work
    /// never contends on these.
    pub(crate) async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.write().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) async fn is_processed(&self, key: &str) -> bool {
        self.processed.read().await.contains(key)
    }

    pub(crate) async fn mark_processed(&self, key: &str) {
        self.processed.write().await.insert(key.to_string());
    }

    pub async fn get_user_progress(&self, user_id: &str) -> Option<UserProgress> {
        self.users.read().await.get(user_id).cloned()
    }

    pub async fn get_streak(&self, user_id: &str, streak_type: StreakType) -> Option<StreakRecord> {
        self.streaks
            .read()
            .await
            .get(&(user_id.to_string(), streak_type))
            .cloned()
    }

    pub async fn get_achievements(&self, user_id: &str) -> Vec<UserAchievement> {
        self.unlocked
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append to the suspicious-activity audit trail.
    pub async fn record_flag(&self, user_id: &str, reason: &str, now: DateTime<Utc>) {
        self.flags.write().await.push(SuspiciousActivityFlag {
            id: ulid::Ulid::new().to_string(),
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            timestamp: now,
        });
    }

    pub async fn flags_for(&self, user_id: &str) -> Vec<SuspiciousActivityFlag> {
        self.flags
            .read()
            .await
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect()
    }

    pub(crate) async fn mark_boards_dirty(&self, dims: &[ScoreDimension], user_id: &str) {
        let mut dirty = self.dirty_boards.write().await;
        for dim in dims {
            for &score_type in dim.affected_score_types() {
                for &period in Period::ALL.iter() {
                    dirty.insert((score_type, period));
                }
            }
        }
        *self.last_updated_user.write().await = Some(user_id.to_string());
    }

    /// Drain the staled-board set (used by the background refresher).
    pub async fn take_dirty_boards(&self) -> (Vec<BoardKey>, Option<UserId>) {
        let keys: Vec<BoardKey> = self.dirty_boards.write().await.drain().collect();
        let user = self.last_updated_user.read().await.clone();
        (keys, user)
    }

    /// Resolve every user's score for one board.
    async fn collect_rows(&self, score_type: ScoreType, now: DateTime<Utc>) -> Vec<UserScoreRow> {
        let users = self.users.read().await;

        match score_type {
            ScoreType::CurrentStreak | ScoreType::LongestStreak => {
                let streaks = self.streaks.read().await;
                let mut best: HashMap<&str, u64> = HashMap::new();
                for ((user_id, _), record) in streaks.iter() {
                    let value = match score_type {
                        ScoreType::CurrentStreak => record.current_streak as u64,
                        _ => record.longest_streak as u64,
                    };
                    let slot = best.entry(user_id.as_str()).or_insert(0);
                    *slot = (*slot).max(value);
                }
                users
                    .values()
                    .map(|u| UserScoreRow {
                        user_id: u.user_id.clone(),
                        score: best.get(u.user_id.as_str()).copied().unwrap_or(0),
                        tiebreak: u.last_activity,
                    })
                    .collect()
            }
            ScoreType::Achievements => {
                let unlocked = self.unlocked.read().await;
                users
                    .values()
                    .map(|u| UserScoreRow {
                        user_id: u.user_id.clone(),
                        score: unlocked.get(&u.user_id).map(|v| v.len() as u64).unwrap_or(0),
                        tiebreak: u.last_activity,
                    })
                    .collect()
            }
            _ => users
                .values()
                .map(|u| {
                    let score = match score_type {
                        ScoreType::TotalPoints => u.total_xp,
                        ScoreType::WeeklyPoints => u.period_points.weekly_at(now),
                        ScoreType::MonthlyPoints => u.period_points.monthly_at(now),
                        ScoreType::DailyPoints => u.period_points.daily_at(now),
                        ScoreType::MealsLogged => u.meals_logged,
                        _ => unreachable!(),
                    };
                    UserScoreRow {
                        user_id: u.user_id.clone(),
                        score,
                        tiebreak: u.last_activity,
                    }
                })
                .collect(),
        }
    }

    /// Ranked board for (score_type, period), cache-first. `limit` is
    /// applied after full ranking so rank numbers stay globally correct.
    pub async fn get_leaderboard(
        &self,
        score_type: ScoreType,
        period: Period,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<LeaderboardEntry> {
        let key = (score_type, period);
        let full = match self.leaderboards.cached(key).await {
            Some(entries) => entries,
            None => {
                let rows = self.collect_rows(score_type, now).await;
                self.leaderboards.compute(key, rows).await
            }
        };
        full.into_iter().take(limit).collect()
    }

    /// A user's global rank, `None` when it cannot be resolved.
    pub async fn get_user_rank(
        &self,
        user_id: &str,
        score_type: ScoreType,
        period: Period,
        now: DateTime<Utc>,
    ) -> Option<u32> {
        let board = self.get_leaderboard(score_type, period, usize::MAX, now).await;
        LeaderboardEngine::rank_of(&board, user_id)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_user_created_on_first_lookup_is_none() {
        let state = AppState::new();
        assert!(state.get_user_progress("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_flag_trail_is_append_only_per_user() {
        let state = AppState::new();
        state.record_flag("u1", "xp_claim_deviation", ts(10)).await;
        state.record_flag("u2", "rate_limit_exceeded", ts(10)).await;
        state.record_flag("u1", "uniform_action_timing", ts(11)).await;

        let u1 = state.flags_for("u1").await;
        assert_eq!(u1.len(), 2);
        assert_eq!(u1[0].reason, "xp_claim_deviation");
        assert_eq!(u1[1].reason, "uniform_action_timing");
    }

    #[tokio::test]
    async fn test_user_lock_is_shared_per_user() {
        let state = AppState::new();
        let a = state.user_lock("u1").await;
        let b = state.user_lock("u1").await;
        assert!(Arc::ptr_eq(&a, &b));

        let c = state.user_lock("u2").await;
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_dirty_boards_drain() {
        let state = AppState::new();
        state
            .mark_boards_dirty(&[ScoreDimension::Points], "u1")
            .await;
        let (keys, user) = state.take_dirty_boards().await;
        // 4 point score types × 4 periods
        assert_eq!(keys.len(), 16);
        assert_eq!(user.as_deref(), Some("u1"));

        let (keys, _) = state.take_dirty_boards().await;
        assert!(keys.is_empty());
    }
}
