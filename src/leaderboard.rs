//! Leaderboard Engine: derived rankings over progress/streak/achievement
//! aggregates, with an injected TTL cache and rank-change tracking.
//!
//! Entries are never authoritative state — every board is recomputed from
//! the owning trackers on cache miss. Cache writes are last-writer-wins;
//! invalidation is targeted per score dimension so an XP gain doesn't stale
//! the streak boards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::{LeaderboardEntry, Period, ScoreDimension, ScoreType, UserId};

pub type BoardKey = (ScoreType, Period);

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// A fully ranked board plus the moment it was computed.
#[derive(Debug, Clone)]
pub struct CachedBoard {
    pub entries: Vec<LeaderboardEntry>,
    pub computed_at: DateTime<Utc>,
}

/// Cache seam for ranked boards. The engine only talks to this trait, so an
/// in-memory map can be swapped for a distributed cache without touching
/// ranking logic.
#[async_trait]
pub trait LeaderboardCache: Send + Sync {
    async fn get(&self, key: BoardKey) -> Option<CachedBoard>;
    async fn set(&self, key: BoardKey, board: CachedBoard);
    async fn invalidate(&self, keys: &[BoardKey]);
}

/// Process-local cache with a fixed TTL per entry.
pub struct InMemoryCache {
    ttl: Duration,
    slots: RwLock<HashMap<BoardKey, (CachedBoard, Instant)>>,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[async_trait]
impl LeaderboardCache for InMemoryCache {
    async fn get(&self, key: BoardKey) -> Option<CachedBoard> {
        let slots = self.slots.read().await;
        let (board, inserted) = slots.get(&key)?;
        if inserted.elapsed() >= self.ttl {
            return None;
        }
        Some(board.clone())
    }

    async fn set(&self, key: BoardKey, board: CachedBoard) {
        self.slots.write().await.insert(key, (board, Instant::now()));
    }

    async fn invalidate(&self, keys: &[BoardKey]) {
        let mut slots = self.slots.write().await;
        for key in keys {
            slots.remove(key);
        }
    }
}

/// One user's resolved score for a given board, before ranking.
#[derive(Debug, Clone)]
pub struct UserScoreRow {
    pub user_id: UserId,
    pub score: u64,
    /// Tie-break: earlier activity/join time wins. Storage order never
    /// decides a rank.
    pub tiebreak: DateTime<Utc>,
}

pub struct LeaderboardEngine {
    cache: Arc<dyn LeaderboardCache>,
    /// Rank snapshot from the most recent computation per board, for Δrank.
    prev_ranks: RwLock<HashMap<BoardKey, HashMap<UserId, u32>>>,
}

impl LeaderboardEngine {
    pub fn new(cache: Arc<dyn LeaderboardCache>) -> Self {
        Self {
            cache,
            prev_ranks: RwLock::new(HashMap::new()),
        }
    }

    /// Serve the cached board if fresh.
    pub async fn cached(&self, key: BoardKey) -> Option<Vec<LeaderboardEntry>> {
        self.cache.get(key).await.map(|b| b.entries)
    }

    /// Rank `rows`, compute rank deltas against the previous snapshot,
    /// cache the full board and return it. Pagination happens at the call
    /// site, after ranking, so rank numbers stay globally correct.
    pub async fn compute(&self, key: BoardKey, mut rows: Vec<UserScoreRow>) -> Vec<LeaderboardEntry> {
        rows.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.tiebreak.cmp(&b.tiebreak))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let mut prev_ranks = self.prev_ranks.write().await;
        let previous = prev_ranks.entry(key).or_default();

        let entries: Vec<LeaderboardEntry> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let rank = i as u32 + 1;
                let rank_change = previous
                    .get(&row.user_id)
                    .map(|&prev| prev as i64 - rank as i64)
                    .unwrap_or(0);
                LeaderboardEntry {
                    rank,
                    user_id: row.user_id.clone(),
                    score: row.score,
                    rank_change,
                }
            })
            .collect();

        *previous = entries
            .iter()
            .map(|e| (e.user_id.clone(), e.rank))
            .collect();
        drop(prev_ranks);

        self.cache
            .set(
                key,
                CachedBoard {
                    entries: entries.clone(),
                    computed_at: Utc::now(),
                },
            )
            .await;

        entries
    }

    /// Drop every cached board whose score type is touched by `dimension`.
    /// Untouched dimensions keep their cache entries.
    pub async fn invalidate_dimension(&self, dimension: ScoreDimension) {
        let keys: Vec<BoardKey> = dimension
            .affected_score_types()
            .iter()
            .flat_map(|&st| Period::ALL.iter().map(move |&p| (st, p)))
            .collect();
        self.cache.invalidate(&keys).await;
    }

    /// A user's 1-based rank on a board, `None` if they are not on it.
    pub fn rank_of(entries: &[LeaderboardEntry], user_id: &str) -> Option<u32> {
        entries
            .iter()
            .find(|e| e.user_id == user_id)
            .map(|e| e.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap() + chrono::Duration::seconds(s)
    }

    fn row(user: &str, score: u64, tiebreak_s: i64) -> UserScoreRow {
        UserScoreRow {
            user_id: user.to_string(),
            score,
            tiebreak: ts(tiebreak_s),
        }
    }

    fn engine() -> LeaderboardEngine {
        LeaderboardEngine::new(Arc::new(InMemoryCache::default()))
    }

    const KEY: BoardKey = (ScoreType::TotalPoints, Period::Total);

    #[tokio::test]
    async fn test_descending_order_with_tiebreak() {
        let e = engine();
        let board = e
            .compute(
                KEY,
                vec![
                    row("late", 100, 50),
                    row("top", 300, 10),
                    row("early", 100, 5),
                ],
            )
            .await;

        assert_eq!(board[0].user_id, "top");
        assert_eq!(board[0].rank, 1);
        // Equal scores: earlier activity wins
        assert_eq!(board[1].user_id, "early");
        assert_eq!(board[2].user_id, "late");
        for pair in board.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_rank_change_against_previous_snapshot() {
        let e = engine();
        let first = e
            .compute(KEY, vec![row("a", 100, 0), row("b", 50, 0), row("c", 25, 0)])
            .await;
        // Nobody has a prior rank on the first computation
        assert!(first.iter().all(|entry| entry.rank_change == 0));

        // c overtakes everyone; d appears for the first time
        let second = e
            .compute(
                KEY,
                vec![
                    row("a", 100, 0),
                    row("b", 50, 0),
                    row("c", 500, 0),
                    row("d", 75, 0),
                ],
            )
            .await;
        let by_user: HashMap<_, _> = second.iter().map(|e| (e.user_id.as_str(), e)).collect();
        assert_eq!(by_user["c"].rank, 1);
        assert_eq!(by_user["c"].rank_change, 2); // was 3rd
        assert_eq!(by_user["a"].rank_change, -1); // was 1st, now 2nd
        assert_eq!(by_user["d"].rank_change, 0); // unseen before
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let e = engine();
        let computed = e.compute(KEY, vec![row("a", 100, 0), row("b", 50, 0)]).await;
        let cached = e.cached(KEY).await.expect("fresh board should be cached");
        assert_eq!(cached, computed);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let cache = Arc::new(InMemoryCache::new(Duration::from_millis(20)));
        let e = LeaderboardEngine::new(cache);
        e.compute(KEY, vec![row("a", 100, 0)]).await;
        assert!(e.cached(KEY).await.is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(e.cached(KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_targeted_invalidation() {
        let e = engine();
        let streak_key = (ScoreType::CurrentStreak, Period::Total);
        e.compute(KEY, vec![row("a", 100, 0)]).await;
        e.compute(streak_key, vec![row("a", 7, 0)]).await;

        // An XP write stales points boards but not streak boards
        e.invalidate_dimension(ScoreDimension::Points).await;
        assert!(e.cached(KEY).await.is_none());
        assert!(e.cached(streak_key).await.is_some());
    }

    #[tokio::test]
    async fn test_rank_of() {
        let e = engine();
        let board = e
            .compute(KEY, vec![row("a", 100, 0), row("b", 50, 0), row("c", 25, 0)])
            .await;
        assert_eq!(LeaderboardEngine::rank_of(&board, "b"), Some(2));
        assert_eq!(LeaderboardEngine::rank_of(&board, "nobody"), None);
    }
}
