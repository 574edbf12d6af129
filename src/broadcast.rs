use std::sync::Arc;
use std::time::Duration;

use crate::protocol::ServerMessage;
use crate::state::AppState;

/// How often the refresher drains the dirty-board set.
const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Entries broadcast per board update.
const BROADCAST_LIMIT: usize = 100;

/// Spawn the background task that recomputes boards staled by recent writes
/// and pushes them to live-feed subscribers.
///
/// Reads are served stale-while-revalidate: callers keep hitting the cache
/// while this task refreshes staled boards off the hot path.
pub fn spawn_leaderboard_refresher(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REFRESH_INTERVAL).await;

            let (dirty, updated_user) = state.take_dirty_boards().await;
            if dirty.is_empty() {
                continue;
            }

            let now = chrono::Utc::now();
            for (score_type, period) in dirty {
                let board = state
                    .get_leaderboard(score_type, period, BROADCAST_LIMIT, now)
                    .await;

                let msg = ServerMessage::LeaderboardUpdate {
                    score_type,
                    period,
                    leaderboard: board,
                    updated_user_id: updated_user.clone(),
                };
                // No receivers connected is fine
                let _ = state.feed.send(msg);
            }
        }
    });
}
