//! HTTP query surface consumed by the UI collaborator.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::EngineError;
use crate::protocol::{ActionEvent, RewardResult};
use crate::state::AppState;
use crate::types::*;

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub score_type: ScoreType,
    pub period: Period,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub score_type: ScoreType,
    pub period: Period,
    pub entries: Vec<LeaderboardEntry>,
}

/// GET /api/leaderboard?score_type=total_points&period=weekly&limit=100
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<LeaderboardResponse> {
    let entries = state
        .get_leaderboard(query.score_type, query.period, query.limit, chrono::Utc::now())
        .await;
    Json(LeaderboardResponse {
        score_type: query.score_type,
        period: query.period,
        entries,
    })
}

#[derive(Debug, Deserialize)]
pub struct RankQuery {
    pub user_id: UserId,
    pub score_type: ScoreType,
    pub period: Period,
}

#[derive(Debug, Serialize)]
pub struct RankResponse {
    pub user_id: UserId,
    pub score_type: ScoreType,
    pub period: Period,
    /// `null` when the rank cannot be resolved — the UI renders "rank
    /// unavailable" instead of failing the whole view.
    pub rank: Option<u32>,
}

/// GET /api/rank?user_id=u1&score_type=total_points&period=total
pub async fn get_user_rank(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RankQuery>,
) -> Json<RankResponse> {
    let rank = state
        .get_user_rank(
            &query.user_id,
            query.score_type,
            query.period,
            chrono::Utc::now(),
        )
        .await;
    Json(RankResponse {
        user_id: query.user_id,
        score_type: query.score_type,
        period: query.period,
        rank,
    })
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: UserProgress,
    pub title: String,
    /// 0.0..=1.0 toward the next level, pinned to 1.0 at the cap.
    pub level_progress: f64,
    pub streaks: Vec<StreakRecord>,
    pub achievements: Vec<UserAchievement>,
}

/// GET /api/progress/{user_id}
pub async fn get_user_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ProgressResponse>, EngineError> {
    let progress = state
        .get_user_progress(&user_id)
        .await
        .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))?;

    let title = state.tables.title_for(progress.level).to_string();
    let level_progress = state.level_progress(&user_id).await.unwrap_or(0.0);

    let streaks = {
        let all = state.streaks.read().await;
        all.values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    };
    let achievements = state.get_achievements(&user_id).await;

    Ok(Json(ProgressResponse {
        progress,
        title,
        level_progress,
        streaks,
        achievements,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FlagsQuery {
    pub user_id: UserId,
}

/// GET /api/flags?user_id=u1 — audit trail read for account-risk tooling.
pub async fn get_flags(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FlagsQuery>,
) -> Json<Vec<SuspiciousActivityFlag>> {
    Json(state.flags_for(&query.user_id).await)
}

/// POST /api/action — inbound action event, runs the full pipeline.
pub async fn submit_action(
    State(state): State<Arc<AppState>>,
    Json(event): Json<ActionEvent>,
) -> Result<Json<RewardResult>, EngineError> {
    let result = state.process_action(event).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(user: &str, key: &str) -> ActionEvent {
        ActionEvent {
            user_id: user.to_string(),
            action_type: ActionType::MealLog,
            difficulty: Some("easy".to_string()),
            timestamp: Utc::now(),
            idempotency_key: key.to_string(),
            client_claimed_xp: None,
            client_claimed_streak: None,
            time_bonus: false,
            perfect_score: false,
        }
    }

    #[tokio::test]
    async fn test_submit_then_read_progress() {
        let state = Arc::new(AppState::new());
        let result = submit_action(State(state.clone()), Json(event("u1", "k1")))
            .await
            .unwrap();
        assert_eq!(result.0.xp_earned, 15);

        let response = get_user_progress(State(state), Path("u1".to_string()))
            .await
            .unwrap();
        assert_eq!(response.0.progress.total_xp, 15);
        assert_eq!(response.0.title, "Unknown");
        assert_eq!(response.0.streaks.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_for_unknown_user_is_404() {
        let state = Arc::new(AppState::new());
        let result = get_user_progress(State(state), Path("ghost".to_string())).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rank_endpoint_degrades_to_null() {
        let state = Arc::new(AppState::new());
        let response = get_user_rank(
            State(state),
            Query(RankQuery {
                user_id: "nobody".to_string(),
                score_type: ScoreType::TotalPoints,
                period: Period::Total,
            }),
        )
        .await;
        assert_eq!(response.0.rank, None);
    }

    #[tokio::test]
    async fn test_leaderboard_endpoint_orders_and_limits() {
        let state = Arc::new(AppState::new());
        for (user, action) in [("a", "goal_1"), ("b", "meal_1"), ("c", "meal_2")] {
            let mut e = event(user, action);
            if user == "a" {
                e.action_type = ActionType::GoalAchievement;
            }
            submit_action(State(state.clone()), Json(e)).await.unwrap();
        }

        let response = get_leaderboard(
            State(state),
            Query(LeaderboardQuery {
                score_type: ScoreType::TotalPoints,
                period: Period::Total,
                limit: 2,
            }),
        )
        .await;
        let entries = &response.0.entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user_id, "a");
        assert_eq!(entries[0].rank, 1);
        assert!(entries[0].score >= entries[1].score);
    }
}
