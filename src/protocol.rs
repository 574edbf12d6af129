use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::*;

/// Inbound action event from the task/meal/social subsystems.
///
/// `difficulty` stays a raw string on the wire: legacy clients send values
/// we don't model, and the reward path degrades those to the safe default
/// instead of failing the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    pub user_id: UserId,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Retried submissions reuse this key and are not double-awarded.
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_claimed_xp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_claimed_streak: Option<u32>,
    #[serde(default)]
    pub time_bonus: bool,
    #[serde(default)]
    pub perfect_score: bool,
}

/// Level-up details riding a reward result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelUp {
    /// Final level after the whole XP delta — intermediate levels crossed
    /// by one large delta are not reported individually.
    pub new_level: u32,
    /// Cumulative across every level crossed.
    pub bonus_coins: u64,
    /// Union of unlocks across every level crossed.
    pub unlocked_features: Vec<String>,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum StreakUpdate {
    Continued {
        new_streak_count: u32,
        /// Display multiplier, e.g. 1.5 for a week-long streak.
        bonus_multiplier: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        milestone_reached: Option<u32>,
    },
    Reset {
        previous_streak: u32,
        new_streak_count: u32,
    },
}

/// Outbound reward result to the UI/notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardResult {
    pub user_id: UserId,
    pub xp_earned: u32,
    pub coins_earned: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_up: Option<LevelUp>,
    pub achievements_unlocked: Vec<AchievementId>,
    pub streak_update: StreakUpdate,
    pub total_xp: u64,
    pub level: u32,
}

/// Messages from live-feed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to one (score_type, period) leaderboard channel.
    Subscribe {
        score_type: ScoreType,
        period: Period,
    },
    Unsubscribe {
        score_type: ScoreType,
        period: Period,
    },
}

/// Messages pushed to live-feed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        server_now: String,
    },
    Subscribed {
        score_type: ScoreType,
        period: Period,
    },
    LeaderboardUpdate {
        score_type: ScoreType,
        period: Period,
        leaderboard: Vec<LeaderboardEntry>,
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_user_id: Option<UserId>,
    },
    Error {
        code: String,
        msg: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_event_accepts_minimal_payload() {
        let json = r#"{
            "user_id": "u1",
            "action_type": "meal_log",
            "timestamp": "2026-03-04T12:00:00Z",
            "idempotency_key": "evt-1"
        }"#;
        let event: ActionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action_type, ActionType::MealLog);
        assert!(event.difficulty.is_none());
        assert!(!event.time_bonus);
    }

    #[test]
    fn test_legacy_action_type_falls_back_to_unknown() {
        let json = r#"{
            "user_id": "u1",
            "action_type": "tap_dance",
            "timestamp": "2026-03-04T12:00:00Z",
            "idempotency_key": "evt-2",
            "difficulty": "nightmare"
        }"#;
        let event: ActionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action_type, ActionType::Unknown);
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::LeaderboardUpdate {
            score_type: ScoreType::TotalPoints,
            period: Period::Weekly,
            leaderboard: vec![],
            updated_user_id: Some("u1".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "leaderboard_update");
        assert_eq!(json["score_type"], "total_points");
        assert_eq!(json["period"], "weekly");
    }

    #[test]
    fn test_client_subscribe_roundtrip() {
        let json = r#"{"t":"subscribe","score_type":"current_streak","period":"total"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { score_type, period } => {
                assert_eq!(score_type, ScoreType::CurrentStreak);
                assert_eq!(period, Period::Total);
            }
            _ => panic!("expected subscribe"),
        }
    }
}
