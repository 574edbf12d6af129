//! Anti-cheat validation for claimed rewards and streaks.
//!
//! Screens every action before it can mutate progress state:
//! - claimed XP must stay within tolerance of the engine-computed value
//! - per-user rate limiting over a trailing window
//! - suspiciously regular inter-action timing accumulates bot flags
//! - claimed streaks must not outrun the Streak Manager's own count
//!
//! Verdicts are typed, never thrown: the pipeline decides to clamp or drop.
//! The bot heuristic is statistical — a single detection only flags; the
//! account is restricted only after the flag count exceeds the limit.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::UserId;

/// Validation outcome for a single action claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    /// Statistical suspicion — recorded, not enforced on its own.
    Flag { reason: String, confidence: f64 },
    /// Claim is arithmetically impossible or rate-limited. The reward is
    /// clamped, the action still succeeds from the user's perspective.
    HardReject { reason: String },
}

/// Anti-cheat thresholds, immutable after load.
#[derive(Debug, Clone)]
pub struct AntiCheatConfig {
    /// Allowed deviation of claimed XP from the expected value, per-mille.
    pub xp_tolerance_permille: u64,
    /// Max scoring actions within the trailing window.
    pub max_actions_per_window: usize,
    pub rate_window: Duration,
    /// Inter-action gap variance (ms²) below which timing looks automated.
    pub timing_variance_threshold: u64,
    /// Minimum gap samples before the timing heuristic applies.
    pub min_timing_samples: usize,
    /// How many recent action timestamps to retain per user.
    pub history_len: usize,
    /// Flags beyond this count put the account into temporary restriction.
    pub restriction_flag_limit: u32,
    /// Days a claimed streak may exceed the computed streak.
    pub streak_tolerance_days: u32,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            xp_tolerance_permille: 100, // 10%
            max_actions_per_window: 10,
            rate_window: Duration::from_secs(60),
            timing_variance_threshold: 2_500, // stddev under ~50ms
            min_timing_samples: 4,
            history_len: 12,
            restriction_flag_limit: 5,
            streak_tolerance_days: 1,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AntiCheatConfig {
    /// Load config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            xp_tolerance_permille: env_parse(
                "ANTICHEAT_XP_TOLERANCE_PERMILLE",
                defaults.xp_tolerance_permille,
            ),
            max_actions_per_window: env_parse(
                "ANTICHEAT_MAX_ACTIONS",
                defaults.max_actions_per_window,
            ),
            rate_window: Duration::from_secs(env_parse("ANTICHEAT_RATE_WINDOW_SECS", 60)),
            timing_variance_threshold: env_parse(
                "ANTICHEAT_TIMING_VARIANCE",
                defaults.timing_variance_threshold,
            ),
            min_timing_samples: defaults.min_timing_samples,
            history_len: defaults.history_len,
            restriction_flag_limit: env_parse(
                "ANTICHEAT_FLAG_LIMIT",
                defaults.restriction_flag_limit,
            ),
            streak_tolerance_days: defaults.streak_tolerance_days,
        };

        tracing::info!(
            xp_tolerance_permille = config.xp_tolerance_permille,
            max_actions = config.max_actions_per_window,
            flag_limit = config.restriction_flag_limit,
            "Anti-cheat config loaded"
        );
        config
    }
}

#[derive(Debug, Default)]
struct UserActivity {
    timestamps: VecDeque<DateTime<Utc>>,
    flag_count: u32,
    restricted: bool,
}

/// Stateful validator: per-user timing history and accumulated flags.
#[derive(Debug)]
pub struct AntiCheatValidator {
    config: AntiCheatConfig,
    activity: RwLock<HashMap<UserId, UserActivity>>,
}

/// Everything the validator needs to judge one action claim.
#[derive(Debug, Clone, Copy)]
pub struct ClaimContext {
    pub expected_xp: u32,
    pub claimed_xp: Option<u32>,
    pub computed_streak: u32,
    pub claimed_streak: Option<u32>,
}

impl AntiCheatValidator {
    pub fn new(config: AntiCheatConfig) -> Self {
        Self {
            config,
            activity: RwLock::new(HashMap::new()),
        }
    }

    /// Validate one action claim, recording its timestamp in the user's
    /// timing history. Checks run hardest-evidence-first: rate limit, then
    /// claim arithmetic, then the statistical timing heuristic.
    pub async fn validate(&self, user_id: &str, now: DateTime<Utc>, claim: ClaimContext) -> Verdict {
        let mut activity = self.activity.write().await;
        let user = activity.entry(user_id.to_string()).or_default();

        user.timestamps.push_back(now);
        while user.timestamps.len() > self.config.history_len {
            user.timestamps.pop_front();
        }

        let window = chrono::Duration::from_std(self.config.rate_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let in_window = user
            .timestamps
            .iter()
            .filter(|&&t| now - t <= window && t <= now)
            .count();
        if in_window > self.config.max_actions_per_window {
            tracing::warn!(user_id, in_window, "rate limit exceeded");
            return Verdict::HardReject {
                reason: "rate_limit_exceeded".to_string(),
            };
        }

        if let Some(claimed) = claim.claimed_xp {
            let expected = claim.expected_xp as u64;
            let deviation = (claimed as u64).abs_diff(expected) * 1000;
            if deviation > expected * self.config.xp_tolerance_permille {
                tracing::warn!(
                    user_id,
                    claimed,
                    expected = claim.expected_xp,
                    "claimed XP outside tolerance"
                );
                return Verdict::HardReject {
                    reason: "xp_claim_deviation".to_string(),
                };
            }
        }

        if let Some(claimed) = claim.claimed_streak {
            if claimed > claim.computed_streak + self.config.streak_tolerance_days {
                tracing::warn!(
                    user_id,
                    claimed,
                    computed = claim.computed_streak,
                    "claimed streak exceeds computed value"
                );
                return Verdict::HardReject {
                    reason: "streak_claim_exceeds_computed".to_string(),
                };
            }
        }

        if let Some(variance) = timing_variance_ms2(&user.timestamps, self.config.min_timing_samples)
        {
            if variance < self.config.timing_variance_threshold {
                user.flag_count += 1;
                if user.flag_count > self.config.restriction_flag_limit {
                    user.restricted = true;
                    tracing::warn!(
                        user_id,
                        flags = user.flag_count,
                        "flag limit exceeded, account temporarily restricted"
                    );
                }
                let confidence =
                    1.0 - variance as f64 / self.config.timing_variance_threshold as f64;
                return Verdict::Flag {
                    reason: "uniform_action_timing".to_string(),
                    confidence,
                };
            }
        }

        Verdict::Accept
    }

    /// Whether the account has accumulated enough flags to be restricted.
    /// Enforcement itself is an external concern.
    pub async fn is_restricted(&self, user_id: &str) -> bool {
        self.activity
            .read()
            .await
            .get(user_id)
            .map(|a| a.restricted)
            .unwrap_or(false)
    }

    pub async fn flag_count(&self, user_id: &str) -> u32 {
        self.activity
            .read()
            .await
            .get(user_id)
            .map(|a| a.flag_count)
            .unwrap_or(0)
    }
}

/// Population variance of inter-action gaps, in ms². Returns `None` until
/// enough samples exist for the heuristic to mean anything.
fn timing_variance_ms2(timestamps: &VecDeque<DateTime<Utc>>, min_samples: usize) -> Option<u64> {
    if timestamps.len() < min_samples + 1 {
        return None;
    }
    let gaps: Vec<i64> = timestamps
        .iter()
        .zip(timestamps.iter().skip(1))
        .map(|(a, b)| (*b - *a).num_milliseconds())
        .collect();

    let mean = gaps.iter().sum::<i64>() / gaps.len() as i64;
    let variance = gaps
        .iter()
        .map(|g| {
            let d = (g - mean) as i128;
            (d * d) as u128
        })
        .sum::<u128>()
        / gaps.len() as u128;
    Some(variance.min(u64::MAX as u128) as u64)
}
