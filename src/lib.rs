// Public API for integration tests and potential library usage

pub mod anticheat;
pub mod api;
pub mod broadcast;
pub mod error;
pub mod leaderboard;
pub mod protocol;
pub mod reward;
pub mod state;
pub mod tables;
pub mod types;
pub mod ws;
