//! High-score persistence core for the Unscramble word game.
//! Owns the durable best score and the per-session logic that updates it.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{ConfigError, CoreConfig, StoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::high_score::{HighScoreRecord, HighScoreSnapshot, HighScoreValidationError};
pub use repo::high_score_repo::{
    HighScoreRepository, RepoError, RepoResult, SqliteHighScoreRepository,
};
pub use repo::legacy::LegacyImport;
pub use service::game_session::{
    GameSessionController, ScoreClassification, SessionError, SessionOutcome, SessionResult,
    SessionState,
};
pub use store::{HighScoreStore, HighScoreStream, PendingWrite, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
