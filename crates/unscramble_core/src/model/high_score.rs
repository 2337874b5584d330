//! High-score record model.
//!
//! # Responsibility
//! - Define the single best-score record shared by every game session.
//! - Render local-clock timestamps in the persisted ISO-8601 shape.
//!
//! # Invariants
//! - `points == 0` implies `achieved_at` is empty.
//! - A non-empty `achieved_at` parses as a local date-time without offset.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Persisted timestamp layout: local date-time, no offset, optional fraction.
pub const ACHIEVED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Best score achieved across all sessions.
///
/// `Default` is the unset state returned before anything was ever stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighScoreRecord {
    pub points: u32,
    /// Local ISO-8601 date-time, empty when never set.
    pub achieved_at: String,
}

/// A record together with the store revision it was read at.
///
/// Revisions grow by one per committed write or clear, which lets consumers
/// discard emissions older than what they already hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighScoreSnapshot {
    pub revision: u64,
    pub record: HighScoreRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighScoreValidationError {
    TimestampWithoutScore(String),
    MissingTimestamp(u32),
    MalformedTimestamp(String),
}

impl Display for HighScoreValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimestampWithoutScore(value) => {
                write!(f, "unset high score must not carry timestamp `{value}`")
            }
            Self::MissingTimestamp(points) => {
                write!(f, "high score {points} has no timestamp")
            }
            Self::MalformedTimestamp(value) => {
                write!(f, "high score timestamp `{value}` is not a local ISO-8601 date-time")
            }
        }
    }
}

impl Error for HighScoreValidationError {}

impl HighScoreRecord {
    /// Builds a record for `points` achieved at the current local time.
    ///
    /// Zero points produce the unset record.
    pub fn achieved_now(points: u32) -> Self {
        if points == 0 {
            return Self::default();
        }
        Self {
            points,
            achieved_at: Local::now().naive_local().format(ACHIEVED_AT_FORMAT).to_string(),
        }
    }

    /// Returns whether no score was ever stored.
    pub fn is_unset(&self) -> bool {
        self.points == 0
    }

    /// Parses `achieved_at`, returning `None` when unset.
    pub fn achieved_at_local(&self) -> Option<NaiveDateTime> {
        if self.achieved_at.is_empty() {
            return None;
        }
        NaiveDateTime::parse_from_str(&self.achieved_at, ACHIEVED_AT_FORMAT).ok()
    }

    /// Checks the unset/timestamp coupling and timestamp shape.
    pub fn validate(&self) -> Result<(), HighScoreValidationError> {
        match (self.points, self.achieved_at.is_empty()) {
            (0, true) => Ok(()),
            (0, false) => Err(HighScoreValidationError::TimestampWithoutScore(
                self.achieved_at.clone(),
            )),
            (points, true) => Err(HighScoreValidationError::MissingTimestamp(points)),
            (_, false) => match self.achieved_at_local() {
                Some(_) => Ok(()),
                None => Err(HighScoreValidationError::MalformedTimestamp(
                    self.achieved_at.clone(),
                )),
            },
        }
    }

    /// Line shown above the puzzle to challenge the player.
    pub fn challenge_message(&self) -> String {
        match self.achieved_at_local() {
            Some(at) if !self.is_unset() => format!(
                "Beat the high score of {} set on {}",
                self.points,
                at.format("%Y-%m-%d %H:%M")
            ),
            _ => "No high score yet, set the first one!".to_string(),
        }
    }
}
