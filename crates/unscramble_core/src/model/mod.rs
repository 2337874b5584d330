//! Domain records persisted by the preference store.
//!
//! # Invariants
//! - An unset high score carries no timestamp.

pub mod high_score;
