//! Use-case services built on the high-score store.
//!
//! # Responsibility
//! - Turn gameplay outcomes into store reads and writes.
//! - Keep presentation callers unaware of storage details.

pub mod game_session;
