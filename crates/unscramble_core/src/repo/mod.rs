//! Repository layer over named preference stores.
//!
//! # Responsibility
//! - Define the persistence contract the async store is built on.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Writes validate records before touching SQL.
//! - Every committed write or clear bumps the store revision in the same
//!   transaction.

pub mod high_score_repo;
pub mod legacy;
