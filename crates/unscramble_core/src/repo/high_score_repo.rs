//! High-score repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Read and write the two high-score preferences of one named store.
//! - Track a per-store revision counter alongside the values.
//!
//! # Invariants
//! - Points and timestamp change together in one transaction.
//! - Reads reject invalid persisted state instead of masking it.
//! - An absent value key reads as the default record.

use crate::db::DbError;
use crate::model::high_score::{HighScoreRecord, HighScoreSnapshot, HighScoreValidationError};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const HIGH_SCORE_VALUE_KEY: &str = "saved_high_score_value";
pub const HIGH_SCORE_DATETIME_KEY: &str = "saved_high_score_datetime";
const MAX_STORE_NAME_LEN: usize = 64;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(HighScoreValidationError),
    Db(DbError),
    InvalidData(String),
    InvalidStoreName(String),
}

impl RepoError {
    /// Returns whether the failure is transient storage I/O.
    pub fn is_transient_io(&self) -> bool {
        match self {
            Self::Db(err) => err.is_transient_io(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted high score: {message}"),
            Self::InvalidStoreName(name) => write!(f, "invalid store name `{name}`"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::InvalidStoreName(_) => None,
        }
    }
}

impl From<HighScoreValidationError> for RepoError {
    fn from(value: HighScoreValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract for the single high-score record.
///
/// Implementations are moved onto blocking worker threads by the async
/// store, hence the `Send + 'static` bound.
pub trait HighScoreRepository: Send + 'static {
    /// Name of the preference store this repository is bound to.
    fn store_name(&self) -> &str;
    /// Reads the record and the revision it belongs to.
    fn load(&self) -> RepoResult<HighScoreSnapshot>;
    /// Replaces the record, returning the new revision.
    fn save(&mut self, record: &HighScoreRecord) -> RepoResult<u64>;
    /// Removes every key of the store, returning the new revision.
    fn clear(&mut self) -> RepoResult<u64>;
}

/// SQLite-backed repository bound to one store name.
pub struct SqliteHighScoreRepository {
    conn: Connection,
    store_name: String,
}

impl SqliteHighScoreRepository {
    /// Wraps a migrated connection, validating `store_name`.
    pub fn try_new(conn: Connection, store_name: &str) -> RepoResult<Self> {
        Ok(Self {
            conn,
            store_name: normalize_store_name(store_name)?,
        })
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl HighScoreRepository for SqliteHighScoreRepository {
    fn store_name(&self) -> &str {
        &self.store_name
    }

    fn load(&self) -> RepoResult<HighScoreSnapshot> {
        // Deferred read transaction so values and revision come from one
        // consistent database state.
        let tx = self.conn.unchecked_transaction()?;
        let points = read_int(&tx, &self.store_name, HIGH_SCORE_VALUE_KEY)?;
        let achieved_at = read_text(&tx, &self.store_name, HIGH_SCORE_DATETIME_KEY)?;
        let revision = read_revision(&tx, &self.store_name)?;
        tx.finish()?;

        let points = match points {
            None => 0,
            Some(value) => u32::try_from(value).map_err(|_| {
                RepoError::InvalidData(format!(
                    "value `{value}` in {HIGH_SCORE_VALUE_KEY} is out of range"
                ))
            })?,
        };
        let record = HighScoreRecord {
            points,
            achieved_at: achieved_at.unwrap_or_default(),
        };
        record.validate()?;

        Ok(HighScoreSnapshot { revision, record })
    }

    fn save(&mut self, record: &HighScoreRecord) -> RepoResult<u64> {
        record.validate()?;

        let store_name = self.store_name.clone();
        let tx = self.conn.transaction()?;
        if record.is_unset() {
            delete_keys(&tx, &store_name, &[HIGH_SCORE_VALUE_KEY, HIGH_SCORE_DATETIME_KEY])?;
        } else {
            upsert_int(&tx, &store_name, HIGH_SCORE_VALUE_KEY, i64::from(record.points))?;
            upsert_text(&tx, &store_name, HIGH_SCORE_DATETIME_KEY, &record.achieved_at)?;
        }
        let revision = bump_revision(&tx, &store_name)?;
        tx.commit()?;
        Ok(revision)
    }

    fn clear(&mut self) -> RepoResult<u64> {
        let store_name = self.store_name.clone();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM preferences WHERE store_name = ?1;",
            params![store_name],
        )?;
        let revision = bump_revision(&tx, &store_name)?;
        tx.commit()?;
        Ok(revision)
    }
}

/// Trims and validates a store name.
///
/// Accepts 1..=64 characters from `[A-Za-z0-9_.-]`.
pub fn normalize_store_name(value: &str) -> RepoResult<String> {
    let trimmed = value.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_STORE_NAME_LEN
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(RepoError::InvalidStoreName(value.to_string()));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn read_int(conn: &Connection, store_name: &str, key: &str) -> RepoResult<Option<i64>> {
    let value = conn
        .query_row(
            "SELECT int_value FROM preferences WHERE store_name = ?1 AND key = ?2;",
            params![store_name, key],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

pub(crate) fn read_text(
    conn: &Connection,
    store_name: &str,
    key: &str,
) -> RepoResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT text_value FROM preferences WHERE store_name = ?1 AND key = ?2;",
            params![store_name, key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

fn read_revision(conn: &Connection, store_name: &str) -> RepoResult<u64> {
    let revision = conn
        .query_row(
            "SELECT revision FROM store_revisions WHERE store_name = ?1;",
            params![store_name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .unwrap_or(0);
    u64::try_from(revision)
        .map_err(|_| RepoError::InvalidData(format!("negative store revision `{revision}`")))
}

pub(crate) fn upsert_int(
    tx: &Transaction<'_>,
    store_name: &str,
    key: &str,
    value: i64,
) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO preferences (store_name, key, int_value, text_value, updated_at)
         VALUES (?1, ?2, ?3, NULL, (strftime('%s', 'now') * 1000))
         ON CONFLICT (store_name, key) DO UPDATE SET
            int_value = excluded.int_value,
            text_value = NULL,
            updated_at = excluded.updated_at;",
        params![store_name, key, value],
    )?;
    Ok(())
}

pub(crate) fn upsert_text(
    tx: &Transaction<'_>,
    store_name: &str,
    key: &str,
    value: &str,
) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO preferences (store_name, key, int_value, text_value, updated_at)
         VALUES (?1, ?2, NULL, ?3, (strftime('%s', 'now') * 1000))
         ON CONFLICT (store_name, key) DO UPDATE SET
            int_value = NULL,
            text_value = excluded.text_value,
            updated_at = excluded.updated_at;",
        params![store_name, key, value],
    )?;
    Ok(())
}

pub(crate) fn delete_keys(
    tx: &Transaction<'_>,
    store_name: &str,
    keys: &[&str],
) -> RepoResult<()> {
    for key in keys {
        tx.execute(
            "DELETE FROM preferences WHERE store_name = ?1 AND key = ?2;",
            params![store_name, key],
        )?;
    }
    Ok(())
}

pub(crate) fn bump_revision(tx: &Transaction<'_>, store_name: &str) -> RepoResult<u64> {
    let revision = tx.query_row(
        "INSERT INTO store_revisions (store_name, revision) VALUES (?1, 1)
         ON CONFLICT (store_name) DO UPDATE SET revision = revision + 1
         RETURNING revision;",
        params![store_name],
        |row| row.get::<_, i64>(0),
    )?;
    u64::try_from(revision)
        .map_err(|_| RepoError::InvalidData(format!("negative store revision `{revision}`")))
}
