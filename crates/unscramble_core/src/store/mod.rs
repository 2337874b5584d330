//! Asynchronous high-score store.
//!
//! # Responsibility
//! - Expose the persisted record as a restartable observe stream.
//! - Run every SQLite call on a blocking worker, never on the async caller.
//!   `open`/`open_in_memory` are the exception: they bootstrap synchronously
//!   before any task can hold the store.
//! - Notify all observers after each committed write or clear.
//!
//! # Invariants
//! - Repository access is serialized; a read never sees half of a write.
//! - The change channel only ever carries revisions that are committed.
//! - Transient read I/O degrades to the default record; other read failures
//!   reach the subscriber.

use crate::config::StoreConfig;
use crate::db::{open_db, open_db_in_memory};
use crate::model::high_score::{HighScoreRecord, HighScoreSnapshot};
use crate::repo::high_score_repo::{HighScoreRepository, RepoError, SqliteHighScoreRepository};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

mod stream;

pub use stream::HighScoreStream;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Repo(RepoError),
    /// The blocking worker running the storage call panicked or was aborted.
    Worker(tokio::task::JoinError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Worker(err) => write!(f, "storage worker failed: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Worker(err) => Some(err),
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Worker(value)
    }
}

/// Handle to a write running as its own task.
///
/// Dropping the handle detaches the write; it still runs to completion.
pub type PendingWrite = JoinHandle<StoreResult<u64>>;

struct Inner<R> {
    repo: Mutex<R>,
    changes: watch::Sender<u64>,
    store_name: String,
}

/// Durable store of the single high-score record.
///
/// Cloning is cheap; clones share the repository and change channel, so a
/// write through one clone reaches observers of every other.
pub struct HighScoreStore<R: HighScoreRepository = SqliteHighScoreRepository> {
    inner: Arc<Inner<R>>,
}

impl<R: HighScoreRepository> Clone for HighScoreStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl HighScoreStore<SqliteHighScoreRepository> {
    /// Opens the SQLite-backed store described by `config`.
    ///
    /// Runs the legacy import first when `config.legacy_store_name` is set.
    ///
    /// # Errors
    /// - Database bootstrap, store name validation or import failures.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let conn = open_db(&config.db_path).map_err(RepoError::from)?;
        let mut repo = SqliteHighScoreRepository::try_new(conn, &config.store_name)?;
        if let Some(legacy_store) = config.legacy_store_name.as_deref() {
            repo.import_legacy(legacy_store)?;
        }
        info!(
            "event=store_open module=store status=ok store={} db_path={}",
            repo.store_name(),
            config.db_path.display()
        );
        Ok(Self::from_repository(repo))
    }

    /// Opens a throwaway in-memory store named `store_name`.
    pub fn open_in_memory(store_name: &str) -> StoreResult<Self> {
        let conn = open_db_in_memory().map_err(RepoError::from)?;
        let repo = SqliteHighScoreRepository::try_new(conn, store_name)?;
        Ok(Self::from_repository(repo))
    }
}

impl<R: HighScoreRepository> HighScoreStore<R> {
    /// Wraps any repository implementation.
    ///
    /// Does no I/O. The change channel starts at revision 0 and only ever
    /// moves forward with committed revisions; observers read the actual
    /// record on first poll.
    pub fn from_repository(repo: R) -> Self {
        let store_name = repo.store_name().to_string();
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                repo: Mutex::new(repo),
                changes,
                store_name,
            }),
        }
    }

    pub fn store_name(&self) -> &str {
        &self.inner.store_name
    }

    /// Starts a new observation.
    ///
    /// The stream does no I/O until first polled. Its first item is the
    /// currently persisted record, followed by one item per observed commit.
    pub fn observe(&self) -> HighScoreStream {
        HighScoreStream::new(Arc::clone(&self.inner))
    }

    /// Reads the current snapshot once.
    ///
    /// Transient I/O failures yield the default record at revision 0.
    pub async fn current(&self) -> StoreResult<HighScoreSnapshot> {
        read_snapshot(Arc::clone(&self.inner)).await
    }

    /// Persists `points` stamped with the current local time.
    ///
    /// Returns the committed revision. Zero points store the unset record.
    /// Not retried on failure.
    pub async fn write(&self, points: u32) -> StoreResult<u64> {
        let record = HighScoreRecord::achieved_now(points);
        commit(Arc::clone(&self.inner), "store_write", move |repo| repo.save(&record)).await
    }

    /// Runs [`write`](Self::write) as an independent task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn_write(&self, points: u32) -> PendingWrite {
        let store = self.clone();
        tokio::spawn(async move { store.write(points).await })
    }

    /// Resets the record to the default. Idempotent.
    pub async fn clear(&self) -> StoreResult<u64> {
        commit(Arc::clone(&self.inner), "store_clear", |repo| repo.clear()).await
    }

    /// Number of live observe streams.
    pub fn observer_count(&self) -> usize {
        self.inner.changes.receiver_count()
    }
}

async fn commit<R, F>(inner: Arc<Inner<R>>, event: &'static str, op: F) -> StoreResult<u64>
where
    R: HighScoreRepository,
    F: FnOnce(&mut R) -> Result<u64, RepoError> + Send + 'static,
{
    let started_at = Instant::now();
    let store_name = inner.store_name.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut repo = inner.repo.blocking_lock();
        let revision = op(&mut *repo)?;
        // Published while the lock is held so revisions reach the channel in
        // commit order.
        inner.changes.send_if_modified(|current| {
            if revision > *current {
                *current = revision;
                true
            } else {
                false
            }
        });
        Ok::<u64, RepoError>(revision)
    })
    .await;

    match result {
        Ok(Ok(revision)) => {
            info!(
                "event={event} module=store status=ok store={} revision={revision} duration_ms={}",
                store_name,
                started_at.elapsed().as_millis()
            );
            Ok(revision)
        }
        Ok(Err(err)) => {
            error!(
                "event={event} module=store status=error duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err.into())
        }
        Err(err) => {
            error!("event={event} module=store status=error error_code=worker_failed error={err}");
            Err(err.into())
        }
    }
}

async fn read_snapshot<R: HighScoreRepository>(
    inner: Arc<Inner<R>>,
) -> StoreResult<HighScoreSnapshot> {
    let loaded = tokio::task::spawn_blocking(move || inner.repo.blocking_lock().load()).await?;
    match loaded {
        Ok(snapshot) => Ok(snapshot),
        Err(err) if err.is_transient_io() => {
            warn!("event=store_read module=store status=fallback reason=transient_io error={err}");
            Ok(HighScoreSnapshot::default())
        }
        Err(err) => {
            error!("event=store_read module=store status=error error={err}");
            Err(err.into())
        }
    }
}
