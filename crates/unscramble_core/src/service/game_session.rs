//! Game session controller.
//!
//! # Responsibility
//! - Track the persisted high score for the duration of one session.
//! - Decide whether a finished round persists a new high score.
//! - Report the comparison outcome without waiting for the write.
//!
//! # Invariants
//! - Held snapshots only move to newer store revisions.
//! - A finished round issues at most one write, and only for a score above
//!   the held high score and above this session's own unconfirmed write.
//! - Writes issued by one session commit in issue order.
//! - Dropping the controller stops tracking but never cancels a write.

use crate::model::high_score::{HighScoreRecord, HighScoreSnapshot};
use crate::repo::high_score_repo::{HighScoreRepository, SqliteHighScoreRepository};
use crate::store::{HighScoreStore, PendingWrite, StoreError, StoreResult};
use futures_util::StreamExt;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Tracking,
    Finished,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Tracking => "tracking",
            Self::Finished => "finished",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum SessionError {
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// The observe stream failed, or a write/clear was rejected.
    Store(Arc<StoreError>),
    /// Tracking ended before any high score was observed.
    SubscriptionClosed,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while session is {state}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::SubscriptionClosed => write!(f, "high score subscription closed"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        Self::Store(Arc::new(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreClassification {
    NewHighScore,
    NoNewHighScore,
}

/// What the result screen shows after a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub final_score: u32,
    /// High score held before this round, for display.
    pub previous: HighScoreRecord,
    pub classification: ScoreClassification,
}

impl SessionOutcome {
    pub fn is_new_high_score(&self) -> bool {
        self.classification == ScoreClassification::NewHighScore
    }
}

/// Write issued by this session that the held snapshot may not show yet.
#[derive(Debug, Clone, Copy)]
struct IssuedWrite {
    points: u32,
    /// Committed revision, once the write resolved successfully.
    revision: Option<u64>,
}

#[derive(Debug, Clone)]
enum Tracked {
    Pending,
    Ready(HighScoreSnapshot),
    Failed(Arc<StoreError>),
}

/// Per-session bridge between gameplay and the high-score store.
pub struct GameSessionController<R: HighScoreRepository = SqliteHighScoreRepository> {
    session_id: Uuid,
    store: HighScoreStore<R>,
    state: SessionState,
    score: u32,
    issued: Option<IssuedWrite>,
    /// Outcome of a write that resolved before `close`.
    settled: Option<SessionResult<u64>>,
    held: Option<watch::Receiver<Tracked>>,
    tracker: Option<JoinHandle<()>>,
    pending_write: Option<PendingWrite>,
}

impl<R: HighScoreRepository> GameSessionController<R> {
    /// Creates an idle controller bound to `store`.
    pub fn new(store: HighScoreStore<R>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            store,
            state: SessionState::Idle,
            score: 0,
            issued: None,
            settled: None,
            held: None,
            tracker: None,
            pending_write: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    /// Subscribes to the store and enters `Tracking`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&mut self) -> SessionResult<()> {
        self.expect_state("start", SessionState::Idle)?;

        let (held_tx, held_rx) = watch::channel(Tracked::Pending);
        let mut stream = self.store.observe();
        let session_id = self.session_id;
        self.tracker = Some(tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(snapshot) => {
                        held_tx.send_if_modified(|held| accept_snapshot(held, snapshot));
                    }
                    Err(err) => {
                        warn!(
                            "event=session_tracking module=service status=error session={session_id} error={err}"
                        );
                        held_tx.send_replace(Tracked::Failed(Arc::new(err)));
                        break;
                    }
                }
                if held_tx.is_closed() {
                    break;
                }
            }
        }));
        self.held = Some(held_rx);
        self.state = SessionState::Tracking;

        info!(
            "event=session_start module=service status=ok session={} store={}",
            self.session_id,
            self.store.store_name()
        );
        Ok(())
    }

    /// Adds `points` to the running score, saturating at `u32::MAX`.
    pub fn add_points(&mut self, points: u32) -> SessionResult<u32> {
        self.expect_state("add points", SessionState::Tracking)?;
        self.score = self.score.saturating_add(points);
        Ok(self.score)
    }

    /// Latest accepted high score, if one has been observed.
    pub fn held_high_score(&self) -> Option<HighScoreRecord> {
        match self.held.as_ref().map(|held| held.borrow().clone()) {
            Some(Tracked::Ready(snapshot)) => Some(snapshot.record),
            _ => None,
        }
    }

    /// Challenge line for the game screen, once a high score is known.
    pub fn challenge_message(&self) -> Option<String> {
        self.held_high_score()
            .map(|record| record.challenge_message())
    }

    /// Ends the round and classifies its score.
    ///
    /// Waits for the first observed high score if none arrived yet. A higher
    /// score starts a background write that is not awaited here.
    ///
    /// # Errors
    /// - `InvalidState` outside `Tracking`.
    /// - `Store` when observing the high score failed.
    pub async fn finish(&mut self) -> SessionResult<SessionOutcome> {
        self.expect_state("finish", SessionState::Tracking)?;

        let held = self.held.as_mut().ok_or(SessionError::SubscriptionClosed)?;
        let tracked = held
            .wait_for(|tracked| !matches!(tracked, Tracked::Pending))
            .await
            .map_err(|_| SessionError::SubscriptionClosed)?
            .clone();
        let (held_revision, previous) = match tracked {
            Tracked::Ready(snapshot) => (snapshot.revision, snapshot.record),
            Tracked::Failed(err) => return Err(SessionError::Store(err)),
            Tracked::Pending => return Err(SessionError::SubscriptionClosed),
        };

        self.settle_finished_write().await;
        let final_score = self.score;
        let best_known = previous.points.max(self.write_floor(held_revision));
        let classification = if final_score > best_known {
            self.issue_write(final_score);
            ScoreClassification::NewHighScore
        } else {
            ScoreClassification::NoNewHighScore
        };
        self.state = SessionState::Finished;

        info!(
            "event=session_finish module=service status=ok session={} score={} previous={} new_high_score={}",
            self.session_id,
            final_score,
            previous.points,
            classification == ScoreClassification::NewHighScore
        );
        Ok(SessionOutcome {
            final_score,
            previous,
            classification,
        })
    }

    /// Starts another round in the same session with a zero score.
    pub fn play_again(&mut self) -> SessionResult<()> {
        self.expect_state("play again", SessionState::Finished)?;
        self.score = 0;
        self.state = SessionState::Tracking;
        Ok(())
    }

    /// Resets the persisted high score.
    ///
    /// Any write this session still has in flight is awaited first, so it
    /// cannot land after the reset.
    pub async fn reset_high_score(&mut self) -> SessionResult<u64> {
        if let Some(pending) = self.pending_write.take() {
            log_superseded_write(self.session_id, pending.await);
        }
        self.issued = None;
        self.settled = None;
        Ok(self.store.clear().await?)
    }

    /// Whether a background write is still unresolved.
    pub fn has_pending_write(&self) -> bool {
        self.pending_write
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }

    /// Ends the session, waiting for the last write to commit.
    ///
    /// Returns the committed revision of the latest write, or `None` when
    /// this session wrote nothing.
    pub async fn close(mut self) -> SessionResult<Option<u64>> {
        self.stop_tracking();
        let result = match (self.pending_write.take(), self.settled.take()) {
            (Some(pending), _) => resolve_write(pending.await).map(Some),
            (None, Some(settled)) => settled.map(Some),
            (None, None) => Ok(None),
        };
        info!(
            "event=session_close module=service status={} session={}",
            if result.is_ok() { "ok" } else { "error" },
            self.session_id
        );
        result
    }

    /// Collects the result of a background write that already finished.
    async fn settle_finished_write(&mut self) {
        if !self
            .pending_write
            .as_ref()
            .is_some_and(|pending| pending.is_finished())
        {
            return;
        }
        let Some(pending) = self.pending_write.take() else {
            return;
        };

        let result = resolve_write(pending.await);
        match &result {
            Ok(revision) => {
                if let Some(issued) = self.issued.as_mut() {
                    issued.revision = Some(*revision);
                }
            }
            Err(err) => {
                warn!(
                    "event=session_write module=service status=error session={} error={err}",
                    self.session_id
                );
                self.issued = None;
            }
        }
        self.settled = Some(result);
    }

    /// Score a new round must beat on top of the held high score.
    ///
    /// Non-zero only while this session's write is unresolved, or committed
    /// at a revision the held snapshot has not reached yet.
    fn write_floor(&mut self, held_revision: u64) -> u32 {
        match self.issued {
            None => 0,
            Some(IssuedWrite {
                revision: Some(committed),
                ..
            }) if held_revision >= committed => {
                self.issued = None;
                0
            }
            Some(issued) => issued.points,
        }
    }

    fn issue_write(&mut self, points: u32) {
        self.issued = Some(IssuedWrite {
            points,
            revision: None,
        });
        self.settled = None;
        let next = match self.pending_write.take() {
            None => self.store.spawn_write(points),
            Some(previous) => {
                let store = self.store.clone();
                let session_id = self.session_id;
                tokio::spawn(async move {
                    log_superseded_write(session_id, previous.await);
                    store.write(points).await
                })
            }
        };
        self.pending_write = Some(next);
    }

    fn stop_tracking(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.abort();
        }
        self.held = None;
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> SessionResult<()> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}

impl<R: HighScoreRepository> Drop for GameSessionController<R> {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

fn accept_snapshot(held: &mut Tracked, snapshot: HighScoreSnapshot) -> bool {
    match held {
        Tracked::Ready(current) if current.revision >= snapshot.revision => false,
        Tracked::Failed(_) => false,
        _ => {
            *held = Tracked::Ready(snapshot);
            true
        }
    }
}

fn resolve_write(result: Result<StoreResult<u64>, JoinError>) -> SessionResult<u64> {
    match result {
        Ok(Ok(revision)) => Ok(revision),
        Ok(Err(err)) => Err(SessionError::from(err)),
        Err(err) => Err(SessionError::from(StoreError::Worker(err))),
    }
}

fn log_superseded_write(session_id: Uuid, result: Result<StoreResult<u64>, JoinError>) {
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(
            "event=session_write module=service status=error session={session_id} error={err}"
        ),
        Err(err) => warn!(
            "event=session_write module=service status=error error_code=worker_failed session={session_id} error={err}"
        ),
    }
}
