#![allow(dead_code)]

use rusqlite::ffi;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use unscramble_core::db::DbError;
use unscramble_core::{
    HighScoreRecord, HighScoreRepository, HighScoreSnapshot, RepoError, RepoResult,
};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailure {
    TransientIo,
    Corrupt,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub snapshot: HighScoreSnapshot,
    pub saves: Vec<u32>,
    pub clears: usize,
    pub loads: usize,
    pub fail_loads: Option<LoadFailure>,
    pub fail_saves: bool,
    /// Served by `load` ahead of `snapshot`, oldest first.
    pub queued_loads: VecDeque<HighScoreSnapshot>,
}

/// In-memory repository whose state the test keeps a handle to.
#[derive(Clone, Default)]
pub struct FakeRepository {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeRepository {
    pub fn with_high_score(points: u32) -> Self {
        let repo = Self::default();
        {
            let mut state = repo.state.lock().unwrap();
            state.snapshot = HighScoreSnapshot {
                revision: 1,
                record: HighScoreRecord {
                    points,
                    achieved_at: "2024-02-10T09:15:00".to_string(),
                },
            };
        }
        repo
    }

    pub fn saves(&self) -> Vec<u32> {
        self.state.lock().unwrap().saves.clone()
    }

    pub fn fail_loads(&self, failure: Option<LoadFailure>) {
        self.state.lock().unwrap().fail_loads = failure;
    }

    pub fn fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }

    pub fn loads(&self) -> usize {
        self.state.lock().unwrap().loads
    }

    pub fn queue_load(&self, snapshot: HighScoreSnapshot) {
        self.state.lock().unwrap().queued_loads.push_back(snapshot);
    }

    pub fn queued_loads(&self) -> usize {
        self.state.lock().unwrap().queued_loads.len()
    }
}

pub fn sqlite_failure(code: i32) -> RepoError {
    RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
        ffi::Error::new(code),
        None,
    )))
}

impl HighScoreRepository for FakeRepository {
    fn store_name(&self) -> &str {
        "fake_store"
    }

    fn load(&self) -> RepoResult<HighScoreSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.loads += 1;
        match state.fail_loads {
            Some(LoadFailure::TransientIo) => Err(sqlite_failure(ffi::SQLITE_IOERR)),
            Some(LoadFailure::Corrupt) => Err(sqlite_failure(ffi::SQLITE_CORRUPT)),
            None => match state.queued_loads.pop_front() {
                Some(queued) => Ok(queued),
                None => Ok(state.snapshot.clone()),
            },
        }
    }

    fn save(&mut self, record: &HighScoreRecord) -> RepoResult<u64> {
        let mut state = self.state.lock().unwrap();
        if state.fail_saves {
            return Err(sqlite_failure(ffi::SQLITE_FULL));
        }
        state.saves.push(record.points);
        state.snapshot = HighScoreSnapshot {
            revision: state.snapshot.revision + 1,
            record: record.clone(),
        };
        Ok(state.snapshot.revision)
    }

    fn clear(&mut self) -> RepoResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.clears += 1;
        state.snapshot = HighScoreSnapshot {
            revision: state.snapshot.revision + 1,
            record: HighScoreRecord::default(),
        };
        Ok(state.snapshot.revision)
    }
}
