//! One-shot import of the legacy per-activity high score.
//!
//! Older builds kept the score in activity-scoped shared preferences, with
//! `-1` meaning "never set" and the timestamp under a differently named key.
//! The import copies that value into the refined store once and deletes the
//! legacy keys.

use crate::model::high_score::HighScoreRecord;
use crate::repo::high_score_repo::{
    bump_revision, delete_keys, normalize_store_name, read_int, read_text, upsert_int,
    upsert_text, HighScoreRepository, RepoResult, SqliteHighScoreRepository,
    HIGH_SCORE_DATETIME_KEY, HIGH_SCORE_VALUE_KEY,
};
use log::{info, warn};

pub const LEGACY_VALUE_KEY: &str = "saved_high_score_value";
pub const LEGACY_DATE_KEY: &str = "saved_high_score_date";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyImport {
    /// Legacy store held no usable score.
    NothingToImport,
    /// Refined store already had a value; the legacy one was dropped.
    KeptExisting,
    Imported(HighScoreRecord),
}

impl SqliteHighScoreRepository {
    /// Moves a legacy high score from `legacy_store` into this store.
    ///
    /// # Contract
    /// - Runs in one transaction; on error nothing changes.
    /// - Imports only when the legacy value is > 0 and this store is unset.
    /// - Legacy keys are deleted in every successful outcome, so a second call
    ///   returns `NothingToImport`.
    /// - An unparseable legacy timestamp is replaced by the import time.
    pub fn import_legacy(&mut self, legacy_store: &str) -> RepoResult<LegacyImport> {
        let legacy_store = normalize_store_name(legacy_store)?;
        let store_name = self.store_name().to_string();
        if legacy_store == store_name {
            return Ok(LegacyImport::NothingToImport);
        }

        let tx = self.connection_mut().transaction()?;
        let legacy_points = read_int(&tx, &legacy_store, LEGACY_VALUE_KEY)?;
        let legacy_date = read_text(&tx, &legacy_store, LEGACY_DATE_KEY)?;
        let existing = read_int(&tx, &store_name, HIGH_SCORE_VALUE_KEY)?;

        let points = legacy_points
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0);

        let outcome = match (points, existing) {
            (None, _) => LegacyImport::NothingToImport,
            (Some(_), Some(current)) if current > 0 => LegacyImport::KeptExisting,
            (Some(points), _) => {
                let mut record = HighScoreRecord {
                    points,
                    achieved_at: legacy_date.unwrap_or_default(),
                };
                if record.validate().is_err() {
                    warn!(
                        "event=legacy_import module=repo status=restamp reason=bad_timestamp store={store_name}"
                    );
                    record = HighScoreRecord::achieved_now(points);
                }
                upsert_int(&tx, &store_name, HIGH_SCORE_VALUE_KEY, i64::from(record.points))?;
                upsert_text(&tx, &store_name, HIGH_SCORE_DATETIME_KEY, &record.achieved_at)?;
                bump_revision(&tx, &store_name)?;
                LegacyImport::Imported(record)
            }
        };

        delete_keys(&tx, &legacy_store, &[LEGACY_VALUE_KEY, LEGACY_DATE_KEY])?;
        tx.commit()?;

        match &outcome {
            LegacyImport::Imported(record) => info!(
                "event=legacy_import module=repo status=ok outcome=imported points={} store={store_name}",
                record.points
            ),
            LegacyImport::KeptExisting => info!(
                "event=legacy_import module=repo status=ok outcome=kept_existing store={store_name}"
            ),
            LegacyImport::NothingToImport => {}
        }
        Ok(outcome)
    }
}
