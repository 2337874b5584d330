//! Observe stream over the high-score store.

use super::{read_snapshot, Inner, StoreResult};
use crate::model::high_score::HighScoreSnapshot;
use crate::repo::high_score_repo::HighScoreRepository;
use futures_util::future;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::wrappers::WatchStream;

/// Lazy, unbounded sequence of high-score snapshots.
///
/// The first item replays the currently persisted record. Later items are
/// fresh reads taken after committed changes; bursts of commits may collapse
/// into one item carrying the latest value. The stream only ends after it
/// yielded a non-transient read error.
pub struct HighScoreStream {
    snapshots: BoxStream<'static, StoreResult<HighScoreSnapshot>>,
}

impl HighScoreStream {
    pub(super) fn new<R: HighScoreRepository>(inner: Arc<Inner<R>>) -> Self {
        // WatchStream yields the current revision on first poll, then once
        // per observed change. Each tick triggers a fresh read.
        let snapshots = WatchStream::new(inner.changes.subscribe())
            .then(move |_revision| read_snapshot(Arc::clone(&inner)))
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .fuse()
            .boxed();
        Self { snapshots }
    }
}

impl Stream for HighScoreStream {
    type Item = StoreResult<HighScoreSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.snapshots.poll_next_unpin(cx)
    }
}
