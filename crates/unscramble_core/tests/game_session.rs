mod common;

use common::{FakeRepository, LoadFailure, WAIT};
use std::time::Duration;
use tokio::time::timeout;
use unscramble_core::{
    GameSessionController, HighScoreRecord, HighScoreRepository, HighScoreSnapshot,
    HighScoreStore, ScoreClassification, SessionError, SessionState,
};

fn controller_for(repo: &FakeRepository) -> GameSessionController<FakeRepository> {
    GameSessionController::new(HighScoreStore::from_repository(repo.clone()))
}

async fn wait_for_held<R: HighScoreRepository>(session: &GameSessionController<R>, points: u32) {
    timeout(WAIT, async {
        while session.held_high_score().map(|r| r.points) != Some(points) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

async fn wait_for_write<R: HighScoreRepository>(session: &GameSessionController<R>) {
    timeout(WAIT, async {
        while session.has_pending_write() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn lower_score_is_not_a_new_high_score_and_writes_nothing() {
    let repo = FakeRepository::with_high_score(120);
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(80).unwrap();

    let outcome = timeout(WAIT, session.finish()).await.unwrap().unwrap();
    assert_eq!(outcome.classification, ScoreClassification::NoNewHighScore);
    assert_eq!(outcome.final_score, 80);
    assert_eq!(outcome.previous.points, 120);
    assert_eq!(outcome.previous.achieved_at, "2024-02-10T09:15:00");

    assert_eq!(session.close().await.unwrap(), None);
    assert!(repo.saves().is_empty());
}

#[tokio::test]
async fn equal_score_is_not_a_new_high_score() {
    let repo = FakeRepository::with_high_score(120);
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(120).unwrap();

    let outcome = session.finish().await.unwrap();
    assert!(!outcome.is_new_high_score());
    session.close().await.unwrap();
    assert!(repo.saves().is_empty());
}

#[tokio::test]
async fn higher_score_issues_exactly_one_write() {
    let repo = FakeRepository::with_high_score(120);
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(100).unwrap();
    session.add_points(50).unwrap();

    let outcome = session.finish().await.unwrap();
    assert_eq!(outcome.classification, ScoreClassification::NewHighScore);
    assert_eq!(outcome.final_score, 150);
    assert_eq!(outcome.previous.points, 120);

    let revision = session.close().await.unwrap();
    assert_eq!(revision, Some(2));
    assert_eq!(repo.saves(), vec![150]);
}

#[tokio::test]
async fn first_session_on_empty_store_sets_high_score() {
    let store = HighScoreStore::open_in_memory("unscramble_datastore").unwrap();
    let mut session = GameSessionController::new(store.clone());
    session.start().unwrap();
    session.add_points(20).unwrap();

    let outcome = session.finish().await.unwrap();
    assert!(outcome.is_new_high_score());
    assert_eq!(outcome.previous, HighScoreRecord::default());

    session.close().await.unwrap();
    let record = store.current().await.unwrap().record;
    assert_eq!(record.points, 20);
    assert!(!record.achieved_at.is_empty());
}

#[tokio::test]
async fn zero_score_on_empty_store_writes_nothing() {
    let repo = FakeRepository::default();
    let mut session = controller_for(&repo);
    session.start().unwrap();

    let outcome = session.finish().await.unwrap();
    assert!(!outcome.is_new_high_score());
    session.close().await.unwrap();
    assert!(repo.saves().is_empty());
}

#[tokio::test]
async fn later_round_does_not_overwrite_with_lower_score() {
    let repo = FakeRepository::with_high_score(120);
    let mut session = controller_for(&repo);
    session.start().unwrap();

    session.add_points(150).unwrap();
    assert!(session.finish().await.unwrap().is_new_high_score());

    session.play_again().unwrap();
    assert_eq!(session.score(), 0);
    session.add_points(130).unwrap();
    assert!(!session.finish().await.unwrap().is_new_high_score());

    session.play_again().unwrap();
    session.add_points(200).unwrap();
    assert!(session.finish().await.unwrap().is_new_high_score());

    session.close().await.unwrap();
    assert_eq!(repo.saves(), vec![150, 200]);
}

#[tokio::test]
async fn held_high_score_follows_committed_writes() {
    let store = HighScoreStore::open_in_memory("unscramble_datastore").unwrap();
    let mut session = GameSessionController::new(store.clone());
    session.start().unwrap();

    store.write(70).await.unwrap();
    wait_for_held(&session, 70).await;

    let message = session.challenge_message().unwrap();
    assert!(message.starts_with("Beat the high score of 70"));
}

#[tokio::test]
async fn transient_read_failure_degrades_to_no_high_score() {
    let repo = FakeRepository::with_high_score(120);
    repo.fail_loads(Some(LoadFailure::TransientIo));
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(10).unwrap();

    let outcome = session.finish().await.unwrap();
    assert_eq!(outcome.previous, HighScoreRecord::default());
    assert!(outcome.is_new_high_score());
}

#[tokio::test]
async fn non_transient_read_failure_surfaces_from_finish() {
    let repo = FakeRepository::with_high_score(120);
    repo.fail_loads(Some(LoadFailure::Corrupt));
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(500).unwrap();

    let err = timeout(WAIT, session.finish()).await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));
    assert_eq!(session.state(), SessionState::Tracking);
    drop(session);
    assert!(repo.saves().is_empty());
}

#[tokio::test]
async fn write_failure_is_reported_only_on_close() {
    let repo = FakeRepository::with_high_score(120);
    repo.fail_saves(true);
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(150).unwrap();

    let outcome = session.finish().await.unwrap();
    assert!(outcome.is_new_high_score());

    let err = session.close().await.unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));
}

#[tokio::test]
async fn dropping_session_keeps_pending_write_running() {
    let store = HighScoreStore::open_in_memory("unscramble_datastore").unwrap();
    let mut session = GameSessionController::new(store.clone());
    session.start().unwrap();
    session.add_points(90).unwrap();
    assert!(session.finish().await.unwrap().is_new_high_score());
    drop(session);

    timeout(WAIT, async {
        while store.current().await.unwrap().record.points != 90 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn closing_session_releases_subscription() {
    let store = HighScoreStore::open_in_memory("unscramble_datastore").unwrap();
    let mut session = GameSessionController::new(store.clone());
    session.start().unwrap();
    assert_eq!(store.observer_count(), 1);

    session.close().await.unwrap();
    timeout(WAIT, async {
        while store.observer_count() != 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn reset_clears_store_after_pending_write() {
    let repo = FakeRepository::with_high_score(120);
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(150).unwrap();
    session.finish().await.unwrap();

    session.reset_high_score().await.unwrap();
    assert_eq!(repo.saves(), vec![150]);
    assert_eq!(repo.state.lock().unwrap().clears, 1);
    assert!(!session.has_pending_write());
    assert_eq!(session.close().await.unwrap(), None);
}

#[tokio::test]
async fn operations_out_of_order_are_rejected() {
    let repo = FakeRepository::default();
    let mut session = controller_for(&repo);

    assert!(matches!(
        session.finish().await,
        Err(SessionError::InvalidState {
            state: SessionState::Idle,
            ..
        })
    ));
    assert!(session.add_points(10).is_err());
    assert!(session.play_again().is_err());

    session.start().unwrap();
    assert!(matches!(
        session.start(),
        Err(SessionError::InvalidState {
            state: SessionState::Tracking,
            ..
        })
    ));

    session.finish().await.unwrap();
    assert!(session.finish().await.is_err());
    assert_eq!(session.state(), SessionState::Finished);
}

#[tokio::test]
async fn external_clear_lowers_the_bar_for_the_next_round() {
    let store = HighScoreStore::open_in_memory("unscramble_datastore").unwrap();
    let mut session = GameSessionController::new(store.clone());
    session.start().unwrap();
    session.add_points(150).unwrap();
    assert!(session.finish().await.unwrap().is_new_high_score());
    wait_for_write(&session).await;
    wait_for_held(&session, 150).await;

    store.clear().await.unwrap();
    wait_for_held(&session, 0).await;

    session.play_again().unwrap();
    session.add_points(100).unwrap();
    let outcome = session.finish().await.unwrap();
    assert_eq!(outcome.classification, ScoreClassification::NewHighScore);
    assert_eq!(outcome.previous, HighScoreRecord::default());

    session.close().await.unwrap();
    assert_eq!(store.current().await.unwrap().record.points, 100);
}

#[tokio::test]
async fn failed_write_does_not_raise_the_bar_for_the_next_round() {
    let repo = FakeRepository::with_high_score(120);
    repo.fail_saves(true);
    let mut session = controller_for(&repo);
    session.start().unwrap();
    session.add_points(150).unwrap();
    assert!(session.finish().await.unwrap().is_new_high_score());
    wait_for_write(&session).await;
    repo.fail_saves(false);

    session.play_again().unwrap();
    session.add_points(130).unwrap();
    let outcome = session.finish().await.unwrap();
    assert_eq!(outcome.classification, ScoreClassification::NewHighScore);
    assert_eq!(outcome.previous.points, 120);

    assert_eq!(session.close().await.unwrap(), Some(2));
    assert_eq!(repo.saves(), vec![130]);
}

#[tokio::test]
async fn older_snapshot_arriving_late_is_ignored() {
    let repo = FakeRepository::with_high_score(120);
    let store = HighScoreStore::from_repository(repo.clone());
    let mut session = GameSessionController::new(store.clone());
    session.start().unwrap();
    wait_for_held(&session, 120).await;

    store.write(150).await.unwrap();
    wait_for_held(&session, 150).await;

    repo.queue_load(HighScoreSnapshot {
        revision: 1,
        record: HighScoreRecord {
            points: 120,
            achieved_at: "2024-02-10T09:15:00".to_string(),
        },
    });
    store.write(160).await.unwrap();
    timeout(WAIT, async {
        while repo.queued_loads() != 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.held_high_score().map(|r| r.points), Some(150));
    session.add_points(140).unwrap();
    let outcome = session.finish().await.unwrap();
    assert_eq!(outcome.classification, ScoreClassification::NoNewHighScore);
    assert_eq!(outcome.previous.points, 150);
    assert_eq!(session.close().await.unwrap(), None);
    assert_eq!(repo.saves(), vec![150, 160]);
}
