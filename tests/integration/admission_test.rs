//! Integration tests for the admission API.

mod helpers;

use chrono::TimeDelta;
use futures::future::join_all;

use waitline_core::config::AppConfig;
use waitline_core::{ClientAction, ErrorKind};
use waitline_entity::{EnterStatus, QueueStatus};
use waitline_service::StatusPoll;
use waitline_store::QueueStore;

use helpers::{TestApp, concert, user};

#[tokio::test]
async fn test_concurrent_enters_create_one_wait_entry() {
    let app = TestApp::new(2);
    let c = concert("c1");
    app.enter_all(&c, &["first"]).await;

    let dup = user("dup");
    let results = join_all((0..25).map(|_| app.admission.enter(&c, &dup))).await;

    let positions: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().position)
        .collect();
    assert!(positions.iter().all(|p| *p == Some(2)));
    assert_eq!(app.store.wait_size(&c).await.unwrap(), 2);

    let again = app.admission.enter(&c, &user("dup")).await.unwrap();
    assert_eq!(again.status, EnterStatus::AlreadyWaiting);
    assert_eq!(again.position, Some(2));
}

#[tokio::test]
async fn test_arrival_order_is_preserved() {
    let app = TestApp::new(2);
    let c = concert("c1");
    // arrival order runs against name order, so ties cannot explain the ranks
    let arrivals = ["zed", "yan", "xia", "wes"];
    app.enter_all(&c, &arrivals).await;

    // re-entering never moves anyone
    app.admission.enter(&c, &user("zed")).await.unwrap();
    app.admission.enter(&c, &user("xia")).await.unwrap();

    for (i, id) in arrivals.iter().enumerate() {
        let view = app.admission.status(&c, &user(id)).await.unwrap();
        assert_eq!(view.status, QueueStatus::Waiting);
        assert_eq!(view.position, Some(i as u64 + 1));
    }

    app.scheduler.run_promotion_cycle().await;
    for id in ["zed", "yan"] {
        let view = app.admission.status(&c, &user(id)).await.unwrap();
        assert_eq!(view.status, QueueStatus::Ready);
    }
    let xia = app.admission.status(&c, &user("xia")).await.unwrap();
    let wes = app.admission.status(&c, &user("wes")).await.unwrap();
    assert_eq!(xia.position, Some(1));
    assert_eq!(wes.position, Some(2));
}

#[tokio::test]
async fn test_two_user_capacity_walkthrough() {
    let app = TestApp::new(2);
    let c = concert("c1");
    app.enter_all(&c, &["A", "B", "C"]).await;

    for (rank, id) in ["A", "B", "C"].iter().enumerate() {
        assert_eq!(
            app.store.wait_rank(&c, &user(id)).await.unwrap(),
            Some(rank as u64)
        );
    }

    let report = app.scheduler.run_promotion_cycle().await;
    assert_eq!(report.affected, 2);
    for id in ["A", "B"] {
        let view = app.admission.status(&c, &user(id)).await.unwrap();
        assert_eq!(view.status, QueueStatus::Ready);
    }
    assert_eq!(app.store.wait_rank(&c, &user("C")).await.unwrap(), Some(0));

    let err = app
        .admission
        .validate(&c, &user("A"), "not-the-token")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenInvalid);
    assert_eq!(err.client_action(), ClientAction::ReEnterQueue);

    let activated = app.admission.activate(&c, &user("A")).await.unwrap();
    assert_eq!(activated.status, QueueStatus::Active);

    app.admission.extend(&c, &user("A")).await.unwrap();
    let second = app.admission.extend(&c, &user("A")).await.unwrap();
    assert_eq!(second.extend_count, 2);

    let err = app.admission.extend(&c, &user("A")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExtensionLimitExceeded);
    assert_eq!(err.client_action(), ClientAction::Abort);

    let token = app.token_of(&c, &user("A")).await.unwrap();
    let lease = app.admission.validate(&c, &user("A"), &token).await.unwrap();
    assert_eq!(lease.extend_count, 2);
}

#[tokio::test]
async fn test_activation_is_idempotent() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A"]).await;
    app.scheduler.run_promotion_cycle().await;

    let first = app.admission.activate(&c, &user("A")).await.unwrap();
    app.clock.advance(TimeDelta::seconds(30));
    let second = app.admission.activate(&c, &user("A")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.extend_count, 0);
    assert_eq!(app.store.active_size(&c).await.unwrap(), 1);
}

#[tokio::test]
async fn test_extension_cap_holds_after_time_passes() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A"]).await;
    app.scheduler.run_promotion_cycle().await;
    app.admission.activate(&c, &user("A")).await.unwrap();

    for _ in 0..2 {
        app.clock.advance(TimeDelta::seconds(500));
        app.admission.extend(&c, &user("A")).await.unwrap();
    }
    app.clock.advance(TimeDelta::seconds(500));
    let err = app.admission.extend(&c, &user("A")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExtensionLimitExceeded);
}

#[tokio::test]
async fn test_expired_lease_reports_expired_then_requeues() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A"]).await;
    app.scheduler.run_promotion_cycle().await;
    let token = app.token_of(&c, &user("A")).await.unwrap();

    app.clock.advance(TimeDelta::seconds(301));
    let view = app.admission.status(&c, &user("A")).await.unwrap();
    assert_eq!(view.status, QueueStatus::Expired);
    assert_eq!(view.token, None);

    let err = app.admission.validate(&c, &user("A"), &token).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenExpired);

    // entering again drops the stale lease and queues a fresh wait entry
    let position = app.admission.enter(&c, &user("A")).await.unwrap();
    assert_eq!(position.status, EnterStatus::New);
    assert_eq!(position.position, Some(1));
    assert_eq!(app.store.active_size(&c).await.unwrap(), 0);
}

#[tokio::test]
async fn test_enter_while_admitted_returns_lease() {
    let mut config = AppConfig::default();
    config.queue.active_max_size = 1;
    config.queue.total_waiting_cache_ttl_ms = 0;
    let app = TestApp::with_config(config);
    let c = concert("c1");
    app.enter_all(&c, &["A", "B"]).await;
    app.scheduler.run_promotion_cycle().await;

    let position = app.admission.enter(&c, &user("A")).await.unwrap();
    assert_eq!(position.status, EnterStatus::AlreadyAdmitted);
    assert_eq!(position.total_waiting, 1);
    let lease = position.lease.unwrap();
    assert_eq!(lease.status, QueueStatus::Ready);
    assert_eq!(lease.token, app.token_of(&c, &user("A")).await);
}

#[tokio::test]
async fn test_status_polling_is_rate_limited_per_user() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A", "B"]).await;

    for _ in 0..10 {
        let poll = app.admission.poll_status(&c, &user("A")).await.unwrap();
        assert!(matches!(poll, StatusPoll::Status { .. }));
    }
    let poll = app.admission.poll_status(&c, &user("A")).await.unwrap();
    assert_eq!(
        poll,
        StatusPoll::Throttled {
            retry_after_seconds: 1
        }
    );

    // another user has their own bucket
    let poll = app.admission.poll_status(&c, &user("B")).await.unwrap();
    assert!(matches!(poll, StatusPoll::Status { .. }));

    app.clock.advance(TimeDelta::seconds(1));
    let mut allowed = 0;
    for _ in 0..10 {
        if matches!(
            app.admission.poll_status(&c, &user("A")).await.unwrap(),
            StatusPoll::Status { .. }
        ) {
            allowed += 1;
        }
    }
    assert!(allowed >= 5);
}

#[tokio::test]
async fn test_poll_hint_is_fast_near_the_head() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A"]).await;

    match app.admission.poll_status(&c, &user("A")).await.unwrap() {
        StatusPoll::Status {
            token,
            next_poll_after_ms,
        } => {
            assert_eq!(token.status, QueueStatus::Waiting);
            assert_eq!(next_poll_after_ms, app.config.polling.fast_interval_ms);
        }
        other => panic!("unexpected poll result: {other:?}"),
    }
}

#[tokio::test]
async fn test_remove_frees_capacity() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A", "B"]).await;
    app.scheduler.run_promotion_cycle().await;

    let report = app.admission.remove(&c, &user("A")).await.unwrap();
    assert!(report.lease_removed);

    let err = app.admission.activate(&c, &user("A")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenNotFound);

    app.scheduler.run_promotion_cycle().await;
    let view = app.admission.status(&c, &user("B")).await.unwrap();
    assert_eq!(view.status, QueueStatus::Ready);
}

#[tokio::test]
async fn test_tenants_are_independent() {
    let app = TestApp::new(1);
    let (c1, c2) = (concert("c1"), concert("c2"));
    app.enter_all(&c1, &["A", "B"]).await;
    app.enter_all(&c2, &["A"]).await;
    app.scheduler.run_promotion_cycle().await;

    assert_eq!(
        app.admission.status(&c1, &user("A")).await.unwrap().status,
        QueueStatus::Ready
    );
    assert_eq!(
        app.admission.status(&c2, &user("A")).await.unwrap().status,
        QueueStatus::Ready
    );
    let t1 = app.token_of(&c1, &user("A")).await.unwrap();
    let err = app.admission.validate(&c2, &user("A"), &t1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenInvalid);
}
