//! Integration tests for the background scheduler passes.

mod helpers;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use futures::future::join_all;

use waitline_core::types::SharedClock;
use waitline_entity::QueueStatus;
use waitline_guard::lock::MemoryLock;
use waitline_store::QueueStore;
use waitline_worker::QueueScheduler;

use helpers::{TestApp, concert, user};

const CROWD: [&str; 12] = [
    "u00", "u01", "u02", "u03", "u04", "u05", "u06", "u07", "u08", "u09", "u10", "u11",
];

#[tokio::test]
async fn test_concurrent_promotions_never_exceed_capacity() {
    let app = TestApp::new(5);
    let c = concert("c1");
    app.enter_all(&c, &CROWD).await;

    // noop lock: nothing serializes these passes except the store itself
    join_all((0..8).map(|_| app.scheduler.run_promotion_cycle())).await;
    assert_eq!(app.store.active_size(&c).await.unwrap(), 5);

    let now = app.now();
    let expires_at = now + TimeDelta::seconds(300);
    let moved = join_all(
        (0..8).map(|_| app.store.migrate_wait_to_active(&c, 5, 5, expires_at, now)),
    )
    .await;
    assert!(moved.iter().all(|m| m.as_ref().unwrap().is_empty()));
    assert_eq!(app.store.active_size(&c).await.unwrap(), 5);
}

#[tokio::test]
async fn test_promoted_users_are_distinct() {
    let app = TestApp::new(6);
    let c = concert("c1");
    app.enter_all(&c, &CROWD).await;
    join_all((0..4).map(|_| app.scheduler.run_promotion_cycle())).await;

    let mut tokens = HashSet::new();
    let mut admitted = 0;
    for id in CROWD {
        if let Some(token) = app.token_of(&c, &user(id)).await {
            admitted += 1;
            assert!(tokens.insert(token), "token issued twice");
        }
    }
    assert_eq!(admitted, 6);
}

#[tokio::test]
async fn test_every_user_is_waiting_or_leased_never_both() {
    let app = TestApp::new(4);
    let c = concert("c1");
    app.enter_all(&c, &CROWD).await;
    app.scheduler.run_promotion_cycle().await;

    for id in CROWD {
        let waiting = app.store.wait_rank(&c, &user(id)).await.unwrap().is_some();
        let leased = app.store.get_lease(&c, &user(id)).await.unwrap().is_some();
        assert!(waiting ^ leased, "{id}: waiting={waiting} leased={leased}");
        assert_eq!(leased, app.store.in_active_set(&c, &user(id)).await);
    }
}

#[tokio::test]
async fn test_cleanup_reclaims_expired_leases_and_refills() {
    let app = TestApp::new(2);
    let c = concert("c1");
    app.enter_all(&c, &["A", "B", "C"]).await;
    app.scheduler.run_promotion_cycle().await;
    app.admission.activate(&c, &user("B")).await.unwrap();

    // A's READY lease lapses, B's ACTIVE lease is still live
    app.clock.advance(TimeDelta::seconds(301));
    let report = app.scheduler.run_cleanup_cycle().await;
    assert_eq!(report.affected, 1);

    assert!(app.store.get_lease(&c, &user("A")).await.unwrap().is_none());
    assert!(!app.store.in_active_set(&c, &user("A")).await);
    assert_eq!(
        app.admission.status(&c, &user("A")).await.unwrap().status,
        QueueStatus::NotFound
    );

    app.scheduler.run_promotion_cycle().await;
    assert_eq!(
        app.admission.status(&c, &user("C")).await.unwrap().status,
        QueueStatus::Ready
    );
}

#[tokio::test]
async fn test_expiry_boundary_is_inclusive() {
    let app = TestApp::new(1);
    let c = concert("c1");
    app.enter_all(&c, &["A"]).await;
    app.scheduler.run_promotion_cycle().await;
    let lease = app.store.get_lease(&c, &user("A")).await.unwrap().unwrap();

    app.clock.set(lease.expires_at - TimeDelta::milliseconds(1));
    assert_eq!(app.scheduler.run_cleanup_cycle().await.affected, 0);

    app.clock.set(lease.expires_at);
    assert_eq!(app.scheduler.run_cleanup_cycle().await.affected, 1);
}

#[tokio::test]
async fn test_cluster_lock_lets_one_instance_promote() {
    let app = TestApp::new(3);
    let c = concert("c1");
    app.enter_all(&c, &CROWD).await;

    let clock: SharedClock = Arc::new(app.clock.clone());
    let lock = MemoryLock::new(Duration::from_secs(30));
    let instances: Vec<QueueScheduler> = (0..4)
        .map(|_| {
            QueueScheduler::new(
                app.store.clone(),
                Arc::new(lock.peer()),
                Arc::clone(&clock),
                &app.config,
            )
        })
        .collect();

    let reports = join_all(instances.iter().map(|s| s.run_promotion_cycle())).await;
    let processed: usize = reports.iter().map(|r| r.processed).sum();
    let moved: u64 = reports.iter().map(|r| r.affected).sum();

    assert!(processed >= 1);
    assert_eq!(moved, 3);
    assert_eq!(app.store.active_size(&c).await.unwrap(), 3);
}

#[tokio::test]
async fn test_idle_concerts_are_not_visited() {
    let app = TestApp::new(1);
    let busy = concert("busy");
    let drained = concert("drained");
    app.enter_all(&busy, &["A", "B"]).await;
    app.enter_all(&drained, &["X"]).await;
    app.admission.remove(&drained, &user("X")).await.unwrap();

    let report = app.scheduler.run_promotion_cycle().await;
    assert_eq!(report.concerts, 1);
    assert_eq!(report.affected, 1);
}
