//! Integration tests against a live Redis server.
//!
//! These exercise the Lua scripts behind the Redis backend. They run only
//! when `REDIS_URL` is set (e.g. `REDIS_URL=redis://localhost:6379`) and
//! return early otherwise. Every test works under its own key prefix and
//! deletes its keys when it finishes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use uuid::Uuid;

use waitline_core::ErrorKind;
use waitline_core::config::{AppConfig, RedisStoreConfig};
use waitline_core::types::{ConcertId, ManualClock, SharedClock, UserId, truncate_to_millis};
use waitline_entity::{EnterOutcome, Lease, QueueStatus};
use waitline_guard::RateLimiter;
use waitline_guard::SchedulerLock;
use waitline_guard::lock::RedisLock;
use waitline_guard::rate_limit::{RateLimitBackend, RedisTokenBucket};
use waitline_service::AdmissionService;
use waitline_store::redis::{RedisClient, RedisQueueStore};
use waitline_store::{ActivationResult, ExtensionResult, QueueStore, RemovalReport};
use waitline_worker::QueueScheduler;

/// A Redis connection scoped to one test's key prefix.
struct TestRedis {
    client: RedisClient,
    prefix: String,
}

impl TestRedis {
    async fn connect() -> Option<Self> {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("REDIS_URL not set, skipping Redis test");
            return None;
        };
        let prefix = format!("waitline-test:{}:", Uuid::new_v4().simple());
        let config = RedisStoreConfig {
            url,
            key_prefix: prefix.clone(),
        };
        let client = RedisClient::connect(&config).await.unwrap();
        Some(Self { client, prefix })
    }

    fn store(&self) -> RedisQueueStore {
        RedisQueueStore::new(self.client.clone(), Duration::from_secs(60))
    }

    /// Delete every key written under this test's prefix.
    async fn cleanup(&self) {
        let mut conn = self.client.conn_mut();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{}*", self.prefix))
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .unwrap();
            if !keys.is_empty() {
                let _: i64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .unwrap();
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
    }
}

fn concert(id: &str) -> ConcertId {
    ConcertId::new(id).unwrap()
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn now() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

#[tokio::test]
async fn test_redis_concurrent_enters_create_one_wait_entry() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    store.enter(&c, &user("first"), t0).await.unwrap();

    let dup = user("dup");
    let outcomes = join_all(
        (0..25).map(|i| store.enter(&c, &dup, t0 + TimeDelta::milliseconds(1 + i))),
    )
    .await;

    let added = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o.as_ref().unwrap(),
                EnterOutcome::Waiting { newly_added: true, .. }
            )
        })
        .count();
    assert_eq!(added, 1);
    assert!(outcomes.iter().all(|o| matches!(
        o.as_ref().unwrap(),
        EnterOutcome::Waiting { rank: 1, total_waiting: 2, .. }
    )));
    assert_eq!(store.wait_size(&c).await.unwrap(), 2);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_wait_order_follows_arrival_not_name() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    for (i, id) in ["zed", "yan", "xia"].iter().enumerate() {
        store
            .enter(&c, &user(id), t0 + TimeDelta::milliseconds(i as i64))
            .await
            .unwrap();
    }

    for (rank, id) in ["zed", "yan", "xia"].iter().enumerate() {
        assert_eq!(store.wait_rank(&c, &user(id)).await.unwrap(), Some(rank as u64));
    }
    let popped = store.pop_batch(&c, 2).await.unwrap();
    assert_eq!(popped, vec![user("zed"), user("yan")]);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_concurrent_migrations_respect_capacity() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    let crowd: Vec<String> = (0..12).map(|i| format!("u{i:02}")).collect();
    for (i, id) in crowd.iter().enumerate() {
        store
            .enter(&c, &user(id), t0 + TimeDelta::milliseconds(i as i64))
            .await
            .unwrap();
    }

    let expires_at = t0 + TimeDelta::seconds(300);
    let batches = join_all((0..8).map(|_| store.migrate_wait_to_active(&c, 5, 5, expires_at, t0)))
        .await;
    let moved: Vec<UserId> = batches.into_iter().flat_map(|b| b.unwrap()).collect();

    assert_eq!(moved.len(), 5);
    assert_eq!(moved.iter().collect::<HashSet<_>>().len(), 5);
    assert_eq!(store.active_size(&c).await.unwrap(), 5);

    let mut tokens = HashSet::new();
    for id in &crowd {
        let waiting = store.wait_rank(&c, &user(id)).await.unwrap().is_some();
        let lease = store.get_lease(&c, &user(id)).await.unwrap();
        assert!(waiting ^ lease.is_some(), "{id}: waiting={waiting}");
        if let Some(lease) = lease {
            assert_eq!(lease.status, QueueStatus::Ready);
            assert_eq!(lease.expires_at, expires_at);
            assert!(tokens.insert(lease.token));
        }
    }
    assert_eq!(tokens.len(), 5);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_enter_returns_live_lease_and_drops_stale_one() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    let live = Lease::ready(c.clone(), user("a"), "tok-a".into(), t0 + TimeDelta::seconds(30));
    let stale = Lease::ready(c.clone(), user("b"), "tok-b".into(), t0 - TimeDelta::seconds(1));
    store.create_lease(&live, t0).await.unwrap();
    store.create_lease(&stale, t0).await.unwrap();

    let outcome = store.enter(&c, &user("a"), t0).await.unwrap();
    assert_eq!(outcome, EnterOutcome::Admitted(live));

    let outcome = store.enter(&c, &user("b"), t0).await.unwrap();
    assert!(matches!(outcome, EnterOutcome::Waiting { rank: 0, newly_added: true, .. }));
    assert!(store.get_lease(&c, &user("b")).await.unwrap().is_none());
    assert_eq!(store.active_size(&c).await.unwrap(), 1);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_activation_is_idempotent() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    store.enter(&c, &user("a"), t0).await.unwrap();
    store
        .migrate_wait_to_active(&c, 1, 1, t0 + TimeDelta::seconds(60), t0)
        .await
        .unwrap();

    let active_until = t0 + TimeDelta::seconds(600);
    assert_eq!(
        store.activate_lease(&c, &user("a"), active_until, t0).await.unwrap(),
        ActivationResult::Promoted
    );
    assert_eq!(
        store
            .activate_lease(&c, &user("a"), active_until + TimeDelta::seconds(5), t0)
            .await
            .unwrap(),
        ActivationResult::AlreadyActive
    );
    assert_eq!(
        store.activate_lease(&c, &user("ghost"), active_until, t0).await.unwrap(),
        ActivationResult::NotFound
    );

    let lease = store.get_lease(&c, &user("a")).await.unwrap().unwrap();
    assert_eq!(lease.status, QueueStatus::Active);
    assert_eq!(lease.expires_at, active_until);
    assert_eq!(lease.extend_count, 0);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_extension_cap_holds_under_concurrency() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    let lease = Lease {
        status: QueueStatus::Active,
        ..Lease::ready(c.clone(), user("a"), "tok".into(), t0 + TimeDelta::seconds(60))
    };
    store.create_lease(&lease, t0).await.unwrap();

    let new_expiry = t0 + TimeDelta::seconds(600);
    let a = user("a");
    let results = join_all((0..10).map(|_| store.extend_lease(&c, &a, new_expiry, 2, t0)))
        .await;
    let extended = results
        .iter()
        .filter(|r| matches!(r.as_ref().unwrap(), ExtensionResult::Extended(_)))
        .count();
    let refused = results
        .iter()
        .filter(|r| matches!(r.as_ref().unwrap(), ExtensionResult::LimitReached))
        .count();
    assert_eq!((extended, refused), (2, 8));

    let lease = store.get_lease(&c, &user("a")).await.unwrap().unwrap();
    assert_eq!(lease.extend_count, 2);
    assert_eq!(lease.expires_at, new_expiry);

    let expired = Lease {
        status: QueueStatus::Active,
        ..Lease::ready(c.clone(), user("b"), "tok".into(), t0 - TimeDelta::seconds(1))
    };
    store.create_lease(&expired, t0).await.unwrap();
    assert_eq!(
        store.extend_lease(&c, &user("b"), new_expiry, 2, t0).await.unwrap(),
        ExtensionResult::Expired
    );

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_reclaim_boundary_is_inclusive() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    let edge = Lease::ready(c.clone(), user("edge"), "t1".into(), t0);
    let fresh = Lease::ready(c.clone(), user("fresh"), "t2".into(), t0 + TimeDelta::seconds(60));
    store.create_lease(&edge, t0 - TimeDelta::seconds(10)).await.unwrap();
    store.create_lease(&fresh, t0).await.unwrap();

    assert_eq!(
        store.reclaim_expired(&c, t0 - TimeDelta::milliseconds(1)).await.unwrap(),
        0
    );
    assert_eq!(store.reclaim_expired(&c, t0).await.unwrap(), 1);

    assert!(store.get_lease(&c, &user("edge")).await.unwrap().is_none());
    assert!(store.get_lease(&c, &user("fresh")).await.unwrap().is_some());
    assert_eq!(store.active_size(&c).await.unwrap(), 1);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_withdraw_clears_every_structure() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let t0 = now();
    store.enter(&c, &user("a"), t0).await.unwrap();
    store.enter(&c, &user("b"), t0 + TimeDelta::milliseconds(1)).await.unwrap();
    store
        .migrate_wait_to_active(&c, 1, 1, t0 + TimeDelta::seconds(60), t0)
        .await
        .unwrap();

    let report = store.withdraw(&c, &user("a")).await.unwrap();
    assert_eq!(report, RemovalReport { lease_removed: true, wait_removed: false });
    let report = store.withdraw(&c, &user("b")).await.unwrap();
    assert_eq!(report, RemovalReport { lease_removed: false, wait_removed: true });
    assert!(!store.withdraw(&c, &user("b")).await.unwrap().removed_anything());

    assert_eq!(store.active_size(&c).await.unwrap(), 0);
    assert_eq!(store.wait_size(&c).await.unwrap(), 0);
    assert!(store.active_concerts().await.unwrap().is_empty());

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_unreadable_lease_is_corruption() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let store = redis.store();
    let c = concert("c1");
    let key = redis.client.keys().lease(c.as_str(), "a");
    let mut conn = redis.client.conn_mut();
    let fields = [
        ("token", "t"),
        ("status", "ACTIVE"),
        ("expires_at", "soon"),
        ("extend_count", "0"),
    ];
    let _: i64 = redis::cmd("HSET")
        .arg(&key)
        .arg(&fields[..])
        .query_async(&mut conn)
        .await
        .unwrap();

    let err = store.get_lease(&c, &user("a")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueueDataCorruption);
    let err = store.enter(&c, &user("a"), now()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueueDataCorruption);

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_admission_walkthrough() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let mut config = AppConfig::default();
    config.queue.active_max_size = 2;
    let clock = ManualClock::starting_now();
    let shared: SharedClock = Arc::new(clock.clone());
    let store = Arc::new(redis.store());
    let limiter = RateLimiter::new(
        Arc::new(RedisTokenBucket::new(redis.client.clone())),
        redis.client.keys().clone(),
        &config.polling,
        Arc::clone(&shared),
    );
    let admission = AdmissionService::new(store.clone(), limiter, Arc::clone(&shared), &config);
    let lock = Arc::new(RedisLock::new(redis.client.clone(), Duration::from_secs(30)));
    let scheduler = QueueScheduler::new(store.clone(), lock, shared, &config);

    let c = concert("c1");
    for id in ["A", "B", "C"] {
        admission.enter(&c, &user(id)).await.unwrap();
        clock.advance(TimeDelta::milliseconds(1));
    }

    let report = scheduler.run_promotion_cycle().await;
    assert_eq!(report.affected, 2);
    assert_eq!(store.wait_rank(&c, &user("C")).await.unwrap(), Some(0));

    let err = admission.validate(&c, &user("A"), "wrong").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenInvalid);

    admission.activate(&c, &user("A")).await.unwrap();
    admission.extend(&c, &user("A")).await.unwrap();
    let second = admission.extend(&c, &user("A")).await.unwrap();
    assert_eq!(second.extend_count, 2);
    let err = admission.extend(&c, &user("A")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExtensionLimitExceeded);

    // B never activates; its READY lease lapses and C takes the slot
    clock.advance(TimeDelta::seconds(301));
    let cleanup = scheduler.run_cleanup_cycle().await;
    assert_eq!(cleanup.affected, 1);
    scheduler.run_promotion_cycle().await;
    assert_eq!(
        admission.status(&c, &user("C")).await.unwrap().status,
        QueueStatus::Ready
    );

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_lock_release_spares_new_holder() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let c = concert("c1");
    let first = RedisLock::new(redis.client.clone(), Duration::from_millis(100));
    let second = RedisLock::new(redis.client.clone(), Duration::from_secs(30));
    let third = RedisLock::new(redis.client.clone(), Duration::from_secs(30));

    assert!(first.try_acquire("move", &c).await);
    assert!(!second.try_acquire("move", &c).await);

    // first's lock lapses and second takes over
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(second.try_acquire("move", &c).await);

    // a late release from the old holder must not free second's lock
    first.release("move", &c).await;
    assert!(!third.try_acquire("move", &c).await);

    second.release("move", &c).await;
    assert!(third.try_acquire("move", &c).await);
    third.release("move", &c).await;

    redis.cleanup().await;
}

#[tokio::test]
async fn test_redis_token_bucket_burst_then_refill() {
    let Some(redis) = TestRedis::connect().await else {
        return;
    };
    let buckets = RedisTokenBucket::new(redis.client.clone());
    let key = redis.client.keys().rate_limit("c1", "u1");
    let t0 = now().timestamp_millis();

    for _ in 0..10 {
        assert!(buckets.try_consume(&key, 10, 5.0, t0).await.unwrap());
    }
    assert!(!buckets.try_consume(&key, 10, 5.0, t0).await.unwrap());

    let t1 = t0 + 1_000;
    let mut allowed = 0;
    for _ in 0..10 {
        if buckets.try_consume(&key, 10, 5.0, t1).await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);

    let other = redis.client.keys().rate_limit("c1", "u2");
    assert!(buckets.try_consume(&other, 10, 5.0, t1).await.unwrap());

    redis.cleanup().await;
}
