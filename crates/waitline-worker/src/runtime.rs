//! Scheduler runtime: fixed-delay timers for the promotion and cleanup cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing;

use waitline_core::config::SchedulerConfig;

use crate::scheduler::QueueScheduler;

/// Drives the promotion and cleanup cycles until the cancel signal fires.
///
/// Each timer waits its full interval after the previous cycle returns, so
/// a cycle never overlaps with itself within one process. The two timers are
/// independent: a slow cleanup never delays promotion.
#[derive(Debug, Clone)]
pub struct SchedulerRuntime {
    /// Per-concert pass runner
    scheduler: Arc<QueueScheduler>,
    /// Delay between promotion cycles
    activation_interval: Duration,
    /// Delay between cleanup cycles
    cleanup_interval: Duration,
}

impl SchedulerRuntime {
    /// Create a new scheduler runtime
    pub fn new(scheduler: Arc<QueueScheduler>, config: &SchedulerConfig) -> Self {
        Self {
            scheduler,
            activation_interval: config.activation_interval(),
            cleanup_interval: config.cleanup_interval(),
        }
    }

    /// Run both timers until `cancel` becomes `true` or its sender is dropped.
    ///
    /// A cycle in progress is allowed to finish so its locks are released.
    pub async fn run(&self, cancel: watch::Receiver<bool>) {
        tracing::info!(
            activation_interval_ms = self.activation_interval.as_millis() as u64,
            cleanup_interval_ms = self.cleanup_interval.as_millis() as u64,
            "Queue scheduler started"
        );

        let promotion = {
            let scheduler = Arc::clone(&self.scheduler);
            Self::every(
                "promotion",
                self.activation_interval,
                cancel.clone(),
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    async move {
                        scheduler.run_promotion_cycle().await;
                    }
                },
            )
        };
        let cleanup = {
            let scheduler = Arc::clone(&self.scheduler);
            Self::every("cleanup", self.cleanup_interval, cancel, move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    scheduler.run_cleanup_cycle().await;
                }
            })
        };

        tokio::join!(promotion, cleanup);
        tracing::info!("Queue scheduler shut down complete");
    }

    async fn every<F, Fut>(
        name: &'static str,
        interval: Duration,
        mut cancel: watch::Receiver<bool>,
        mut cycle: F,
    ) where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            if *cancel.borrow() {
                break;
            }
            cycle().await;

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = time::sleep(interval) => {}
            }
        }
        tracing::info!(timer = name, "Scheduler timer stopped");
    }
}
