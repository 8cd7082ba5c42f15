//! Waitline Server: concert admission queue.
//!
//! Main entry point that wires all crates together and runs the background
//! scheduler until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use waitline_core::config::AppConfig;
use waitline_core::error::AppError;
use waitline_core::types::SystemClock;
use waitline_guard::{RateLimiter, SchedulerLockDispatch};
use waitline_service::AdmissionService;
use waitline_store::{QueueStore, QueueStoreManager};
use waitline_worker::{QueueScheduler, SchedulerRuntime};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, kind = %e.kind, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("WAITLINE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Waitline");

    let clock = SystemClock::shared();

    // ── Step 1: Queue store ──────────────────────────────────────
    tracing::info!(backend = ?config.store.backend, "Initializing queue store...");
    let store_manager = QueueStoreManager::new(&config.store, &config.queue).await?;
    let store = store_manager.shared();
    if !store.health_check().await? {
        return Err(AppError::service_unavailable("Queue store failed its health check"));
    }
    tracing::info!("Queue store initialized");

    // ── Step 2: Rate limiter + scheduler lock ────────────────────
    let limiter =
        RateLimiter::from_config(&config.polling, &config.store, Arc::clone(&clock)).await?;
    let lock = SchedulerLockDispatch::from_config(&config.scheduler.lock, &config.store).await?;
    let lock = Arc::new(lock);

    // ── Step 3: Admission service ────────────────────────────────
    let admission =
        AdmissionService::new(Arc::clone(&store), limiter, Arc::clone(&clock), &config);
    tracing::info!(
        capacity = config.queue.active_max_size,
        ready_ttl_secs = config.queue.ready_ttl_seconds,
        active_ttl_secs = config.queue.active_ttl_seconds,
        max_extensions = config.queue.max_extensions,
        "Admission service ready"
    );

    // ── Step 4: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 5: Background scheduler ─────────────────────────────
    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = Arc::new(QueueScheduler::new(
            Arc::clone(&store),
            lock,
            Arc::clone(&clock),
            &config,
        ));
        let runtime = SchedulerRuntime::new(scheduler, &config.scheduler);
        let handle = tokio::spawn(async move {
            runtime.run(shutdown_rx).await;
        });
        tracing::info!(
            lock_strategy = ?config.scheduler.lock.strategy,
            "Background scheduler started"
        );
        Some(handle)
    } else {
        tracing::info!("Background scheduler disabled");
        None
    };

    // ── Step 6: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = scheduler_handle {
        let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
    }

    match admission.health_check().await {
        Ok(true) => tracing::debug!("Queue store reachable at shutdown"),
        Ok(false) | Err(_) => tracing::warn!("Queue store unreachable at shutdown"),
    }

    tracing::info!("Waitline shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
