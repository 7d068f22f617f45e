//! Ticketing HTTP server.
//!
//! Reserves tickets from PostgreSQL-backed inventory under Redis unit locks.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use ticketing::{
    AdminService, Config, LockFacade, ReservationCoordinator,
    metrics::install_prometheus,
    server::{AppState, build_router},
};
use ticketlock_core::environment::SystemClock;
use ticketlock_postgres::PostgresInventoryStore;
use ticketlock_redis::{BackoffPolicy, RedisLock};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ticketing HTTP Server");
    info!(
        strategy = %config.lock.strategy(),
        lease = ?config.lock.lease(),
        key_prefix = %config.lock.key_prefix,
        "Configuration loaded"
    );

    let metrics_handle = match install_prometheus() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus exporter not installed, /metrics disabled");
            None
        }
    };

    // Inventory store
    info!("Connecting to PostgreSQL...");
    let store = PostgresInventoryStore::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        Duration::from_secs(config.postgres.connect_timeout),
    )
    .await?;
    store.migrate().await?;
    info!("PostgreSQL connected, migrations applied");

    // Lock store
    info!("Connecting to Redis...");
    let lock = RedisLock::new(&config.redis.url).await?.with_backoff(BackoffPolicy::new(
        Duration::from_millis(config.lock.poll_min_ms),
        Duration::from_millis(config.lock.poll_max_ms),
    ));
    info!("Redis connected");

    let facade = LockFacade::new(Arc::new(lock.clone()), config.lock.strategy())
        .with_key_prefix(config.lock.key_prefix.clone());
    let coordinator =
        ReservationCoordinator::new(facade, Arc::new(store.clone()), Arc::new(SystemClock));
    let admin = AdminService::new(Arc::new(store.clone()));

    let mut state = AppState::new(coordinator, admin)
        .with_probe(Arc::new(store))
        .with_probe(Arc::new(lock));
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    let app = build_router(state);

    let addr = config.bind_address();
    info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "HTTP server listening");

    // Run server with graceful shutdown, bounded by the drain timeout
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });
    let drain_deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.into_future() => result?,
        () = drain_deadline => {
            warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out, dropping in-flight requests"
            );
        }
    }

    info!("Server shut down");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
