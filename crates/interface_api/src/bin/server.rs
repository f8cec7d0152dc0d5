//! Carryline Payments - API Server Binary
//!
//! Starts the operator HTTP API and the background job runner that
//! drives payment deadlines.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin carryline-payments-api
//!
//! # Run with environment variables
//! API_HOST=0.0.0.0 API_PORT=8080 DATABASE_URL=postgres://... cargo run --bin carryline-payments-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{CachedSettings, PaymentPolicy};
use domain_cancellation::CancellationEngine;
use domain_payment::{
    AuthorizationService, NoopBookingPort, NotificationOutbox, PaymentJobExecutor,
};
use domain_scheduler::{JobRunner, RunnerConfig};
use infra_db::{
    create_pool, run_migrations, DatabaseConfig, PgAuthorizationStore, PgCancellationLedger,
    PgEventLog, PgJobStore, PgSettings,
};
use infra_gateway::{MockGateway, Reconciler};
use interface_api::{config::ApiConfig, create_router, AppState};

const RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting Carryline Payments API Server"
    );

    let pool = create_pool(DatabaseConfig::new(config.database_url.clone())).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(PgAuthorizationStore::new(pool.clone()));
    let jobs = Arc::new(PgJobStore::new(pool.clone()));
    let event_log = Arc::new(PgEventLog::new(pool.clone()));
    let settings = Arc::new(CachedSettings::new(
        PgSettings::new(pool.clone()),
        Duration::from_secs(60),
    ));
    let ledger = Arc::new(PgCancellationLedger::new(pool.clone()));
    let outbox = Arc::new(NotificationOutbox::new());
    let booking = Arc::new(NoopBookingPort);

    // Simulated processor until a real transport is configured
    let gateway = Arc::new(MockGateway::new());

    let service = Arc::new(AuthorizationService::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        gateway.clone(),
        booking.clone(),
        event_log.clone(),
        Arc::clone(&outbox),
        settings.clone(),
    ));

    let cancellations = Arc::new(CancellationEngine::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        gateway.clone(),
        booking,
        event_log.clone(),
        Arc::clone(&outbox),
        ledger,
        settings.clone(),
    ));

    // Deadline enforcement runs in-process alongside the API
    let policy = PaymentPolicy::load(settings.as_ref()).await?;
    let executor = Arc::new(PaymentJobExecutor::new(Arc::clone(&service), Arc::clone(&jobs)));
    let runner = JobRunner::new(
        Arc::clone(&jobs),
        executor,
        RunnerConfig {
            backoff_base_minutes: policy.retry_backoff_base_minutes,
            ..RunnerConfig::default()
        },
    );
    tokio::spawn(async move { runner.run().await });

    // Periodic sweep converging authorizations whose last gateway
    // outcome was ambiguous
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        gateway,
        event_log,
    );
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            tick.tick().await;
            match reconciler.run_once().await {
                Ok(report) => {
                    if report.examined > 0 {
                        tracing::info!(
                            examined = report.examined,
                            adopted_captures = report.adopted_captures,
                            adopted_cancellations = report.adopted_cancellations,
                            unresolved = report.unresolved,
                            "reconciliation sweep done"
                        );
                    }
                }
                Err(err) => tracing::warn!(error = %err, "reconciliation sweep failed"),
            }
        }
    });

    let state = AppState {
        service,
        cancellations,
        jobs,
        config: config.clone(),
    };
    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads API configuration from environment variables, falling back to
/// individual variables and then defaults.
fn load_config() -> Result<ApiConfig, Box<dyn std::error::Error>> {
    let config = ApiConfig::from_env().unwrap_or_else(|_| ApiConfig {
        host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        port: std::env::var("API_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080),
        jwt_secret: std::env::var("API_JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production".to_string()),
        jwt_expiration_secs: std::env::var("API_JWT_EXPIRATION_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600),
        database_url: std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("API_DATABASE_URL"))
            .unwrap_or_else(|_| "postgres://localhost/carryline".to_string()),
        log_level: std::env::var("API_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string()),
    });

    Ok(config)
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM) so in-flight requests
/// can complete before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
