//! Billing Webhooks server.
//!
//! Wires the Postgres stores and the Stripe adapter into the webhook
//! router and serves it until Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::signal;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_webhooks::adapters::http::{billing_router, BillingAppState};
use billing_webhooks::adapters::postgres::{PostgresBillingRepository, PostgresProcessedEventStore};
use billing_webhooks::adapters::stripe::StripePaymentAdapter;
use billing_webhooks::application::handlers::billing::{
    EventRouter, ProcessWebhookHandler, PruneProcessedEventsHandler,
};
use billing_webhooks::config::{AppConfig, ConfigError, ValidationError};
use billing_webhooks::ports::{BillingRepository, PaymentProvider, ProcessedEventStore};

/// Slack on top of the handler bound before the HTTP layer gives up.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting billing webhooks"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    tracing::info!(database = %config.database.redacted_url(), "Database connection established");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let repository: Arc<dyn BillingRepository> =
        Arc::new(PostgresBillingRepository::new(pool.clone()));
    let store: Arc<dyn ProcessedEventStore> = Arc::new(PostgresProcessedEventStore::new(pool));
    let provider: Arc<dyn PaymentProvider> =
        Arc::new(StripePaymentAdapter::new(config.stripe_config()));

    if config.payment.is_test_mode() && config.is_production() {
        tracing::warn!("Production environment is using a Stripe test-mode key");
    }

    let router = Arc::new(EventRouter::new(repository, provider.clone()));
    let webhook_handler = ProcessWebhookHandler::new(provider, store.clone(), router)
        .with_handler_timeout(config.webhook.handler_timeout())
        .with_claim_lease(config.webhook.claim_lease());

    spawn_pruner(
        PruneProcessedEventsHandler::new(store, config.webhook.retention()),
        config.webhook.prune_interval(),
    );

    let app = billing_router()
        .with_state(BillingAppState::new(Arc::new(webhook_handler)))
        .layer(TimeoutLayer::new(
            config.webhook.handler_timeout() + REQUEST_TIMEOUT_SLACK,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Prunes processed-event markers on a fixed interval.
fn spawn_pruner(pruner: PruneProcessedEventsHandler, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(err) = pruner.handle().await {
                tracing::error!(error = %err, "Pruning processed webhook events failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
