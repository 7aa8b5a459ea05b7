//! API server entry point.

use std::sync::Arc;

use api::auth::{Authenticator, StaticTokenAuthenticator};
use api::config::{Config, LogFormat};
use api::{AppStore, create_app, create_state};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn serve<S: AppStore>(
    config: &Config,
    store: S,
    auth: Arc<dyn Authenticator>,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let app = create_app(create_state(store, auth), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let tokens = StaticTokenAuthenticator::parse(&config.api_tokens)?;
    if tokens.is_empty() {
        tracing::warn!("API_TOKENS is empty; every order endpoint will answer 401");
    }
    let auth: Arc<dyn Authenticator> = Arc::new(tokens);

    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "connected to PostgreSQL"
            );
            serve(&config, store, auth, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            serve(&config, InMemoryStore::new(), auth, metrics_handle).await
        }
    }
}
