//! Voxline server binary.
//!
//! Starts the webhook server with structured logging, attaches the metrics
//! pipeline to the voice clients, and flushes the metrics CSV on SIGTERM or
//! SIGINT before exiting.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use voxline_server::config::{self, LoggingConfig};
use voxline_server::{app, build_session, start_metrics, AppState};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VOXLINE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let (config, origin) = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    init_tracing(&config.logging);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        origin = origin.as_str(),
        "resolved startup configuration path"
    );
    if origin == config::ConfigOrigin::Defaults {
        tracing::info!("config file not found, using defaults");
    }

    let session = build_session(&config)
        .expect("failed to build voice clients: check the [llm] section");
    if !session.llm().is_configured() {
        tracing::warn!("no LLM API key configured (set GROQ_API_KEY); replies will fail");
    }

    let session = Arc::new(session);
    let pipeline = start_metrics(&config.metrics, &session);
    tracing::info!(path = %config.metrics.path.display(), "metrics logging enabled");

    let state = AppState {
        session: Arc::clone(&session),
        voice: config.telephony.voice.clone(),
    };
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting voxline server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address: is another process using this port?");

    if let Err(e) = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {}", e);
    }

    match pipeline.shutdown().await {
        Ok(store) => tracing::info!(
            rows = store.records().len(),
            sink = %store.describe_sink(),
            "metrics flushed"
        ),
        Err(e) => tracing::error!("final metrics flush failed: {}", e),
    }

    tracing::info!("voxline server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
