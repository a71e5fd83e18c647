//! aegis-server binary: configuration, tracing, the vault sweeper, and
//! graceful shutdown around the axum service.

use std::sync::Arc;
use std::time::Duration;

use aegis_core::analyzer::LexiconAnalyzer;
use aegis_core::{Aegis, AegisPolicy, AsyncAegis};
use aegis_server::{router, ApiState, ServerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Cadence of the eager vault sweeper.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// aegis privacy filter service
#[derive(Parser, Debug)]
#[command(name = "aegis-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env().context("failed to read configuration")?;

    let mut default_policy = AegisPolicy::default();
    default_policy.language = config.language.clone();

    let engine = Aegis::builder()
        .analyzer(Arc::new(LexiconAnalyzer::with_name(&config.model_name)))
        .root_key(config.root_key)
        .session_ttl(config.ttl)
        .max_sessions(config.max_sessions)
        .default_policy(default_policy)
        .build()
        .context("failed to build engine")?;
    let aegis = AsyncAegis::new(Arc::new(engine));

    // Eager TTL sweeper on a bounded cadence; lazy expiry on access
    // covers the gaps.
    let sweeper = aegis.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.sweep_expired().await;
        }
    });

    let state = Arc::new(ApiState { aegis });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %config.bind, model = %config.model_name, "aegis-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("aegis-server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!();
        },
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT; shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM; shutting down"),
    }
}
