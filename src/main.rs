//! Claw Turn Server - turn scheduling for chat-driven claw machines
//!
//! Startup order:
//! - load `.env` and configuration, then logging
//! - bind a turn scheduler to every configured machine and connect them
//! - serve the HTTP and WebSocket surface until a shutdown signal arrives

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use claw_turn_server::app::AppState;
use claw_turn_server::config::Config;
use claw_turn_server::game::MachineRegistry;
use claw_turn_server::http::build_router;
use claw_turn_server::util::rate_limit::ChatRateLimiter;
use claw_turn_server::util::time::init_server_time;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    init_tracing(&config);
    init_server_time();

    info!(
        addr = %config.server_addr,
        machines = config.machines.len(),
        mode = %config.default_mode,
        "Starting Claw Turn Server"
    );
    if config.alert_webhook_url.is_none() {
        warn!("ALERT_WEBHOOK_URL not set, operator alerts are only logged");
    }

    let state = AppState::new(config.clone())?;
    state.connect_machines().await;
    spawn_limiter_pruning(state.chat_limiter.clone());

    let registry: Arc<MachineRegistry> = state.registry.clone();
    let listener = TcpListener::bind(config.server_addr).await?;
    info!(addr = %config.server_addr, "Listening for chat bridges and operators");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown_all();
    info!(machines = registry.len(), "Schedulers unbound, server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Forget chat senders that have gone quiet
fn spawn_limiter_pruning(limiter: ChatRateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.prune();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "sigterm",
    };
    info!(signal, "Shutting down, draining connections");
}
