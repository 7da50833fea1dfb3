use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use runtime_core::config::RuntimeConfig;
use runtime_server::routes;
use runtime_server::state::AppState;

const SESSION_EVICTION_SWEEP: Duration = Duration::from_secs(300);

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Periodically sweeps the session store for turns past `ttl_secs` (spec §3
/// "evicted by TTL/size policy"). Runs for the life of the process; errors
/// are logged and the sweep continues on the next tick rather than aborting.
fn spawn_session_eviction(state: &AppState) {
    let sessions = state.sessions.clone();
    let ttl_secs = state.config.session_ttl_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_EVICTION_SWEEP);
        loop {
            interval.tick().await;
            match sessions.evict_expired(now_unix(), ttl_secs).await {
                Ok(evicted) if evicted > 0 => info!(evicted, "evicted expired sessions"),
                Ok(_) => {}
                Err(error) => warn!(%error, "session eviction sweep failed"),
            }
        }
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = RuntimeConfig::from_env()?;
    let addr = format!("{}:{}", config.listen_host, config.listen_port);
    let app_state = AppState::build(config)?;
    spawn_session_eviction(&app_state);

    let app = routes::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "runtime gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("runtime gateway shutdown complete");
    Ok(())
}
