use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use academy_gate::{config::Config, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Config ────────────────────────────────────────────────
    let config = Config::from_env()?;
    tracing::info!(
        env = %config.app_env,
        upstream = %config.upstream_url,
        api_rules = config.policy.api_rules.len(),
        page_rules = config.policy.page_rules.len(),
        "Starting academy gate"
    );

    // Read address before moving config into state
    let addr: SocketAddr = format!("{}:{}", config.gate_host, config.gate_port).parse()?;

    let app_state = AppState::new(config)?;

    // ── Router ────────────────────────────────────────────────
    let app = routes::app(app_state);
    tracing::info!(%addr, "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
