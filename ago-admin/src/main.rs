use std::{env, net::SocketAddr};

use ago_admin::{AdminConfig, AdminState, build_admin_app};
use tracing::{info, warn};
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if wants_version_flag() {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logging();

    let addr = parse_addr("ADMIN_ADDR", "0.0.0.0:8060")?;
    let mut config = AdminConfig::for_controller(
        parse_url("ADMIN_RPC_URL", "http://127.0.0.1:8008/jsonrpc")?,
        parse_url(
            "ADMIN_SETTINGS_URL",
            "http://127.0.0.1:8008/cgi-bin/settings.cgi",
        )?,
    );
    config.reply_timeout_ms = parse_u64("ADMIN_REPLY_TIMEOUT_MS", config.reply_timeout_ms)?;
    config.favorites_max = parse_usize("ADMIN_FAVORITES_MAX", config.favorites_max)?;
    config.drain_capacity = parse_usize("ADMIN_DRAIN_CAPACITY", config.drain_capacity)?;
    config.process_poll_interval_ms =
        parse_u64("ADMIN_PROCESS_POLL_MS", config.process_poll_interval_ms)?;

    let state = AdminState::new(config);
    if let Err(err) = state.refresh_inventory().await {
        warn!("initial inventory fetch failed, starting empty: {err}");
    }
    let _pump = state.spawn_event_pump();

    let app = build_admin_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("admin gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn parse_addr(key: &str, default: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    Ok(value.parse()?)
}

fn parse_url(key: &str, default: &str) -> Result<Url, Box<dyn std::error::Error>> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    Ok(value.parse()?)
}

fn parse_u64(key: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}

fn wants_version_flag() -> bool {
    env::args()
        .skip(1)
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
}
