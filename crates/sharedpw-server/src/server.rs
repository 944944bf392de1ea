use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    handlers::{create_secret, get_secret, head_secret, health},
    store::{RedbGateway, StoreConfig},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// How often the store drops records past their expiry.
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
    /// Take the requester address from `X-Forwarded-For` / `X-Real-IP`
    /// (`SHAREDPW_TRUST_PROXY=true`). Only safe behind a proxy that sets them.
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SHAREDPW_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("SHAREDPW_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("SHAREDPW_DATA_DIR").ok().map(PathBuf::from),
            sweep_interval: Duration::from_secs(300),
            cors_origins: std::env::var("SHAREDPW_CORS_ORIGINS").ok(),
            trust_proxy_headers: std::env::var("SHAREDPW_TRUST_PROXY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Resolve (and create) the directory that holds the database files.
///
/// Without an explicit directory this is the platform data dir for sharedpw,
/// e.g. `~/.local/share/sharedpw` on Linux.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => ProjectDirs::from("", "", "sharedpw")
            .context("no platform data directory for sharedpw")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir {}", path.display()))?;
    Ok(path)
}

/// Build the HTTP router over `state`.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/secrets", post(create_secret))
        .route("/secrets/{id}", get(get_secret).head(head_secret))
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    // Opens lazily; a broken store shows up on the first request.
    let store_config = StoreConfig::new(data_dir);
    info!(
        table = %store_config.table,
        region = %store_config.region,
        "store configured"
    );
    let gateway = RedbGateway::new(store_config);
    gateway.clone().spawn_sweep(cfg.sweep_interval);

    let state = AppState {
        gateway: Arc::new(gateway),
        trust_proxy_headers: cfg.trust_proxy_headers,
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "sharedpw server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::HEAD,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
