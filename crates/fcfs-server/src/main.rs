//! fcfs-server entry point.
//!
//! Thin on purpose: tracing, config, pool + migrations, middleware, serve.
//! All route handlers live in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use fcfs_server::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = fcfs_config::load_from_env()?;
    info!(config_hash = %loaded.config_hash, "server config loaded");

    let pool = fcfs_db::connect_from_env().await?;
    fcfs_db::migrate(&pool).await?;

    let shared = Arc::new(state::AppState::new(pool));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(admin_cors());

    let addr = bind_addr_from_env()
        .or_else(|| loaded.config.server.bind_addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
    info!("fcfs-server listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("FCFS_SERVER_ADDR").ok()?.parse().ok()
}

/// The only browser caller is the co-hosted admin page; subcontractor
/// clients talk server-to-server and never preflight. Everything else is
/// refused at the CORS layer.
fn admin_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = ["http://localhost:3000", "http://127.0.0.1:3000"]
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
