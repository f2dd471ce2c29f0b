//! CreditLens - Credit Lookup API
//! Mission: Serve tax-credit lookups behind bearer tokens, auditing every protected query

use anyhow::{Context, Result};
use clap::Parser;
use creditlens_backend::{
    api::{build_state, create_router},
    config::Config,
};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();

    info!("🚀 CreditLens starting");
    if config.uses_dev_secret() {
        warn!("⚠️ JWT_SECRET not set, using the development secret. Do not run like this in production.");
    }

    let state = build_state(&config)?;
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!("🌐 Listening on http://{}", config.bind_addr);
    info!("   GET  /credits/:invoice_number");
    info!("   GET  /credits/credit/:credit_number");
    info!("   POST /users, POST /users/login, GET /users/me");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("👋 CreditLens stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "creditlens_backend=debug,creditlens=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when started from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
