use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crm_api::config::config;
use crm_api::events::TracingEventSink;
use crm_api::permissions::PermissionMatrix;
use crm_api::server::{app, AppState};
use crm_api::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crm_api=debug")),
        )
        .init();

    let config = config();
    config.validate().map_err(anyhow::Error::msg)?;
    tracing::info!("Starting CRM API in {:?} mode", config.environment);

    let permissions = PermissionMatrix::load(config.permissions_file.as_deref())
        .context("loading permission policy")?;
    let store = PgStore::connect(&config.database).context("configuring database pool")?;

    let state = AppState::new(
        Arc::new(store),
        Arc::new(TracingEventSink),
        permissions,
        config.clone(),
    );

    // Allow tests or deployments to override port via env
    let port = std::env::var("CRM_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("CRM API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server")?;
    Ok(())
}
