// Campaign Spend - Web Server
// Loads the warehouse datasets once, then serves the JSON API + dashboard

use anyhow::{Context, Result};
use campaign_spend::api::{app, AppState};
use campaign_spend::logging::{init_logging, init_logging_json};
use campaign_spend::{BigQueryClient, Config, Datasets, LogFormat};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    match config.log_format {
        LogFormat::Json => init_logging_json("spend-server", "info,tower_http=info"),
        LogFormat::Text => init_logging("spend-server", "info,tower_http=info"),
    }

    tracing::info!(
        billing_project = %config.billing_project,
        credentials = %config.credentials_path.display(),
        static_root = %config.static_root.display(),
        "starting campaign spend server"
    );

    let warehouse = BigQueryClient::new(config.billing_project.clone(), config.credentials_path.clone())
        .with_api_base(config.bigquery_api_base.clone());
    let datasets = Arc::new(Datasets::new(Arc::new(warehouse)));

    // Load failures are not fatal: the API reports the datasets as unavailable
    let readiness = datasets.warm_up().await;
    if readiness.ready {
        tracing::info!("all datasets loaded");
    } else {
        for dataset in readiness.datasets.iter().filter(|d| d.error.is_some()) {
            tracing::error!(
                dataset = dataset.name,
                error = dataset.error.as_deref().unwrap_or_default(),
                "dataset unavailable, dependent endpoints will return 500"
            );
        }
    }

    let state = AppState::new(datasets, config.static_root.clone());
    let router = app(state);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(%addr, "server running (API under /api, dashboard at /)");

    axum::serve(listener, router)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
