//! Rent2Repay dashboard application library

use anyhow::Context;
use r2r_api::AppState;
use r2r_core::AppConfig;

/// Load configuration, then serve the API until the process exits
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rent2repay_dashboard=debug".parse()?)
                .add_directive("r2r_api=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let contract = config.contract()?;

    tracing::info!(
        network = config.network.as_str(),
        rpc = %config.rpc.url,
        contract = %contract,
        tokens = config.tokens.len(),
        "Starting Rent2Repay dashboard"
    );

    let port = config.api_port;
    let state = AppState::with_config(config);

    // Check the endpoint up front so the first request does not pay for it
    if let Err(e) = state.require_client().await {
        tracing::warn!(error = %e, "RPC endpoint not usable yet, reads will fail until it is");
    }

    r2r_api::start_server(state, port)
        .await
        .with_context(|| format!("API server on port {} failed", port))
}
