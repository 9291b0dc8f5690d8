//! RPC endpoint status and configuration

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use evm_rpc_client::{ChainCapabilities, SyncTier};
use r2r_core::{AppConfig, RpcConfig};

use crate::dto::{ApiError, NodeConfigRequest, NodeStatusResponse};
use crate::AppState;

/// Create node routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/configure", post(configure))
}

fn status_response(config: &AppConfig, caps: Option<ChainCapabilities>) -> NodeStatusResponse {
    let caps = caps.unwrap_or_else(ChainCapabilities::offline);
    NodeStatusResponse {
        connected: caps.is_online,
        url: config.rpc.url.clone(),
        network: config.network.as_str().to_string(),
        expected_chain_id: config.chain_id(),
        chain_id: caps.chain_id,
        chain_matches: caps.chain_matches,
        block_number: caps.block_number,
        syncing: caps.syncing,
        sync_tier: caps.tier.as_str().to_string(),
    }
}

/// GET /node/status - Check the endpoint and report what it serves
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<NodeStatusResponse>, (StatusCode, Json<ApiError>)> {
    let config = state.config().await;

    let caps = match state.rpc_client().await {
        Some(client) => {
            client.refresh_capabilities().await;
            client.capabilities().await
        }
        None => None,
    };

    Ok(Json(status_response(&config, caps)))
}

/// POST /node/configure - Switch to another RPC endpoint
pub async fn configure(
    State(state): State<AppState>,
    Json(request): Json<NodeConfigRequest>,
) -> Result<Json<NodeStatusResponse>, (StatusCode, Json<ApiError>)> {
    let url = request.url.trim().to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::bad_request(format!(
                "RPC URL must start with http:// or https://, got '{}'",
                url
            ))),
        ));
    }

    let current = state.config().await.rpc;
    let rpc_config = RpcConfig {
        url,
        timeout_secs: request.timeout_secs.unwrap_or(current.timeout_secs),
    };
    state.set_rpc_config(rpc_config).await;

    let client = state.refresh_rpc_client().await;
    let caps = match &client {
        Some(client) => client.capabilities().await,
        None => None,
    };

    let config = state.config().await;
    let response = status_response(&config, caps);
    if response.sync_tier == SyncTier::Synced.as_str() {
        tracing::info!(url = %response.url, block = response.block_number, "RPC endpoint configured");
    } else {
        tracing::warn!(url = %response.url, tier = %response.sync_tier, "RPC endpoint configured but not usable");
    }
    Ok(Json(response))
}
