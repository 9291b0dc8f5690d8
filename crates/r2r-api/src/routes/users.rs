//! Per-account reads: configuration, balances, fee eligibility, roles

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use r2r_core::EvmAddress;
use rent2repay::{fetch_fee_eligibility, fetch_user_overview, fetch_wallet_balances};

use crate::dto::{
    ApiError, BalanceView, BalancesResponse, CapabilitiesResponse, EligibilityResponse,
    RefreshQuery, UserConfigResponse,
};
use crate::state::reject;
use crate::AppState;

/// Create user routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:address/config", get(get_config))
        .route("/:address/balances", get(get_balances))
        .route("/:address/eligibility", get(get_eligibility))
        .route("/:address/capabilities", get(get_capabilities))
}

async fn prepare_read(
    state: &AppState,
    address: &str,
    refresh: bool,
) -> Result<EvmAddress, (StatusCode, Json<ApiError>)> {
    let account = EvmAddress::parse(address).map_err(reject)?;
    if refresh {
        state.invalidate_account(account).await;
    }
    Ok(account)
}

/// GET /users/:address/config - Configuration with per-token amounts
pub async fn get_config(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<UserConfigResponse>, (StatusCode, Json<ApiError>)> {
    let user = prepare_read(&state, &address, query.refresh).await?;
    let contract = state.contract().await.map_err(reject)?;
    let client = state.require_client().await.map_err(reject)?;
    let catalog = state.config().await.tokens;

    let overview = fetch_user_overview(&client, contract, &catalog, user)
        .await
        .map_err(reject)?;

    Ok(Json(UserConfigResponse::new(
        overview.user,
        overview.config,
        overview.positions,
    )))
}

/// GET /users/:address/balances - Wallet balances of catalog tokens
pub async fn get_balances(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<BalancesResponse>, (StatusCode, Json<ApiError>)> {
    let account = prepare_read(&state, &address, query.refresh).await?;
    let client = state.require_client().await.map_err(reject)?;
    let catalog = state.config().await.tokens;

    let balances = fetch_wallet_balances(&client, &catalog, account).await;
    Ok(Json(BalancesResponse {
        account,
        balances: balances.into_iter().map(BalanceView::from).collect(),
    }))
}

/// GET /users/:address/eligibility - DAO fee reduction eligibility
pub async fn get_eligibility(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<EligibilityResponse>, (StatusCode, Json<ApiError>)> {
    let account = prepare_read(&state, &address, query.refresh).await?;
    let contract = state.contract().await.map_err(reject)?;
    let client = state.require_client().await.map_err(reject)?;

    let eligibility = fetch_fee_eligibility(&client, contract, account)
        .await
        .map_err(reject)?;
    Ok(Json(eligibility.into()))
}

/// GET /users/:address/capabilities - Maintenance roles and allowed actions
pub async fn get_capabilities(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<CapabilitiesResponse>, (StatusCode, Json<ApiError>)> {
    let account = EvmAddress::parse(&address).map_err(reject)?;
    let caps = state
        .capabilities(account, query.refresh)
        .await
        .map_err(reject)?;
    Ok(Json(CapabilitiesResponse::new(account, caps)))
}
