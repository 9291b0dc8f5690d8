//! Contract-wide reads: fees, pause flag, token catalog, effective rate

use alloy_primitives::U256;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use r2r_core::{EvmAddress, ProtocolError};
use rent2repay::constants::{periods, MAX_TOKENS};
use rent2repay::{fetch_contract_info, fetch_effective_rate};

use crate::dto::{
    ApiError, ContractInfoResponse, EffectiveRateQuery, EffectiveRateResponse, PeriodPresetInfo,
    RefreshQuery, TokenCatalogResponse,
};
use crate::state::reject;
use crate::AppState;

/// Create contract routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/info", get(get_info))
        .route("/tokens", get(get_tokens))
        .route("/effective-rate", get(get_effective_rate))
}

/// GET /contract/info - Fee configuration, reduction configuration, pause flag
pub async fn get_info(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<ContractInfoResponse>, (StatusCode, Json<ApiError>)> {
    let contract = state.contract().await.map_err(reject)?;
    let client = state.require_client().await.map_err(reject)?;
    if query.refresh {
        state.invalidate_contract(contract).await;
    }

    let info = fetch_contract_info(&client, contract).await.map_err(reject)?;
    Ok(Json(info.into()))
}

/// GET /contract/tokens - Repayment-token catalog and wizard limits
pub async fn get_tokens(State(state): State<AppState>) -> Json<TokenCatalogResponse> {
    let config = state.config().await;
    Json(TokenCatalogResponse {
        tokens: config.tokens,
        period_presets: periods::PRESETS
            .iter()
            .map(|p| PeriodPresetInfo {
                label: p.label.to_string(),
                seconds: p.seconds,
            })
            .collect(),
        min_period_secs: periods::MIN_PERIOD_SECS,
        max_tokens: MAX_TOKENS,
    })
}

/// GET /contract/effective-rate - Borrow rate after Rent2Repay fees
pub async fn get_effective_rate(
    State(state): State<AppState>,
    Query(query): Query<EffectiveRateQuery>,
) -> Result<Json<EffectiveRateResponse>, (StatusCode, Json<ApiError>)> {
    let account = EvmAddress::parse(&query.account).map_err(reject)?;
    let nominal = U256::from_str_radix(query.nominal_rate_ray.trim(), 10).map_err(|_| {
        reject(ProtocolError::InvalidAmount {
            message: format!("'{}' is not a RAY integer", query.nominal_rate_ray),
        })
    })?;

    let contract = state.contract().await.map_err(reject)?;
    let client = state.require_client().await.map_err(reject)?;
    let quote = fetch_effective_rate(&client, contract, account, nominal)
        .await
        .map_err(reject)?;

    Ok(Json(EffectiveRateResponse::new(account, quote)))
}
