//! Unsigned transaction building and broadcast tracking
//!
//! The backend never signs. Build endpoints return EIP-1193 transaction
//! objects for the wallet; once the wallet has broadcast one, the client
//! registers the hash with `POST /tx/watch` so the receipt is tracked and
//! cached reads are refreshed on confirmation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use evm_tx::{parse_units, UnsignedTx};
use r2r_core::{EvmAddress, ProtocolError, TxHash};
use rent2repay::{parse_user_list, preflight, MaintenanceAction, TokenInfo, WizardEvent};
use uuid::Uuid;

use crate::dto::{
    ApiError, ApproveRequest, AuthorizeRequest, BatchRequest, Rent2RepayRequest,
    RemoveUserRequest, SenderRequest, TokenRequest, WatchResponse,
};
use crate::state::{reject, unix_now, AppError};
use crate::tx_watcher::{self, TxOperation, WatchItem, WatchRequest, WatchedTxInfo};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

/// Create transaction routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/build/revoke", post(build_revoke))
        .route("/build/rent2repay", post(build_rent2repay))
        .route("/build/batch", post(build_batch))
        .route("/build/approve", post(build_approve))
        .route("/build/authorize", post(build_authorize))
        .route("/build/unauthorize", post(build_unauthorize))
        .route("/build/remove-user", post(build_remove_user))
        .route("/build/pause", post(build_pause))
        .route("/build/unpause", post(build_unpause))
        .route("/watch", post(watch))
        .route("/", get(list_watched))
        .route("/:id", get(get_watched))
}

/// Optionally dry-run the transaction against the endpoint
async fn finish(state: &AppState, tx: UnsignedTx, run_preflight: bool) -> ApiResult<UnsignedTx> {
    if !run_preflight {
        return Ok(Json(tx));
    }
    let client = state.require_client().await.map_err(reject)?;
    preflight(&client, tx).await.map(Json).map_err(reject)
}

/// Reject the build unless `from` holds the role `action` needs
async fn authorize(
    state: &AppState,
    from: EvmAddress,
    action: MaintenanceAction,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let caps = state.capabilities(from, false).await.map_err(reject)?;
    caps.require(action).map_err(reject)
}

/// POST /tx/build/revoke - `revokeRent2RepayAll()`
pub async fn build_revoke(
    State(state): State<AppState>,
    Json(req): Json<SenderRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;
    finish(&state, builder.revoke_all(from), req.preflight).await
}

/// POST /tx/build/rent2repay - Single repayment, open to anyone
pub async fn build_rent2repay(
    State(state): State<AppState>,
    Json(req): Json<Rent2RepayRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let user = EvmAddress::parse(&req.user).map_err(reject)?;
    let token = EvmAddress::parse(&req.token).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;
    finish(&state, builder.rent2repay(from, user, token), req.preflight).await
}

/// POST /tx/build/batch - Batched repayment over a user list
pub async fn build_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let users = parse_user_list(&req.users).map_err(reject)?;
    let token = EvmAddress::parse(&req.token).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;
    let tx = builder
        .batch_rent2repay(from, &users, token)
        .map_err(reject)?;

    authorize(&state, from, MaintenanceAction::BatchRent2Repay).await?;
    finish(&state, tx, req.preflight).await
}

/// POST /tx/build/approve - ERC-20 approval toward the contract
pub async fn build_approve(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let token = EvmAddress::parse(&req.token).map_err(reject)?;
    let catalog = state.config().await.tokens;
    let info = TokenInfo::lookup(&catalog, token);
    let amount = parse_units(&req.amount, info.decimals).map_err(reject)?;

    let builder = state.tx_builder().await.map_err(reject)?;
    let tx = builder.approve(from, &info, amount).map_err(reject)?;
    finish(&state, tx, req.preflight).await
}

/// POST /tx/build/authorize - `authorizeTokenPair(token, supply, debt)`
pub async fn build_authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let token = EvmAddress::parse(&req.token).map_err(reject)?;
    let supply = EvmAddress::parse(&req.supply_token).map_err(reject)?;
    let debt = EvmAddress::parse(&req.debt_token).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;

    authorize(&state, from, MaintenanceAction::AuthorizeTokenPair).await?;
    let tx = builder.authorize_token_pair(from, token, supply, debt);
    finish(&state, tx, req.preflight).await
}

/// POST /tx/build/unauthorize - `unauthorizeToken(token)`
pub async fn build_unauthorize(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let token = EvmAddress::parse(&req.token).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;

    authorize(&state, from, MaintenanceAction::UnauthorizeToken).await?;
    finish(&state, builder.unauthorize_token(from, token), req.preflight).await
}

/// POST /tx/build/remove-user - `removeUser(user)`, operator only
pub async fn build_remove_user(
    State(state): State<AppState>,
    Json(req): Json<RemoveUserRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let user = EvmAddress::parse(&req.user).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;

    authorize(&state, from, MaintenanceAction::RemoveUser).await?;
    finish(&state, builder.remove_user(from, user), req.preflight).await
}

/// POST /tx/build/pause - emergency only
pub async fn build_pause(
    State(state): State<AppState>,
    Json(req): Json<SenderRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;

    authorize(&state, from, MaintenanceAction::Pause).await?;
    finish(&state, builder.pause(from), req.preflight).await
}

/// POST /tx/build/unpause - admin only
pub async fn build_unpause(
    State(state): State<AppState>,
    Json(req): Json<SenderRequest>,
) -> ApiResult<UnsignedTx> {
    let from = EvmAddress::parse(&req.from).map_err(reject)?;
    let builder = state.tx_builder().await.map_err(reject)?;

    authorize(&state, from, MaintenanceAction::Unpause).await?;
    finish(&state, builder.unpause(from), req.preflight).await
}

/// POST /tx/watch - Track a transaction the wallet has broadcast
pub async fn watch(
    State(state): State<AppState>,
    Json(req): Json<WatchRequest>,
) -> ApiResult<WatchResponse> {
    let tx_hash = TxHash::parse(&req.tx_hash).map_err(reject)?;
    let account = EvmAddress::parse(&req.account).map_err(reject)?;
    let token = EvmAddress::parse_optional(req.token.as_deref()).map_err(reject)?;
    let targets = req
        .targets
        .iter()
        .map(|t| EvmAddress::parse(t))
        .collect::<Result<Vec<_>, _>>()
        .map_err(reject)?;

    if let Some(session) = req.session_id {
        let event = match (req.operation, token) {
            (TxOperation::Approve, Some(token)) => Some(WizardEvent::ApprovalSubmitted { token, tx_hash }),
            (TxOperation::Approve, None) => {
                return Err(reject(ProtocolError::InvalidAddress {
                    address: "approval watch needs the approved token".to_string(),
                }))
            }
            (TxOperation::Configure, _) => Some(WizardEvent::SubmissionSent { tx_hash }),
            _ => None,
        };
        if let Some(event) = event {
            state
                .with_wizard(session, |w| w.apply(event, unix_now()))
                .await
                .map_err(reject)?;
        }
    }

    let description = match req.description.trim() {
        "" => format!("{} {}", req.operation.as_str(), tx_hash),
        d => d.to_string(),
    };
    let item = WatchItem::new(tx_hash, account, req.operation, description, req.session_id, token)
        .with_targets(targets);
    let id = tx_watcher::watch(&state, item).await;
    Ok(Json(WatchResponse { id }))
}

/// GET /tx - Transactions still awaiting a receipt
pub async fn list_watched(State(state): State<AppState>) -> Json<Vec<WatchedTxInfo>> {
    Json(state.tx_watcher().watched_items().await)
}

/// GET /tx/:id - Status of one watched transaction
pub async fn get_watched(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WatchedTxInfo> {
    state
        .tx_watcher()
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| reject(AppError::WatchNotFound(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::routes::test_support::{
        call_parts, mock_rpc, offline_state, receipt, returns, send, state_with_rpc,
    };
    use alloy_primitives::U256;
    use alloy_sol_types::SolCall;
    use evm_tx::IERC20;
    use serde_json::{json, Value};

    const FROM: &str = "0x2222222222222222222222222222222222222222";
    const USDC: &str = "0xddafbb505ad214d7b80b1f830fccc89b60fb7a83";

    /// Endpoint whose USDC allowance and receipts switch once `mined` is set
    async fn chain(mined: Arc<AtomicBool>, allowance_before: U256, succeeded: bool) -> String {
        mock_rpc(move |method, params| {
            let mined = mined.load(Ordering::SeqCst);
            match method {
                "eth_call" => {
                    let (_, data) = call_parts(params);
                    (data[..4] == IERC20::allowanceCall::SELECTOR).then(|| {
                        let allowance = if mined { U256::MAX } else { allowance_before };
                        returns::<IERC20::allowanceCall>(&(allowance,))
                    })
                }
                "eth_getTransactionReceipt" if mined => Some(receipt(params, succeeded)),
                "eth_getTransactionReceipt" => Some(Value::Null),
                "eth_getTransactionByHash" => Some(json!({ "hash": params[0] })),
                _ => None,
            }
        })
        .await
    }

    async fn wizard_action(state: &AppState, id: &str, action: Value) -> Value {
        let (status, body) = send(
            create_router(state.clone()),
            "POST",
            &format!("/wizard/{}/action", id),
            Some(action),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    /// Open a session and walk it to the approval step for 100 USDC
    async fn walk_to_approval(state: &AppState) -> (String, Value) {
        let (status, body) = send(
            create_router(state.clone()),
            "POST",
            "/wizard",
            Some(json!({ "account": FROM, "load_existing": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap().to_string();

        wizard_action(state, &id, json!({ "action": "configure" })).await;
        wizard_action(state, &id, json!({ "action": "add-token", "token": USDC, "amount": "100" })).await;
        wizard_action(state, &id, json!({ "action": "continue" })).await;
        wizard_action(state, &id, json!({ "action": "select-period", "preset": 86400 })).await;
        let body = wizard_action(state, &id, json!({ "action": "select-activation", "asap": true })).await;
        (id, body)
    }

    async fn watch_tx(state: &AppState, session: &str, operation: &str, hash_byte: &str) -> String {
        let (status, body) = send(
            create_router(state.clone()),
            "POST",
            "/tx/watch",
            Some(json!({
                "tx_hash": format!("0x{}", hash_byte.repeat(32)),
                "account": FROM,
                "operation": operation,
                "session_id": session,
                "token": USDC,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_build_revoke() {
        let app = create_router(offline_state());
        let (status, body) = send(app, "POST", "/tx/build/revoke", Some(json!({ "from": FROM }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["to"], "0x1111111111111111111111111111111111111111");
        assert_eq!(body["from"], FROM);
        assert_eq!(body["chainId"], 100);
    }

    #[tokio::test]
    async fn test_build_approve_scales_amount() {
        let app = create_router(offline_state());
        let (status, body) = send(
            app,
            "POST",
            "/tx/build/approve",
            Some(json!({
                "from": FROM,
                "token": "0xddafbb505ad214d7b80b1f830fccc89b60fb7a83",
                "amount": "0",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_amount");
    }

    #[tokio::test]
    async fn test_empty_user_list_rejected_before_role_check() {
        let app = create_router(offline_state());
        let (status, body) = send(
            app,
            "POST",
            "/tx/build/batch",
            Some(json!({
                "from": FROM,
                "users": " , ",
                "token": "0xddafbb505ad214d7b80b1f830fccc89b60fb7a83",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_address");
    }

    #[tokio::test]
    async fn test_role_check_needs_endpoint() {
        let app = create_router(offline_state());
        let (status, _) = send(app, "POST", "/tx/build/pause", Some(json!({ "from": FROM }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_watch_and_lookup() {
        let state = offline_state();
        let (status, body) = send(
            create_router(state.clone()),
            "POST",
            "/tx/watch",
            Some(json!({
                "tx_hash": format!("0x{}", "ab".repeat(32)),
                "account": FROM,
                "operation": "revoke",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(create_router(state.clone()), "GET", &format!("/tx/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["operation"], "revoke");

        let (_, body) = send(create_router(state), "GET", "/tx", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_rejects_bad_hash() {
        let app = create_router(offline_state());
        let (status, body) = send(
            app,
            "POST",
            "/tx/watch",
            Some(json!({ "tx_hash": "0x12", "account": FROM, "operation": "revoke" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_tx_hash");
    }

    #[tokio::test]
    async fn test_confirmed_approval_advances_to_summary() {
        let mined = Arc::new(AtomicBool::new(false));
        let url = chain(mined.clone(), U256::ZERO, true).await;
        let state = state_with_rpc(&url);

        let (id, body) = walk_to_approval(&state).await;
        assert_eq!(body["step"], "approval");
        assert_eq!(body["transactions"].as_array().unwrap().len(), 1);

        let watch_id = watch_tx(&state, &id, "approve", "cd").await;
        let (_, body) = send(create_router(state.clone()), "GET", &format!("/wizard/{}", id), None).await;
        assert_eq!(body["step"], "approval");
        // The submitted approval is not offered again
        assert!(body["transactions"].as_array().unwrap().is_empty());

        // Still pending on chain
        assert!(tx_watcher::poll_once(&state).await);
        let (_, body) = send(create_router(state.clone()), "GET", &format!("/tx/{}", watch_id), None).await;
        assert_eq!(body["status"], "pending");

        mined.store(true, Ordering::SeqCst);
        assert!(tx_watcher::poll_once(&state).await);

        let (_, body) = send(create_router(state.clone()), "GET", &format!("/tx/{}", watch_id), None).await;
        assert_eq!(body["status"], "confirmed");
        assert_eq!(body["block_number"], 17);

        let (_, body) = send(create_router(state.clone()), "GET", &format!("/wizard/{}", id), None).await;
        assert_eq!(body["step"], "summary");
        assert!(body["state"]["error"].is_null());

        // Nothing left to watch stops the loop
        assert!(!tx_watcher::poll_once(&state).await);
    }

    #[tokio::test]
    async fn test_reverted_configure_returns_to_summary() {
        let mined = Arc::new(AtomicBool::new(false));
        let url = chain(mined.clone(), U256::MAX, false).await;
        let state = state_with_rpc(&url);

        // Allowance already sufficient, so approval is skipped
        let (id, body) = walk_to_approval(&state).await;
        assert_eq!(body["step"], "summary");

        let body = wizard_action(&state, &id, json!({ "action": "submit" })).await;
        assert_eq!(body["step"], "complete");
        assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
        assert_eq!(body["transactions"][0]["to"], "0x1111111111111111111111111111111111111111");

        let watch_id = watch_tx(&state, &id, "configure", "ef").await;
        let (_, body) = send(create_router(state.clone()), "GET", &format!("/wizard/{}", id), None).await;
        assert_eq!(body["state"]["status"], "pending");

        mined.store(true, Ordering::SeqCst);
        tx_watcher::poll_once(&state).await;

        let (_, body) = send(create_router(state.clone()), "GET", &format!("/tx/{}", watch_id), None).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["error"], "transaction reverted");

        let (_, body) = send(create_router(state), "GET", &format!("/wizard/{}", id), None).await;
        assert_eq!(body["step"], "summary");
        assert_eq!(body["state"]["error"], "transaction reverted");
        assert_eq!(body["state"]["draft"]["tokens"][0]["token"], USDC);
    }
}
