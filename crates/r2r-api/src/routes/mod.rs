//! API route handlers

pub mod contract;
pub mod health;
pub mod node;
pub mod tx;
pub mod users;
pub mod wizard;

use axum::{routing::get, Router};

use crate::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/node", node::router())
        .nest("/contract", contract::router())
        .nest("/users", users::router())
        .nest("/wizard", wizard::router())
        .nest("/tx", tx::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use alloy_sol_types::{SolCall, SolType};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::post,
        Json, Router,
    };
    use r2r_core::{AppConfig, EvmAddress, RpcConfig};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::AppState;

    pub const CONTRACT: &str = "0x1111111111111111111111111111111111111111";

    /// State with a contract configured and the given endpoint.
    ///
    /// Tests drive receipt polling through `tx_watcher::poll_once`.
    pub fn state_with_rpc(url: &str) -> AppState {
        AppState::with_config(config_with_rpc(url))
    }

    pub fn config_with_rpc(url: &str) -> AppConfig {
        AppConfig {
            rpc: RpcConfig {
                url: url.to_string(),
                timeout_secs: 1,
            },
            contract_address: Some(EvmAddress::parse(CONTRACT).unwrap()),
            tx_poll_interval_secs: 3600,
            ..AppConfig::default()
        }
    }

    /// State with a contract configured and an endpoint nothing listens on
    pub fn offline_state() -> AppState {
        state_with_rpc("http://127.0.0.1:1")
    }

    /// Local JSON-RPC endpoint serving Gnosis Chain (id 100), synced.
    ///
    /// Every other method goes to `handler`; `None` answers with a
    /// JSON-RPC error.
    pub async fn mock_rpc<F>(handler: F) -> String
    where
        F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let app = Router::new().route(
            "/",
            post(move |Json(request): Json<Value>| {
                let handler = handler.clone();
                async move {
                    let method = request["method"].as_str().unwrap_or_default();
                    let result = match method {
                        "eth_chainId" => Some(json!("0x64")),
                        "eth_blockNumber" => Some(json!("0x10")),
                        "eth_syncing" => Some(json!(false)),
                        _ => handler.as_ref()(method, &request["params"]),
                    };
                    Json(match result {
                        Some(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
                        None => json!({
                            "jsonrpc": "2.0",
                            "id": request["id"],
                            "error": { "code": -32601, "message": format!("{} not stubbed", method) },
                        }),
                    })
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        url
    }

    /// Target and calldata of an `eth_call`
    pub fn call_parts(params: &Value) -> (EvmAddress, Vec<u8>) {
        let to = EvmAddress::parse(params[0]["to"].as_str().unwrap()).unwrap();
        let data = params[0]["data"].as_str().unwrap().trim_start_matches("0x");
        (to, hex::decode(data).unwrap())
    }

    /// `eth_call` result for `C` returning `ret`
    pub fn returns<'a, C: SolCall>(ret: &'a <C::ReturnTuple<'a> as SolType>::RustType) -> Value {
        json!(format!("0x{}", hex::encode(C::abi_encode_returns(ret))))
    }

    /// Mined receipt for the hash in `params`
    pub fn receipt(params: &Value, succeeded: bool) -> Value {
        let status = if succeeded { "0x1" } else { "0x0" };
        json!({
            "transactionHash": params[0],
            "blockNumber": "0x11",
            "status": status,
        })
    }

    pub async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
