//! Application state shared across API handlers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{http::StatusCode, Json};
use evm_rpc_client::RpcClient;
use r2r_core::{AppConfig, EvmAddress, ProtocolError, RpcConfig, RpcError, TxError};
use rent2repay::{resolve_capabilities, Capabilities, Rent2RepayTxBuilder, Wizard, WizardError};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dto::ApiError;
use crate::tx_watcher::TxWatcherState;

/// Errors that can occur in the API layer
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] r2r_core::Error),

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error("Wizard session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Watched transaction {0} not found")]
    WatchNotFound(Uuid),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.error_code(),
            Self::Wizard(e) => e.error_code(),
            Self::SessionNotFound(_) | Self::WatchNotFound(_) => "not_found",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        let code = match self {
            Self::Core(e) => e.status_code(),
            Self::Wizard(e) => e.status_code(),
            Self::SessionNotFound(_) | Self::WatchNotFound(_) => 404,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ProtocolError> for AppError {
    fn from(e: ProtocolError) -> Self {
        Self::Core(e.into())
    }
}

impl From<RpcError> for AppError {
    fn from(e: RpcError) -> Self {
        Self::Core(e.into())
    }
}

impl From<TxError> for AppError {
    fn from(e: TxError) -> Self {
        Self::Core(e.into())
    }
}

impl From<AppError> for (StatusCode, Json<ApiError>) {
    fn from(e: AppError) -> Self {
        let status = e.status_code();
        if status.is_server_error() {
            tracing::warn!(code = e.error_code(), error = %e, "Request failed");
        }
        (status, Json(ApiError::new(e.error_code(), e.to_string())))
    }
}

/// Map any handler error into the JSON error response
pub fn reject(e: impl Into<AppError>) -> (StatusCode, Json<ApiError>) {
    e.into().into()
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RwLock<AppConfig>,
    rpc_client: RwLock<Option<RpcClient>>,
    capabilities: RwLock<HashMap<EvmAddress, Capabilities>>,
    wizards: RwLock<HashMap<Uuid, Wizard>>,
    tx_watcher: TxWatcherState,
}

impl AppState {
    /// Create a new application state with default config
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Create with a specific config
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config: RwLock::new(config),
                rpc_client: RwLock::new(None),
                capabilities: RwLock::new(HashMap::new()),
                wizards: RwLock::new(HashMap::new()),
                tx_watcher: TxWatcherState::new(),
            }),
        }
    }

    /// Get current config
    pub async fn config(&self) -> AppConfig {
        self.inner.config.read().await.clone()
    }

    /// Update the RPC endpoint. Cached reads and roles came from the old
    /// endpoint and are dropped with it.
    pub async fn set_rpc_config(&self, rpc: RpcConfig) {
        let mut config = self.inner.config.write().await;
        config.rpc = rpc;

        let mut client = self.inner.rpc_client.write().await;
        *client = None;
        self.inner.capabilities.write().await.clear();
    }

    /// Get or create the RPC client
    pub async fn rpc_client(&self) -> Option<RpcClient> {
        {
            let client = self.inner.rpc_client.read().await;
            if client.is_some() {
                return client.clone();
            }
        }

        let config = self.inner.config.read().await;
        tracing::info!(url = %config.rpc.url, "Creating RPC client");
        match RpcClient::new(config.rpc.clone(), config.chain_id()).await {
            Ok(client) => {
                let mut cached = self.inner.rpc_client.write().await;
                *cached = Some(client.clone());
                Some(client)
            }
            Err(e) => {
                tracing::warn!(url = %config.rpc.url, error = %e, "Failed to create RPC client");
                None
            }
        }
    }

    /// Force refresh the RPC client
    pub async fn refresh_rpc_client(&self) -> Option<RpcClient> {
        let mut client = self.inner.rpc_client.write().await;
        *client = None;
        drop(client);

        self.rpc_client().await
    }

    /// RPC client for a read, or 503 when the endpoint is unusable
    pub async fn require_client(&self) -> Result<RpcClient, AppError> {
        let client = self
            .rpc_client()
            .await
            .ok_or_else(|| ProtocolError::StateUnavailable {
                reason: "RPC endpoint not configured".to_string(),
            })?;

        // A failed check is retried so the endpoint can come back
        if !matches!(client.capabilities().await, Some(caps) if caps.can_read()) {
            client.refresh_capabilities().await;
        }

        if let Some(caps) = client.capabilities().await {
            if !caps.is_online {
                return Err(RpcError::Unreachable {
                    url: client.config().url.clone(),
                }
                .into());
            }
            if let (false, Some(actual)) = (caps.chain_matches, caps.chain_id) {
                return Err(RpcError::ChainMismatch {
                    expected: client.expected_chain_id(),
                    actual,
                }
                .into());
            }
        }
        Ok(client)
    }

    /// Configured Rent2Repay contract
    pub async fn contract(&self) -> Result<EvmAddress, AppError> {
        Ok(self.inner.config.read().await.contract()?)
    }

    /// Transaction builder for the configured deployment
    pub async fn tx_builder(&self) -> Result<Rent2RepayTxBuilder, AppError> {
        let config = self.inner.config.read().await;
        Ok(Rent2RepayTxBuilder::new(config.contract()?, config.chain_id()))
    }

    /// Roles held by `account`, cached until refreshed
    pub async fn capabilities(
        &self,
        account: EvmAddress,
        refresh: bool,
    ) -> Result<Capabilities, AppError> {
        if !refresh {
            if let Some(caps) = self.inner.capabilities.read().await.get(&account) {
                return Ok(*caps);
            }
        }

        let contract = self.contract().await?;
        let client = self.require_client().await?;
        if refresh {
            client
                .cache()
                .invalidate(&evm_rpc_client::CacheKey::account(contract, account))
                .await;
        }
        let caps = resolve_capabilities(&client, contract, account).await?;
        self.inner.capabilities.write().await.insert(account, caps);
        Ok(caps)
    }

    /// Drop cached reads scoped to `account` before a forced refresh
    pub async fn invalidate_account(&self, account: EvmAddress) {
        if let Some(client) = self.inner.rpc_client.read().await.as_ref() {
            let removed = client.cache().invalidate_account(&account).await;
            tracing::debug!(account = %account, removed, "Invalidated cached reads");
        }
    }

    /// Drop contract-wide cached reads (fees, pause flag)
    pub async fn invalidate_contract(&self, contract: EvmAddress) {
        if let Some(client) = self.inner.rpc_client.read().await.as_ref() {
            client
                .cache()
                .invalidate(&evm_rpc_client::CacheKey::contract(contract))
                .await;
        }
    }

    // Wizard sessions

    pub async fn create_wizard(&self, account: EvmAddress) -> Uuid {
        let catalog = self.inner.config.read().await.tokens.clone();
        let id = Uuid::new_v4();
        self.inner
            .wizards
            .write()
            .await
            .insert(id, Wizard::new(account, catalog));
        tracing::info!(session = %id, account = %account, "Wizard session started");
        id
    }

    /// Snapshot of a session
    pub async fn wizard(&self, id: Uuid) -> Result<Wizard, AppError> {
        self.inner
            .wizards
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppError::SessionNotFound(id))
    }

    /// Run `f` against a session under the session-map write lock
    pub async fn with_wizard<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Wizard) -> Result<T, WizardError>,
    ) -> Result<T, AppError> {
        let mut wizards = self.inner.wizards.write().await;
        let wizard = wizards.get_mut(&id).ok_or(AppError::SessionNotFound(id))?;
        Ok(f(wizard)?)
    }

    pub async fn remove_wizard(&self, id: Uuid) -> bool {
        self.inner.wizards.write().await.remove(&id).is_some()
    }

    pub fn tx_watcher(&self) -> &TxWatcherState {
        &self.inner.tx_watcher
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
