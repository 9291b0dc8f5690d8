//! Background transaction watcher
//!
//! Polls the RPC endpoint for receipts of wallet-broadcast transactions.
//! When one resolves, cached reads for the sender and for every account the
//! write touched are invalidated, and the linked wizard session (if any) is
//! moved forward.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use evm_rpc_client::RpcClient;
use r2r_core::{EvmAddress, TxHash};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::sessions;
use crate::state::{unix_now, AppState};

/// Items older than this are timed out and removed.
const TIMEOUT: Duration = Duration::from_secs(40 * 60);

/// Finished items kept for status lookups
const MAX_FINISHED: usize = 256;

/// The write a watched transaction performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxOperation {
    Configure,
    Approve,
    Revoke,
    #[serde(rename = "rent2repay")]
    Rent2Repay,
    #[serde(rename = "batch-rent2repay")]
    BatchRent2Repay,
    AuthorizeTokenPair,
    UnauthorizeToken,
    RemoveUser,
    Pause,
    Unpause,
}

impl TxOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Approve => "approve",
            Self::Revoke => "revoke",
            Self::Rent2Repay => "rent2repay",
            Self::BatchRent2Repay => "batch-rent2repay",
            Self::AuthorizeTokenPair => "authorize-token-pair",
            Self::UnauthorizeToken => "unauthorize-token",
            Self::RemoveUser => "remove-user",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }

    /// Writes that change contract-wide state
    pub fn touches_contract(&self) -> bool {
        matches!(
            self,
            Self::AuthorizeTokenPair | Self::UnauthorizeToken | Self::Pause | Self::Unpause
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Pending,
    Confirmed,
    Failed,
    Dropped,
    Timeout,
}

/// Registration of a broadcast transaction
#[derive(Debug, Clone, Deserialize)]
pub struct WatchRequest {
    pub tx_hash: String,
    pub account: String,
    pub operation: TxOperation,
    #[serde(default)]
    pub description: String,
    /// Wizard session to drive on resolution
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Token approved, for approval transactions
    #[serde(default)]
    pub token: Option<String>,
    /// Other accounts whose state the write changes: the removed user, the
    /// repaid user, or every user of a batch
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WatchItem {
    pub id: Uuid,
    pub tx_hash: TxHash,
    pub account: EvmAddress,
    pub operation: TxOperation,
    pub description: String,
    pub session_id: Option<Uuid>,
    pub token: Option<EvmAddress>,
    pub targets: Vec<EvmAddress>,
    submitted_at: Instant,
}

impl WatchItem {
    pub fn new(
        tx_hash: TxHash,
        account: EvmAddress,
        operation: TxOperation,
        description: String,
        session_id: Option<Uuid>,
        token: Option<EvmAddress>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_hash,
            account,
            operation,
            description,
            session_id,
            token,
            targets: Vec::new(),
            submitted_at: Instant::now(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<EvmAddress>) -> Self {
        self.targets = targets;
        self
    }

    /// Every account whose cached reads the write makes stale
    pub fn affected_accounts(&self) -> Vec<EvmAddress> {
        let mut accounts = vec![self.account];
        for target in &self.targets {
            if !accounts.contains(target) {
                accounts.push(*target);
            }
        }
        accounts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedTxInfo {
    pub id: Uuid,
    pub tx_hash: TxHash,
    pub account: EvmAddress,
    pub operation: TxOperation,
    pub description: String,
    pub session_id: Option<Uuid>,
    pub status: WatchStatus,
    pub block_number: Option<u64>,
    pub error: Option<String>,
    pub elapsed_secs: u64,
    /// Unix seconds when the status was last decided
    pub updated_at: u64,
}

impl WatchedTxInfo {
    fn pending(item: &WatchItem) -> Self {
        Self {
            id: item.id,
            tx_hash: item.tx_hash,
            account: item.account,
            operation: item.operation,
            description: item.description.clone(),
            session_id: item.session_id,
            status: WatchStatus::Pending,
            block_number: None,
            error: None,
            elapsed_secs: item.submitted_at.elapsed().as_secs(),
            updated_at: unix_now(),
        }
    }
}

/// A watched item that left the pending state
#[derive(Debug, Clone)]
pub struct Resolution {
    pub item: WatchItem,
    pub status: WatchStatus,
    pub block_number: Option<u64>,
    pub error: Option<String>,
}

impl Resolution {
    fn new(item: &WatchItem, status: WatchStatus) -> Self {
        Self {
            item: item.clone(),
            status,
            block_number: None,
            error: None,
        }
    }

    fn info(&self) -> WatchedTxInfo {
        WatchedTxInfo {
            status: self.status,
            block_number: self.block_number,
            error: self.error.clone(),
            ..WatchedTxInfo::pending(&self.item)
        }
    }

    /// Message shown inline when the write did not confirm
    pub fn failure_message(&self) -> Option<String> {
        match self.status {
            WatchStatus::Pending | WatchStatus::Confirmed => None,
            WatchStatus::Failed => Some(
                self.error
                    .clone()
                    .unwrap_or_else(|| "transaction reverted".to_string()),
            ),
            WatchStatus::Dropped => Some("transaction dropped from the mempool".to_string()),
            WatchStatus::Timeout => Some("transaction not confirmed in time".to_string()),
        }
    }
}

// ─── TxWatcher ───────────────────────────────────────────────────────────────

pub struct TxWatcher {
    items: Vec<WatchItem>,
    finished: HashMap<Uuid, WatchedTxInfo>,
    /// Finished ids, oldest first
    finished_order: VecDeque<Uuid>,
    timeout: Duration,
}

impl Default for TxWatcher {
    fn default() -> Self {
        Self::new(TIMEOUT)
    }
}

impl TxWatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            items: Vec::new(),
            finished: HashMap::new(),
            finished_order: VecDeque::new(),
            timeout,
        }
    }

    pub fn add(&mut self, item: WatchItem) -> Uuid {
        let id = item.id;
        tracing::info!(
            id = %id,
            tx_hash = %item.tx_hash,
            account = %item.account,
            operation = item.operation.as_str(),
            "Watching transaction"
        );
        self.items.push(item);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<WatchedTxInfo> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .map(WatchedTxInfo::pending)
            .or_else(|| self.finished.get(&id).cloned())
    }

    pub fn watched_items(&self) -> Vec<WatchedTxInfo> {
        self.items.iter().map(WatchedTxInfo::pending).collect()
    }

    /// Time out items older than the watch window
    pub fn expire(&mut self) -> Vec<Resolution> {
        let expired: Vec<Resolution> = self
            .items
            .iter()
            .filter(|item| item.submitted_at.elapsed() > self.timeout)
            .map(|item| Resolution::new(item, WatchStatus::Timeout))
            .collect();
        for resolution in &expired {
            self.finish(resolution);
        }
        expired
    }

    /// Check every pending item once and return those that resolved
    pub async fn poll(&mut self, client: &RpcClient) -> Vec<Resolution> {
        let mut resolved = self.expire();
        let mut mined = Vec::new();

        for item in &self.items {
            match client.transaction_receipt(&item.tx_hash).await {
                Ok(Some(receipt)) => {
                    let status = if receipt.succeeded() {
                        WatchStatus::Confirmed
                    } else {
                        WatchStatus::Failed
                    };
                    mined.push(Resolution {
                        block_number: receipt.block_number(),
                        error: (status == WatchStatus::Failed)
                            .then(|| "transaction reverted".to_string()),
                        ..Resolution::new(item, status)
                    });
                }
                Ok(None) => match client.transaction_known(&item.tx_hash).await {
                    // Neither mined nor in the mempool
                    Ok(false) => mined.push(Resolution::new(item, WatchStatus::Dropped)),
                    Ok(true) => {}
                    Err(e) => {
                        tracing::debug!(tx_hash = %item.tx_hash, error = %e, "Mempool lookup failed")
                    }
                },
                Err(e) => {
                    tracing::debug!(tx_hash = %item.tx_hash, error = %e, "Receipt lookup failed");
                }
            }
        }

        for resolution in &mined {
            self.finish(resolution);
        }
        resolved.extend(mined);
        resolved
    }

    fn finish(&mut self, resolution: &Resolution) {
        let id = resolution.item.id;
        self.items.retain(|item| item.id != id);
        while self.finished_order.len() >= MAX_FINISHED {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
        self.finished_order.push_back(id);
        self.finished.insert(id, resolution.info());
        tracing::info!(
            id = %id,
            tx_hash = %resolution.item.tx_hash,
            status = ?resolution.status,
            "Transaction resolved"
        );
    }
}

// ─── Shared state ────────────────────────────────────────────────────────────

pub struct TxWatcherState {
    watcher: Mutex<TxWatcher>,
    polling: AtomicBool,
}

impl Default for TxWatcherState {
    fn default() -> Self {
        Self {
            watcher: Mutex::new(TxWatcher::default()),
            polling: AtomicBool::new(false),
        }
    }
}

impl TxWatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<WatchedTxInfo> {
        self.watcher.lock().await.get(id)
    }

    pub async fn watched_items(&self) -> Vec<WatchedTxInfo> {
        self.watcher.lock().await.watched_items()
    }
}

/// Register `item` and make sure the poll loop runs
pub async fn watch(state: &AppState, item: WatchItem) -> Uuid {
    let id = state.tx_watcher().watcher.lock().await.add(item);
    ensure_poll_loop(state.clone());
    id
}

fn ensure_poll_loop(state: AppState) {
    if state.tx_watcher().polling.swap(true, Ordering::SeqCst) {
        return; // Already running
    }

    tokio::spawn(async move {
        loop {
            let interval = Duration::from_secs(state.config().await.tx_poll_interval_secs);
            tokio::time::sleep(interval).await;

            if !poll_once(&state).await {
                break;
            }
        }

        tracing::debug!("TxWatcher poll loop stopped (no items)");
    });
}

/// One polling round. Returns false once nothing is left to watch.
///
/// Without an RPC client only the timeout sweep runs.
pub(crate) async fn poll_once(state: &AppState) -> bool {
    let client = state.rpc_client().await;

    let resolved = {
        let watcher_state = state.tx_watcher();
        let mut watcher = watcher_state.watcher.lock().await;
        if watcher.is_empty() {
            // Cleared under the lock so a concurrent `watch` restarts the loop
            watcher_state.polling.store(false, Ordering::SeqCst);
            return false;
        }
        match &client {
            Some(client) => watcher.poll(client).await,
            None => watcher.expire(),
        }
    };

    for resolution in resolved {
        apply_resolution(state, resolution).await;
    }
    true
}

async fn apply_resolution(state: &AppState, resolution: Resolution) {
    let item = &resolution.item;
    for account in item.affected_accounts() {
        state.invalidate_account(account).await;
    }

    if item.operation.touches_contract() {
        if let Ok(contract) = state.contract().await {
            state.invalidate_contract(contract).await;
        }
    }

    if let Some(session_id) = item.session_id {
        sessions::on_tx_resolved(state, session_id, &resolution).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::offline_state;
    use alloy_primitives::Address;
    use evm_rpc_client::CacheKey;
    use r2r_core::RpcConfig;

    fn addr(byte: u8) -> EvmAddress {
        EvmAddress::from(Address::repeat_byte(byte))
    }

    fn item(operation: TxOperation) -> WatchItem {
        WatchItem::new(
            TxHash::parse(&format!("0x{}", "ab".repeat(32))).unwrap(),
            EvmAddress::ZERO,
            operation,
            "test".to_string(),
            None,
            None,
        )
    }

    #[test]
    fn test_add_and_lookup() {
        let mut watcher = TxWatcher::default();
        let id = watcher.add(item(TxOperation::Revoke));
        let info = watcher.get(id).unwrap();
        assert_eq!(info.status, WatchStatus::Pending);
        assert_eq!(watcher.watched_items().len(), 1);
        assert!(watcher.get(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_timeout_resolves_without_rpc() {
        let config = RpcConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
        };
        let client = RpcClient::new_unchecked(config, 100).unwrap();
        let mut watcher = TxWatcher::new(Duration::ZERO);
        let id = watcher.add(item(TxOperation::Configure));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let resolved = watcher.poll(&client).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, WatchStatus::Timeout);
        assert!(resolved[0].failure_message().is_some());
        assert!(watcher.is_empty());
        assert_eq!(watcher.get(id).unwrap().status, WatchStatus::Timeout);
    }

    #[test]
    fn test_failure_messages() {
        let confirmed = Resolution::new(&item(TxOperation::Approve), WatchStatus::Confirmed);
        assert!(confirmed.failure_message().is_none());
        let failed = Resolution::new(&item(TxOperation::Approve), WatchStatus::Failed);
        assert_eq!(failed.failure_message().as_deref(), Some("transaction reverted"));
    }

    #[test]
    fn test_contract_wide_operations() {
        assert!(TxOperation::Pause.touches_contract());
        assert!(!TxOperation::Configure.touches_contract());
        let op: TxOperation = serde_json::from_str("\"batch-rent2repay\"").unwrap();
        assert_eq!(op, TxOperation::BatchRent2Repay);
    }

    #[test]
    fn test_affected_accounts_include_targets() {
        let batch = item(TxOperation::BatchRent2Repay).with_targets(vec![
            addr(0x33),
            addr(0x44),
            EvmAddress::ZERO,
        ]);
        assert_eq!(
            batch.affected_accounts(),
            vec![EvmAddress::ZERO, addr(0x33), addr(0x44)]
        );
        assert_eq!(item(TxOperation::Revoke).affected_accounts(), vec![EvmAddress::ZERO]);
    }

    #[tokio::test]
    async fn test_resolution_invalidates_target_accounts() {
        let state = offline_state();
        let contract = state.contract().await.unwrap();
        let client = state.rpc_client().await.unwrap();
        let removed = CacheKey::account(contract, addr(0x33));
        let bystander = CacheKey::account(contract, addr(0x44));
        client.cache().insert(removed, vec![1], vec![9]).await;
        client.cache().insert(bystander, vec![1], vec![9]).await;

        let item = WatchItem::new(
            TxHash::parse(&format!("0x{}", "cd".repeat(32))).unwrap(),
            addr(0x22),
            TxOperation::RemoveUser,
            "remove user".to_string(),
            None,
            None,
        )
        .with_targets(vec![addr(0x33)]);
        apply_resolution(
            &state,
            Resolution {
                item,
                status: WatchStatus::Confirmed,
                block_number: Some(12),
                error: None,
            },
        )
        .await;

        assert_eq!(client.cache().get(&removed, &[1]).await, None);
        assert_eq!(client.cache().get(&bystander, &[1]).await, Some(vec![9]));
    }

    #[tokio::test]
    async fn test_expire_without_client() {
        let mut watcher = TxWatcher::new(Duration::ZERO);
        watcher.add(item(TxOperation::Approve));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let expired = watcher.expire();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, WatchStatus::Timeout);
        assert!(watcher.is_empty());
    }

    #[tokio::test]
    async fn test_finished_history_evicts_oldest() {
        let mut watcher = TxWatcher::new(Duration::ZERO);
        let ids: Vec<Uuid> = (0..=MAX_FINISHED)
            .map(|_| watcher.add(item(TxOperation::Revoke)))
            .collect();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(watcher.expire().len(), MAX_FINISHED + 1);
        assert!(watcher.get(ids[0]).is_none());
        assert_eq!(watcher.get(ids[1]).unwrap().status, WatchStatus::Timeout);
        assert_eq!(watcher.get(ids[MAX_FINISHED]).unwrap().status, WatchStatus::Timeout);
        assert_eq!(watcher.finished.len(), MAX_FINISHED);
    }
}
