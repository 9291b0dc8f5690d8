//! Read cache for `eth_call` results
//!
//! Entries are grouped by (target contract, account) and then keyed by
//! calldata. Nothing is refetched implicitly: callers invalidate an account
//! after one of its writes confirms, or bypass the cache on demand.
//! A maximum age bounds how long a forgotten entry can be served.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use r2r_core::EvmAddress;
use tokio::sync::RwLock;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(120);

/// Cache partition: a contract and, for per-user reads, the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub target: EvmAddress,
    pub account: Option<EvmAddress>,
}

impl CacheKey {
    /// Contract-wide read (fees, pause flag, ...)
    pub fn contract(target: EvmAddress) -> Self {
        Self {
            target,
            account: None,
        }
    }

    /// Read scoped to one account (balances, allowances, user config, ...)
    pub fn account(target: EvmAddress, account: EvmAddress) -> Self {
        Self {
            target,
            account: Some(account),
        }
    }
}

struct CachedRead {
    data: Vec<u8>,
    fetched_at: Instant,
}

pub struct ReadCache {
    entries: RwLock<HashMap<CacheKey, HashMap<Vec<u8>, CachedRead>>>,
    max_age: Duration,
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl ReadCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    pub async fn get(&self, key: &CacheKey, calldata: &[u8]) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        let cached = entries.get(key)?.get(calldata)?;
        if cached.fetched_at.elapsed() > self.max_age {
            return None;
        }
        Some(cached.data.clone())
    }

    pub async fn insert(&self, key: CacheKey, calldata: Vec<u8>, data: Vec<u8>) {
        let mut entries = self.entries.write().await;
        entries.entry(key).or_default().insert(
            calldata,
            CachedRead {
                data,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop one partition
    pub async fn invalidate(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }

    /// Drop every partition scoped to `account`, across all targets.
    /// Returns the number of partitions removed.
    pub async fn invalidate_account(&self, account: &EvmAddress) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.account.as_ref() != Some(account));
        before - entries.len()
    }

    /// Number of cached calls across all partitions
    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.values().map(HashMap::len).sum()
    }
}
