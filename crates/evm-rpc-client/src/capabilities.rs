//! Chain capability detection
//!
//! Detects whether the endpoint is online, which chain it serves and
//! whether it is still syncing.

use serde::{Deserialize, Serialize};

use crate::RpcClient;

/// Capability tier based on endpoint status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SyncTier {
    /// Online, on the expected chain and synced - all reads are trustworthy
    Synced,
    /// Online but catching up - reads may be stale
    Syncing,
    /// Unreachable or serving a different chain
    Unavailable,
}

impl SyncTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::Syncing => "Syncing",
            Self::Unavailable => "Unavailable",
        }
    }
}

/// Endpoint capabilities detected through probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainCapabilities {
    /// Endpoint is reachable and responding
    pub is_online: bool,

    /// Chain id reported by `eth_chainId`
    pub chain_id: Option<u64>,

    /// Reported chain id equals the configured one
    pub chain_matches: bool,

    /// Latest block number
    pub block_number: u64,

    /// `eth_syncing` reported progress
    pub syncing: bool,

    pub tier: SyncTier,
}

impl ChainCapabilities {
    pub fn offline() -> Self {
        Self {
            is_online: false,
            chain_id: None,
            chain_matches: false,
            block_number: 0,
            syncing: false,
            tier: SyncTier::Unavailable,
        }
    }

    /// Classify the capability check results
    pub fn from_checks(chain_id: u64, expected_chain_id: u64, block_number: u64, syncing: bool) -> Self {
        let chain_matches = chain_id == expected_chain_id;
        let tier = match (chain_matches, syncing) {
            (false, _) => SyncTier::Unavailable,
            (true, true) => SyncTier::Syncing,
            (true, false) => SyncTier::Synced,
        };
        Self {
            is_online: true,
            chain_id: Some(chain_id),
            chain_matches,
            block_number,
            syncing,
            tier,
        }
    }

    /// Reads can be served from this endpoint
    pub fn can_read(&self) -> bool {
        self.is_online && self.chain_matches
    }
}

/// Detect endpoint capabilities from chain id, head and sync status
pub async fn detect_capabilities(client: &RpcClient) -> ChainCapabilities {
    let (chain_id, block_number, syncing) = tokio::join!(
        client.chain_id(),
        client.block_number(),
        client.is_syncing()
    );

    let (chain_id, block_number) = match (chain_id, block_number) {
        (Ok(c), Ok(b)) => (c, b),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(url = %client.config().url, error = %e, "RPC capability check failed");
            return ChainCapabilities::offline();
        }
    };

    // Some public endpoints disable eth_syncing; treat that as synced
    let syncing = syncing.unwrap_or(false);

    ChainCapabilities::from_checks(chain_id, client.expected_chain_id(), block_number, syncing)
}
