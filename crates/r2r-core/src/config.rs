//! Configuration types for the Rent2Repay dashboard

use alloy_primitives::address;
use serde::{Deserialize, Serialize};

use crate::{Error, EvmAddress, Network, Result};

/// RPC endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC URL (e.g., "https://rpc.gnosischain.com")
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::new(Network::Gnosis.default_rpc_url())
    }
}

/// A token users can configure for repayment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentToken {
    pub symbol: String,
    pub address: EvmAddress,
    pub decimals: u8,
    /// Variable-debt token tracking what the user owes in this asset
    #[serde(default)]
    pub debt_token: Option<EvmAddress>,
}

/// USDC on Gnosis Chain
pub const USDC_ADDRESS: EvmAddress =
    EvmAddress::new(address!("ddafbb505ad214d7b80b1f830fccc89b60fb7a83"));

/// Wrapped xDAI on Gnosis Chain
pub const WXDAI_ADDRESS: EvmAddress =
    EvmAddress::new(address!("0ca4f5554dd9da6217d62d8df2816c82bba4157b"));

/// Built-in catalog.
///
/// Debt tokens are left unset: the variable-debt token of each asset depends
/// on the lending market the deployment is paired with. Until a config file
/// sets `debt_token`, the usable amount is bounded by the configured maximum
/// and the wallet balance only.
fn default_tokens() -> Vec<RepaymentToken> {
    vec![
        RepaymentToken {
            symbol: "USDC".to_string(),
            address: USDC_ADDRESS,
            decimals: 6,
            debt_token: None,
        },
        RepaymentToken {
            symbol: "WXDAI".to_string(),
            address: WXDAI_ADDRESS,
            decimals: 18,
            debt_token: None,
        },
    ]
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// RPC connection settings
    pub rpc: RpcConfig,

    /// Chain the contract is deployed on
    pub network: Network,

    /// Rent2Repay proxy contract
    #[serde(default)]
    pub contract_address: Option<EvmAddress>,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Repayment-token catalog offered by the wizard
    #[serde(default = "default_tokens")]
    pub tokens: Vec<RepaymentToken>,

    /// How often the transaction watcher polls for receipts
    #[serde(default = "default_poll_interval_secs")]
    pub tx_poll_interval_secs: u64,
}

fn default_api_port() -> u16 {
    19100
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            network: Network::Gnosis,
            contract_address: None,
            api_port: default_api_port(),
            tokens: default_tokens(),
            tx_poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Environment variables read by [`AppConfig::from_env`]
pub mod env {
    pub const CONFIG_PATH: &str = "R2R_CONFIG";
    pub const NETWORK: &str = "R2R_NETWORK";
    pub const RPC_URL: &str = "R2R_RPC_URL";
    pub const RPC_URL_LEGACY: &str = "NEXT_PUBLIC_RPC_URL";
    pub const CONTRACT: &str = "R2R_CONTRACT_ADDRESS";
    pub const CONTRACT_LEGACY: &str = "NEXT_PUBLIC_R2R_PROXY";
    pub const API_PORT: &str = "R2R_API_PORT";
}

impl AppConfig {
    /// Load configuration from an optional JSON file, then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(env::CONFIG_PATH) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path, e)))?;
        serde_json::from_str(&raw).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup(env::NETWORK) {
            self.network = match network.trim().to_lowercase().as_str() {
                "gnosis" => Network::Gnosis,
                "chiado" => Network::Chiado,
                other => return Err(Error::Config(format!("unknown network '{}'", other))),
            };
            if lookup(env::RPC_URL).is_none() && lookup(env::RPC_URL_LEGACY).is_none() {
                self.rpc.url = self.network.default_rpc_url().to_string();
            }
        }

        if let Some(url) = lookup(env::RPC_URL).or_else(|| lookup(env::RPC_URL_LEGACY)) {
            self.rpc.url = url;
        }

        if let Some(contract) = lookup(env::CONTRACT).or_else(|| lookup(env::CONTRACT_LEGACY)) {
            let address = EvmAddress::parse(&contract)
                .map_err(|e| Error::Config(format!("{}: {}", env::CONTRACT, e)))?;
            self.contract_address = Some(address);
        }

        if let Some(port) = lookup(env::API_PORT) {
            self.api_port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid {} '{}'", env::API_PORT, port)))?;
        }

        Ok(())
    }

    /// The configured contract, or a configuration error when missing
    pub fn contract(&self) -> Result<EvmAddress> {
        self.contract_address.ok_or_else(|| {
            Error::Config(format!(
                "contract address not set (use {} or {})",
                env::CONTRACT,
                env::CONTRACT_LEGACY
            ))
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }

    /// Look up a catalog token by address
    pub fn token(&self, address: &EvmAddress) -> Option<&RepaymentToken> {
        self.tokens.iter().find(|t| &t.address == address)
    }
}
