//! EIP-1193 Transaction Request
//!
//! Defines the JSON structure handed to a browser wallet for
//! `eth_sendTransaction`. The wallet fills in nonce and fee fields, signs
//! and broadcasts; the dashboard never holds keys.

use alloy_primitives::U256;
use r2r_core::EvmAddress;
use serde::{Deserialize, Serialize};

/// Unsigned transaction request ready for the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    /// Sender; wallets use the connected account when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EvmAddress>,
    pub to: EvmAddress,
    /// ABI-encoded calldata, `0x`-prefixed hex
    pub data: String,
    /// Native value in wei, `0x`-prefixed hex quantity
    pub value: String,
    /// Gas limit from preflight estimation, hex quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    pub chain_id: u64,
    /// Human-readable summary shown next to the wallet prompt
    #[serde(default)]
    pub description: String,
}

impl UnsignedTx {
    /// Contract call carrying no native value
    pub fn call(to: EvmAddress, calldata: Vec<u8>, chain_id: u64) -> Self {
        Self {
            from: None,
            to,
            data: format!("0x{}", hex::encode(calldata)),
            value: "0x0".to_string(),
            gas: None,
            chain_id,
            description: String::new(),
        }
    }

    pub fn with_from(mut self, from: EvmAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(format!("{:#x}", gas));
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = format!("0x{:x}", value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Calldata as raw bytes
    pub fn calldata(&self) -> Vec<u8> {
        hex::decode(self.data.trim_start_matches("0x")).unwrap_or_default()
    }

    /// First four calldata bytes
    pub fn selector(&self) -> Option<[u8; 4]> {
        let data = self.calldata();
        data.get(..4).and_then(|s| s.try_into().ok())
    }
}
