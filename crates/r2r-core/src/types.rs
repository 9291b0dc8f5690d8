//! Core type definitions for the Rent2Repay dashboard

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

/// EVM account or contract address.
///
/// Always rendered as lowercase `0x`-prefixed hex. Parsing accepts any case
/// and does not enforce the EIP-55 checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvmAddress(Address);

impl EvmAddress {
    pub const ZERO: Self = Self(Address::ZERO);

    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// Parse a `0x`-prefixed, 40 hex digit address
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim();
        let invalid = || ProtocolError::InvalidAddress {
            address: trimmed.to_string(),
        };

        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(invalid)?;
        if digits.len() != 40 {
            return Err(invalid());
        }
        Address::from_str(digits).map(Self).map_err(|_| invalid())
    }

    /// Parse an optional form field; blank input means "not provided"
    pub fn parse_optional(input: Option<&str>) -> Result<Option<Self>, ProtocolError> {
        match input.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => Self::parse(s).map(Some),
        }
    }

    pub fn as_address(&self) -> Address {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Address::ZERO
    }

    /// Lowercase hex with `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0.as_slice()))
    }

    /// Abbreviated form for display, e.g. `0x1234...5678`
    pub fn to_short_string(&self) -> String {
        let full = self.to_hex();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<EvmAddress> for Address {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl FromStr for EvmAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EvmAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Transaction hash (32 bytes, hex-encoded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(B256);

impl TxHash {
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim();
        let invalid = || ProtocolError::InvalidTxHash {
            hash: trimmed.to_string(),
        };

        let digits = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
        if digits.len() != 64 {
            return Err(invalid());
        }
        B256::from_str(digits).map(Self).map_err(|_| invalid())
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0.as_slice()))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Gnosis,
    Chiado,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gnosis => "gnosis",
            Self::Chiado => "chiado",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Gnosis => constants::GNOSIS_CHAIN_ID,
            Self::Chiado => constants::CHIADO_CHAIN_ID,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gnosis => "Gnosis Chain",
            Self::Chiado => "Gnosis Chiado Testnet",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Self::Gnosis => "https://rpc.gnosischain.com",
            Self::Chiado => "https://rpc.chiadochain.net",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Block number
pub type BlockNumber = u64;

/// Constants
pub mod constants {
    pub const GNOSIS_CHAIN_ID: u64 = 100;
    pub const CHIADO_CHAIN_ID: u64 = 10200;

    /// Basis points in 100%
    pub const BPS_DENOMINATOR: u64 = 10_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "0xDDAfbb505ad214D7b80b1f830fcCc89B60fb7A83";

    #[test]
    fn test_address_normalized_lowercase() {
        let addr = EvmAddress::parse(USDC).unwrap();
        assert_eq!(addr.to_string(), "0xddafbb505ad214d7b80b1f830fccc89b60fb7a83");
        assert_eq!(addr, USDC.to_lowercase().parse::<EvmAddress>().unwrap());
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!(EvmAddress::parse("ddafbb505ad214d7b80b1f830fccc89b60fb7a83").is_err());
        assert!(EvmAddress::parse("0x1234").is_err());
        assert!(EvmAddress::parse("0xzzafbb505ad214d7b80b1f830fccc89b60fb7a83").is_err());
        assert!(EvmAddress::parse("").is_err());
        assert!(EvmAddress::parse("0x0xddafbb505ad214d7b80b1f830fccc89b60fb7a").is_err());
    }

    #[test]
    fn test_address_optional_and_short() {
        assert_eq!(EvmAddress::parse_optional(None).unwrap(), None);
        assert_eq!(EvmAddress::parse_optional(Some("  ")).unwrap(), None);

        let addr = EvmAddress::parse_optional(Some(USDC)).unwrap().unwrap();
        assert_eq!(addr.to_short_string(), "0xddaf...7a83");
        assert!(!addr.is_zero());
        assert!(EvmAddress::ZERO.is_zero());
    }

    #[test]
    fn test_address_serde() {
        let addr = EvmAddress::parse(USDC).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0xddafbb505ad214d7b80b1f830fccc89b60fb7a83\"");
        let parsed: EvmAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, addr);
        assert!(serde_json::from_str::<EvmAddress>("\"0xnope\"").is_err());
    }

    #[test]
    fn test_tx_hash_parse() {
        let hash = format!("0x{}", "ab".repeat(32));
        let parsed = TxHash::parse(&hash).unwrap();
        assert_eq!(parsed.to_string(), hash);
        assert!(TxHash::parse("0xabcd").is_err());
    }

    #[test]
    fn test_network() {
        assert_eq!(Network::Gnosis.chain_id(), 100);
        assert_eq!(Network::Chiado.as_str(), "chiado");
        assert_eq!(
            serde_json::to_string(&Network::Gnosis).unwrap(),
            "\"gnosis\""
        );
    }
}
