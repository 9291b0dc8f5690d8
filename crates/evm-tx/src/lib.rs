//! evm-tx: Transaction building utilities for EVM chains
//!
//! Provides wallet-ready transaction requests, the ERC-20 interface and
//! decimal unit conversion.

pub mod eip1193;
pub mod erc20;
pub mod units;

pub use eip1193::UnsignedTx;
pub use erc20::{build_approve_tx, IERC20};
pub use units::{format_units, parse_units};
