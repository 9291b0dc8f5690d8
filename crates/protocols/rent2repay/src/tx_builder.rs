//! Rent2Repay Transaction Builders
//!
//! Every write the dashboard offers becomes an [`UnsignedTx`] for the
//! browser wallet. Inputs are validated here so that nothing malformed is
//! ever sent to the chain.

use std::collections::HashSet;

use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use evm_rpc_client::RpcClient;
use evm_tx::{build_approve_tx, format_units, UnsignedTx};
use r2r_core::{EvmAddress, ProtocolError, RpcError, TxError};
use serde::{Deserialize, Serialize};

use crate::abi::IRent2Repay;
use crate::calculator::format_period;
use crate::constants::{periods, MAX_TOKENS};
use crate::state::TokenInfo;

/// Arguments of `configureRent2Repay`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureArgs {
    pub tokens: Vec<EvmAddress>,
    /// Per-token maximum in native decimals
    pub amounts: Vec<U256>,
    pub period: u64,
    pub activation_timestamp: u64,
}

impl ConfigureArgs {
    pub fn validate(&self) -> Result<(), r2r_core::Error> {
        if self.tokens.is_empty() {
            return Err(TxError::BuildFailed {
                message: "at least one token is required".to_string(),
            }
            .into());
        }
        if self.tokens.len() > MAX_TOKENS {
            return Err(ProtocolError::TooManyTokens { max: MAX_TOKENS }.into());
        }
        if self.tokens.len() != self.amounts.len() {
            return Err(TxError::LengthMismatch {
                tokens: self.tokens.len(),
                amounts: self.amounts.len(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for token in &self.tokens {
            if !seen.insert(*token) {
                return Err(ProtocolError::DuplicateToken {
                    token: token.to_hex(),
                }
                .into());
            }
        }

        if self.amounts.iter().any(|a| a.is_zero()) {
            return Err(ProtocolError::InvalidAmount {
                message: "amounts must be positive".to_string(),
            }
            .into());
        }

        if self.period < periods::MIN_PERIOD_SECS {
            return Err(ProtocolError::InvalidPeriod {
                message: format!(
                    "period must be at least {} seconds",
                    periods::MIN_PERIOD_SECS
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Parse a comma-separated list of user addresses.
///
/// Entries are trimmed and empty ones dropped; at least one must remain and
/// every remaining entry must be a valid address.
pub fn parse_user_list(input: &str) -> Result<Vec<EvmAddress>, ProtocolError> {
    let users = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(EvmAddress::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if users.is_empty() {
        return Err(ProtocolError::InvalidAddress {
            address: "no user address provided".to_string(),
        });
    }
    Ok(users)
}

/// Builds unsigned writes against one Rent2Repay deployment
#[derive(Debug, Clone, Copy)]
pub struct Rent2RepayTxBuilder {
    contract: EvmAddress,
    chain_id: u64,
}

impl Rent2RepayTxBuilder {
    pub fn new(contract: EvmAddress, chain_id: u64) -> Self {
        Self { contract, chain_id }
    }

    pub fn contract(&self) -> EvmAddress {
        self.contract
    }

    fn contract_call<C: SolCall>(&self, from: EvmAddress, call: &C) -> UnsignedTx {
        UnsignedTx::call(self.contract, call.abi_encode(), self.chain_id).with_from(from)
    }

    /// `configureRent2Repay(tokens, amounts, period, timestamp)`
    pub fn configure(
        &self,
        from: EvmAddress,
        args: &ConfigureArgs,
    ) -> Result<UnsignedTx, r2r_core::Error> {
        args.validate()?;
        let call = IRent2Repay::configureRent2RepayCall {
            tokens: args.tokens.iter().map(EvmAddress::as_address).collect(),
            amounts: args.amounts.clone(),
            period: U256::from(args.period),
            timestamp: U256::from(args.activation_timestamp),
        };
        Ok(self.contract_call(from, &call).with_description(format!(
            "Configure Rent2Repay for {} token(s), every {}",
            args.tokens.len(),
            format_period(args.period)
        )))
    }

    /// `revokeRent2RepayAll()`
    pub fn revoke_all(&self, from: EvmAddress) -> UnsignedTx {
        self.contract_call(from, &IRent2Repay::revokeRent2RepayAllCall {})
            .with_description("Revoke all Rent2Repay authorizations")
    }

    /// `rent2repay(user, token)`; open to any caller
    pub fn rent2repay(&self, from: EvmAddress, user: EvmAddress, token: EvmAddress) -> UnsignedTx {
        let call = IRent2Repay::rent2repayCall {
            user: user.as_address(),
            token: token.as_address(),
        };
        self.contract_call(from, &call).with_description(format!(
            "Execute Rent2Repay for {}",
            user.to_short_string()
        ))
    }

    /// `batchRent2Repay(users, token)`
    pub fn batch_rent2repay(
        &self,
        from: EvmAddress,
        users: &[EvmAddress],
        token: EvmAddress,
    ) -> Result<UnsignedTx, r2r_core::Error> {
        if users.is_empty() {
            return Err(TxError::EmptyBatch.into());
        }
        let call = IRent2Repay::batchRent2RepayCall {
            users: users.iter().map(EvmAddress::as_address).collect(),
            token: token.as_address(),
        };
        Ok(self.contract_call(from, &call).with_description(format!(
            "Execute Rent2Repay for {} user(s)",
            users.len()
        )))
    }

    /// `authorizeTokenPair(token, supplyToken, debtToken)`
    pub fn authorize_token_pair(
        &self,
        from: EvmAddress,
        token: EvmAddress,
        supply_token: EvmAddress,
        debt_token: EvmAddress,
    ) -> UnsignedTx {
        let call = IRent2Repay::authorizeTokenPairCall {
            token: token.as_address(),
            supplyToken: supply_token.as_address(),
            debtToken: debt_token.as_address(),
        };
        self.contract_call(from, &call).with_description(format!(
            "Authorize token {}",
            token.to_short_string()
        ))
    }

    /// `unauthorizeToken(token)`
    pub fn unauthorize_token(&self, from: EvmAddress, token: EvmAddress) -> UnsignedTx {
        let call = IRent2Repay::unauthorizeTokenCall {
            token: token.as_address(),
        };
        self.contract_call(from, &call).with_description(format!(
            "Unauthorize token {}",
            token.to_short_string()
        ))
    }

    /// `removeUser(user)`
    pub fn remove_user(&self, from: EvmAddress, user: EvmAddress) -> UnsignedTx {
        let call = IRent2Repay::removeUserCall {
            user: user.as_address(),
        };
        self.contract_call(from, &call)
            .with_description(format!("Remove user {}", user.to_short_string()))
    }

    pub fn pause(&self, from: EvmAddress) -> UnsignedTx {
        self.contract_call(from, &IRent2Repay::pauseCall {})
            .with_description("Pause the contract")
    }

    pub fn unpause(&self, from: EvmAddress) -> UnsignedTx {
        self.contract_call(from, &IRent2Repay::unpauseCall {})
            .with_description("Unpause the contract")
    }

    /// ERC-20 `approve(contract, amount)` on `token`
    pub fn approve(
        &self,
        owner: EvmAddress,
        token: &TokenInfo,
        amount: U256,
    ) -> Result<UnsignedTx, r2r_core::Error> {
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount {
                message: format!("approval of 0 {}", token.symbol),
            }
            .into());
        }
        tracing::debug!(
            owner = %owner,
            token = %token.address,
            amount = %format_units(amount, token.decimals),
            "Building approval"
        );
        Ok(build_approve_tx(
            owner,
            token.address,
            self.contract,
            amount,
            token.decimals,
            &token.symbol,
            self.chain_id,
        ))
    }
}

/// Dry-run `tx` with `eth_estimateGas` and attach the gas limit.
///
/// A revert comes back as [`TxError::Reverted`] carrying the node's message.
pub async fn preflight(client: &RpcClient, tx: UnsignedTx) -> Result<UnsignedTx, r2r_core::Error> {
    match client.estimate_gas(tx.from, tx.to, &tx.calldata()).await {
        Ok(gas) => Ok(tx.with_gas(gas)),
        Err(RpcError::JsonRpc { message, .. }) => {
            tracing::info!(to = %tx.to, reason = %message, "Preflight reverted");
            Err(TxError::Reverted { message }.into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2r_core::{USDC_ADDRESS, WXDAI_ADDRESS};

    fn contract() -> EvmAddress {
        EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap()
    }

    fn user() -> EvmAddress {
        EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap()
    }

    fn builder() -> Rent2RepayTxBuilder {
        Rent2RepayTxBuilder::new(contract(), 100)
    }

    fn args() -> ConfigureArgs {
        ConfigureArgs {
            tokens: vec![USDC_ADDRESS],
            amounts: vec![U256::from(100_000_000u64)],
            period: 86_400,
            activation_timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_configure_encoding() {
        let tx = builder().configure(user(), &args()).unwrap();
        assert_eq!(tx.to, contract());
        assert_eq!(tx.from, Some(user()));
        assert_eq!(tx.chain_id, 100);
        assert_eq!(
            tx.selector(),
            Some(IRent2Repay::configureRent2RepayCall::SELECTOR)
        );

        let decoded = IRent2Repay::configureRent2RepayCall::abi_decode(&tx.calldata(), true).unwrap();
        assert_eq!(decoded.tokens, vec![USDC_ADDRESS.as_address()]);
        assert_eq!(decoded.amounts, vec![U256::from(100_000_000u64)]);
        assert_eq!(decoded.period, U256::from(86_400u64));
        assert_eq!(decoded.timestamp, U256::from(1_700_000_000u64));
        assert!(tx.description.contains("1 day"));
    }

    #[test]
    fn test_configure_validation() {
        let empty = ConfigureArgs {
            tokens: vec![],
            amounts: vec![],
            ..args()
        };
        assert!(builder().configure(user(), &empty).is_err());

        let duplicate = ConfigureArgs {
            tokens: vec![USDC_ADDRESS, USDC_ADDRESS],
            amounts: vec![U256::from(1u64), U256::from(2u64)],
            ..args()
        };
        assert!(matches!(
            duplicate.validate(),
            Err(r2r_core::Error::Protocol(ProtocolError::DuplicateToken { .. }))
        ));

        let mismatched = ConfigureArgs {
            tokens: vec![USDC_ADDRESS, WXDAI_ADDRESS],
            amounts: vec![U256::from(1u64)],
            ..args()
        };
        assert!(matches!(
            mismatched.validate(),
            Err(r2r_core::Error::Transaction(TxError::LengthMismatch { tokens: 2, amounts: 1 }))
        ));

        let too_many = ConfigureArgs {
            tokens: (1..=5u8)
                .map(|b| EvmAddress::parse(&format!("0x{}", "0".repeat(39) + &b.to_string())).unwrap())
                .collect(),
            amounts: vec![U256::from(1u64); 5],
            ..args()
        };
        assert!(matches!(
            too_many.validate(),
            Err(r2r_core::Error::Protocol(ProtocolError::TooManyTokens { max: 4 }))
        ));

        let short_period = ConfigureArgs { period: 4, ..args() };
        assert!(short_period.validate().is_err());

        let zero_amount = ConfigureArgs {
            amounts: vec![U256::ZERO],
            ..args()
        };
        assert!(zero_amount.validate().is_err());
    }

    #[test]
    fn test_parse_user_list() {
        let users = parse_user_list(
            " 0x2222222222222222222222222222222222222222, ,0x3333333333333333333333333333333333333333,",
        )
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0], user());

        assert!(parse_user_list(" , ,").is_err());
        assert!(parse_user_list("0x2222222222222222222222222222222222222222,0x12").is_err());
    }

    #[test]
    fn test_batch_encoding() {
        let users = vec![user(), contract()];
        let tx = builder()
            .batch_rent2repay(user(), &users, WXDAI_ADDRESS)
            .unwrap();
        let decoded = IRent2Repay::batchRent2RepayCall::abi_decode(&tx.calldata(), true).unwrap();
        assert_eq!(decoded.users.len(), 2);
        assert_eq!(decoded.token, WXDAI_ADDRESS.as_address());

        assert!(builder().batch_rent2repay(user(), &[], WXDAI_ADDRESS).is_err());
    }

    #[test]
    fn test_maintenance_selectors() {
        let b = builder();
        assert_eq!(
            b.pause(user()).selector(),
            Some(IRent2Repay::pauseCall::SELECTOR)
        );
        assert_eq!(
            b.unpause(user()).selector(),
            Some(IRent2Repay::unpauseCall::SELECTOR)
        );
        assert_eq!(
            b.revoke_all(user()).selector(),
            Some(IRent2Repay::revokeRent2RepayAllCall::SELECTOR)
        );
        assert_eq!(
            b.remove_user(user(), user()).selector(),
            Some(IRent2Repay::removeUserCall::SELECTOR)
        );
        assert_eq!(
            b.unauthorize_token(user(), USDC_ADDRESS).selector(),
            Some(IRent2Repay::unauthorizeTokenCall::SELECTOR)
        );
        let authorize = b.authorize_token_pair(user(), USDC_ADDRESS, WXDAI_ADDRESS, contract());
        let decoded =
            IRent2Repay::authorizeTokenPairCall::abi_decode(&authorize.calldata(), true).unwrap();
        assert_eq!(decoded.debtToken, contract().as_address());
    }

    #[test]
    fn test_approve_targets_token() {
        let usdc = TokenInfo {
            address: USDC_ADDRESS,
            symbol: "USDC".to_string(),
            decimals: 6,
        };
        let tx = builder()
            .approve(user(), &usdc, U256::from(100_000_000u64))
            .unwrap();
        assert_eq!(tx.to, USDC_ADDRESS);
        assert_eq!(tx.description, "Approve 100 USDC for 0x1111...1111");

        assert!(builder().approve(user(), &usdc, U256::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_preflight_unreachable_is_rpc_error() {
        let config = r2r_core::RpcConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        };
        let client = RpcClient::new_unchecked(config, 100).unwrap();
        let err = preflight(&client, builder().pause(user())).await.unwrap_err();
        assert!(matches!(err, r2r_core::Error::Rpc(_)));
    }
}
