//! Rent2Repay state types

use alloy_primitives::U256;
use r2r_core::{EvmAddress, ProtocolError, RepaymentToken};
use serde::{Deserialize, Serialize};

use crate::abi::IRent2Repay;
use crate::calculator;
use crate::constants::tokens;

/// Fee split taken from every repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfiguration {
    pub dao_fee_bps: u64,
    pub sender_tip_bps: u64,
}

impl From<IRent2Repay::getFeeConfigurationReturn> for FeeConfiguration {
    fn from(ret: IRent2Repay::getFeeConfigurationReturn) -> Self {
        Self {
            dao_fee_bps: ret.daoFeesBps.saturating_to(),
            sender_tip_bps: ret.senderTipsBps.saturating_to(),
        }
    }
}

/// DAO fee discount for holders of the reduction token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReductionConfiguration {
    pub reduction_token: EvmAddress,
    pub minimum_balance: U256,
    pub reduction_bps: u64,
    pub treasury: EvmAddress,
}

impl FeeReductionConfiguration {
    pub fn is_eligible(&self, balance: U256) -> bool {
        calculator::is_user_eligible(balance, self.minimum_balance)
    }
}

impl From<IRent2Repay::getDaoFeeReductionConfigurationReturn> for FeeReductionConfiguration {
    fn from(ret: IRent2Repay::getDaoFeeReductionConfigurationReturn) -> Self {
        Self {
            reduction_token: ret.reductionToken.into(),
            minimum_balance: ret.minimumAmount,
            reduction_bps: ret.reductionBps.saturating_to(),
            treasury: ret.treasury.into(),
        }
    }
}

/// Contract-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub contract: EvmAddress,
    pub fees: FeeConfiguration,
    pub reduction: FeeReductionConfiguration,
    pub paused: bool,
}

/// One token in a user's on-chain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredToken {
    pub token: EvmAddress,
    /// Maximum pulled per period, in token base units
    pub max_amount: U256,
}

/// A user's on-chain Rent2Repay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub user: EvmAddress,
    pub tokens: Vec<ConfiguredToken>,
    /// Seconds between repayments
    pub periodicity: u64,
    /// Unix seconds of the last repayment, 0 if never
    pub last_repay_timestamp: u64,
}

impl UserConfig {
    pub fn from_reads(
        user: EvmAddress,
        configs: IRent2Repay::getUserConfigsReturn,
        periodicity: U256,
        last_repay_timestamp: U256,
    ) -> Result<Self, ProtocolError> {
        if configs.tokens.len() != configs.maxAmounts.len() {
            return Err(ProtocolError::DecodeError {
                message: format!(
                    "getUserConfigs returned {} tokens and {} amounts",
                    configs.tokens.len(),
                    configs.maxAmounts.len()
                ),
            });
        }

        let tokens = configs
            .tokens
            .into_iter()
            .zip(configs.maxAmounts)
            .map(|(token, max_amount)| ConfiguredToken {
                token: token.into(),
                max_amount,
            })
            .collect();

        Ok(Self {
            user,
            tokens,
            periodicity: periodicity.saturating_to(),
            last_repay_timestamp: last_repay_timestamp.saturating_to(),
        })
    }

    /// An empty token list means the user has no configuration
    pub fn is_configured(&self) -> bool {
        !self.tokens.is_empty()
    }
}

/// Display metadata for a token address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: EvmAddress,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    /// Look up a token in the catalog, falling back to `UNKNOWN` with 18 decimals
    pub fn lookup(catalog: &[RepaymentToken], address: EvmAddress) -> Self {
        match catalog.iter().find(|t| t.address == address) {
            Some(token) => Self {
                address,
                symbol: token.symbol.clone(),
                decimals: token.decimals,
            },
            None => Self {
                address,
                symbol: tokens::UNKNOWN_SYMBOL.to_string(),
                decimals: tokens::DEFAULT_DECIMALS,
            },
        }
    }

    pub fn is_known(&self) -> bool {
        self.symbol != tokens::UNKNOWN_SYMBOL
    }
}

/// Debt token paired with `token` in the catalog
pub fn debt_token_for(catalog: &[RepaymentToken], token: EvmAddress) -> Option<EvmAddress> {
    catalog
        .iter()
        .find(|t| t.address == token)
        .and_then(|t| t.debt_token)
}

/// The three amounts bounding what a repayment can pull for one token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmountTriple {
    pub configured_amount: U256,
    pub wallet_balance: U256,
    /// None when no debt token is known for this asset
    pub debt_balance: Option<U256>,
}

impl TokenAmountTriple {
    /// Amount actually usable on-chain
    pub fn usable(&self) -> U256 {
        calculator::minimum_of(
            self.configured_amount,
            self.wallet_balance,
            self.debt_balance.unwrap_or(U256::MAX),
        )
    }

    pub fn approval(&self, allowance: Option<U256>) -> ApprovalCheck {
        ApprovalCheck::new(allowance, self.usable())
    }
}

/// Allowance compared against the amount the contract needs to pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCheck {
    pub required: U256,
    pub allowance: Option<U256>,
    pub sufficient: bool,
}

impl ApprovalCheck {
    pub fn new(allowance: Option<U256>, required: U256) -> Self {
        Self {
            required,
            allowance,
            sufficient: calculator::is_approval_sufficient(allowance, required),
        }
    }

    pub fn needs_approval(&self) -> bool {
        !self.sufficient
    }
}

/// Per-token view of a configured user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPosition {
    pub token: TokenInfo,
    pub debt_token: Option<EvmAddress>,
    pub amounts: TokenAmountTriple,
    pub approval: ApprovalCheck,
}

/// Fee-reduction eligibility of one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeEligibility {
    pub account: EvmAddress,
    pub reduction_token: EvmAddress,
    pub balance: U256,
    pub minimum_balance: U256,
    pub reduction_bps: u64,
    pub eligible: bool,
}

/// Borrowing rate once Rent2Repay fees are taken
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveRateQuote {
    pub nominal_rate_ray: U256,
    pub fees: FeeConfiguration,
    pub reduction_bps: u64,
    pub user_eligible: bool,
    /// DAO fee after any reduction, in basis points
    pub effective_dao_fee_bps: f64,
    /// `None` when fees reach 100%
    pub effective_rate_ray: Option<U256>,
}

impl EffectiveRateQuote {
    pub fn new(
        nominal_rate_ray: U256,
        fees: FeeConfiguration,
        reduction_bps: u64,
        user_eligible: bool,
    ) -> Self {
        Self {
            nominal_rate_ray,
            fees,
            reduction_bps,
            user_eligible,
            effective_dao_fee_bps: calculator::effective_dao_fee_bps(
                fees.dao_fee_bps,
                reduction_bps,
                user_eligible,
            ),
            effective_rate_ray: calculator::compute_effective_rate(
                nominal_rate_ray,
                fees.dao_fee_bps,
                fees.sender_tip_bps,
                reduction_bps,
                user_eligible,
            ),
        }
    }

    pub fn nominal_percent(&self) -> f64 {
        calculator::ray_to_percent(self.nominal_rate_ray)
    }

    pub fn effective_percent(&self) -> Option<f64> {
        self.effective_rate_ray.map(calculator::ray_to_percent)
    }
}

/// Wallet balance of one catalog token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalance {
    pub token: TokenInfo,
    pub balance: U256,
}

/// Everything the configuration check view shows for an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverview {
    pub user: EvmAddress,
    pub config: Option<UserConfig>,
    pub positions: Vec<TokenPosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use r2r_core::{USDC_ADDRESS, WXDAI_ADDRESS};

    fn catalog() -> Vec<RepaymentToken> {
        r2r_core::AppConfig::default().tokens
    }

    #[test]
    fn test_token_lookup_fallback() {
        let usdc = TokenInfo::lookup(&catalog(), USDC_ADDRESS);
        assert_eq!(usdc.symbol, "USDC");
        assert_eq!(usdc.decimals, 6);
        assert!(usdc.is_known());

        let unknown = TokenInfo::lookup(&catalog(), EvmAddress::ZERO);
        assert_eq!(unknown.symbol, "UNKNOWN");
        assert_eq!(unknown.decimals, 18);
        assert!(!unknown.is_known());
    }

    #[test]
    fn test_debt_token_mapping() {
        let debt = EvmAddress::parse("0x3333333333333333333333333333333333333333").unwrap();
        let mut catalog = catalog();
        catalog[1].debt_token = Some(debt);
        assert_eq!(debt_token_for(&catalog, WXDAI_ADDRESS), Some(debt));
        assert_eq!(debt_token_for(&catalog, USDC_ADDRESS), None);
    }

    #[test]
    fn test_user_config_from_reads() {
        let user = EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let configs = IRent2Repay::getUserConfigsReturn {
            tokens: vec![USDC_ADDRESS.as_address()],
            maxAmounts: vec![U256::from(100_000_000u64)],
        };
        let config =
            UserConfig::from_reads(user, configs, U256::from(86_400u64), U256::ZERO).unwrap();
        assert!(config.is_configured());
        assert_eq!(config.periodicity, 86_400);
        assert_eq!(config.tokens[0].token, USDC_ADDRESS);

        let mismatched = IRent2Repay::getUserConfigsReturn {
            tokens: vec![Address::ZERO],
            maxAmounts: vec![],
        };
        assert!(UserConfig::from_reads(user, mismatched, U256::ZERO, U256::ZERO).is_err());
    }

    #[test]
    fn test_triple_usable_and_approval() {
        let triple = TokenAmountTriple {
            configured_amount: U256::from(100u64),
            wallet_balance: U256::from(80u64),
            debt_balance: Some(U256::from(90u64)),
        };
        assert_eq!(triple.usable(), U256::from(80u64));
        assert!(triple.approval(Some(U256::from(80u64))).sufficient);
        assert!(triple.approval(Some(U256::from(79u64))).needs_approval());
        assert!(triple.approval(None).needs_approval());

        let no_debt = TokenAmountTriple {
            debt_balance: None,
            ..triple
        };
        assert_eq!(no_debt.usable(), U256::from(80u64));
    }

    #[test]
    fn test_effective_rate_quote() {
        let fees = FeeConfiguration {
            dao_fee_bps: 1_000,
            sender_tip_bps: 500,
        };
        let nominal = U256::from(crate::constants::fees::RAY) * U256::from(9u64) / U256::from(100u64);

        let eligible = EffectiveRateQuote::new(nominal, fees, 5_000, true);
        assert_eq!(eligible.effective_dao_fee_bps, 500.0);
        assert!((eligible.effective_percent().unwrap() - 10.0).abs() < 1e-9);
        assert!((eligible.nominal_percent() - 9.0).abs() < 1e-9);

        let full = FeeConfiguration {
            dao_fee_bps: 10_000,
            sender_tip_bps: 0,
        };
        assert_eq!(EffectiveRateQuote::new(nominal, full, 0, false).effective_rate_ray, None);
    }

    #[test]
    fn test_reduction_eligibility() {
        let reduction = FeeReductionConfiguration {
            reduction_token: EvmAddress::ZERO,
            minimum_balance: U256::from(1_000u64),
            reduction_bps: 5_000,
            treasury: EvmAddress::ZERO,
        };
        assert!(reduction.is_eligible(U256::from(1_500u64)));
        assert!(reduction.is_eligible(U256::from(1_000u64)));
        assert!(!reduction.is_eligible(U256::from(500u64)));
    }
}
