//! Data Transfer Objects for API requests and responses
//!
//! Token amounts are rendered twice: `raw` in base units as a decimal
//! string, and a human string with the token's decimals applied.

use alloy_primitives::U256;
use evm_tx::UnsignedTx;
use r2r_core::{EvmAddress, RepaymentToken};
use rent2repay::{
    calculator, wizard::SubmissionOutcome, Capabilities, ContractInfo, EffectiveRateQuote,
    FeeEligibility, MaintenanceAction, Role, TokenInfo, TokenPosition, UserConfig, WalletBalance,
    WizardState, WizardStep,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Generic API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }
}

/// `?refresh=true` bypasses the read cache for this account
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

// =============================================================================
// Node
// =============================================================================

/// RPC endpoint status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    pub connected: bool,
    pub url: String,
    pub network: String,
    pub expected_chain_id: u64,
    pub chain_id: Option<u64>,
    pub chain_matches: bool,
    pub block_number: u64,
    pub syncing: bool,
    pub sync_tier: String,
}

/// RPC endpoint configuration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigRequest {
    pub url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

// =============================================================================
// Contract
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfoResponse {
    pub contract: EvmAddress,
    pub paused: bool,
    pub dao_fee_bps: u64,
    pub sender_tip_bps: u64,
    pub reduction_token: EvmAddress,
    pub minimum_balance: String,
    pub reduction_bps: u64,
    pub treasury: EvmAddress,
}

impl From<ContractInfo> for ContractInfoResponse {
    fn from(info: ContractInfo) -> Self {
        Self {
            contract: info.contract,
            paused: info.paused,
            dao_fee_bps: info.fees.dao_fee_bps,
            sender_tip_bps: info.fees.sender_tip_bps,
            reduction_token: info.reduction.reduction_token,
            minimum_balance: info.reduction.minimum_balance.to_string(),
            reduction_bps: info.reduction.reduction_bps,
            treasury: info.reduction.treasury,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodPresetInfo {
    pub label: String,
    pub seconds: u64,
}

/// Repayment-token catalog and wizard limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCatalogResponse {
    pub tokens: Vec<RepaymentToken>,
    pub period_presets: Vec<PeriodPresetInfo>,
    pub min_period_secs: u64,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EffectiveRateQuery {
    pub account: String,
    /// Lending rate in RAY, decimal string
    pub nominal_rate_ray: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveRateResponse {
    pub account: EvmAddress,
    pub user_eligible: bool,
    pub dao_fee_bps: u64,
    pub sender_tip_bps: u64,
    pub reduction_bps: u64,
    pub effective_dao_fee_bps: f64,
    pub nominal_rate_ray: String,
    pub nominal_rate_pct: String,
    /// Absent when fees reach 100%
    pub effective_rate_ray: Option<String>,
    pub effective_rate_pct: Option<String>,
}

impl EffectiveRateResponse {
    pub fn new(account: EvmAddress, quote: EffectiveRateQuote) -> Self {
        Self {
            account,
            user_eligible: quote.user_eligible,
            dao_fee_bps: quote.fees.dao_fee_bps,
            sender_tip_bps: quote.fees.sender_tip_bps,
            reduction_bps: quote.reduction_bps,
            effective_dao_fee_bps: quote.effective_dao_fee_bps,
            nominal_rate_ray: quote.nominal_rate_ray.to_string(),
            nominal_rate_pct: calculator::format_significant(
                &quote.nominal_percent().to_string(),
                2,
            ),
            effective_rate_ray: quote.effective_rate_ray.map(|r| r.to_string()),
            effective_rate_pct: quote
                .effective_percent()
                .map(|p| calculator::format_significant(&p.to_string(), 2)),
        }
    }
}

// =============================================================================
// Users
// =============================================================================

/// Base-unit amount with its human rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountView {
    pub raw: String,
    pub formatted: String,
}

impl AmountView {
    pub fn new(amount: U256, decimals: u8) -> Self {
        Self {
            raw: amount.to_string(),
            formatted: calculator::format_token_amount(amount, decimals),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub token: TokenInfo,
    pub debt_token: Option<EvmAddress>,
    pub configured_amount: AmountView,
    pub wallet_balance: AmountView,
    pub debt_balance: Option<AmountView>,
    pub usable_amount: AmountView,
    pub allowance: Option<AmountView>,
    pub needs_approval: bool,
}

impl From<TokenPosition> for PositionView {
    fn from(position: TokenPosition) -> Self {
        let decimals = position.token.decimals;
        Self {
            configured_amount: AmountView::new(position.amounts.configured_amount, decimals),
            wallet_balance: AmountView::new(position.amounts.wallet_balance, decimals),
            debt_balance: position
                .amounts
                .debt_balance
                .map(|d| AmountView::new(d, decimals)),
            usable_amount: AmountView::new(position.amounts.usable(), decimals),
            allowance: position
                .approval
                .allowance
                .map(|a| AmountView::new(a, decimals)),
            needs_approval: position.approval.needs_approval(),
            debt_token: position.debt_token,
            token: position.token,
        }
    }
}

/// The configuration check view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfigResponse {
    pub user: EvmAddress,
    pub configured: bool,
    /// Informational message when nothing is configured
    pub message: Option<String>,
    pub periodicity_secs: Option<u64>,
    pub periodicity: Option<String>,
    pub last_repay: Option<String>,
    pub positions: Vec<PositionView>,
}

impl UserConfigResponse {
    pub fn new(user: EvmAddress, config: Option<UserConfig>, positions: Vec<TokenPosition>) -> Self {
        match config {
            Some(config) => Self {
                user,
                configured: true,
                message: None,
                periodicity_secs: Some(config.periodicity),
                periodicity: Some(calculator::format_period(config.periodicity)),
                last_repay: Some(calculator::format_timestamp(config.last_repay_timestamp)),
                positions: positions.into_iter().map(PositionView::from).collect(),
            },
            None => Self {
                user,
                configured: false,
                message: Some("No Rent2Repay configuration found".to_string()),
                periodicity_secs: None,
                periodicity: None,
                last_repay: None,
                positions: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    pub token: TokenInfo,
    pub balance: AmountView,
}

impl From<WalletBalance> for BalanceView {
    fn from(balance: WalletBalance) -> Self {
        Self {
            balance: AmountView::new(balance.balance, balance.token.decimals),
            token: balance.token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesResponse {
    pub account: EvmAddress,
    pub balances: Vec<BalanceView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub account: EvmAddress,
    pub reduction_token: EvmAddress,
    pub balance: String,
    pub minimum_balance: String,
    pub reduction_bps: u64,
    pub eligible: bool,
}

impl From<FeeEligibility> for EligibilityResponse {
    fn from(e: FeeEligibility) -> Self {
        Self {
            account: e.account,
            reduction_token: e.reduction_token,
            balance: e.balance.to_string(),
            minimum_balance: e.minimum_balance.to_string(),
            reduction_bps: e.reduction_bps,
            eligible: e.eligible,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    pub account: EvmAddress,
    pub has_admin: bool,
    pub has_operator: bool,
    pub has_emergency: bool,
    pub primary_role: Option<Role>,
    pub allowed_actions: Vec<MaintenanceAction>,
    /// Informational message for accounts holding no role
    pub message: Option<String>,
}

impl CapabilitiesResponse {
    pub fn new(account: EvmAddress, caps: Capabilities) -> Self {
        Self {
            account,
            has_admin: caps.has_admin,
            has_operator: caps.has_operator,
            has_emergency: caps.has_emergency,
            primary_role: caps.primary_role(),
            allowed_actions: caps.allowed_actions(),
            message: (!caps.has_any())
                .then(|| "This account holds no maintenance role".to_string()),
        }
    }
}

// =============================================================================
// Wizard
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StartWizardRequest {
    pub account: String,
    /// Read the account's existing configuration into the check step
    #[serde(default = "default_true")]
    pub load_existing: bool,
}

fn default_true() -> bool {
    true
}

/// User actions accepted by `POST /wizard/:id/action`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum WizardActionRequest {
    Configure,
    Modify,
    AddToken {
        token: String,
        amount: String,
    },
    RemoveToken {
        token: String,
    },
    Continue,
    SelectPeriod {
        #[serde(default)]
        preset: Option<u64>,
        #[serde(default)]
        custom: Option<String>,
    },
    SelectActivation {
        #[serde(default)]
        asap: bool,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        time: Option<String>,
    },
    RefreshAllowances,
    /// The wallet refused or failed to send an approval
    ApprovalFailed {
        token: String,
        message: String,
    },
    Submit,
    /// The wallet refused or failed to send the configuration
    SubmissionFailed {
        message: String,
    },
    Back,
    Cancel,
}

#[derive(Debug, Clone, Serialize)]
pub struct WizardResponse {
    pub id: Uuid,
    pub account: EvmAddress,
    pub step: WizardStep,
    pub state: WizardState,
    pub last_outcome: Option<SubmissionOutcome>,
    pub available_tokens: Vec<TokenInfo>,
    pub can_add_token: bool,
    /// Transactions the wallet should send next: approvals in the approval
    /// step, the configuration in the complete step
    pub transactions: Vec<UnsignedTx>,
    /// Offered from the check step when a configuration exists
    pub revoke: Option<UnsignedTx>,
}

// =============================================================================
// Transactions
// =============================================================================

/// Build request for writes that need only a sender
#[derive(Debug, Clone, Deserialize)]
pub struct SenderRequest {
    pub from: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rent2RepayRequest {
    pub from: String,
    pub user: String,
    pub token: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub from: String,
    /// Comma-separated user addresses
    pub users: String,
    pub token: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRequest {
    pub from: String,
    pub token: String,
    /// Human amount, e.g. "100.5"
    pub amount: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub from: String,
    pub token: String,
    pub supply_token: String,
    pub debt_token: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub from: String,
    pub token: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveUserRequest {
    pub from: String,
    pub user: String,
    #[serde(default)]
    pub preflight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchResponse {
    pub id: Uuid,
}
