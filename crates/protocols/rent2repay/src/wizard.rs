//! Configuration wizard
//!
//! A state machine walking a user from "no configuration" to a submitted
//! `configureRent2Repay` call:
//!
//! ```text
//! check -> token-selection -> periodicity-selection -> timestamp-selection
//!       -> approval -> summary -> complete -> check
//! ```
//!
//! Each [`WizardState`] variant carries only the data that is valid in that
//! step, and [`Wizard::apply`] is the single transition table. Chain
//! activity (allowance reads, receipts) enters as events as well, so the
//! machine itself never performs I/O and never reads the clock.

use std::collections::HashSet;

use alloy_primitives::U256;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use evm_tx::parse_units;
use r2r_core::{EvmAddress, ProtocolError, RepaymentToken, TxHash};
use serde::{Deserialize, Serialize};

use crate::constants::{periods, MAX_TOKENS};
use crate::state::{ApprovalCheck, TokenInfo, UserConfig};
use crate::tx_builder::ConfigureArgs;

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Action '{event}' is not available in step '{step}'")]
    InvalidTransition {
        step: &'static str,
        event: &'static str,
    },

    #[error(transparent)]
    Validation(#[from] ProtocolError),
}

impl WizardError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(e) => e.error_code(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidTransition { .. } => 409,
            Self::Validation(e) => e.status_code(),
        }
    }
}

/// A token the user wants repaid from, with the per-period maximum as typed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: EvmAddress,
    pub amount: String,
}

/// Choices collected up to the approval step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDraft {
    pub tokens: Vec<TokenConfig>,
    pub period: u64,
    pub activation_timestamp: u64,
    /// Activation was "as soon as possible"
    pub asap: bool,
}

/// Allowance status of one drafted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenApproval {
    pub token: TokenInfo,
    pub check: ApprovalCheck,
    /// Approval broadcast by the wallet, not yet confirmed
    pub pending_tx: Option<TxHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    /// Transaction built, waiting for the wallet to broadcast it
    AwaitingSignature,
    /// Broadcast, waiting for a receipt
    Pending,
}

/// The last configuration that confirmed on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub tx_hash: TxHash,
    pub args: ConfigureArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum WizardState {
    Check {
        existing: Option<UserConfig>,
    },
    TokenSelection {
        tokens: Vec<TokenConfig>,
    },
    PeriodicitySelection {
        tokens: Vec<TokenConfig>,
    },
    TimestampSelection {
        tokens: Vec<TokenConfig>,
        period: u64,
    },
    Approval {
        draft: ConfigDraft,
        approvals: Vec<TokenApproval>,
        error: Option<String>,
    },
    Summary {
        draft: ConfigDraft,
        error: Option<String>,
    },
    Complete {
        draft: ConfigDraft,
        args: ConfigureArgs,
        status: SubmissionStatus,
        tx_hash: Option<TxHash>,
    },
}

/// Step names without their data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    Check,
    TokenSelection,
    PeriodicitySelection,
    TimestampSelection,
    Approval,
    Summary,
    Complete,
}

impl WizardStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::TokenSelection => "token-selection",
            Self::PeriodicitySelection => "periodicity-selection",
            Self::TimestampSelection => "timestamp-selection",
            Self::Approval => "approval",
            Self::Summary => "summary",
            Self::Complete => "complete",
        }
    }
}

impl WizardState {
    pub fn step(&self) -> WizardStep {
        match self {
            Self::Check { .. } => WizardStep::Check,
            Self::TokenSelection { .. } => WizardStep::TokenSelection,
            Self::PeriodicitySelection { .. } => WizardStep::PeriodicitySelection,
            Self::TimestampSelection { .. } => WizardStep::TimestampSelection,
            Self::Approval { .. } => WizardStep::Approval,
            Self::Summary { .. } => WizardStep::Summary,
            Self::Complete { .. } => WizardStep::Complete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodChoice {
    Preset(u64),
    /// Seconds as typed; clamped to the minimum period
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationChoice {
    Asap,
    /// `YYYY-MM-DD` and `HH:MM[:SS]`, interpreted as UTC
    At { date: String, time: String },
}

/// Everything that can move the wizard: user actions and chain results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEvent {
    // User actions
    /// Configure (no configuration yet) or Modify (replace it)
    Configure,
    AddToken { token: EvmAddress, amount: String },
    RemoveToken { token: EvmAddress },
    Continue,
    SelectPeriod(PeriodChoice),
    SelectActivation(ActivationChoice),
    Submit,
    Back,
    Cancel,

    // Chain results
    ExistingLoaded(Option<UserConfig>),
    AllowancesRefreshed(Vec<(EvmAddress, Option<U256>)>),
    ApprovalSubmitted { token: EvmAddress, tx_hash: TxHash },
    ApprovalFailed { token: EvmAddress, message: String },
    SubmissionSent { tx_hash: TxHash },
    SubmissionConfirmed,
    SubmissionFailed { message: String },
}

impl WizardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::AddToken { .. } => "add-token",
            Self::RemoveToken { .. } => "remove-token",
            Self::Continue => "continue",
            Self::SelectPeriod(_) => "select-period",
            Self::SelectActivation(_) => "select-activation",
            Self::Submit => "submit",
            Self::Back => "back",
            Self::Cancel => "cancel",
            Self::ExistingLoaded(_) => "existing-loaded",
            Self::AllowancesRefreshed(_) => "allowances-refreshed",
            Self::ApprovalSubmitted { .. } => "approval-submitted",
            Self::ApprovalFailed { .. } => "approval-failed",
            Self::SubmissionSent { .. } => "submission-sent",
            Self::SubmissionConfirmed => "submission-confirmed",
            Self::SubmissionFailed { .. } => "submission-failed",
        }
    }
}

/// One user's configuration session
#[derive(Debug, Clone, Serialize)]
pub struct Wizard {
    account: EvmAddress,
    #[serde(skip)]
    catalog: Vec<RepaymentToken>,
    state: WizardState,
    last_outcome: Option<SubmissionOutcome>,
}

impl Wizard {
    pub fn new(account: EvmAddress, catalog: Vec<RepaymentToken>) -> Self {
        Self {
            account,
            catalog,
            state: WizardState::Check { existing: None },
            last_outcome: None,
        }
    }

    pub fn account(&self) -> EvmAddress {
        self.account
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn step(&self) -> WizardStep {
        self.state.step()
    }

    pub fn last_outcome(&self) -> Option<&SubmissionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Catalog tokens not yet in the selection
    pub fn available_tokens(&self) -> Vec<&RepaymentToken> {
        let selected: HashSet<EvmAddress> = match &self.state {
            WizardState::TokenSelection { tokens } => tokens.iter().map(|t| t.token).collect(),
            _ => HashSet::new(),
        };
        self.catalog
            .iter()
            .filter(|t| !selected.contains(&t.address))
            .collect()
    }

    pub fn can_add_token(&self) -> bool {
        match &self.state {
            WizardState::TokenSelection { tokens } => {
                tokens.len() < MAX_TOKENS && !self.available_tokens().is_empty()
            }
            _ => false,
        }
    }

    /// Tokens still needing an approval, in selection order
    pub fn tokens_needing_approval(&self) -> Vec<&TokenApproval> {
        match &self.state {
            WizardState::Approval { approvals, .. } => approvals
                .iter()
                .filter(|a| a.check.needs_approval())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Apply one event. On error the state is left untouched.
    ///
    /// `now` is the current unix time in seconds.
    pub fn apply(&mut self, event: WizardEvent, now: u64) -> Result<(), WizardError> {
        let next = self.transition(event, now)?;
        self.state = next;
        Ok(())
    }

    fn transition(&mut self, event: WizardEvent, now: u64) -> Result<WizardState, WizardError> {
        use WizardEvent as E;
        use WizardState as S;

        let step = self.state.step();
        let invalid = |event: &WizardEvent| WizardError::InvalidTransition {
            step: step.as_str(),
            event: event.name(),
        };

        let next = match (&self.state, event) {
            // check
            (S::Check { .. }, E::ExistingLoaded(existing)) => S::Check { existing },
            (S::Check { .. }, E::Configure) => S::TokenSelection { tokens: Vec::new() },

            // token-selection
            (S::TokenSelection { tokens }, E::AddToken { token, amount }) => {
                let mut tokens = tokens.clone();
                self.validate_new_token(&tokens, token, &amount)?;
                tokens.push(TokenConfig {
                    token,
                    amount: amount.trim().to_string(),
                });
                S::TokenSelection { tokens }
            }
            (S::TokenSelection { tokens }, E::RemoveToken { token }) => S::TokenSelection {
                tokens: tokens.iter().filter(|t| t.token != token).cloned().collect(),
            },
            (S::TokenSelection { tokens }, E::Continue) => {
                if tokens.is_empty() {
                    return Err(ProtocolError::InvalidAmount {
                        message: "add at least one token before continuing".to_string(),
                    }
                    .into());
                }
                S::PeriodicitySelection {
                    tokens: tokens.clone(),
                }
            }

            // periodicity-selection
            (S::PeriodicitySelection { tokens }, E::SelectPeriod(choice)) => {
                S::TimestampSelection {
                    tokens: tokens.clone(),
                    period: resolve_period(&choice)?,
                }
            }
            (S::PeriodicitySelection { tokens }, E::Back) => S::TokenSelection {
                tokens: tokens.clone(),
            },

            // timestamp-selection
            (S::TimestampSelection { tokens, period }, E::SelectActivation(choice)) => {
                let (activation_timestamp, asap) = match choice {
                    ActivationChoice::Asap => (now, true),
                    ActivationChoice::At { date, time } => {
                        (resolve_activation(&date, &time, now)?, false)
                    }
                };
                let draft = ConfigDraft {
                    tokens: tokens.clone(),
                    period: *period,
                    activation_timestamp,
                    asap,
                };
                let approvals = self.approvals_for(&draft)?;
                S::Approval {
                    draft,
                    approvals,
                    error: None,
                }
            }
            (S::TimestampSelection { tokens, .. }, E::Back) => S::PeriodicitySelection {
                tokens: tokens.clone(),
            },

            // approval
            (S::Approval { draft, approvals, .. }, E::AllowancesRefreshed(allowances)) => {
                let approvals: Vec<TokenApproval> = approvals
                    .iter()
                    .map(|approval| {
                        let allowance = allowances
                            .iter()
                            .find(|(token, _)| *token == approval.token.address)
                            .map(|(_, allowance)| *allowance)
                            .unwrap_or(approval.check.allowance);
                        let check = ApprovalCheck::new(allowance, approval.check.required);
                        TokenApproval {
                            token: approval.token.clone(),
                            pending_tx: approval.pending_tx.filter(|_| check.needs_approval()),
                            check,
                        }
                    })
                    .collect();

                if approvals.iter().all(|a| a.check.sufficient) {
                    S::Summary {
                        draft: draft.clone(),
                        error: None,
                    }
                } else {
                    S::Approval {
                        draft: draft.clone(),
                        approvals,
                        error: None,
                    }
                }
            }
            (S::Approval { draft, approvals, .. }, E::ApprovalSubmitted { token, tx_hash }) => {
                let approvals = update_approval(approvals, token, |a| a.pending_tx = Some(tx_hash))?;
                S::Approval {
                    draft: draft.clone(),
                    approvals,
                    error: None,
                }
            }
            (S::Approval { draft, approvals, .. }, E::ApprovalFailed { token, message }) => {
                let approvals = update_approval(approvals, token, |a| a.pending_tx = None)?;
                S::Approval {
                    draft: draft.clone(),
                    approvals,
                    error: Some(message),
                }
            }
            (S::Approval { draft, .. }, E::Back) => S::TimestampSelection {
                tokens: draft.tokens.clone(),
                period: draft.period,
            },

            // summary
            (S::Summary { draft, .. }, E::Submit) => S::Complete {
                args: self.configure_args(draft)?,
                draft: draft.clone(),
                status: SubmissionStatus::AwaitingSignature,
                tx_hash: None,
            },
            (S::Summary { draft, .. }, E::Back) => S::TimestampSelection {
                tokens: draft.tokens.clone(),
                period: draft.period,
            },

            // complete
            (
                S::Complete {
                    draft,
                    args,
                    status: SubmissionStatus::AwaitingSignature,
                    ..
                },
                E::SubmissionSent { tx_hash },
            ) => S::Complete {
                draft: draft.clone(),
                args: args.clone(),
                status: SubmissionStatus::Pending,
                tx_hash: Some(tx_hash),
            },
            (
                S::Complete {
                    args,
                    status: SubmissionStatus::Pending,
                    tx_hash: Some(tx_hash),
                    ..
                },
                E::SubmissionConfirmed,
            ) => {
                self.last_outcome = Some(SubmissionOutcome {
                    tx_hash: *tx_hash,
                    args: args.clone(),
                });
                S::Check { existing: None }
            }
            // nothing broadcast yet, so the draft can still be edited
            (
                S::Complete {
                    draft,
                    status: SubmissionStatus::AwaitingSignature,
                    ..
                },
                E::Back,
            ) => S::Summary {
                draft: draft.clone(),
                error: None,
            },
            (S::Complete { draft, .. }, E::SubmissionFailed { message }) => S::Summary {
                draft: draft.clone(),
                error: Some(message),
            },

            // closing any pre-submission step abandons the draft
            (
                S::TokenSelection { .. }
                | S::PeriodicitySelection { .. }
                | S::TimestampSelection { .. }
                | S::Approval { .. }
                | S::Summary { .. },
                E::Cancel,
            ) => S::Check { existing: None },

            (_, event) => return Err(invalid(&event)),
        };

        tracing::debug!(
            account = %self.account,
            from = step.as_str(),
            to = next.step().as_str(),
            "Wizard transition"
        );
        Ok(next)
    }

    fn token_info(&self, token: EvmAddress) -> TokenInfo {
        TokenInfo::lookup(&self.catalog, token)
    }

    fn validate_new_token(
        &self,
        tokens: &[TokenConfig],
        token: EvmAddress,
        amount: &str,
    ) -> Result<(), ProtocolError> {
        if tokens.len() >= MAX_TOKENS {
            return Err(ProtocolError::TooManyTokens { max: MAX_TOKENS });
        }
        if tokens.iter().any(|t| t.token == token) {
            return Err(ProtocolError::DuplicateToken {
                token: token.to_hex(),
            });
        }
        if !self.catalog.iter().any(|t| t.address == token) {
            return Err(ProtocolError::UnknownToken {
                token: token.to_hex(),
            });
        }

        let parsed = parse_units(amount.trim(), self.token_info(token).decimals)?;
        if parsed.is_zero() {
            return Err(ProtocolError::InvalidAmount {
                message: "amount must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn approvals_for(&self, draft: &ConfigDraft) -> Result<Vec<TokenApproval>, ProtocolError> {
        draft
            .tokens
            .iter()
            .map(|t| {
                let token = self.token_info(t.token);
                let required = parse_units(&t.amount, token.decimals)?;
                Ok(TokenApproval {
                    token,
                    // Unknown until the first allowance read lands
                    check: ApprovalCheck::new(None, required),
                    pending_tx: None,
                })
            })
            .collect()
    }

    fn configure_args(&self, draft: &ConfigDraft) -> Result<ConfigureArgs, ProtocolError> {
        let amounts = draft
            .tokens
            .iter()
            .map(|t| parse_units(&t.amount, self.token_info(t.token).decimals))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConfigureArgs {
            tokens: draft.tokens.iter().map(|t| t.token).collect(),
            amounts,
            period: draft.period,
            activation_timestamp: draft.activation_timestamp,
        })
    }
}

fn update_approval(
    approvals: &[TokenApproval],
    token: EvmAddress,
    update: impl FnOnce(&mut TokenApproval),
) -> Result<Vec<TokenApproval>, ProtocolError> {
    let mut approvals = approvals.to_vec();
    let approval = approvals
        .iter_mut()
        .find(|a| a.token.address == token)
        .ok_or_else(|| ProtocolError::UnknownToken {
            token: token.to_hex(),
        })?;
    update(approval);
    Ok(approvals)
}

fn resolve_period(choice: &PeriodChoice) -> Result<u64, ProtocolError> {
    match choice {
        PeriodChoice::Preset(seconds) if periods::is_preset(*seconds) => Ok(*seconds),
        PeriodChoice::Preset(seconds) => Err(ProtocolError::InvalidPeriod {
            message: format!("{} seconds is not a preset", seconds),
        }),
        PeriodChoice::Custom(raw) => {
            let seconds: u64 = raw.trim().parse().map_err(|_| ProtocolError::InvalidPeriod {
                message: format!("'{}' is not a whole number of seconds", raw),
            })?;
            Ok(seconds.max(periods::MIN_PERIOD_SECS))
        }
    }
}

fn resolve_activation(date: &str, time: &str, now: u64) -> Result<u64, ProtocolError> {
    let (date, time) = (date.trim(), time.trim());
    if date.is_empty() || time.is_empty() {
        return Err(ProtocolError::MissingDateTime);
    }

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
        ProtocolError::InvalidTimestamp {
            message: format!("date '{}': {}", date, e),
        }
    })?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .map_err(|e| ProtocolError::InvalidTimestamp {
            message: format!("time '{}': {}", time, e),
        })?;

    let timestamp = NaiveDateTime::new(date, time).and_utc().timestamp();
    let timestamp = u64::try_from(timestamp).map_err(|_| ProtocolError::InvalidTimestamp {
        message: "activation before 1970".to_string(),
    })?;
    if timestamp < now {
        return Err(ProtocolError::InvalidTimestamp {
            message: "activation time is in the past".to_string(),
        });
    }
    Ok(timestamp)
}
