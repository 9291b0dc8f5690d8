//! Rent2Repay Protocol Implementation
//!
//! Rent2Repay lets a user authorize a contract to pull rental income tokens
//! from their wallet on a fixed period and use them to repay debt on their
//! behalf.
//!
//! # Architecture
//!
//! The user configures, per token, the maximum amount that may be pulled
//! per period and approves the contract to spend it. Anyone can then trigger
//! `rent2repay(user, token)`; operators can batch it over many users. Fees
//! (DAO fee plus a sender tip) are taken from each repayment, and holders of
//! the reduction token pay a reduced DAO fee.

pub mod abi;
pub mod calculator;
pub mod constants;
pub mod fetch;
pub mod roles;
pub mod state;
pub mod tx_builder;
pub mod wizard;

// Re-exports
pub use calculator::*;
pub use fetch::*;
pub use roles::{resolve_capabilities, Capabilities, MaintenanceAction, Role};
pub use state::*;
pub use tx_builder::{parse_user_list, preflight, ConfigureArgs, Rent2RepayTxBuilder};
pub use wizard::{
    ActivationChoice, PeriodChoice, SubmissionStatus, TokenConfig, Wizard, WizardError,
    WizardEvent, WizardState, WizardStep,
};
