//! Chain reads that feed wizard sessions
//!
//! The wizard itself never performs I/O. These helpers read what a step
//! needs, then apply the result as an event, re-checking the step under the
//! session lock since the session may have moved on during the read.

use evm_tx::UnsignedTx;
use rent2repay::{
    fetch_allowances, fetch_user_config, SubmissionStatus, TokenInfo, Wizard, WizardEvent,
    WizardState, WizardStep,
};
use uuid::Uuid;

use crate::dto::WizardResponse;
use crate::state::{unix_now, AppError, AppState};
use crate::tx_watcher::{Resolution, TxOperation};

/// Read the account's configuration into the check step
pub async fn load_existing(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let wizard = state.wizard(id).await?;
    if wizard.step() != WizardStep::Check {
        return Ok(());
    }

    let contract = state.contract().await?;
    let client = state.require_client().await?;
    let existing = fetch_user_config(&client, contract, wizard.account()).await?;

    state
        .with_wizard(id, |w| match w.step() {
            WizardStep::Check => w.apply(WizardEvent::ExistingLoaded(existing), unix_now()),
            _ => Ok(()),
        })
        .await
}

/// Re-read allowances for the tokens of the approval step
pub async fn refresh_allowances(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let wizard = state.wizard(id).await?;
    let tokens: Vec<_> = match wizard.state() {
        WizardState::Approval { approvals, .. } => {
            approvals.iter().map(|a| a.token.address).collect()
        }
        _ => return Ok(()),
    };

    let contract = state.contract().await?;
    let client = state.require_client().await?;
    state.invalidate_account(wizard.account()).await;
    let allowances = fetch_allowances(&client, contract, wizard.account(), &tokens).await;

    state
        .with_wizard(id, |w| match w.step() {
            WizardStep::Approval => w.apply(WizardEvent::AllowancesRefreshed(allowances), unix_now()),
            _ => Ok(()),
        })
        .await
}

/// Move a session forward once a watched transaction resolves
pub async fn on_tx_resolved(state: &AppState, id: Uuid, resolution: &Resolution) {
    let item = &resolution.item;
    let failure = resolution.failure_message();

    let result = match (item.operation, failure, item.token) {
        (TxOperation::Approve, None, _) => refresh_allowances(state, id).await,
        (TxOperation::Approve, Some(message), Some(token)) => {
            state
                .with_wizard(id, |w| match w.step() {
                    WizardStep::Approval => {
                        w.apply(WizardEvent::ApprovalFailed { token, message }, unix_now())
                    }
                    _ => Ok(()),
                })
                .await
        }
        (TxOperation::Configure, None, _) => {
            let confirmed = state
                .with_wizard(id, |w| match w.state() {
                    WizardState::Complete {
                        status: SubmissionStatus::Pending,
                        ..
                    } => w.apply(WizardEvent::SubmissionConfirmed, unix_now()),
                    _ => Ok(()),
                })
                .await;
            match confirmed {
                Ok(()) => load_existing(state, id).await,
                Err(e) => Err(e),
            }
        }
        // A confirmed revoke leaves nothing configured
        (TxOperation::Revoke, None, _) => {
            state
                .with_wizard(id, |w| match w.step() {
                    WizardStep::Check => w.apply(WizardEvent::ExistingLoaded(None), unix_now()),
                    _ => Ok(()),
                })
                .await
        }
        (TxOperation::Configure, Some(message), _) => {
            state
                .with_wizard(id, |w| match w.step() {
                    WizardStep::Complete => {
                        w.apply(WizardEvent::SubmissionFailed { message }, unix_now())
                    }
                    _ => Ok(()),
                })
                .await
        }
        _ => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!(
            session = %id,
            tx_hash = %item.tx_hash,
            error = %e,
            "Failed to update wizard after transaction"
        );
    }
}

/// Transactions the wallet should send for the session's current step
pub async fn pending_transactions(
    state: &AppState,
    wizard: &Wizard,
) -> Result<Vec<UnsignedTx>, AppError> {
    match wizard.state() {
        WizardState::Approval { .. } => {
            let builder = state.tx_builder().await?;
            wizard
                .tokens_needing_approval()
                .into_iter()
                .filter(|a| a.pending_tx.is_none())
                .map(|a| {
                    builder
                        .approve(wizard.account(), &a.token, a.check.required)
                        .map_err(AppError::from)
                })
                .collect()
        }
        WizardState::Complete {
            args,
            status: SubmissionStatus::AwaitingSignature,
            ..
        } => {
            let builder = state.tx_builder().await?;
            Ok(vec![builder.configure(wizard.account(), args)?])
        }
        _ => Ok(Vec::new()),
    }
}

/// `revokeRent2RepayAll()` for an account whose configuration is on screen
pub async fn revoke_transaction(
    state: &AppState,
    wizard: &Wizard,
) -> Result<Option<UnsignedTx>, AppError> {
    match wizard.state() {
        WizardState::Check { existing: Some(_) } => {
            Ok(Some(state.tx_builder().await?.revoke_all(wizard.account())))
        }
        _ => Ok(None),
    }
}

/// Full view of a session
pub async fn view(state: &AppState, id: Uuid) -> Result<WizardResponse, AppError> {
    let wizard = state.wizard(id).await?;
    let transactions = pending_transactions(state, &wizard).await?;
    let revoke = revoke_transaction(state, &wizard).await?;
    let catalog = state.config().await.tokens;

    Ok(WizardResponse {
        id,
        account: wizard.account(),
        step: wizard.step(),
        state: wizard.state().clone(),
        last_outcome: wizard.last_outcome().cloned(),
        available_tokens: wizard
            .available_tokens()
            .into_iter()
            .map(|t| TokenInfo::lookup(&catalog, t.address))
            .collect(),
        can_add_token: wizard.can_add_token(),
        transactions,
        revoke,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_watcher::{WatchItem, WatchStatus};
    use alloy_primitives::U256;
    use r2r_core::{AppConfig, EvmAddress, TxHash, USDC_ADDRESS};
    use rent2repay::{ConfiguredToken, UserConfig};

    fn state() -> AppState {
        let config = AppConfig {
            contract_address: Some(
                EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap(),
            ),
            ..AppConfig::default()
        };
        AppState::with_config(config)
    }

    #[tokio::test]
    async fn test_view_of_fresh_session() {
        let state = state();
        let id = state.create_wizard(EvmAddress::ZERO).await;
        let view = view(&state, id).await.unwrap();
        assert_eq!(view.step, WizardStep::Check);
        assert!(view.transactions.is_empty());
        assert!(!view.can_add_token);
    }

    #[tokio::test]
    async fn test_approval_step_lists_approvals() {
        let state = state();
        let account = EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let id = state.create_wizard(account).await;
        let now = unix_now();

        state
            .with_wizard(id, |w| {
                w.apply(WizardEvent::Configure, now)?;
                w.apply(
                    WizardEvent::AddToken {
                        token: USDC_ADDRESS,
                        amount: "100".to_string(),
                    },
                    now,
                )?;
                w.apply(WizardEvent::Continue, now)?;
                w.apply(
                    WizardEvent::SelectPeriod(rent2repay::PeriodChoice::Preset(86_400)),
                    now,
                )?;
                w.apply(
                    WizardEvent::SelectActivation(rent2repay::ActivationChoice::Asap),
                    now,
                )
            })
            .await
            .unwrap();

        let view = view(&state, id).await.unwrap();
        assert_eq!(view.step, WizardStep::Approval);
        assert_eq!(view.transactions.len(), 1);
        assert_eq!(view.transactions[0].to, USDC_ADDRESS);
        assert_eq!(view.transactions[0].from, Some(account));
    }

    #[tokio::test]
    async fn test_refresh_outside_approval_is_noop() {
        let state = state();
        let id = state.create_wizard(EvmAddress::ZERO).await;
        refresh_allowances(&state, id).await.unwrap();
        assert_eq!(state.wizard(id).await.unwrap().step(), WizardStep::Check);
    }

    fn resolution(account: EvmAddress, operation: TxOperation, status: WatchStatus) -> Resolution {
        Resolution {
            item: WatchItem::new(
                TxHash::parse(&format!("0x{}", "ef".repeat(32))).unwrap(),
                account,
                operation,
                String::new(),
                None,
                Some(USDC_ADDRESS),
            ),
            status,
            block_number: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_confirmed_revoke_clears_existing() {
        let state = state();
        let account = EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let id = state.create_wizard(account).await;
        let existing = UserConfig {
            user: account,
            tokens: vec![ConfiguredToken {
                token: USDC_ADDRESS,
                max_amount: U256::from(100_000_000u64),
            }],
            periodicity: 86_400,
            last_repay_timestamp: 0,
        };
        state
            .with_wizard(id, |w| w.apply(WizardEvent::ExistingLoaded(Some(existing)), unix_now()))
            .await
            .unwrap();

        let before = view(&state, id).await.unwrap();
        let revoke = before.revoke.unwrap();
        assert_eq!(revoke.from, Some(account));

        // A failed revoke keeps the configuration
        on_tx_resolved(&state, id, &resolution(account, TxOperation::Revoke, WatchStatus::Failed)).await;
        assert!(view(&state, id).await.unwrap().revoke.is_some());

        on_tx_resolved(&state, id, &resolution(account, TxOperation::Revoke, WatchStatus::Confirmed)).await;
        let after = state.wizard(id).await.unwrap();
        assert_eq!(after.state(), &WizardState::Check { existing: None });
        assert!(view(&state, id).await.unwrap().revoke.is_none());
    }

    #[tokio::test]
    async fn test_failed_approval_is_shown_inline() {
        let state = state();
        let account = EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let id = state.create_wizard(account).await;
        let now = unix_now();
        state
            .with_wizard(id, |w| {
                w.apply(WizardEvent::Configure, now)?;
                w.apply(
                    WizardEvent::AddToken {
                        token: USDC_ADDRESS,
                        amount: "100".to_string(),
                    },
                    now,
                )?;
                w.apply(WizardEvent::Continue, now)?;
                w.apply(
                    WizardEvent::SelectPeriod(rent2repay::PeriodChoice::Preset(86_400)),
                    now,
                )?;
                w.apply(
                    WizardEvent::SelectActivation(rent2repay::ActivationChoice::Asap),
                    now,
                )
            })
            .await
            .unwrap();

        on_tx_resolved(&state, id, &resolution(account, TxOperation::Approve, WatchStatus::Dropped)).await;
        let WizardState::Approval { error, .. } = state.wizard(id).await.unwrap().state().clone() else {
            panic!("expected approval");
        };
        assert_eq!(error.as_deref(), Some("transaction dropped from the mempool"));
    }
}
