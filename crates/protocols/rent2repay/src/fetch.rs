//! Rent2Repay State Fetching from the RPC endpoint
//!
//! Every fetcher issues its independent reads concurrently and builds the
//! derived values from whatever resolved. Optional reads (debt balances,
//! allowances) degrade to `None` with a log line instead of failing the call.

use alloy_primitives::U256;
use evm_rpc_client::{queries, CacheKey, RpcClient};
use futures::future::join_all;
use r2r_core::{EvmAddress, RepaymentToken};

use crate::abi::IRent2Repay;
use crate::state::{
    debt_token_for, ContractInfo, EffectiveRateQuote, FeeConfiguration, FeeEligibility,
    FeeReductionConfiguration, TokenAmountTriple, TokenInfo, TokenPosition, UserConfig,
    UserOverview, WalletBalance,
};

/// Fee configuration, reduction configuration and pause flag
pub async fn fetch_contract_info(
    client: &RpcClient,
    contract: EvmAddress,
) -> r2r_core::Result<ContractInfo> {
    let key = CacheKey::contract(contract);
    let fees_call = IRent2Repay::getFeeConfigurationCall {};
    let reduction_call = IRent2Repay::getDaoFeeReductionConfigurationCall {};
    let paused_call = IRent2Repay::pausedCall {};
    let (fees, reduction, paused) = tokio::join!(
        queries::read(client, key, &fees_call),
        queries::read(client, key, &reduction_call),
        queries::read(client, key, &paused_call),
    );

    Ok(ContractInfo {
        contract,
        fees: FeeConfiguration::from(fees?),
        reduction: FeeReductionConfiguration::from(reduction?),
        paused: paused?.isPaused,
    })
}

/// Fee-reduction configuration alone
pub async fn fetch_reduction_config(
    client: &RpcClient,
    contract: EvmAddress,
) -> r2r_core::Result<FeeReductionConfiguration> {
    let ret = queries::read(
        client,
        CacheKey::contract(contract),
        &IRent2Repay::getDaoFeeReductionConfigurationCall {},
    )
    .await?;
    Ok(ret.into())
}

/// A user's configuration; `None` when they have configured no token
pub async fn fetch_user_config(
    client: &RpcClient,
    contract: EvmAddress,
    user: EvmAddress,
) -> r2r_core::Result<Option<UserConfig>> {
    let key = CacheKey::account(contract, user);
    let account = user.as_address();
    let configs_call = IRent2Repay::getUserConfigsCall { user: account };
    let periodicity_call = IRent2Repay::getPeriodicityCall { user: account };
    let last_repay_call = IRent2Repay::getLastRepayTimestampsCall { user: account };
    let (configs, periodicity, last_repay) = tokio::join!(
        queries::read(client, key, &configs_call),
        queries::read(client, key, &periodicity_call),
        queries::read(client, key, &last_repay_call),
    );

    let config = UserConfig::from_reads(user, configs?, periodicity?.period, last_repay?.timestamp)?;
    if !config.is_configured() {
        tracing::debug!(account = %user, "No Rent2Repay configuration found");
        return Ok(None);
    }
    Ok(Some(config))
}

/// Display metadata for `token`; tokens outside the catalog are read from
/// the token contract, falling back to `UNKNOWN` with 18 decimals
pub async fn fetch_token_info(
    client: &RpcClient,
    catalog: &[RepaymentToken],
    token: EvmAddress,
) -> TokenInfo {
    let fallback = TokenInfo::lookup(catalog, token);
    if fallback.is_known() {
        return fallback;
    }

    let (decimals, symbol) = tokio::join!(
        queries::erc20_decimals(client, token),
        queries::erc20_symbol(client, token),
    );
    match (decimals, symbol) {
        (Ok(decimals), Ok(symbol)) => TokenInfo {
            address: token,
            symbol,
            decimals,
        },
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(token = %token, error = %e, "Token metadata unavailable");
            fallback
        }
    }
}

/// Wallet balance, allowance and debt for every configured token
pub async fn fetch_token_positions(
    client: &RpcClient,
    contract: EvmAddress,
    catalog: &[RepaymentToken],
    config: &UserConfig,
) -> r2r_core::Result<Vec<TokenPosition>> {
    let user = config.user;
    let futures = config.tokens.iter().map(|configured| async move {
        let token = fetch_token_info(client, catalog, configured.token).await;
        let debt_token = debt_token_for(catalog, configured.token);

        let debt_read = async {
            match debt_token {
                Some(debt) => Some(queries::erc20_balance(client, debt, user).await),
                None => None,
            }
        };
        let (balance, allowance, debt) = tokio::join!(
            queries::erc20_balance(client, configured.token, user),
            queries::erc20_allowance(client, configured.token, user, contract),
            debt_read,
        );

        let allowance = match allowance {
            Ok(a) => Some(a),
            Err(e) => {
                tracing::warn!(account = %user, token = %configured.token, error = %e, "Failed to read allowance");
                None
            }
        };
        let debt_balance = match debt {
            Some(Ok(d)) => Some(d),
            Some(Err(e)) => {
                tracing::warn!(account = %user, token = %configured.token, error = %e, "Failed to read debt balance");
                None
            }
            None => {
                tracing::debug!(token = %configured.token, "No debt token known");
                None
            }
        };

        let amounts = TokenAmountTriple {
            configured_amount: configured.max_amount,
            wallet_balance: balance?,
            debt_balance,
        };
        Ok::<_, r2r_core::Error>(TokenPosition {
            approval: amounts.approval(allowance),
            token,
            debt_token,
            amounts,
        })
    });

    join_all(futures).await.into_iter().collect()
}

/// The account's reduction-token balance against the configured minimum
pub async fn fetch_fee_eligibility(
    client: &RpcClient,
    contract: EvmAddress,
    account: EvmAddress,
) -> r2r_core::Result<FeeEligibility> {
    let reduction = fetch_reduction_config(client, contract).await?;

    // No reduction program configured
    if reduction.reduction_token.is_zero() {
        return Ok(FeeEligibility {
            account,
            reduction_token: reduction.reduction_token,
            balance: U256::ZERO,
            minimum_balance: reduction.minimum_balance,
            reduction_bps: reduction.reduction_bps,
            eligible: false,
        });
    }

    let balance = queries::erc20_balance(client, reduction.reduction_token, account).await?;
    Ok(FeeEligibility {
        account,
        reduction_token: reduction.reduction_token,
        balance,
        minimum_balance: reduction.minimum_balance,
        reduction_bps: reduction.reduction_bps,
        eligible: reduction.is_eligible(balance),
    })
}

/// Allowances of `owner` toward the contract; failed reads come back as `None`
pub async fn fetch_allowances(
    client: &RpcClient,
    contract: EvmAddress,
    owner: EvmAddress,
    tokens: &[EvmAddress],
) -> Vec<(EvmAddress, Option<U256>)> {
    let futures = tokens.iter().map(|&token| async move {
        match queries::erc20_allowance(client, token, owner, contract).await {
            Ok(allowance) => (token, Some(allowance)),
            Err(e) => {
                tracing::warn!(account = %owner, token = %token, error = %e, "Failed to read allowance");
                (token, None)
            }
        }
    });
    join_all(futures).await
}

/// Balances of every catalog token; tokens whose read fails are skipped
pub async fn fetch_wallet_balances(
    client: &RpcClient,
    catalog: &[RepaymentToken],
    account: EvmAddress,
) -> Vec<WalletBalance> {
    let futures = catalog.iter().map(|token| async move {
        match queries::erc20_balance(client, token.address, account).await {
            Ok(balance) => Some(WalletBalance {
                token: TokenInfo::lookup(catalog, token.address),
                balance,
            }),
            Err(e) => {
                tracing::warn!(account = %account, token = %token.symbol, error = %e, "Failed to read balance");
                None
            }
        }
    });
    join_all(futures).await.into_iter().flatten().collect()
}

/// Configuration plus per-token positions, as shown by the check view
pub async fn fetch_user_overview(
    client: &RpcClient,
    contract: EvmAddress,
    catalog: &[RepaymentToken],
    user: EvmAddress,
) -> r2r_core::Result<UserOverview> {
    let config = fetch_user_config(client, contract, user).await?;
    let positions = match &config {
        Some(config) => fetch_token_positions(client, contract, catalog, config).await?,
        None => Vec::new(),
    };
    Ok(UserOverview {
        user,
        config,
        positions,
    })
}

/// Effective borrowing rate for `account` given the lending protocol's rate
pub async fn fetch_effective_rate(
    client: &RpcClient,
    contract: EvmAddress,
    account: EvmAddress,
    nominal_rate_ray: U256,
) -> r2r_core::Result<EffectiveRateQuote> {
    let (info, eligibility) = tokio::join!(
        fetch_contract_info(client, contract),
        fetch_fee_eligibility(client, contract, account),
    );
    let info = info?;
    let eligible = eligibility?.eligible;

    Ok(EffectiveRateQuote::new(
        nominal_rate_ray,
        info.fees,
        info.reduction.reduction_bps,
        eligible,
    ))
}
