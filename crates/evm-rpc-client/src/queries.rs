//! Typed contract read helpers

use alloy_primitives::U256;
use alloy_sol_types::SolCall;
use evm_tx::IERC20;
use r2r_core::{EvmAddress, RpcError};

use crate::{CacheKey, Result, RpcClient};

/// ABI-encode `call`, run it through the read cache and decode the return
pub async fn read<C: SolCall>(client: &RpcClient, key: CacheKey, call: &C) -> Result<C::Return> {
    let data = client.call_cached(key, &call.abi_encode()).await?;
    decode_return::<C>(&data)
}

fn decode_return<C: SolCall>(data: &[u8]) -> Result<C::Return> {
    if data.is_empty() {
        return Err(RpcError::ParseError(format!(
            "{} returned no data (is the target a contract?)",
            C::SIGNATURE
        )));
    }
    C::abi_decode_returns(data, true)
        .map_err(|e| RpcError::ParseError(format!("{}: {}", C::SIGNATURE, e)))
}

/// ERC-20 `balanceOf(owner)`
pub async fn erc20_balance(client: &RpcClient, token: EvmAddress, owner: EvmAddress) -> Result<U256> {
    let call = IERC20::balanceOfCall {
        owner: owner.as_address(),
    };
    Ok(read(client, CacheKey::account(token, owner), &call).await?.balance)
}

/// ERC-20 `allowance(owner, spender)`
pub async fn erc20_allowance(
    client: &RpcClient,
    token: EvmAddress,
    owner: EvmAddress,
    spender: EvmAddress,
) -> Result<U256> {
    let call = IERC20::allowanceCall {
        owner: owner.as_address(),
        spender: spender.as_address(),
    };
    Ok(read(client, CacheKey::account(token, owner), &call)
        .await?
        .remaining)
}

/// ERC-20 `decimals()`
pub async fn erc20_decimals(client: &RpcClient, token: EvmAddress) -> Result<u8> {
    Ok(read(client, CacheKey::contract(token), &IERC20::decimalsCall {})
        .await?
        .value)
}

/// ERC-20 `symbol()`
pub async fn erc20_symbol(client: &RpcClient, token: EvmAddress) -> Result<String> {
    Ok(read(client, CacheKey::contract(token), &IERC20::symbolCall {})
        .await?
        .value)
}
