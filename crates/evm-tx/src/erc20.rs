//! ERC-20 token interface

use alloy_primitives::U256;
use alloy_sol_types::{sol, SolCall};
use r2r_core::EvmAddress;

use crate::eip1193::UnsignedTx;
use crate::units::format_units;

sol! {
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool success);
        function decimals() external view returns (uint8 value);
        function symbol() external view returns (string value);
    }
}

/// Build an `approve(spender, amount)` request on `token`.
///
/// The approval is for the exact amount, never an unlimited allowance.
pub fn build_approve_tx(
    owner: EvmAddress,
    token: EvmAddress,
    spender: EvmAddress,
    amount: U256,
    decimals: u8,
    symbol: &str,
    chain_id: u64,
) -> UnsignedTx {
    let call = IERC20::approveCall {
        spender: spender.as_address(),
        amount,
    };
    UnsignedTx::call(token, call.abi_encode(), chain_id)
        .with_from(owner)
        .with_description(format!(
            "Approve {} {} for {}",
            format_units(amount, decimals),
            symbol,
            spender.to_short_string()
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_calldata() {
        let owner = EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let token = EvmAddress::parse("0xddafbb505ad214d7b80b1f830fccc89b60fb7a83").unwrap();
        let spender = EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap();

        let tx = build_approve_tx(owner, token, spender, U256::from(100_000_000u64), 6, "USDC", 100);

        assert_eq!(tx.to, token);
        assert_eq!(tx.selector(), Some(IERC20::approveCall::SELECTOR));
        // approve(address,uint256)
        assert!(tx.data.starts_with("0x095ea7b3"));
        assert_eq!(tx.description, "Approve 100 USDC for 0x1111...1111");

        let decoded = IERC20::approveCall::abi_decode(&tx.calldata(), true).unwrap();
        assert_eq!(decoded.spender, spender.as_address());
        assert_eq!(decoded.amount, U256::from(100_000_000u64));
    }
}
