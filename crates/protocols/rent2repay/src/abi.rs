//! Rent2Repay contract interface

use alloy_sol_types::sol;

sol! {
    interface IRent2Repay {
        // Reads
        function getUserConfigs(address user) external view returns (address[] tokens, uint256[] maxAmounts);
        function getLastRepayTimestamps(address user) external view returns (uint256 timestamp);
        function getPeriodicity(address user) external view returns (uint256 period);
        function getFeeConfiguration() external view returns (uint256 daoFeesBps, uint256 senderTipsBps);
        function getDaoFeeReductionConfiguration() external view returns (address reductionToken, uint256 minimumAmount, uint256 reductionBps, address treasury);
        function hasRole(bytes32 role, address account) external view returns (bool granted);
        function paused() external view returns (bool isPaused);

        // User writes
        function configureRent2Repay(address[] tokens, uint256[] amounts, uint256 period, uint256 timestamp) external;
        function revokeRent2RepayAll() external;

        // Execution
        function rent2repay(address user, address token) external;
        function batchRent2Repay(address[] users, address token) external;

        // Maintenance
        function authorizeTokenPair(address token, address supplyToken, address debtToken) external;
        function unauthorizeToken(address token) external;
        function removeUser(address user) external;
        function pause() external;
        function unpause() external;
    }
}
