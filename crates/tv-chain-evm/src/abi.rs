//! Solidity interfaces of the token, vault and router contracts.

use alloy_sol_types::sol;

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface ITimelockVault {
        function nextDepositId() external view returns (uint256);
        function deposits(uint256 depositId) external view returns (
            address owner,
            uint256 principal,
            uint64 startTime,
            uint64 unlockTime,
            bool withdrawn
        );
        function withdraw(uint256 depositId) external;
        function emergencyWithdraw(uint256 depositId) external;

        event Deposited(
            uint256 indexed depositId,
            address indexed owner,
            uint256 grossAmount,
            uint256 feeAmount,
            uint256 principal,
            uint64 unlockTime
        );
        event Withdrawn(uint256 indexed depositId, address indexed owner, uint256 amount);
        event EmergencyWithdrawn(
            uint256 indexed depositId,
            address indexed owner,
            uint256 payout,
            uint256 penalty
        );
    }

    interface IVaultRouter {
        function deposit(uint256 grossAmount, uint64 duration) external returns (uint256 depositId);
        function withdraw(uint256 depositId) external;
        function emergencyWithdraw(uint256 depositId) external;

        event DepositRouted(
            address indexed user,
            uint256 indexed depositId,
            uint256 grossAmount,
            uint256 feeAmount,
            uint256 principal,
            uint64 duration
        );
    }
}
