//! Contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the contracts
//! the app reads from and writes to. Only the functions this crate calls are
//! declared.

use alloy::sol;

sol! {
    /// ERC20 subset (USDC, USDC.pol, wVTRU)
    #[sol(rpc)]
    contract ERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

sol! {
    /// wVTRU wrap contract with epoch circuit breaker
    #[sol(rpc)]
    contract WrappedVtru {
        /// Wrap the attached native VTRU into wVTRU
        function wrap() external payable;

        /// Burn wVTRU and return native VTRU
        function unwrap(uint256 amount) external;

        /// Circuit breaker state: price in cents, epoch-wide wrap limit,
        /// per-user period limit, user period in blocks, total wrapped and
        /// wrapped in the current epoch (whole VTRU)
        function circuitBreakerInfo() external view returns (
            uint256 price,
            uint256 totalEpochWrapLimit,
            uint256 userPeriodWrapLimit,
            uint256 userPeriodBlocks,
            uint256 totalWrapped,
            uint256 totalEpochWrapped
        );

        /// First block of the next epoch
        function epochNextBlock() external view returns (uint256);

        /// Per-user wrap bookkeeping
        function userInfo(address account) external view returns (
            uint256 periodWrapped,
            uint256 lastWrapBlock,
            uint256 nextWrapBlock
        );
    }
}

sol! {
    /// VIA fiat-token bridge settlement contract
    #[sol(rpc)]
    contract ViaBridge {
        /// Bridge `amount` of the fiat token to `to` on the destination chain
        function bridge(address to, uint256 amount) external returns (uint256 txId);
    }
}
