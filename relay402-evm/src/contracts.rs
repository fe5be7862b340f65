//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface the relay needs:
//! - [`IMinimalForwarder`] — the trusted forwarder (EIP-2771 pattern)
//! - [`IStablecoin`] — ERC-20 + EIP-3009 subset for USDC-style tokens
//! - [`ISwapRouter`] — V2-style router used by the auto-rebalance loop

use alloy_sol_types::sol;

sol! {
    /// Trusted forwarder contract: verifies a typed `ForwardRequest`
    /// envelope and performs the inner call with the signer's address
    /// appended to calldata.
    ///
    /// The `ForwardRequest` struct doubles as the EIP-712 type the
    /// agent signs; field order here must not change.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IMinimalForwarder {
        struct ForwardRequest {
            address from;
            address to;
            uint256 value;
            uint256 gas;
            uint256 nonce;
            uint256 deadline;
            bytes data;
        }

        function getNonce(address from) external view returns (uint256);
        function verify(ForwardRequest calldata req, bytes calldata signature) external view returns (bool);
        function execute(ForwardRequest calldata req, bytes calldata signature) external payable returns (bool, bytes memory);

        event Executed(address indexed from, address indexed to, bool success, bytes result);
    }
}

sol! {
    /// ERC-20 + EIP-3009 subset for USDC-style stablecoins.
    ///
    /// `transferWithAuthorization` is the split-signature (v, r, s)
    /// variant; `approve`/`allowance` exist for the rebalance path.
    ///
    /// References:
    /// - EIP-3009: <https://eips.ethereum.org/EIPS/eip-3009>
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IStablecoin {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function DOMAIN_SEPARATOR() external view returns (bytes32);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}

sol! {
    /// Uniswap-V2-style router subset used to swap collected stablecoin
    /// back into native gas.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface ISwapRouter {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
        function swapExactTokensForETH(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }
}
