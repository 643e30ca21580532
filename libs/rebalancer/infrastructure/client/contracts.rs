//! Contract bindings for the liquidity book pair, router and rewarder

use ethers::contract::abigen;

// Generate contract bindings for the LB pair
abigen!(
    LbPair,
    r#"[
        function getTokenX() external view returns (address)
        function getTokenY() external view returns (address)
        function getActiveId() external view returns (uint24)
        function getBinStep() external view returns (uint16)
        function getPriceFromId(uint24 id) external view returns (uint256)
        function balanceOf(address account, uint256 id) external view returns (uint256)
        function isApprovedForAll(address owner, address spender) external view returns (bool)
        function approveForAll(address spender, bool approved) external
    ]"#
);

// Generate contract bindings for the LB router
abigen!(
    LbRouter,
    r#"[
        struct LiquidityParameters { address tokenX; address tokenY; uint256 binStep; uint256 amountX; uint256 amountY; uint256 amountXMin; uint256 amountYMin; uint256 activeIdDesired; uint256 idSlippage; int256[] deltaIds; uint256[] distributionX; uint256[] distributionY; address to; address refundTo; uint256 deadline; }
        struct Path { uint256[] pairBinSteps; uint8[] versions; address[] tokenPath; }
        function addLiquidity(LiquidityParameters liquidityParameters) external returns (uint256 amountXAdded, uint256 amountYAdded, uint256 amountXLeft, uint256 amountYLeft, uint256[] depositIds, uint256[] liquidityMinted)
        function removeLiquidity(address tokenX, address tokenY, uint16 binStep, uint256 amountXMin, uint256 amountYMin, uint256[] ids, uint256[] amounts, address to, uint256 deadline) external returns (uint256 amountX, uint256 amountY)
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, Path path, address to, uint256 deadline) external returns (uint256 amountOut)
        function swapExactTokensForNATIVE(uint256 amountIn, uint256 amountOutMinNATIVE, Path path, address to, uint256 deadline) external returns (uint256 amountOut)
    ]"#
);

// Generate contract bindings for the pair rewarder
abigen!(
    LbRewarder,
    r#"[
        function getRewardToken() external view returns (address)
        function getPendingRewards(address user, uint256[] ids) external view returns (uint256)
        function claim(address user, uint256[] ids) external
    ]"#
);

// Generate contract bindings for ERC20 tokens
abigen!(
    Erc20,
    r#"[
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function balanceOf(address account) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function transfer(address to, uint256 amount) external returns (bool)
    ]"#
);
