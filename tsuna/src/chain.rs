//! Chain definitions and chain id helpers.
//!
//! A [`Chain`] is static configuration: it is built once when the
//! [`Client`](crate::Client) is created and never mutated afterwards.
//! Connections reference chains by numeric id only; whether a chain id is
//! "unsupported" is derived by looking it up in the configured list.

use std::fmt;

use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical Multicall3 deployment address, identical on most EVM chains.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Native currency metadata of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Currency name (e.g. `"Ether"`).
    pub name: String,
    /// Ticker symbol (e.g. `"ETH"`).
    pub symbol: String,
    /// Number of decimals.
    pub decimals: u8,
}

impl NativeCurrency {
    /// Ether with 18 decimals.
    #[must_use]
    pub fn ether() -> Self {
        Self {
            name: "Ether".into(),
            symbol: "ETH".into(),
            decimals: 18,
        }
    }
}

/// A block explorer entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExplorer {
    /// Display name.
    pub name: String,
    /// Base URL.
    pub url: String,
}

/// Well-known contracts deployed on a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContracts {
    /// Multicall3 aggregator, if deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicall3: Option<Address>,
}

/// An EVM-compatible chain.
///
/// # Examples
///
/// ```rust
/// use tsuna::chain::Chain;
///
/// let chain = Chain::mainnet();
/// assert_eq!(chain.id, 1);
/// assert!(chain.contracts.multicall3.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    /// Numeric chain id.
    pub id: u64,
    /// Human-readable name.
    pub name: String,
    /// Native currency.
    pub native_currency: NativeCurrency,
    /// JSON-RPC endpoints, first is the default.
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    /// Block explorers, first is the default.
    #[serde(default)]
    pub block_explorers: Vec<BlockExplorer>,
    /// Well-known contracts.
    #[serde(default)]
    pub contracts: ChainContracts,
    /// Whether the chain is a testnet.
    #[serde(default)]
    pub testnet: bool,
}

impl Chain {
    /// Create a chain with ether as native currency and no contracts.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            native_currency: NativeCurrency::ether(),
            rpc_urls: Vec::new(),
            block_explorers: Vec::new(),
            contracts: ChainContracts::default(),
            testnet: false,
        }
    }

    /// Add an RPC endpoint.
    #[must_use]
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_urls.push(url.into());
        self
    }

    /// Add a block explorer.
    #[must_use]
    pub fn with_block_explorer(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.block_explorers.push(BlockExplorer {
            name: name.into(),
            url: url.into(),
        });
        self
    }

    /// Set the multicall aggregator address.
    #[must_use]
    pub const fn with_multicall3(mut self, address: Address) -> Self {
        self.contracts.multicall3 = Some(address);
        self
    }

    /// Set the native currency.
    #[must_use]
    pub fn with_native_currency(mut self, currency: NativeCurrency) -> Self {
        self.native_currency = currency;
        self
    }

    /// Mark the chain as a testnet.
    #[must_use]
    pub const fn testnet(mut self) -> Self {
        self.testnet = true;
        self
    }

    /// Default RPC endpoint, if any.
    #[must_use]
    pub fn default_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    /// Block explorer base URLs, as sent with `wallet_addEthereumChain`.
    #[must_use]
    pub fn block_explorer_urls(&self) -> Vec<String> {
        self.block_explorers.iter().map(|e| e.url.clone()).collect()
    }

    /// Ethereum mainnet (chain ID 1).
    #[must_use]
    pub fn mainnet() -> Self {
        Self::new(1, "Ethereum")
            .with_rpc_url("https://eth.merkle.io")
            .with_block_explorer("Etherscan", "https://etherscan.io")
            .with_multicall3(MULTICALL3_ADDRESS)
    }

    /// Sepolia testnet (chain ID 11155111).
    #[must_use]
    pub fn sepolia() -> Self {
        Self::new(11_155_111, "Sepolia")
            .with_native_currency(NativeCurrency {
                name: "Sepolia Ether".into(),
                symbol: "ETH".into(),
                decimals: 18,
            })
            .with_rpc_url("https://rpc.sepolia.org")
            .with_block_explorer("Etherscan", "https://sepolia.etherscan.io")
            .with_multicall3(MULTICALL3_ADDRESS)
            .testnet()
    }

    /// OP Mainnet (chain ID 10).
    #[must_use]
    pub fn optimism() -> Self {
        Self::new(10, "OP Mainnet")
            .with_rpc_url("https://mainnet.optimism.io")
            .with_block_explorer("Optimism Explorer", "https://optimistic.etherscan.io")
            .with_multicall3(MULTICALL3_ADDRESS)
    }

    /// Arbitrum One (chain ID 42161).
    #[must_use]
    pub fn arbitrum() -> Self {
        Self::new(42_161, "Arbitrum One")
            .with_rpc_url("https://arb1.arbitrum.io/rpc")
            .with_block_explorer("Arbiscan", "https://arbiscan.io")
            .with_multicall3(MULTICALL3_ADDRESS)
    }

    /// Base (chain ID 8453).
    #[must_use]
    pub fn base() -> Self {
        Self::new(8453, "Base")
            .with_rpc_url("https://mainnet.base.org")
            .with_block_explorer("Basescan", "https://basescan.org")
            .with_multicall3(MULTICALL3_ADDRESS)
    }

    /// Polygon `PoS` (chain ID 137).
    #[must_use]
    pub fn polygon() -> Self {
        Self::new(137, "Polygon")
            .with_native_currency(NativeCurrency {
                name: "POL".into(),
                symbol: "POL".into(),
                decimals: 18,
            })
            .with_rpc_url("https://polygon-rpc.com")
            .with_block_explorer("PolygonScan", "https://polygonscan.com")
            .with_multicall3(MULTICALL3_ADDRESS)
    }

    /// Local Foundry / Anvil node (chain ID 31337), without multicall.
    #[must_use]
    pub fn foundry() -> Self {
        Self::new(31_337, "Foundry")
            .with_rpc_url("http://127.0.0.1:8545")
            .testnet()
    }

    /// Look up a built-in chain definition by id.
    #[must_use]
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            1 => Some(Self::mainnet()),
            10 => Some(Self::optimism()),
            137 => Some(Self::polygon()),
            8453 => Some(Self::base()),
            31_337 => Some(Self::foundry()),
            42_161 => Some(Self::arbitrum()),
            11_155_111 => Some(Self::sepolia()),
            _ => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Find a chain by id in an ordered chain list.
#[must_use]
pub fn find_chain(chains: &[Chain], id: u64) -> Option<&Chain> {
    chains.iter().find(|c| c.id == id)
}

/// Whether `id` is absent from the configured chain list.
#[must_use]
pub fn is_unsupported(chains: &[Chain], id: u64) -> bool {
    find_chain(chains, id).is_none()
}

/// Normalize a chain id reported by a wallet to a canonical integer.
///
/// Wallets report `eth_chainId` / `chainChanged` payloads as `0x`-prefixed
/// hex strings, decimal strings or JSON numbers.
///
/// # Errors
///
/// Returns [`Error::Provider`] if the value is not a valid chain id.
pub fn normalize_chain_id(value: &serde_json::Value) -> Result<u64> {
    let invalid = || Error::Provider {
        code: -32603,
        message: format!("invalid chain id: {value}"),
    };
    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(invalid),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).map_err(|_| invalid())
            } else {
                s.parse::<u64>().map_err(|_| invalid())
            }
        }
        _ => Err(invalid()),
    }
}

/// Encode a chain id as the `0x`-prefixed hex string wallets expect.
#[must_use]
pub fn to_hex_chain_id(id: u64) -> String {
    format!("{id:#x}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_normalize_chain_id_forms() {
        assert_eq!(normalize_chain_id(&json!("0x1")).ok(), Some(1));
        assert_eq!(normalize_chain_id(&json!("0xa4b1")).ok(), Some(42_161));
        assert_eq!(normalize_chain_id(&json!("137")).ok(), Some(137));
        assert_eq!(normalize_chain_id(&json!(10)).ok(), Some(10));
        assert!(normalize_chain_id(&json!("0xzz")).is_err());
        assert!(normalize_chain_id(&json!(null)).is_err());
        assert!(normalize_chain_id(&json!(-1)).is_err());
    }

    #[test]
    fn test_hex_chain_id() {
        assert_eq!(to_hex_chain_id(1), "0x1");
        assert_eq!(to_hex_chain_id(11_155_111), "0xaa36a7");
    }

    #[test]
    fn test_unsupported_is_derived_from_list() {
        let chains = vec![Chain::mainnet(), Chain::sepolia()];
        assert!(!is_unsupported(&chains, 1));
        assert!(is_unsupported(&chains, 69));
        assert_eq!(find_chain(&chains, 11_155_111).map(|c| c.name.as_str()), Some("Sepolia"));
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Chain::from_id(8453).map(|c| c.name), Some("Base".to_owned()));
        assert!(Chain::from_id(999).is_none());
        assert!(Chain::foundry().contracts.multicall3.is_none());
        assert_eq!(Chain::mainnet().to_string(), "Ethereum (1)");
    }

    #[test]
    fn test_chain_serde_uses_camel_case() {
        let value = serde_json::to_value(Chain::foundry()).unwrap_or_default();
        assert!(value.get("nativeCurrency").is_some());
        assert!(value.get("rpcUrls").is_some());
    }
}
