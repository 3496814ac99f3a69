//! EIP-1193 provider capability.
//!
//! [`Eip1193Provider`] is the minimal surface an injected wallet exposes:
//! a JSON-RPC `request` method, an event listener slot, and a few identity
//! flags used to pick the right provider when several are injected.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;

/// Error returned by an EIP-1193 `request`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    /// EIP-1193 / JSON-RPC error code.
    pub code: i64,
    /// Provider message.
    pub message: String,
    /// Optional error payload.
    pub data: Option<Value>,
}

impl ProviderRpcError {
    /// The user rejected the request.
    pub const USER_REJECTED: i64 = 4001;
    /// The requested method or account is not authorized.
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider is disconnected from all chains.
    pub const DISCONNECTED: i64 = 4900;
    /// The requested chain has not been added to the wallet.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// A request of the same kind is already pending.
    pub const RESOURCE_UNAVAILABLE: i64 = -32002;
    /// Internal JSON-RPC error.
    pub const INTERNAL: i64 = -32603;

    /// Create an error without payload.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Whether the user rejected the request.
    #[must_use]
    pub const fn is_user_rejected(&self) -> bool {
        self.code == Self::USER_REJECTED
    }
}

impl From<ProviderRpcError> for Error {
    fn from(err: ProviderRpcError) -> Self {
        match err.code {
            ProviderRpcError::USER_REJECTED => Self::UserRejectedRequest(err.message),
            ProviderRpcError::RESOURCE_UNAVAILABLE => Self::ResourceUnavailable(err.message),
            code => Self::Provider {
                code,
                message: err.message,
            },
        }
    }
}

/// Raw event emitted by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// `accountsChanged` with hex addresses.
    AccountsChanged(Vec<String>),
    /// `chainChanged` with a hex or decimal chain id.
    ChainChanged(Value),
    /// `connect` with the provider's chain id.
    Connect {
        /// Hex or decimal chain id.
        chain_id: Value,
    },
    /// `disconnect`, optionally carrying the reason.
    Disconnect(Option<ProviderRpcError>),
}

/// Callback installed on a provider to receive its events.
pub type ProviderListener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Identity flags exposed by injected providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProviderFlags {
    /// `isMetaMask`.
    pub is_meta_mask: bool,
    /// `isBraveWallet`.
    pub is_brave_wallet: bool,
    /// `isTokenary`.
    pub is_tokenary: bool,
    /// `isCoinbaseWallet`.
    pub is_coinbase_wallet: bool,
}

/// An EIP-1193 provider.
#[async_trait]
pub trait Eip1193Provider: Send + Sync + fmt::Debug {
    /// Send a JSON-RPC request.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Install (or with `None`, remove) the event listener.
    fn set_listener(&self, listener: Option<ProviderListener>);

    /// Identity flags.
    fn flags(&self) -> ProviderFlags {
        ProviderFlags::default()
    }
}

/// Which injected provider a connector should bind to.
#[derive(Clone)]
pub enum Target {
    /// The first injected provider.
    Injected,
    /// MetaMask, excluding wallets that impersonate it.
    MetaMask,
    /// Coinbase Wallet.
    CoinbaseWallet,
    /// A custom wallet selected by predicate.
    Custom {
        /// Connector id.
        id: String,
        /// Display name.
        name: String,
        /// Provider selector.
        predicate: fn(&ProviderFlags) -> bool,
    },
}

impl Target {
    /// Connector id for this target.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Injected => "injected",
            Self::MetaMask => "metaMask",
            Self::CoinbaseWallet => "coinbaseWallet",
            Self::Custom { id, .. } => id,
        }
    }

    /// Display name for this target.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Injected => "Injected",
            Self::MetaMask => "MetaMask",
            Self::CoinbaseWallet => "Coinbase Wallet",
            Self::Custom { name, .. } => name,
        }
    }

    /// Whether a provider with `flags` matches this target.
    #[must_use]
    pub fn matches(&self, flags: &ProviderFlags) -> bool {
        match self {
            Self::Injected => true,
            // Brave and Tokenary set `isMetaMask` too.
            Self::MetaMask => flags.is_meta_mask && !flags.is_brave_wallet && !flags.is_tokenary,
            Self::CoinbaseWallet => flags.is_coinbase_wallet,
            Self::Custom { predicate, .. } => predicate(flags),
        }
    }

    /// Pick the first matching provider.
    #[must_use]
    pub fn resolve(
        &self,
        providers: &[Arc<dyn Eip1193Provider>],
    ) -> Option<Arc<dyn Eip1193Provider>> {
        providers
            .iter()
            .find(|p| self.matches(&p.flags()))
            .map(Arc::clone)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_translation() {
        assert_eq!(
            Error::from(ProviderRpcError::new(4001, "denied")),
            Error::UserRejectedRequest("denied".into())
        );
        assert_eq!(
            Error::from(ProviderRpcError::new(-32002, "pending")),
            Error::ResourceUnavailable("pending".into())
        );
        assert_eq!(
            Error::from(ProviderRpcError::new(-32000, "boom")),
            Error::Provider {
                code: -32000,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_metamask_excludes_impersonators() {
        let brave = ProviderFlags {
            is_meta_mask: true,
            is_brave_wallet: true,
            ..ProviderFlags::default()
        };
        let metamask = ProviderFlags {
            is_meta_mask: true,
            ..ProviderFlags::default()
        };
        assert!(!Target::MetaMask.matches(&brave));
        assert!(Target::MetaMask.matches(&metamask));
        assert!(Target::Injected.matches(&brave));
    }

    #[test]
    fn test_custom_target() {
        let target = Target::Custom {
            id: "tokenary".into(),
            name: "Tokenary".into(),
            predicate: |f| f.is_tokenary,
        };
        assert_eq!(target.id(), "tokenary");
        assert!(!target.matches(&ProviderFlags::default()));
    }
}
