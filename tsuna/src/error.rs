//! Unified error types for tsuna.
//!
//! This module provides the error taxonomy surfaced by every action:
//! - Connector and connection precondition failures
//! - Chain configuration and switching failures
//! - Wallet request failures translated from EIP-1193 provider codes
//! - Contract read failures (multicall and single calls)

use alloy::primitives::Address;

/// Result type alias for tsuna operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for tsuna.
///
/// Errors are `Clone` so that a single partition failure in
/// [`read_contracts`](crate::Client::read_contracts) can be reported for
/// every request it affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No provider handle is available for the connector.
    #[error("Connector not found")]
    ConnectorNotFound,

    /// The connector already has an active (or in-flight) connection.
    #[error("Connector already connected")]
    ConnectorAlreadyConnected,

    /// The connector has no active connection.
    #[error("Connector not connected")]
    ConnectorNotConnected,

    /// The requested account is not part of the connector's connection.
    #[error("Account \"{address}\" not found for connector \"{connector}\"")]
    ConnectorAccountNotFound {
        /// The account that was requested.
        address: Address,
        /// Id of the connector that was searched.
        connector: String,
    },

    /// The wallet reports a different chain than the stored connection.
    #[error(
        "The current chain of the wallet (id: {connector_chain_id}) does not match the connection chain (id: {connection_chain_id})"
    )]
    ConnectorChainMismatch {
        /// Chain id stored for the connection.
        connection_chain_id: u64,
        /// Chain id reported live by the connector.
        connector_chain_id: u64,
    },

    /// The chain id is not part of the configured chain list.
    #[error("Chain {chain_id} not configured")]
    ChainNotConfigured {
        /// The unknown chain id.
        chain_id: u64,
    },

    /// The wallet failed to switch chains.
    #[error("Error switching chain: {0}")]
    SwitchChain(String),

    /// The wallet failed to add a chain it did not know about.
    #[error("Error adding chain: {0}")]
    AddChain(String),

    /// The user declined the wallet request (EIP-1193 code 4001).
    #[error("User rejected request: {0}")]
    UserRejectedRequest(String),

    /// The wallet already has a pending request (EIP-1193 code -32002).
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Untranslated provider RPC error.
    #[error("Provider error {code}: {message}")]
    Provider {
        /// Numeric JSON-RPC / EIP-1193 error code.
        code: i64,
        /// Provider-supplied message.
        message: String,
    },

    /// The chain has no multicall aggregator configured.
    #[error("Chain \"{chain_id}\" does not support multicall")]
    ChainDoesNotSupportMulticall {
        /// The chain id of the failed partition.
        chain_id: u64,
    },

    /// A contract call reverted or the RPC call failed.
    #[error(
        "Function \"{function_name}\" on contract \"{address}\" (chain {chain_id}) reverted: {message}"
    )]
    ContractMethodReverted {
        /// Target contract.
        address: Address,
        /// Called function.
        function_name: String,
        /// Chain the call was sent to.
        chain_id: u64,
        /// Revert reason or transport message.
        message: String,
    },

    /// A contract call returned no data.
    #[error(
        "Function \"{function_name}\" on contract \"{address}\" (chain {chain_id}) returned no data"
    )]
    ContractMethodNoResult {
        /// Target contract.
        address: Address,
        /// Called function.
        function_name: String,
        /// Chain the call was sent to.
        chain_id: u64,
    },

    /// Contract return data could not be decoded with the ABI.
    #[error("Failed to decode result of \"{function_name}\" on contract \"{address}\": {message}")]
    ContractResultDecode {
        /// Target contract.
        address: Address,
        /// Called function.
        function_name: String,
        /// Decoder message.
        message: String,
    },

    /// ABI lookup or encoding error.
    #[error("ABI error: {0}")]
    Abi(String),

    /// Transport (RPC connection) error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Signing or signature recovery error.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a switch chain error.
    #[must_use]
    pub fn switch_chain(msg: impl Into<String>) -> Self {
        Self::SwitchChain(msg.into())
    }

    /// Create an add chain error.
    #[must_use]
    pub fn add_chain(msg: impl Into<String>) -> Self {
        Self::AddChain(msg.into())
    }

    /// Create a user rejected request error.
    #[must_use]
    pub fn user_rejected(msg: impl Into<String>) -> Self {
        Self::UserRejectedRequest(msg.into())
    }

    /// Create an ABI error.
    #[must_use]
    pub fn abi(msg: impl Into<String>) -> Self {
        Self::Abi(msg.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a signing error.
    #[must_use]
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a config error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is one of the typed per-call contract errors.
    ///
    /// These are re-raised as-is by the read dispatcher instead of
    /// triggering the individual-call fallback.
    #[must_use]
    pub const fn is_contract_error(&self) -> bool {
        matches!(
            self,
            Self::ContractMethodReverted { .. }
                | Self::ContractMethodNoResult { .. }
                | Self::ContractResultDecode { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
