//! Wallet connectors.
//!
//! A [`Connector`] is one wallet integration. It owns the wallet I/O
//! (requesting accounts, switching chains, signing) and reports unsolicited
//! wallet events through the [`EventSink`] handed to it by the client in
//! [`Connector::setup`].
//!
//! Available implementations:
//!
//! - [`InjectedConnector`]: any EIP-1193 provider, selected by [`Target`].
//! - [`MockConnector`]: deterministic local-key connector for tests.

mod injected;
mod mock;
pub mod provider;

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Signature};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::chain::Chain;
use crate::connection::ConnectorId;
use crate::error::Result;
use crate::storage::ClientStorage;

pub use injected::{InjectedConnector, InjectedOptions};
pub use mock::{MockConnector, MockFlags, MockStep};
pub use provider::{
    Eip1193Provider, ProviderEvent, ProviderFlags, ProviderListener, ProviderRpcError, Target,
};

/// Options for [`Connector::connect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Chain to switch to after the handshake, if it differs.
    pub chain_id: Option<u64>,
    /// Silent reconnect: never prompt the user.
    pub is_reconnecting: bool,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResult {
    /// Authorized accounts, primary first.
    pub accounts: Vec<Address>,
    /// Chain the wallet ended up on.
    pub chain_id: u64,
}

/// Unsolicited wallet event, normalized by the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// The authorized accounts changed. An empty list means disconnected.
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain.
    ChainChanged(u64),
    /// The wallet disconnected.
    Disconnect,
    /// The wallet connected on its own (e.g. unlocked after a prompt).
    Connect {
        /// Authorized accounts.
        accounts: Vec<Address>,
        /// Current chain.
        chain_id: u64,
    },
}

/// A [`ConnectorEvent`] tagged with its connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorMessage {
    /// Emitting connector.
    pub connector_id: ConnectorId,
    /// The event.
    pub event: ConnectorEvent,
}

/// Sending half of the client's event channel, bound to one connector.
#[derive(Debug, Clone)]
pub struct EventSink {
    connector_id: ConnectorId,
    tx: UnboundedSender<ConnectorMessage>,
}

impl EventSink {
    /// Bind `tx` to `connector_id`.
    #[must_use]
    pub fn new(connector_id: impl Into<ConnectorId>, tx: UnboundedSender<ConnectorMessage>) -> Self {
        Self {
            connector_id: connector_id.into(),
            tx,
        }
    }

    /// Emit an event. Events sent after the client is gone are dropped.
    pub fn emit(&self, event: ConnectorEvent) {
        trace!(connector = %self.connector_id, event = ?event, "Connector event");
        if self
            .tx
            .send(ConnectorMessage {
                connector_id: self.connector_id.clone(),
                event,
            })
            .is_err()
        {
            trace!(connector = %self.connector_id, "Event channel closed");
        }
    }
}

/// Everything a connector receives from the client at setup time.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    /// Configured chains, in order.
    pub chains: Arc<[Chain]>,
    /// Where to report unsolicited wallet events.
    pub emitter: EventSink,
    /// Client storage, used by shims that must survive restarts.
    pub storage: Option<ClientStorage>,
}

impl ConnectorContext {
    /// Look up a configured chain.
    #[must_use]
    pub fn chain(&self, chain_id: u64) -> Option<&Chain> {
        crate::chain::find_chain(&self.chains, chain_id)
    }
}

/// One wallet integration.
///
/// Implementations translate wallet errors into [`Error`](crate::Error)
/// before returning; raw provider codes never leave a connector.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Stable identifier, unique within a client.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Receive the client context. Called once when the client is built.
    fn setup(&self, context: ConnectorContext);

    /// Run the connect handshake and start forwarding wallet events.
    async fn connect(&self, options: ConnectOptions) -> Result<ConnectResult>;

    /// Stop forwarding wallet events. Idempotent and best effort.
    async fn disconnect(&self) -> Result<()>;

    /// Currently authorized accounts.
    async fn get_accounts(&self) -> Result<Vec<Address>>;

    /// Chain the wallet is currently on.
    async fn get_chain_id(&self) -> Result<u64>;

    /// Whether a silent reconnect would succeed. Never fails.
    async fn is_authorized(&self) -> bool;

    /// Ask the wallet to switch chains.
    async fn switch_chain(&self, chain_id: u64) -> Result<Chain>;

    /// Sign an EIP-191 personal message with `account`.
    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<Signature>;

    /// Sign and broadcast a transaction, returning its hash.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn sink_tags_events_with_connector() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new("mock", tx);
        sink.emit(ConnectorEvent::ChainChanged(10));
        let message = rx.try_recv().unwrap();
        assert_eq!(message.connector_id, "mock");
        assert_eq!(message.event, ConnectorEvent::ChainChanged(10));
    }

    #[test]
    fn sink_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        EventSink::new("mock", tx).emit(ConnectorEvent::Disconnect);
    }
}
