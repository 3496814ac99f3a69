//! Connection registry.
//!
//! [`Connections`] maps connector ids to their live [`Connection`]. Iteration
//! follows insertion order so that "the first remaining connection" is well
//! defined when the active connection goes away.

use alloy::primitives::Address;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Stable identifier of a connector.
pub type ConnectorId = String;

/// Live session state of one connected connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Id of the connector owning this session.
    pub connector_id: ConnectorId,
    /// Authorized accounts; never empty, the first one is the primary account.
    pub accounts: Vec<Address>,
    /// Chain the wallet is currently on.
    pub chain_id: u64,
}

impl Connection {
    /// Create a connection.
    #[must_use]
    pub fn new(connector_id: impl Into<ConnectorId>, accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            connector_id: connector_id.into(),
            accounts,
            chain_id,
        }
    }

    /// The primary account.
    #[must_use]
    pub fn account(&self) -> Option<Address> {
        self.accounts.first().copied()
    }

    /// Whether `address` is one of this connection's accounts.
    #[must_use]
    pub fn has_account(&self, address: &Address) -> bool {
        self.accounts.contains(address)
    }
}

/// Compare two account lists for an `accountsChanged` no-op check.
///
/// The comparison is order-sensitive: the first element is the primary
/// account, so a wallet that moves another account to the front has made
/// a real change.
#[must_use]
pub fn accounts_equal(a: &[Address], b: &[Address]) -> bool {
    a == b
}

/// Insertion-ordered registry of active connections keyed by connector id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Connections {
    inner: IndexMap<ConnectorId, Connection>,
}

impl Connections {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the connection for its connector.
    ///
    /// Replacing keeps the original position in iteration order.
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.inner
            .insert(connection.connector_id.clone(), connection)
    }

    /// Get a connection by connector id.
    #[must_use]
    pub fn get(&self, connector_id: &str) -> Option<&Connection> {
        self.inner.get(connector_id)
    }

    /// Get a mutable connection by connector id.
    pub fn get_mut(&mut self, connector_id: &str) -> Option<&mut Connection> {
        self.inner.get_mut(connector_id)
    }

    /// Remove a connection, preserving the order of the remaining ones.
    pub fn remove(&mut self, connector_id: &str) -> Option<Connection> {
        self.inner.shift_remove(connector_id)
    }

    /// Whether a connection exists for the connector.
    #[must_use]
    pub fn contains(&self, connector_id: &str) -> bool {
        self.inner.contains_key(connector_id)
    }

    /// The first connection in iteration order.
    #[must_use]
    pub fn first(&self) -> Option<&Connection> {
        self.inner.values().next()
    }

    /// Iterate over connections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.inner.values()
    }

    /// Iterate over connector ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    /// Number of connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<Connection> for Connections {
    fn from_iter<T: IntoIterator<Item = Connection>>(iter: T) -> Self {
        let mut connections = Self::new();
        for connection in iter {
            connections.insert(connection);
        }
        connections
    }
}

impl<'a> IntoIterator for &'a Connections {
    type Item = &'a Connection;
    type IntoIter = indexmap::map::Values<'a, ConnectorId, Connection>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.values()
    }
}
