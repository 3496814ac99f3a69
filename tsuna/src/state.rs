//! Client state and its transitions.
//!
//! [`State`] is the value held by the client's [`Store`](crate::store::Store).
//! Every transition helper here takes `&State` and returns a new `State`, so
//! they compose directly with `Store::set_state`.

use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, ConnectorId, Connections};

/// Connection status of the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No active connection.
    #[default]
    Disconnected,
    /// A connect handshake is in flight and nothing is connected yet.
    Connecting,
    /// Persisted connections are being restored.
    Reconnecting,
    /// An active connection exists.
    Connected,
}

impl Status {
    /// Whether the status is transitional.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Reconnecting => "reconnecting",
            Self::Connected => "connected",
        })
    }
}

/// Snapshot of the client state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// Default chain, or the chain of the last connection.
    pub chain_id: u64,
    /// Active connections by connector id.
    pub connections: Connections,
    /// Connector id of the active connection.
    pub current: Option<ConnectorId>,
    /// Connection status.
    pub status: Status,
}

impl State {
    /// Disconnected state on `chain_id`.
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            connections: Connections::new(),
            current: None,
            status: Status::Disconnected,
        }
    }

    /// The active connection.
    #[must_use]
    pub fn active_connection(&self) -> Option<&Connection> {
        self.current
            .as_deref()
            .and_then(|id| self.connections.get(id))
    }

    /// Primary account of the active connection.
    #[must_use]
    pub fn account(&self) -> Option<Address> {
        self.active_connection().and_then(Connection::account)
    }

    /// Whether the state satisfies the status invariants.
    ///
    /// - `Connected` iff `current` names an existing connection.
    /// - `Disconnected` implies no connections.
    /// - Transitional statuses only appear with no active connection.
    /// - Non-empty connections always have `current` set.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let active = self.active_connection().is_some();
        let connected_ok = (self.status == Status::Connected) == active;
        let disconnected_ok = self.status != Status::Disconnected || self.connections.is_empty();
        let current_ok = self.connections.is_empty() || active;
        connected_ok && disconnected_ok && current_ok
    }

    /// Status implied by the connections alone.
    fn settled_status(&self) -> Status {
        if self.active_connection().is_some() {
            Status::Connected
        } else {
            Status::Disconnected
        }
    }

    /// Enter a transitional status unless something is already connected.
    #[must_use]
    pub fn begin(&self, status: Status) -> Self {
        let mut next = self.clone();
        if next.active_connection().is_none() {
            next.status = status;
        }
        next
    }

    /// Undo a transitional status set by [`State::begin`].
    #[must_use]
    pub fn settle(&self) -> Self {
        let mut next = self.clone();
        next.status = next.settled_status();
        next
    }

    /// Insert a connection, make it current (and adopt its chain) if nothing
    /// is, and mark the client connected.
    #[must_use]
    pub fn with_connection(&self, connection: Connection) -> Self {
        let mut next = self.clone();
        if next.active_connection().is_none() {
            next.current = Some(connection.connector_id.clone());
            next.chain_id = connection.chain_id;
        }
        next.connections.insert(connection);
        next.status = next.settled_status();
        next
    }

    /// Remove a connection, promoting the first remaining one if it was
    /// current.
    #[must_use]
    pub fn without_connection(&self, connector_id: &str) -> Self {
        let mut next = self.clone();
        next.connections.remove(connector_id);
        if next.current.as_deref() == Some(connector_id) || next.active_connection().is_none() {
            next.current = next.connections.first().map(|c| c.connector_id.clone());
        }
        if let Some(chain_id) = next.active_connection().map(|c| c.chain_id) {
            next.chain_id = chain_id;
        }
        next.status = next.settled_status();
        next
    }

    /// Make `connector_id` current. Unknown ids leave the state unchanged.
    #[must_use]
    pub fn with_current(&self, connector_id: &str) -> Self {
        let mut next = self.clone();
        if let Some(chain_id) = next.connections.get(connector_id).map(|c| c.chain_id) {
            next.current = Some(connector_id.to_owned());
            next.chain_id = chain_id;
            next.status = next.settled_status();
        }
        next
    }

    /// Update the chain of a connection (and the default chain when the
    /// connection is current).
    #[must_use]
    pub fn with_connection_chain(&self, connector_id: &str, chain_id: u64) -> Self {
        let mut next = self.clone();
        if let Some(connection) = next.connections.get_mut(connector_id) {
            connection.chain_id = chain_id;
            if next.current.as_deref() == Some(connector_id) {
                next.chain_id = chain_id;
            }
        }
        next
    }

    /// Replace the accounts of a connection.
    #[must_use]
    pub fn with_connection_accounts(&self, connector_id: &str, accounts: Vec<Address>) -> Self {
        let mut next = self.clone();
        if let Some(connection) = next.connections.get_mut(connector_id) {
            connection.accounts = accounts;
        }
        next
    }

    /// Set the default chain.
    #[must_use]
    pub fn with_chain_id(&self, chain_id: u64) -> Self {
        Self {
            chain_id,
            ..self.clone()
        }
    }

    /// The persisted slice of the state.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            chain_id: self.chain_id,
            connections: self.connections.clone(),
            current: self.current.clone(),
        }
    }
}

/// The part of [`State`] that survives restarts.
///
/// `status` is never persisted: connections loaded from storage are only
/// candidates for a silent reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Last default chain.
    pub chain_id: u64,
    /// Connections at the time of the write, as `[id, connection]` entries.
    #[serde(with = "connection_entries")]
    pub connections: Connections,
    /// Connector that was current.
    #[serde(default)]
    pub current: Option<ConnectorId>,
}

impl PersistedState {
    /// Connector ids in reconnect order: the current one first, then the
    /// rest in insertion order.
    #[must_use]
    pub fn reconnect_order(&self) -> Vec<ConnectorId> {
        let mut order: Vec<ConnectorId> = self.current.iter().cloned().collect();
        order.extend(
            self.connections
                .ids()
                .filter(|id| self.current.as_deref() != Some(*id))
                .map(str::to_owned),
        );
        order
    }
}

/// Serializes [`Connections`] as a list of `[id, connection]` pairs.
mod connection_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::connection::{Connection, ConnectorId, Connections};

    pub fn serialize<S: Serializer>(value: &Connections, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<(&str, &Connection)> =
            value.iter().map(|c| (c.connector_id.as_str(), c)).collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Connections, D::Error> {
        let entries: Vec<(ConnectorId, Connection)> = Vec::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|(id, mut connection)| {
                connection.connector_id = id;
                connection
            })
            .collect())
    }
}
