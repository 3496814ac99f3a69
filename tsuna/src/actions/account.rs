use alloy::primitives::Address;

use crate::chain::{Chain, find_chain};
use crate::client::Client;
use crate::connection::{Connection, ConnectorId};
use crate::state::{State, Status};
use crate::store::{SelectorOptions, Subscription};

/// Derived view of the active connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Primary account.
    pub address: Option<Address>,
    /// All accounts of the connection.
    pub addresses: Vec<Address>,
    /// Chain of the connection.
    pub chain_id: Option<u64>,
    /// Configured chain matching `chain_id`, if any.
    pub chain: Option<Chain>,
    /// Connector of the connection.
    pub connector_id: Option<ConnectorId>,
    /// Client status.
    pub status: Status,
}

impl Account {
    /// Build the view from a state snapshot.
    #[must_use]
    pub fn from_state(state: &State, chains: &[Chain]) -> Self {
        let connection = state.active_connection();
        let chain_id = connection.map(|c| c.chain_id);
        Self {
            address: connection.and_then(Connection::account),
            addresses: connection.map(|c| c.accounts.clone()).unwrap_or_default(),
            chain_id,
            chain: chain_id.and_then(|id| find_chain(chains, id).cloned()),
            connector_id: connection.map(|c| c.connector_id.clone()),
            status: state.status,
        }
    }

    /// `status == Connected`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == Status::Connected
    }

    /// `status == Connecting`.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.status == Status::Connecting
    }

    /// `status == Reconnecting`.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.status == Status::Reconnecting
    }

    /// `status == Disconnected`.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.status == Status::Disconnected
    }

    /// Connected to a chain that is not configured.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        self.chain_id.is_some() && self.chain.is_none()
    }
}

impl Client {
    /// The active account.
    #[must_use]
    pub fn get_account(&self) -> Account {
        Account::from_state(&self.state(), self.chains())
    }

    /// The default chain.
    #[must_use]
    pub fn get_chain_id(&self) -> u64 {
        self.state().chain_id
    }

    /// All connections, in insertion order.
    #[must_use]
    pub fn get_connections(&self) -> Vec<Connection> {
        self.state().connections.iter().cloned().collect()
    }

    /// Call `listener(next, previous)` whenever the account view changes.
    pub fn watch_account<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Account, &Account) + Send + Sync + 'static,
    {
        let chains = self.shared_chains();
        self.store().subscribe_with_selector(
            move |s| Account::from_state(s, &chains),
            listener,
            SelectorOptions::default(),
        )
    }

    /// Call `listener(next, previous)` whenever the default chain changes.
    pub fn watch_chain_id<F>(&self, listener: F) -> Subscription
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.store().subscribe_with_selector(
            |s| s.chain_id,
            move |next, previous| listener(*next, *previous),
            SelectorOptions::default(),
        )
    }

    /// Call `listener(next, previous)` whenever the connections change.
    pub fn watch_connections<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Connection], &[Connection]) + Send + Sync + 'static,
    {
        self.store().subscribe_with_selector(
            |s| s.connections.iter().cloned().collect::<Vec<_>>(),
            move |next, previous| listener(next, previous),
            SelectorOptions::default(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::connector::MockConnector;

    fn client() -> (Client, Arc<MockConnector>) {
        let mock = Arc::new(MockConnector::anvil(2));
        let client = Client::builder()
            .chains([Chain::mainnet(), Chain::optimism()])
            .connector(Arc::clone(&mock))
            .without_persistence()
            .build()
            .unwrap();
        (client, mock)
    }

    #[tokio::test]
    async fn test_account_view() {
        let (client, mock) = client();
        let account = client.get_account();
        assert!(account.is_disconnected());
        assert_eq!(account.address, None);

        client.connect("mock", Some(69)).await.unwrap();
        let account = client.get_account();
        assert!(account.is_connected());
        assert_eq!(account.addresses, mock.accounts());
        assert_eq!(account.chain_id, Some(69));
        assert!(account.is_unsupported());
        assert_eq!(client.get_chain_id(), 69);
        assert_eq!(client.get_connections().len(), 1);
    }

    #[tokio::test]
    async fn test_watchers_fire_on_change_only() {
        let (client, mock) = client();
        let chains = Arc::new(Mutex::new(Vec::new()));
        let accounts = Arc::new(Mutex::new(Vec::new()));
        let sizes = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&chains);
        let _c = client.watch_chain_id(move |next, prev| seen.lock().push((next, prev)));
        let seen = Arc::clone(&accounts);
        let _a = client.watch_account(move |next, _| seen.lock().push(next.address));
        let seen = Arc::clone(&sizes);
        let _n = client.watch_connections(move |next, _| seen.lock().push(next.len()));

        client.connect("mock", Some(10)).await.unwrap();
        client.switch_chain(10, None).await.unwrap();
        client.disconnect(None).await.unwrap();

        assert_eq!(*chains.lock(), vec![(10, 1)]);
        assert_eq!(
            *accounts.lock(),
            vec![None, mock.accounts().first().copied(), None]
        );
        assert_eq!(*sizes.lock(), vec![1, 0]);
    }
}
