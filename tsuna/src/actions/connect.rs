use tracing::{debug, info, warn};

use crate::chain::is_unsupported;
use crate::client::Client;
use crate::connection::Connection;
use crate::connector::{ConnectOptions, ConnectResult};
use crate::error::{Error, Result};
use crate::state::{State, Status};

impl Client {
    /// Connect `connector_id`, optionally asking the wallet to move to
    /// `chain_id`.
    ///
    /// On success the connection is inserted and becomes current if nothing
    /// else is. On failure the state is left as it was.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectorNotFound`] if the connector is not configured.
    /// - [`Error::ConnectorAlreadyConnected`] if it is connected or a
    ///   connect is already in flight.
    /// - Any error from the connector handshake.
    pub async fn connect(&self, connector_id: &str, chain_id: Option<u64>) -> Result<ConnectResult> {
        let connector = self.connector(connector_id).ok_or(Error::ConnectorNotFound)?;
        let guard = self
            .begin_connect(connector_id)
            .ok_or(Error::ConnectorAlreadyConnected)?;
        if self.state().connections.contains(connector_id) {
            return Err(Error::ConnectorAlreadyConnected);
        }

        self.store().set_state(|s| s.begin(Status::Connecting));
        debug!(connector = %connector_id, chain_id = ?chain_id, "Connecting");

        let result = connector
            .connect(ConnectOptions {
                chain_id,
                is_reconnecting: false,
            })
            .await;
        let result = match result {
            Ok(result) if result.accounts.is_empty() => {
                Err(Error::user_rejected("wallet returned no accounts"))
            }
            other => other,
        };

        match result {
            Ok(result) => {
                let connection =
                    Connection::new(connector_id, result.accounts.clone(), result.chain_id);
                self.store().set_state(move |s| s.with_connection(connection));
                info!(
                    connector = %connector_id,
                    account = ?result.accounts.first(),
                    chain_id = result.chain_id,
                    unsupported = is_unsupported(self.chains(), result.chain_id),
                    "Connected"
                );
                Ok(result)
            }
            Err(e) => {
                if !guard.others_pending() {
                    self.store().set_state(State::settle);
                }
                warn!(connector = %connector_id, error = %e, "Connect failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::Chain;
    use crate::connector::{MockConnector, MockFlags};

    fn client(mock: MockConnector) -> (Client, Arc<MockConnector>) {
        let mock = Arc::new(mock);
        let client = Client::builder()
            .chains([Chain::mainnet(), Chain::optimism()])
            .connector(Arc::clone(&mock))
            .without_persistence()
            .build()
            .unwrap();
        (client, mock)
    }

    #[tokio::test]
    async fn test_connect_sets_current_and_chain() {
        let (client, mock) = client(MockConnector::anvil(2));
        let result = client.connect("mock", Some(10)).await.unwrap();
        assert_eq!(result.chain_id, 10);

        let state = client.state();
        assert_eq!(state.status, Status::Connected);
        assert_eq!(state.current.as_deref(), Some("mock"));
        assert_eq!(state.chain_id, 10);
        assert_eq!(state.account(), mock.accounts().first().copied());
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let (client, _) = client(MockConnector::anvil(1));
        client.connect("mock", None).await.unwrap();
        assert_eq!(
            client.connect("mock", None).await.err(),
            Some(Error::ConnectorAlreadyConnected)
        );
    }

    #[tokio::test]
    async fn test_unknown_connector() {
        let (client, _) = client(MockConnector::anvil(1));
        assert_eq!(
            client.connect("nope", None).await.err(),
            Some(Error::ConnectorNotFound)
        );
    }

    #[tokio::test]
    async fn test_failed_connect_restores_state() {
        let (client, _) = client(MockConnector::anvil(1).with_flags(MockFlags {
            fail_connect: true,
            ..MockFlags::default()
        }));
        let before = client.state();
        let statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&statuses);
        let _sub = client.store().subscribe(move |next, _| seen.lock().push(next.status));

        assert!(matches!(
            client.connect("mock", None).await,
            Err(Error::UserRejectedRequest(_))
        ));
        assert_eq!(*client.state(), *before);
        assert_eq!(*statuses.lock(), vec![Status::Connecting, Status::Disconnected]);
    }

    #[tokio::test]
    async fn test_concurrent_connect_on_same_connector() {
        let (client, _) = client(MockConnector::anvil(1));
        let (a, b) = tokio::join!(client.connect("mock", None), client.connect("mock", None));
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert!(
            [a.err(), b.err()]
                .into_iter()
                .flatten()
                .all(|e| e == Error::ConnectorAlreadyConnected)
        );
    }
}
