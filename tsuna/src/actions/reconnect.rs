use tracing::{debug, info, warn};

use crate::client::Client;
use crate::connection::{Connection, ConnectorId};
use crate::connector::ConnectOptions;
use crate::state::{PersistedState, State, Status};

impl Client {
    /// Silently restore connections.
    ///
    /// Candidates are the connectors of the persisted state (the last current
    /// one first), then `connector_ids` or, when `None`, every configured
    /// connector. Each candidate that is not already connected and reports
    /// [`is_authorized`](crate::connector::Connector::is_authorized) is
    /// connected without prompting. Failures are logged and skipped.
    ///
    /// The persisted state is consumed by the first call. Status is left to
    /// an explicit [`connect`](Client::connect) that is already in flight.
    /// Returns the connections that were restored.
    pub async fn reconnect(&self, connector_ids: Option<&[&str]>) -> Vec<Connection> {
        let persisted = self.take_hydrated();
        let mut order: Vec<ConnectorId> = persisted
            .as_ref()
            .map(PersistedState::reconnect_order)
            .unwrap_or_default();
        let rest: Vec<ConnectorId> = connector_ids.map_or_else(
            || self.connectors().iter().map(|c| c.id().to_owned()).collect(),
            |ids| ids.iter().map(|id| (*id).to_owned()).collect(),
        );
        for id in rest {
            if !order.contains(&id) {
                order.push(id);
            }
        }

        if !self.connect_pending() {
            self.store().set_state(|s| s.begin(Status::Reconnecting));
        }
        debug!(candidates = ?order, "Reconnecting");

        let mut restored = Vec::new();
        for id in order {
            if self.state().connections.contains(&id) {
                continue;
            }
            let Some(connector) = self.connector(&id) else {
                debug!(connector = %id, "Skipping unknown connector");
                continue;
            };
            let Some(_guard) = self.begin_connect(&id) else {
                debug!(connector = %id, "Skipping connector with a connect in flight");
                continue;
            };
            if !connector.is_authorized().await {
                debug!(connector = %id, "Skipping unauthorized connector");
                continue;
            }
            match connector
                .connect(ConnectOptions {
                    chain_id: None,
                    is_reconnecting: true,
                })
                .await
            {
                Ok(result) if !result.accounts.is_empty() => {
                    let connection = Connection::new(id.clone(), result.accounts, result.chain_id);
                    let inserted = connection.clone();
                    self.store().set_state(move |s| s.with_connection(inserted));
                    info!(connector = %id, chain_id = connection.chain_id, "Reconnected");
                    restored.push(connection);
                }
                Ok(_) => debug!(connector = %id, "Wallet returned no accounts"),
                Err(e) => warn!(connector = %id, error = %e, "Reconnect failed"),
            }
        }

        if !self.connect_pending() {
            self.store().set_state(State::settle);
        }
        // Drop connections that could not be restored from storage.
        if persisted.is_some() {
            self.persist_now();
        }
        restored
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::Chain;
    use crate::connector::{MockConnector, MockFlags, MockStep};

    fn client(connectors: &[&Arc<MockConnector>]) -> Client {
        connectors
            .iter()
            .fold(
                Client::builder()
                    .chains([Chain::mainnet(), Chain::optimism()])
                    .without_persistence(),
                |builder, c| builder.connector(Arc::clone(c)),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reconnects_authorized_connectors() {
        let a = Arc::new(MockConnector::anvil(1));
        let b = Arc::new(MockConnector::anvil(1).with_id("locked").with_flags(MockFlags {
            is_authorized: false,
            ..MockFlags::default()
        }));
        let client = client(&[&a, &b]);

        let restored = client.reconnect(None).await;
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].connector_id, "mock");
        let state = client.state();
        assert_eq!(state.status, Status::Connected);
        assert!(!state.connections.contains("locked"));
    }

    #[tokio::test]
    async fn test_nothing_to_restore_ends_disconnected() {
        let a = Arc::new(MockConnector::anvil(1).with_flags(MockFlags {
            fail_connect: true,
            ..MockFlags::default()
        }));
        let client = client(&[&a]);
        assert!(client.reconnect(None).await.is_empty());
        assert_eq!(client.state().status, Status::Disconnected);
    }

    #[tokio::test]
    async fn test_explicit_list_limits_candidates() {
        let a = Arc::new(MockConnector::anvil(1));
        let b = Arc::new(MockConnector::anvil(1).with_id("other"));
        let client = client(&[&a, &b]);
        let restored = client.reconnect(Some(&["other"])).await;
        assert_eq!(restored.len(), 1);
        assert_eq!(client.state().current.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_pending_connect_keeps_its_status() {
        let a = Arc::new(MockConnector::anvil(1));
        let client = client(&[&a]);
        let statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&statuses);
        let _sub = client
            .store()
            .subscribe(move |next, _| seen.lock().push(next.status));
        a.hold(MockStep::Connect);

        let (connected, ()) = tokio::join!(client.connect("mock", None), async {
            a.reached(MockStep::Connect).await;
            assert!(client.reconnect(Some(&[])).await.is_empty());
            assert_eq!(client.state().status, Status::Connecting);
            a.release(MockStep::Connect);
        });

        connected.unwrap();
        assert_eq!(*statuses.lock(), vec![Status::Connecting, Status::Connected]);
    }
}
