//! Reconciliation of unsolicited connector events.

use std::sync::Arc;

use alloy::primitives::Address;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Client;
use crate::chain::is_unsupported;
use crate::connection::{Connection, ConnectorId, accounts_equal};
use crate::connector::{ConnectorEvent, ConnectorMessage};

impl Client {
    /// Apply one connector event to the state.
    ///
    /// Events from connectors the client does not know are ignored, as are
    /// events that would not change anything.
    pub fn handle_event(&self, message: ConnectorMessage) {
        let ConnectorMessage { connector_id, event } = message;
        if self.connector(&connector_id).is_none() {
            debug!(connector = %connector_id, "Ignoring event from unknown connector");
            return;
        }
        debug!(connector = %connector_id, event = ?event, "Reconciling connector event");
        match event {
            ConnectorEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                self.on_disconnect(connector_id);
            }
            ConnectorEvent::AccountsChanged(accounts) => {
                self.on_accounts_changed(connector_id, accounts);
            }
            ConnectorEvent::ChainChanged(chain_id) => {
                if is_unsupported(self.chains(), chain_id) {
                    warn!(connector = %connector_id, chain_id, "Wallet switched to an unsupported chain");
                }
                self.store()
                    .set_state(move |s| s.with_connection_chain(&connector_id, chain_id));
            }
            ConnectorEvent::Disconnect => self.on_disconnect(connector_id),
            ConnectorEvent::Connect { accounts, chain_id } => {
                self.on_connect(connector_id, accounts, chain_id);
            }
        }
    }

    /// Apply every queued event. Returns how many were applied.
    ///
    /// Returns 0 once the queue has been handed to
    /// [`spawn_reconciler`](Client::spawn_reconciler).
    pub fn drain_events(&self) -> usize {
        let messages: Vec<ConnectorMessage> = {
            let mut rx = self.inner.events_rx.lock();
            let Some(rx) = rx.as_mut() else {
                return 0;
            };
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        let count = messages.len();
        for message in messages {
            self.handle_event(message);
        }
        count
    }

    /// Apply events in a background task as they arrive.
    ///
    /// The task holds only a weak reference and stops once the last clone of
    /// the client is dropped. Returns `None` if the reconciler is already
    /// running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn_reconciler(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.inner.events_rx.lock().take()?;
        let mut shutdown = self.inner.shutdown.subscribe();
        let weak = Arc::downgrade(&self.inner);
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = rx.recv() => {
                        let Some(message) = message else {
                            break;
                        };
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        Self { inner }.handle_event(message);
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Reconciler stopped");
        }))
    }

    fn on_accounts_changed(&self, connector_id: ConnectorId, accounts: Vec<Address>) {
        self.store().set_state(move |s| match s.connections.get(&connector_id) {
            Some(connection) if !accounts_equal(&connection.accounts, &accounts) => {
                s.with_connection_accounts(&connector_id, accounts)
            }
            _ => s.clone(),
        });
    }

    fn on_disconnect(&self, connector_id: ConnectorId) {
        self.store()
            .set_state(move |s| s.without_connection(&connector_id));
    }

    fn on_connect(&self, connector_id: ConnectorId, accounts: Vec<Address>, chain_id: u64) {
        if accounts.is_empty() || self.is_connecting(&connector_id) {
            return;
        }
        self.store().set_state(move |s| {
            if s.connections.contains(&connector_id) {
                s.clone()
            } else {
                s.with_connection(Connection::new(connector_id, accounts, chain_id))
            }
        });
    }
}
