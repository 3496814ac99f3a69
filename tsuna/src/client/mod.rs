//! The client handle.
//!
//! A [`Client`] owns the configured chains and connectors, the reactive
//! [`State`] store, persistence, and the read router. It is cheap to clone
//! and every clone shares the same state. There is no global instance:
//! build one with [`Client::builder`] and pass it around.

mod events;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chain::{Chain, find_chain};
use crate::connection::ConnectorId;
use crate::connector::{Connector, ConnectorContext, ConnectorMessage, EventSink};
use crate::contracts::{HttpReadProvider, ReadProvider, ReadRouter};
use crate::error::{Error, Result};
use crate::state::{PersistedState, State};
use crate::storage::{ClientStorage, MemoryStorage, PersistOptions, Persister, Storage};
use crate::store::{SelectorOptions, Store, Subscription};

/// Shared handle to a configured client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    chains: Arc<[Chain]>,
    connectors: IndexMap<ConnectorId, Arc<dyn Connector>>,
    store: Store<State>,
    storage: Option<ClientStorage>,
    persister: Option<Arc<Persister>>,
    router: ReadRouter,
    connecting: Mutex<HashSet<ConnectorId>>,
    hydrated: Mutex<Option<PersistedState>>,
    events_rx: Mutex<Option<UnboundedReceiver<ConnectorMessage>>>,
    _events_tx: UnboundedSender<ConnectorMessage>,
    /// Closed on drop, which stops the reconciler task.
    shutdown: watch::Sender<()>,
    _persist: Option<Subscription>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("chains", &self.inner.chains.iter().map(|c| c.id).collect::<Vec<_>>())
            .field("connectors", &self.inner.connectors.keys().collect::<Vec<_>>())
            .field("state", &self.inner.store.get_state())
            .finish_non_exhaustive()
    }
}

/// Marks a connector as connecting until dropped.
pub(crate) struct ConnectGuard<'a> {
    set: &'a Mutex<HashSet<ConnectorId>>,
    id: ConnectorId,
}

impl ConnectGuard<'_> {
    /// Whether another connector is connecting at the same time.
    pub(crate) fn others_pending(&self) -> bool {
        self.set.lock().iter().any(|id| *id != self.id)
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

impl Client {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Configured chains, first one is the default.
    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.inner.chains
    }

    /// Look up a configured chain.
    #[must_use]
    pub fn chain(&self, chain_id: u64) -> Option<&Chain> {
        find_chain(&self.inner.chains, chain_id)
    }

    /// Configured connectors, in registration order.
    #[must_use]
    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        self.inner.connectors.values().cloned().collect()
    }

    /// Look up a connector by id.
    #[must_use]
    pub fn connector(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.inner.connectors.get(id).cloned()
    }

    /// The state store. Listeners registered here see every transition.
    #[must_use]
    pub fn store(&self) -> &Store<State> {
        &self.inner.store
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<State> {
        self.inner.store.get_state()
    }

    /// Client storage, if one is configured.
    #[must_use]
    pub fn storage(&self) -> Option<&ClientStorage> {
        self.inner.storage.as_ref()
    }

    /// The read router used by the contract read actions.
    #[must_use]
    pub fn router(&self) -> &ReadRouter {
        &self.inner.router
    }

    /// Persisted state loaded at build time that has not been consumed by
    /// [`reconnect`](Client::reconnect) yet.
    #[must_use]
    pub fn hydrated(&self) -> Option<PersistedState> {
        self.inner.hydrated.lock().clone()
    }

    /// Write any pending persisted snapshot now.
    pub fn flush_storage(&self) {
        if let Some(persister) = &self.inner.persister {
            persister.flush();
        }
    }

    pub(crate) fn shared_chains(&self) -> Arc<[Chain]> {
        Arc::clone(&self.inner.chains)
    }

    pub(crate) fn take_hydrated(&self) -> Option<PersistedState> {
        self.inner.hydrated.lock().take()
    }

    /// Write the current persisted slice even if it did not change.
    pub(crate) fn persist_now(&self) {
        if let Some(persister) = &self.inner.persister {
            match serde_json::to_value(self.state().to_persisted()) {
                Ok(value) => persister.schedule(value),
                Err(e) => warn!(error = %e, "Failed to serialize state"),
            }
        }
    }

    /// Register `id` as connecting.
    ///
    /// Returns `None` if a connect for the same connector is already in
    /// flight.
    pub(crate) fn begin_connect(&self, id: &str) -> Option<ConnectGuard<'_>> {
        let mut set = self.inner.connecting.lock();
        if !set.insert(id.to_owned()) {
            return None;
        }
        Some(ConnectGuard {
            set: &self.inner.connecting,
            id: id.to_owned(),
        })
    }

    pub(crate) fn is_connecting(&self, id: &str) -> bool {
        self.inner.connecting.lock().contains(id)
    }

    /// Whether any connect handshake is in flight.
    pub(crate) fn connect_pending(&self) -> bool {
        !self.inner.connecting.lock().is_empty()
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    chains: Vec<Chain>,
    connectors: Vec<Arc<dyn Connector>>,
    storage: Option<Arc<dyn Storage>>,
    storage_prefix: Option<String>,
    persist: Option<PersistOptions>,
    no_persist: bool,
    read_providers: HashMap<u64, Arc<dyn ReadProvider>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("chains", &self.chains.iter().map(|c| c.id).collect::<Vec<_>>())
            .field(
                "connectors",
                &self.connectors.iter().map(|c| c.id().to_owned()).collect::<Vec<_>>(),
            )
            .field("storage", &self.storage)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Replace the chain list. The first chain is the default chain.
    #[must_use]
    pub fn chains(mut self, chains: impl IntoIterator<Item = Chain>) -> Self {
        self.chains = chains.into_iter().collect();
        self
    }

    /// Append a chain.
    #[must_use]
    pub fn chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    /// Register a connector.
    #[must_use]
    pub fn connector<C: Connector + 'static>(self, connector: Arc<C>) -> Self {
        self.dyn_connector(connector)
    }

    /// Register a type-erased connector.
    #[must_use]
    pub fn dyn_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors.push(connector);
        self
    }

    /// Storage backend. Defaults to [`MemoryStorage`].
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Key prefix for every storage entry.
    #[must_use]
    pub fn storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = Some(prefix.into());
        self
    }

    /// Persistence settings.
    #[must_use]
    pub fn persist(mut self, options: PersistOptions) -> Self {
        self.persist = Some(options);
        self
    }

    /// Schema version of the persisted state.
    #[must_use]
    pub fn persist_version(mut self, version: u32) -> Self {
        self.persist.get_or_insert_with(PersistOptions::default).version = version;
        self
    }

    /// Neither hydrate from nor write to storage.
    #[must_use]
    pub const fn without_persistence(mut self) -> Self {
        self.no_persist = true;
        self
    }

    /// Read transport for one chain. Chains without an explicit transport
    /// get an HTTP one built from their default RPC URL.
    #[must_use]
    pub fn read_provider(mut self, chain_id: u64, provider: Arc<dyn ReadProvider>) -> Self {
        self.read_providers.insert(chain_id, provider);
        self
    }

    /// Build the client.
    ///
    /// Hydrates persisted state (which [`Client::reconnect`] later
    /// consumes) and hands every connector its [`ConnectorContext`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no chain is configured, or if chain or
    /// connector ids are not unique.
    pub fn build(self) -> Result<Client> {
        let Self {
            chains,
            connectors,
            storage,
            storage_prefix,
            persist,
            no_persist,
            mut read_providers,
        } = self;

        let Some(default_chain) = chains.first().map(|c| c.id) else {
            return Err(Error::config("at least one chain must be configured"));
        };
        let mut seen = HashSet::new();
        if let Some(dup) = chains.iter().find(|c| !seen.insert(c.id)) {
            return Err(Error::config(format!("duplicate chain id {}", dup.id)));
        }
        let mut registry: IndexMap<ConnectorId, Arc<dyn Connector>> = IndexMap::new();
        for connector in connectors {
            let id = connector.id().to_owned();
            if registry.insert(id.clone(), connector).is_some() {
                return Err(Error::config(format!("duplicate connector id '{id}'")));
            }
        }
        let chains: Arc<[Chain]> = Arc::from(chains);

        let backend = storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let storage = ClientStorage::new(
            backend,
            storage_prefix.unwrap_or_else(|| ClientStorage::DEFAULT_PREFIX.to_owned()),
        );
        let persister = (!no_persist).then(|| {
            Arc::new(Persister::new(
                storage.clone(),
                persist.unwrap_or_default(),
            ))
        });

        let hydrated = persister.as_ref().and_then(|p| p.load::<PersistedState>());
        let chain_id = hydrated
            .as_ref()
            .map(|p| p.chain_id)
            .filter(|id| find_chain(&chains, *id).is_some())
            .unwrap_or(default_chain);
        if let Some(persisted) = &hydrated {
            debug!(
                chain_id,
                connections = persisted.connections.len(),
                current = ?persisted.current,
                "Hydrated persisted state"
            );
        }
        let store = Store::new(State::new(chain_id));

        for chain in chains.iter() {
            if read_providers.contains_key(&chain.id) {
                continue;
            }
            let Some(url) = chain.default_rpc_url() else {
                continue;
            };
            match HttpReadProvider::new(url) {
                Ok(provider) => {
                    read_providers.insert(chain.id, Arc::new(provider));
                }
                Err(e) => warn!(chain_id = chain.id, error = %e, "Skipping read transport"),
            }
        }
        let router = ReadRouter::new(Arc::clone(&chains), read_providers);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        for (id, connector) in &registry {
            connector.setup(ConnectorContext {
                chains: Arc::clone(&chains),
                emitter: EventSink::new(id.clone(), events_tx.clone()),
                storage: Some(storage.clone()),
            });
        }

        let subscription = persister.as_ref().map(|persister| {
            let persister = Arc::clone(persister);
            store.subscribe_with_selector(
                State::to_persisted,
                move |next, _| match serde_json::to_value(next) {
                    Ok(value) => persister.schedule(value),
                    Err(e) => warn!(error = %e, "Failed to serialize state"),
                },
                SelectorOptions::default(),
            )
        });

        info!(
            chains = chains.len(),
            connectors = registry.len(),
            chain_id,
            "Client ready"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                chains,
                connectors: registry,
                store,
                storage: Some(storage),
                persister,
                router,
                connecting: Mutex::new(HashSet::new()),
                hydrated: Mutex::new(hydrated),
                events_rx: Mutex::new(Some(events_rx)),
                _events_tx: events_tx,
                shutdown: watch::Sender::new(()),
                _persist: subscription,
            }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::connector::MockConnector;

    mod build {
        use super::*;

        #[test]
        fn test_requires_a_chain() {
            assert!(matches!(Client::builder().build(), Err(Error::Config(_))));
        }

        #[test]
        fn test_rejects_duplicate_ids() {
            let chains = Client::builder()
                .chain(Chain::mainnet())
                .chain(Chain::mainnet())
                .build();
            assert!(matches!(chains, Err(Error::Config(_))));

            let connectors = Client::builder()
                .chain(Chain::mainnet())
                .connector(Arc::new(MockConnector::anvil(1)))
                .connector(Arc::new(MockConnector::anvil(1)))
                .build();
            assert!(matches!(connectors, Err(Error::Config(_))));
        }

        #[test]
        fn test_defaults() {
            let client = Client::builder()
                .chains([Chain::optimism(), Chain::mainnet()])
                .connector(Arc::new(MockConnector::anvil(1)))
                .build()
                .unwrap();
            assert_eq!(client.state().chain_id, 10);
            assert!(client.connector("mock").is_some());
            assert!(client.router().transport(1).is_ok());
            assert!(client.hydrated().is_none());
        }
    }

    mod hydration {
        use super::*;

        #[test]
        fn test_persisted_state_is_hydrated() {
            let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
            let first = Client::builder()
                .chains([Chain::mainnet(), Chain::optimism()])
                .storage(Arc::clone(&backend))
                .build()
                .unwrap();
            first.store().set_state(|s| {
                s.with_connection(Connection::new("mock", vec![alloy::primitives::Address::ZERO], 10))
            });
            first.flush_storage();

            let second = Client::builder()
                .chains([Chain::mainnet(), Chain::optimism()])
                .storage(backend)
                .build()
                .unwrap();
            let state = second.state();
            assert_eq!(state.chain_id, 10);
            assert!(state.connections.is_empty());
            let hydrated = second.hydrated().unwrap();
            assert_eq!(hydrated.current.as_deref(), Some("mock"));
        }

        #[test]
        fn test_unknown_persisted_chain_falls_back_to_default() {
            let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
            let first = Client::builder()
                .chains([Chain::mainnet(), Chain::base()])
                .storage(Arc::clone(&backend))
                .build()
                .unwrap();
            first.store().set_state(|s| s.with_chain_id(8453));
            first.flush_storage();

            let second = Client::builder()
                .chain(Chain::mainnet())
                .storage(backend)
                .build()
                .unwrap();
            assert_eq!(second.state().chain_id, 1);
        }

        #[test]
        fn test_version_bump_discards() {
            let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
            let first = Client::builder()
                .chains([Chain::mainnet(), Chain::base()])
                .storage(Arc::clone(&backend))
                .build()
                .unwrap();
            first.store().set_state(|s| s.with_chain_id(8453));
            first.flush_storage();

            let second = Client::builder()
                .chains([Chain::mainnet(), Chain::base()])
                .storage(backend)
                .persist_version(1)
                .build()
                .unwrap();
            assert_eq!(second.state().chain_id, 1);
            assert!(second.hydrated().is_none());
        }
    }
}
