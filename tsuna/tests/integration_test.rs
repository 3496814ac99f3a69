//! Scenario tests for the tsuna client.

#![allow(clippy::unwrap_used, clippy::panic, clippy::clone_on_ref_ptr)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, U256, address};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};
use tsuna::connector::{ProviderEvent, ProviderFlags, ProviderListener, ProviderRpcError};
use tsuna::prelude::*;
use tsuna::store::Store;

const ALICE: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const DAI: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");

fn mock(id: &str) -> Arc<MockConnector> {
    Arc::new(MockConnector::anvil(1).with_id(id))
}

fn client_with(connectors: &[&Arc<MockConnector>]) -> Client {
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

fn erc20() -> Arc<JsonAbi> {
    Arc::new(
        JsonAbi::parse([
            "function decimals() view returns (uint8)",
            "function symbol() view returns (string)",
        ])
        .unwrap(),
    )
}

#[test]
fn test_concurrent_writers_are_totally_ordered() {
    let store = Store::new(0_u64);
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&transitions);
    let _sub = store.subscribe(move |next, previous| seen.lock().push((**previous, **next)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    store.set_state(|n| n + 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*store.get_state(), 2_000);
    let transitions = transitions.lock();
    assert_eq!(transitions.len(), 2_000);
    for (i, (previous, next)) in transitions.iter().enumerate() {
        assert_eq!(*previous, i as u64);
        assert_eq!(*next, i as u64 + 1);
    }
}

#[tokio::test]
async fn test_every_transition_preserves_invariants() {
    let a = mock("a");
    let b = mock("b");
    let client = client_with(&[&a, &b]);
    let violations = Arc::new(AtomicU64::new(0));
    let count = Arc::clone(&violations);
    let _sub = client.store().subscribe(move |next, _| {
        if !next.is_consistent() {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });

    assert_ok!(client.connect("a", None).await);
    assert_ok!(client.connect("b", Some(10)).await);
    assert_ok!(client.switch_account("b"));
    assert_ok!(client.switch_chain(1, None).await);
    a.emit_accounts_changed(vec![Address::repeat_byte(1)]);
    b.emit_disconnect();
    client.drain_events();
    assert_ok!(client.disconnect(None).await);
    client.reconnect(None).await;
    a.emit_accounts_changed(Vec::new());
    client.drain_events();

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(client.state().is_consistent());
}

#[tokio::test]
async fn test_disconnect_twice_equals_once() {
    let a = mock("a");
    let b = mock("b");
    let client = client_with(&[&a, &b]);
    assert_ok!(client.connect("a", None).await);
    assert_ok!(client.connect("b", None).await);

    assert_ok!(client.disconnect(Some("a")).await);
    let once = client.state();
    assert_ok!(client.disconnect(Some("a")).await);
    assert_eq!(*client.state(), *once);
    assert_eq!(once.current.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_connect_disconnect_round_trip() {
    let a = mock("a");
    let client = client_with(&[&a]);
    let initial = client.state();

    assert_ok!(client.connect("a", None).await);
    assert_ok!(client.disconnect(Some("a")).await);
    assert_eq!(*client.state(), *initial);
}

#[tokio::test]
async fn test_multi_connect_with_unsupported_chain() {
    let a = mock("a");
    let b = mock("b");
    let client = client_with(&[&a, &b]);

    assert_ok!(client.connect("a", None).await);
    let result = assert_ok!(client.connect("b", Some(69)).await);
    assert_eq!(result.chain_id, 69);

    let state = client.state();
    assert_eq!(state.current.as_deref(), Some("a"));
    assert_eq!(state.chain_id, 1);
    assert_eq!(state.connections.get("b").unwrap().chain_id, 69);
    assert!(!client.get_account().is_unsupported());

    assert_ok!(client.switch_account("b"));
    let account = client.get_account();
    assert_eq!(account.chain_id, Some(69));
    assert!(account.is_unsupported());
    assert_eq!(client.get_chain_id(), 69);

    let err = assert_err!(client.connect("b", None).await);
    assert_eq!(err, Error::ConnectorAlreadyConnected);
}

#[tokio::test]
async fn test_read_contracts_partial_failure() {
    let reader = Arc::new(MockReadProvider::new());
    let client = Client::builder()
        .chains([Chain::mainnet(), Chain::new(999, "No Multicall")])
        .read_provider(1, reader.clone())
        .read_provider(999, reader.clone())
        .without_persistence()
        .build()
        .unwrap();

    let decimals = ContractCall::new(erc20(), DAI, "decimals");
    let symbol = ContractCall::new(erc20(), DAI, "symbol");
    assert_ok!(reader.respond(&decimals, &[DynSolValue::Uint(U256::from(18), 8)]));
    assert_ok!(reader.revert(&symbol, "paused"));

    let results = assert_ok!(
        client
            .read_contracts(ReadContractsParameters::new(vec![
                decimals.clone(),
                decimals.clone().on_chain(999),
                symbol.clone(),
            ]))
            .await
    );
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(Some(vec![DynSolValue::Uint(U256::from(18), 8)])));
    assert_eq!(results[1], Err(Error::ChainDoesNotSupportMulticall { chain_id: 999 }));
    assert_eq!(results[2], Ok(None));

    let err = assert_err!(
        client
            .read_contracts(ReadContractsParameters::new(vec![decimals, symbol]).strict())
            .await
    );
    assert!(matches!(err, Error::ContractMethodReverted { .. }));
}

#[tokio::test]
async fn test_reconnect_drops_stale_connectors() {
    let dir = std::env::temp_dir().join(format!("tsuna-reconnect-{}", std::process::id()));
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&dir));

    let first = {
        let a = mock("a");
        let stale = mock("stale");
        let ghost = mock("ghost");
        let client = Client::builder()
            .chains([Chain::mainnet(), Chain::optimism()])
            .connector(a)
            .connector(stale)
            .connector(ghost)
            .storage(Arc::clone(&storage))
            .build()
            .unwrap();
        assert_ok!(client.connect("stale", Some(10)).await);
        assert_ok!(client.connect("a", None).await);
        assert_ok!(client.connect("ghost", None).await);
        assert_ok!(client.switch_account("a"));
        client.flush_storage();
        client.state()
    };
    assert_eq!(first.connections.len(), 3);

    let a = mock("a");
    let stale = Arc::new(MockConnector::anvil(1).with_id("stale").with_flags(MockFlags {
        is_authorized: false,
        ..MockFlags::default()
    }));
    let client = Client::builder()
        .chains([Chain::mainnet(), Chain::optimism()])
        .connector(Arc::clone(&a))
        .connector(stale)
        .storage(Arc::clone(&storage))
        .build()
        .unwrap();
    let hydrated = client.hydrated().unwrap();
    assert_eq!(hydrated.reconnect_order(), vec!["a", "stale", "ghost"]);
    assert_eq!(client.state().status, Status::Disconnected);

    let restored = client.reconnect(None).await;
    client.flush_storage();

    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].connector_id, "a");
    let state = client.state();
    assert_eq!(state.status, Status::Connected);
    assert_eq!(state.current.as_deref(), Some("a"));
    assert!(client.hydrated().is_none());

    let persisted: Value = client.storage().unwrap().get("store").unwrap().unwrap();
    let ids: Vec<&str> = persisted["state"]["connections"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry[0].as_str())
        .collect();
    assert_eq!(ids, vec!["a"]);

    std::fs::remove_dir_all(&dir).unwrap();
}

/// A MetaMask-like wallet that emits a spurious `disconnect` while switching
/// chains.
#[derive(Default)]
struct FlakyWallet {
    chain_id: AtomicU64,
    listener: Mutex<Option<ProviderListener>>,
}

impl std::fmt::Debug for FlakyWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyWallet").finish_non_exhaustive()
    }
}

impl FlakyWallet {
    fn fire(&self, event: ProviderEvent) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }
}

#[async_trait]
impl Eip1193Provider for FlakyWallet {
    async fn request(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, ProviderRpcError> {
        match method {
            "eth_accounts" | "eth_requestAccounts" => Ok(json!([ALICE])),
            "eth_chainId" => Ok(json!(format!("0x{:x}", self.chain_id.load(Ordering::SeqCst)))),
            "wallet_switchEthereumChain" => {
                let hex = params[0]["chainId"].as_str().unwrap_or_default().to_owned();
                let id = u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or_default();
                self.chain_id.store(id, Ordering::SeqCst);
                self.fire(ProviderEvent::Disconnect(None));
                self.fire(ProviderEvent::ChainChanged(json!(hex)));
                Ok(Value::Null)
            }
            _ => Err(ProviderRpcError::new(-32601, format!("{method} not supported"))),
        }
    }

    fn set_listener(&self, listener: Option<ProviderListener>) {
        *self.listener.lock() = listener;
    }

    fn flags(&self) -> ProviderFlags {
        ProviderFlags {
            is_meta_mask: true,
            ..ProviderFlags::default()
        }
    }
}

#[tokio::test]
async fn test_chain_switch_disconnect_is_swallowed() {
    let wallet = Arc::new(FlakyWallet::default());
    wallet.chain_id.store(1, Ordering::SeqCst);
    let providers: Vec<Arc<dyn Eip1193Provider>> = vec![wallet.clone()];
    let client = Client::builder()
        .chains([Chain::mainnet(), Chain::optimism()])
        .connector(Arc::new(InjectedConnector::metamask(&providers)))
        .without_persistence()
        .build()
        .unwrap();

    assert_ok!(client.connect("metaMask", None).await);
    let chain = assert_ok!(client.switch_chain(10, None).await);
    assert_eq!(chain.id, 10);
    client.drain_events();

    let state = client.state();
    assert_eq!(state.status, Status::Connected);
    assert_eq!(state.chain_id, 10);
    assert_eq!(state.account(), Some(ALICE));

    // A real disconnect afterwards is not swallowed.
    wallet.fire(ProviderEvent::Disconnect(None));
    client.drain_events();
    assert_eq!(client.state().status, Status::Disconnected);
}
