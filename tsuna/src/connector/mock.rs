//! Deterministic connector backed by local private keys.
//!
//! [`MockConnector`] behaves like a wallet that never prompts: `connect`
//! authorizes every configured key, `switch_chain` always moves (even to
//! chains the client does not know), and signing happens in process.
//! Behaviour can be bent with [`MockFlags`] and unsolicited wallet events can
//! be simulated with the `emit_*` helpers. [`MockConnector::hold`] pauses a
//! handshake step so tests can interleave actions with it.
//!
//! # Example
//!
//! ```rust,ignore
//! use tsuna::connector::{MockConnector, MockFlags};
//!
//! let connector = MockConnector::anvil(2).with_flags(MockFlags {
//!     fail_connect: true,
//!     ..MockFlags::default()
//! });
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Signature, keccak256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::debug;

use super::{ConnectOptions, ConnectResult, Connector, ConnectorContext, ConnectorEvent};
use crate::chain::Chain;
use crate::error::{Error, Result};

/// Private keys of the default Anvil / Hardhat development accounts.
const ANVIL_KEYS: [&str; 3] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

/// Behaviour switches for [`MockConnector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct MockFlags {
    /// `connect` fails with a user rejection.
    pub fail_connect: bool,
    /// `switch_chain` fails.
    pub fail_switch_chain: bool,
    /// Result of `is_authorized`.
    pub is_authorized: bool,
    /// Chain the wallet starts on; defaults to the first configured chain.
    pub wallet_chain_id: Option<u64>,
}

impl Default for MockFlags {
    fn default() -> Self {
        Self {
            fail_connect: false,
            fail_switch_chain: false,
            is_authorized: true,
            wallet_chain_id: None,
        }
    }
}

/// A handshake step that can be held open with [`MockConnector::hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStep {
    /// [`Connector::connect`].
    Connect,
    /// [`Connector::disconnect`].
    Disconnect,
}

#[derive(Debug, Default)]
struct Gate {
    reached: Notify,
    released: Notify,
}

#[derive(Debug, Default)]
struct Session {
    connected: bool,
    chain_id: Option<u64>,
}

/// A connector whose wallet is a list of local signers.
#[derive(Debug)]
pub struct MockConnector {
    id: String,
    name: String,
    signers: Vec<PrivateKeySigner>,
    flags: RwLock<MockFlags>,
    session: Mutex<Session>,
    context: RwLock<Option<ConnectorContext>>,
    sent: Mutex<Vec<TransactionRequest>>,
    gates: Mutex<HashMap<MockStep, Arc<Gate>>>,
}

impl MockConnector {
    /// Create a connector for `signers`, the first being the primary account.
    #[must_use]
    pub fn new(signers: Vec<PrivateKeySigner>) -> Self {
        Self {
            id: "mock".into(),
            name: "Mock Connector".into(),
            signers,
            flags: RwLock::new(MockFlags::default()),
            session: Mutex::new(Session::default()),
            context: RwLock::new(None),
            sent: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Create a connector with the first `count` (at most three) Anvil
    /// development accounts.
    #[must_use]
    pub fn anvil(count: usize) -> Self {
        let signers = ANVIL_KEYS
            .iter()
            .take(count)
            .filter_map(|key| key.parse::<PrivateKeySigner>().ok())
            .collect();
        Self::new(signers)
    }

    /// Create a connector from hex private keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if a key is invalid.
    pub fn from_private_keys(keys: &[&str]) -> Result<Self> {
        let signers = keys
            .iter()
            .map(|key| {
                key.strip_prefix("0x")
                    .unwrap_or(key)
                    .parse::<PrivateKeySigner>()
                    .map_err(|e| Error::signing(format!("invalid private key: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(signers))
    }

    /// Override the connector id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Override the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set behaviour flags.
    #[must_use]
    pub fn with_flags(self, flags: MockFlags) -> Self {
        *self.flags.write() = flags;
        self
    }

    /// Change behaviour flags after construction.
    pub fn set_flags(&self, flags: MockFlags) {
        *self.flags.write() = flags;
    }

    /// Addresses of the configured signers.
    #[must_use]
    pub fn accounts(&self) -> Vec<Address> {
        self.signers.iter().map(PrivateKeySigner::address).collect()
    }

    /// Transactions passed to `send_transaction`, in order.
    #[must_use]
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.sent.lock().clone()
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.lock().connected
    }

    /// Pause `step` at its start until [`release`](Self::release) is called.
    pub fn hold(&self, step: MockStep) {
        self.gates.lock().insert(step, Arc::new(Gate::default()));
    }

    /// Wait until a held `step` has started. Returns at once if `step` is
    /// not held.
    pub async fn reached(&self, step: MockStep) {
        let gate = self.gates.lock().get(&step).cloned();
        if let Some(gate) = gate {
            gate.reached.notified().await;
        }
    }

    /// Let a held `step` run to completion.
    pub fn release(&self, step: MockStep) {
        if let Some(gate) = self.gates.lock().remove(&step) {
            gate.released.notify_one();
        }
    }

    async fn pass(&self, step: MockStep) {
        let gate = self.gates.lock().get(&step).cloned();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.released.notified().await;
        }
    }

    fn emit(&self, event: ConnectorEvent) {
        if let Some(context) = self.context.read().as_ref() {
            context.emitter.emit(event);
        }
    }

    /// Simulate the wallet changing its accounts.
    pub fn emit_accounts_changed(&self, accounts: Vec<Address>) {
        self.emit(ConnectorEvent::AccountsChanged(accounts));
    }

    /// Simulate the wallet moving to another chain.
    pub fn emit_chain_changed(&self, chain_id: u64) {
        self.session.lock().chain_id = Some(chain_id);
        self.emit(ConnectorEvent::ChainChanged(chain_id));
    }

    /// Simulate the wallet disconnecting.
    pub fn emit_disconnect(&self) {
        self.session.lock().connected = false;
        self.emit(ConnectorEvent::Disconnect);
    }

    /// Simulate the wallet connecting on its own.
    pub fn emit_connect(&self) {
        let chain_id = self.current_chain_id();
        self.session.lock().connected = true;
        self.emit(ConnectorEvent::Connect {
            accounts: self.accounts(),
            chain_id,
        });
    }

    fn current_chain_id(&self) -> u64 {
        let session_chain = self.session.lock().chain_id;
        session_chain
            .or(self.flags.read().wallet_chain_id)
            .or_else(|| {
                self.context
                    .read()
                    .as_ref()
                    .and_then(|c| c.chains.first().map(|chain| chain.id))
            })
            .unwrap_or(1)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&self, context: ConnectorContext) {
        *self.context.write() = Some(context);
    }

    async fn connect(&self, options: ConnectOptions) -> Result<ConnectResult> {
        self.pass(MockStep::Connect).await;
        if self.flags.read().fail_connect {
            return Err(Error::user_rejected("Failed to connect."));
        }
        if self.signers.is_empty() {
            return Err(Error::ConnectorNotFound);
        }

        let mut chain_id = self.current_chain_id();
        if let Some(requested) = options.chain_id
            && requested != chain_id
        {
            chain_id = self.switch_chain(requested).await?.id;
        }

        let mut session = self.session.lock();
        session.connected = true;
        session.chain_id = Some(chain_id);
        drop(session);

        debug!(connector = %self.id, chain_id, reconnect = options.is_reconnecting, "Mock connected");
        Ok(ConnectResult {
            accounts: self.accounts(),
            chain_id,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        self.pass(MockStep::Disconnect).await;
        self.session.lock().connected = false;
        Ok(())
    }

    async fn get_accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts())
    }

    async fn get_chain_id(&self) -> Result<u64> {
        Ok(self.current_chain_id())
    }

    async fn is_authorized(&self) -> bool {
        self.flags.read().is_authorized && !self.signers.is_empty()
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<Chain> {
        if self.flags.read().fail_switch_chain {
            return Err(Error::switch_chain("Failed to switch chain."));
        }
        let chain = self
            .context
            .read()
            .as_ref()
            .and_then(|c| c.chain(chain_id).cloned())
            .unwrap_or_else(|| Chain::new(chain_id, format!("Chain {chain_id}")));
        self.emit_chain_changed(chain_id);
        Ok(chain)
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<Signature> {
        let signer = self
            .signers
            .iter()
            .find(|s| s.address() == account)
            .ok_or_else(|| Error::ConnectorAccountNotFound {
                address: account,
                connector: self.id.clone(),
            })?;
        signer
            .sign_message_sync(message)
            .map_err(|e| Error::signing(format!("sign_message failed: {e}")))
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256> {
        let encoded = serde_json::to_vec(&request)
            .map_err(|e| Error::transport(format!("encode transaction failed: {e}")))?;
        let mut sent = self.sent.lock();
        let nonce = sent.len().to_be_bytes();
        sent.push(request);
        Ok(keccak256([encoded.as_slice(), nonce.as_slice()].concat()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::address;
    use tokio::sync::mpsc;

    use super::*;
    use crate::connector::EventSink;

    const ALICE: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const BOB: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

    fn setup(connector: &MockConnector) -> mpsc::UnboundedReceiver<crate::connector::ConnectorMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        connector.setup(ConnectorContext {
            chains: Arc::from(vec![Chain::mainnet(), Chain::optimism()]),
            emitter: EventSink::new(connector.id().to_owned(), tx),
            storage: None,
        });
        rx
    }

    #[test]
    fn test_anvil_accounts() {
        assert_eq!(MockConnector::anvil(2).accounts(), vec![ALICE, BOB]);
        assert_eq!(MockConnector::anvil(10).accounts().len(), 3);
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(matches!(
            MockConnector::from_private_keys(&["0x1234"]),
            Err(Error::Signing(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_defaults_to_first_chain() {
        let connector = MockConnector::anvil(1);
        let _rx = setup(&connector);
        let result = connector.connect(ConnectOptions::default()).await.unwrap();
        assert_eq!(result.chain_id, 1);
        assert_eq!(result.accounts, vec![ALICE]);
        assert!(connector.is_connected());
    }

    #[tokio::test]
    async fn test_connect_to_unknown_chain_is_allowed() {
        let connector = MockConnector::anvil(1);
        let mut rx = setup(&connector);
        let result = connector
            .connect(ConnectOptions {
                chain_id: Some(69),
                is_reconnecting: false,
            })
            .await
            .unwrap();
        assert_eq!(result.chain_id, 69);
        assert_eq!(rx.try_recv().unwrap().event, ConnectorEvent::ChainChanged(69));
    }

    #[tokio::test]
    async fn test_failure_flags() {
        let connector = MockConnector::anvil(1).with_flags(MockFlags {
            fail_connect: true,
            fail_switch_chain: true,
            is_authorized: false,
            wallet_chain_id: None,
        });
        let _rx = setup(&connector);
        assert!(matches!(
            connector.connect(ConnectOptions::default()).await,
            Err(Error::UserRejectedRequest(_))
        ));
        assert!(matches!(
            connector.switch_chain(10).await,
            Err(Error::SwitchChain(_))
        ));
        assert!(!connector.is_authorized().await);
    }

    #[tokio::test]
    async fn test_sign_message_recovers() {
        let connector = MockConnector::anvil(2);
        let signature = connector.sign_message(BOB, b"hello").await.unwrap();
        assert_eq!(
            signature.recover_address_from_msg(b"hello").unwrap(),
            BOB
        );
        let stranger = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");
        assert!(matches!(
            connector.sign_message(stranger, b"hello").await,
            Err(Error::ConnectorAccountNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_transaction_records_requests() {
        let connector = MockConnector::anvil(1);
        let first = connector
            .send_transaction(TransactionRequest::default())
            .await
            .unwrap();
        let second = connector
            .send_transaction(TransactionRequest::default())
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(connector.sent_transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_held_step_waits_for_release() {
        let connector = MockConnector::anvil(1);
        let _rx = setup(&connector);
        connector.connect(ConnectOptions::default()).await.unwrap();
        connector.hold(MockStep::Disconnect);

        let ((), ()) = tokio::join!(
            async { connector.disconnect().await.unwrap() },
            async {
                connector.reached(MockStep::Disconnect).await;
                assert!(connector.is_connected());
                connector.release(MockStep::Disconnect);
            }
        );
        assert!(!connector.is_connected());
    }
}
