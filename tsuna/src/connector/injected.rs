//! Connector for injected EIP-1193 wallets.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::{Address, B256, Signature, hex};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::provider::{Eip1193Provider, ProviderEvent, ProviderListener, ProviderRpcError, Target};
use super::{ConnectOptions, ConnectResult, Connector, ConnectorContext, ConnectorEvent};
use crate::chain::{Chain, normalize_chain_id, to_hex_chain_id};
use crate::error::{Error, Result};

/// Configuration for [`InjectedConnector`].
#[derive(Debug, Clone)]
pub struct InjectedOptions {
    /// Which injected provider to bind to.
    pub target: Target,
    /// Display name override.
    pub name: Option<String>,
    /// Remember explicit disconnects in storage, since injected wallets
    /// cannot be disconnected programmatically.
    pub shim_disconnect: bool,
    /// Swallow the `disconnect` some wallets emit while switching chains.
    pub shim_chain_changed_disconnect: bool,
}

impl InjectedOptions {
    /// Options for `target` with the shims it needs.
    #[must_use]
    pub fn new(target: Target) -> Self {
        let shim_chain_changed_disconnect = matches!(target, Target::MetaMask);
        Self {
            target,
            name: None,
            shim_disconnect: true,
            shim_chain_changed_disconnect,
        }
    }

    /// Override the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable the disconnect shim.
    #[must_use]
    pub const fn with_shim_disconnect(mut self, enabled: bool) -> Self {
        self.shim_disconnect = enabled;
        self
    }

    /// Enable or disable the chain-switch disconnect shim.
    #[must_use]
    pub const fn with_shim_chain_changed_disconnect(mut self, enabled: bool) -> Self {
        self.shim_chain_changed_disconnect = enabled;
        self
    }
}

impl Default for InjectedOptions {
    fn default() -> Self {
        Self::new(Target::Injected)
    }
}

/// State shared with the provider event listener.
#[derive(Debug)]
struct Shared {
    id: String,
    shim_disconnect: bool,
    shim_chain_changed_disconnect: bool,
    switching_chains: AtomicBool,
    context: RwLock<Option<ConnectorContext>>,
}

impl Shared {
    fn disconnected_key(&self) -> String {
        format!("{}.disconnected", self.id)
    }

    fn emit(&self, event: ConnectorEvent) {
        if let Some(context) = self.context.read().as_ref() {
            context.emitter.emit(event);
        }
    }

    fn mark_disconnected(&self, disconnected: bool) {
        if !self.shim_disconnect {
            return;
        }
        let Some(storage) = self.context.read().as_ref().and_then(|c| c.storage.clone()) else {
            return;
        };
        let key = self.disconnected_key();
        let result = if disconnected {
            storage.set(&key, &true)
        } else {
            storage.remove(&key)
        };
        if let Err(e) = result {
            warn!(connector = %self.id, error = %e, "Failed to update disconnect flag");
        }
    }

    fn is_marked_disconnected(&self) -> bool {
        self.shim_disconnect
            && self
                .context
                .read()
                .as_ref()
                .and_then(|c| c.storage.as_ref())
                .is_some_and(|s| s.contains(&self.disconnected_key()))
    }

    fn on_event(self: &Arc<Self>, provider: &Arc<dyn Eip1193Provider>, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(raw) => {
                self.emit(ConnectorEvent::AccountsChanged(parse_accounts(&raw)));
            }
            ProviderEvent::ChainChanged(value) => match normalize_chain_id(&value) {
                Ok(chain_id) => self.emit(ConnectorEvent::ChainChanged(chain_id)),
                Err(e) => warn!(connector = %self.id, error = %e, "Ignoring chainChanged"),
            },
            ProviderEvent::Connect { chain_id } => self.on_connect(provider, &chain_id),
            ProviderEvent::Disconnect(reason) => {
                if self.shim_chain_changed_disconnect
                    && self.switching_chains.swap(false, Ordering::AcqRel)
                {
                    debug!(connector = %self.id, "Swallowing disconnect emitted by chain switch");
                    return;
                }
                debug!(connector = %self.id, reason = ?reason, "Provider disconnected");
                self.emit(ConnectorEvent::Disconnect);
                self.mark_disconnected(true);
            }
        }
    }

    fn on_connect(self: &Arc<Self>, provider: &Arc<dyn Eip1193Provider>, chain_id: &Value) {
        let chain_id = match normalize_chain_id(chain_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(connector = %self.id, error = %e, "Ignoring connect event");
                return;
            }
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(connector = %self.id, "No runtime to resolve accounts for connect event");
            return;
        };
        let this = Arc::clone(self);
        let provider = Arc::clone(provider);
        handle.spawn(async move {
            match provider.request("eth_accounts", json!([])).await {
                Ok(value) => {
                    let accounts = parse_accounts(&string_list(&value));
                    if !accounts.is_empty() {
                        this.emit(ConnectorEvent::Connect { accounts, chain_id });
                    }
                }
                Err(e) => debug!(connector = %this.id, error = %e, "eth_accounts failed"),
            }
        });
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_accounts(raw: &[String]) -> Vec<Address> {
    raw.iter()
        .filter_map(|s| Address::from_str(s).ok())
        .collect()
}

/// Generic EIP-1193 connector.
///
/// The provider is resolved once at construction from the list of injected
/// providers using the configured [`Target`]; if none matches, every wallet
/// operation fails with [`Error::ConnectorNotFound`].
#[derive(Debug)]
pub struct InjectedConnector {
    id: String,
    name: String,
    provider: Option<Arc<dyn Eip1193Provider>>,
    shared: Arc<Shared>,
}

impl InjectedConnector {
    /// Bind to the provider selected by `options.target`.
    #[must_use]
    pub fn new(providers: &[Arc<dyn Eip1193Provider>], options: InjectedOptions) -> Self {
        let id = options.target.id().to_owned();
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| options.target.name().to_owned());
        let provider = options.target.resolve(providers);
        if provider.is_none() {
            debug!(connector = %id, "No matching injected provider");
        }
        Self {
            provider,
            shared: Arc::new(Shared {
                id: id.clone(),
                shim_disconnect: options.shim_disconnect,
                shim_chain_changed_disconnect: options.shim_chain_changed_disconnect,
                switching_chains: AtomicBool::new(false),
                context: RwLock::new(None),
            }),
            id,
            name,
        }
    }

    /// MetaMask connector with default options.
    #[must_use]
    pub fn metamask(providers: &[Arc<dyn Eip1193Provider>]) -> Self {
        Self::new(providers, InjectedOptions::new(Target::MetaMask))
    }

    /// Whether a matching provider was found.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn Eip1193Provider>> {
        self.provider.as_ref().ok_or(Error::ConnectorNotFound)
    }

    fn install_listener(&self, provider: &Arc<dyn Eip1193Provider>) {
        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(provider);
        let listener: ProviderListener = Arc::new(move |event| shared.on_event(&source, event));
        provider.set_listener(Some(listener));
    }

    async fn request_accounts(&self, method: &str) -> Result<Vec<Address>> {
        let value = self.provider()?.request(method, json!([])).await?;
        Ok(parse_accounts(&string_list(&value)))
    }

    async fn handshake(
        &self,
        provider: &Arc<dyn Eip1193Provider>,
        options: ConnectOptions,
    ) -> Result<ConnectResult> {
        // Re-prompt the account picker after an explicit disconnect.
        if !options.is_reconnecting && self.shared.is_marked_disconnected() {
            let authorized = self.request_accounts("eth_accounts").await?;
            if !authorized.is_empty()
                && let Err(e) = provider
                    .request("wallet_requestPermissions", json!([{ "eth_accounts": {} }]))
                    .await
            {
                if e.is_user_rejected() {
                    return Err(e.into());
                }
                debug!(connector = %self.id, error = %e, "wallet_requestPermissions failed");
            }
        }

        let method = if options.is_reconnecting {
            "eth_accounts"
        } else {
            "eth_requestAccounts"
        };
        let accounts = self.request_accounts(method).await?;
        if accounts.is_empty() {
            return Err(Error::user_rejected("no accounts authorized"));
        }

        let mut chain_id = self.get_chain_id().await?;
        if let Some(requested) = options.chain_id
            && requested != chain_id
        {
            chain_id = self.switch_chain(requested).await?.id;
        }

        self.shared.mark_disconnected(false);
        Ok(ConnectResult { accounts, chain_id })
    }

    /// Ask the wallet to track an ERC-20 token (`wallet_watchAsset`).
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is available or the request fails.
    pub async fn watch_asset(
        &self,
        address: Address,
        symbol: &str,
        decimals: u8,
        image: Option<&str>,
    ) -> Result<bool> {
        let value = self
            .provider()?
            .request(
                "wallet_watchAsset",
                json!({
                    "type": "ERC20",
                    "options": {
                        "address": address,
                        "symbol": symbol,
                        "decimals": decimals,
                        "image": image,
                    }
                }),
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn add_chain(&self, provider: &Arc<dyn Eip1193Provider>, chain: &Chain) -> Result<()> {
        let params = json!([{
            "chainId": to_hex_chain_id(chain.id),
            "chainName": chain.name,
            "nativeCurrency": chain.native_currency,
            "rpcUrls": chain.default_rpc_url().into_iter().collect::<Vec<_>>(),
            "blockExplorerUrls": chain.block_explorer_urls(),
        }]);
        match provider.request("wallet_addEthereumChain", params).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_user_rejected() => Err(Error::user_rejected(e.message)),
            Err(e) => Err(Error::add_chain(e.to_string())),
        }
    }
}

#[async_trait]
impl Connector for InjectedConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&self, context: ConnectorContext) {
        *self.shared.context.write() = Some(context);
    }

    async fn connect(&self, options: ConnectOptions) -> Result<ConnectResult> {
        let provider = Arc::clone(self.provider()?);
        self.install_listener(&provider);

        match self.handshake(&provider, options).await {
            Ok(result) => {
                info!(
                    connector = %self.id,
                    account = ?result.accounts.first(),
                    chain_id = result.chain_id,
                    "Injected wallet connected"
                );
                Ok(result)
            }
            Err(e) => {
                provider.set_listener(None);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(provider) = &self.provider {
            provider.set_listener(None);
        }
        self.shared.mark_disconnected(true);
        Ok(())
    }

    async fn get_accounts(&self) -> Result<Vec<Address>> {
        self.request_accounts("eth_accounts").await
    }

    async fn get_chain_id(&self) -> Result<u64> {
        let value = self.provider()?.request("eth_chainId", json!([])).await?;
        normalize_chain_id(&value)
    }

    async fn is_authorized(&self) -> bool {
        if self.shared.is_marked_disconnected() {
            return false;
        }
        match self.get_accounts().await {
            Ok(accounts) => !accounts.is_empty(),
            Err(e) => {
                debug!(connector = %self.id, error = %e, "Authorization check failed");
                false
            }
        }
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<Chain> {
        let provider = Arc::clone(self.provider()?);
        let chain = self
            .shared
            .context
            .read()
            .as_ref()
            .and_then(|c| c.chain(chain_id).cloned())
            .ok_or(Error::ChainNotConfigured { chain_id })?;

        if self.shared.shim_chain_changed_disconnect {
            self.shared.switching_chains.store(true, Ordering::Release);
        }

        let params = json!([{ "chainId": to_hex_chain_id(chain_id) }]);
        match provider.request("wallet_switchEthereumChain", params).await {
            Ok(_) => Ok(chain),
            Err(e) => {
                self.shared.switching_chains.store(false, Ordering::Release);
                match e.code {
                    ProviderRpcError::UNRECOGNIZED_CHAIN => {
                        self.add_chain(&provider, &chain).await?;
                        Ok(chain)
                    }
                    ProviderRpcError::USER_REJECTED => Err(Error::user_rejected(e.message)),
                    _ => Err(Error::switch_chain(e.to_string())),
                }
            }
        }
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<Signature> {
        let params = json!([format!("0x{}", hex::encode(message)), account]);
        let value = self.provider()?.request("personal_sign", params).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::signing("personal_sign returned a non-string"))?;
        Signature::from_str(raw).map_err(|e| Error::signing(format!("invalid signature: {e}")))
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256> {
        let tx = serde_json::to_value(&request)
            .map_err(|e| Error::transport(format!("encode transaction failed: {e}")))?;
        let value = self
            .provider()?
            .request("eth_sendTransaction", json!([tx]))
            .await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::transport("eth_sendTransaction returned a non-string"))?;
        B256::from_str(raw).map_err(|e| Error::transport(format!("invalid transaction hash: {e}")))
    }
}
