//! Read transports.

use std::fmt;

use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Executes `eth_call` against one chain.
#[async_trait]
pub trait ReadProvider: Send + Sync + fmt::Debug {
    /// Call `to` with `data` at the latest block and return the raw result.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

/// [`ReadProvider`] over HTTP JSON-RPC, backed by an alloy [`DynProvider`].
pub struct HttpReadProvider {
    url: Url,
    provider: DynProvider<Ethereum>,
}

impl fmt::Debug for HttpReadProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpReadProvider")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpReadProvider {
    /// Create a provider for `rpc_url`. No request is made until the first
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid.
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| Error::config(format!("invalid RPC URL '{rpc_url}': {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        Ok(Self { url, provider })
    }

    /// Endpoint URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ReadProvider for HttpReadProvider {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        debug!(url = %self.url, to = %to, len = data.len(), "eth_call");
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.provider
            .call(tx)
            .await
            .map_err(|e| Error::transport(format!("eth_call to {to} failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_config_error() {
        assert!(matches!(
            HttpReadProvider::new("not a url"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_valid_url() {
        let provider = HttpReadProvider::new("http://127.0.0.1:8545").map(|p| p.url().clone());
        assert_eq!(provider.ok().map(|u| u.port()), Some(Some(8545)));
    }
}
