use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, B256, Signature};
use alloy::rpc::types::TransactionRequest;

use crate::chain::Chain;
use crate::client::Client;
use crate::connection::ConnectorId;
use crate::connector::Connector;
use crate::error::{Error, Result};

/// Selects the connection, account and chain for a connector client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorClientParameters {
    /// Connector to use. Defaults to the current connection.
    pub connector_id: Option<ConnectorId>,
    /// Account to act as. Defaults to the connection's primary account.
    pub account: Option<Address>,
    /// Chain to act on. Defaults to the connection's chain.
    pub chain_id: Option<u64>,
}

impl ConnectorClientParameters {
    /// Use `connector_id` instead of the current connection.
    #[must_use]
    pub fn connector(mut self, connector_id: impl Into<ConnectorId>) -> Self {
        self.connector_id = Some(connector_id.into());
        self
    }

    /// Act as `account`.
    #[must_use]
    pub const fn account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// Act on `chain_id`.
    #[must_use]
    pub const fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

/// A connector bound to one validated account and chain.
#[derive(Clone)]
pub struct ConnectorClient {
    connector: Arc<dyn Connector>,
    account: Address,
    chain_id: u64,
    chain: Option<Chain>,
}

impl fmt::Debug for ConnectorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorClient")
            .field("connector", &self.connector.id())
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl ConnectorClient {
    /// The connector.
    #[must_use]
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// The account requests are signed with.
    #[must_use]
    pub const fn account(&self) -> Address {
        self.account
    }

    /// The chain requests target.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The configured chain, if `chain_id` is configured.
    #[must_use]
    pub const fn chain(&self) -> Option<&Chain> {
        self.chain.as_ref()
    }

    /// Sign an EIP-191 personal message.
    ///
    /// # Errors
    ///
    /// Returns the connector's error, e.g. [`Error::UserRejectedRequest`].
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.connector.sign_message(self.account, message).await
    }

    /// Send a transaction from the bound account on the bound chain.
    ///
    /// `from` and `chain_id` of `request` are overwritten.
    ///
    /// # Errors
    ///
    /// Returns the connector's error, e.g. [`Error::UserRejectedRequest`].
    pub async fn send_transaction(&self, mut request: TransactionRequest) -> Result<B256> {
        request.from = Some(self.account);
        request.chain_id = Some(self.chain_id);
        self.connector.send_transaction(request).await
    }
}

impl Client {
    /// Resolve a [`ConnectorClient`] for a connection.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectorNotConnected`] if there is no such connection.
    /// - [`Error::ConnectorChainMismatch`] if the wallet is no longer on the
    ///   connection's chain. Checked before the account.
    /// - [`Error::ConnectorAccountNotFound`] if `account` is not one of the
    ///   connection's accounts.
    /// - [`Error::ConnectorNotFound`] if the connector is not configured.
    pub async fn get_connector_client(
        &self,
        params: ConnectorClientParameters,
    ) -> Result<ConnectorClient> {
        let state = self.state();
        let connection = match params.connector_id.as_deref() {
            Some(id) => state.connections.get(id),
            None => state.active_connection(),
        }
        .ok_or(Error::ConnectorNotConnected)?;
        let connector = self
            .connector(&connection.connector_id)
            .ok_or(Error::ConnectorNotFound)?;

        let connector_chain_id = connector.get_chain_id().await?;
        if connector_chain_id != connection.chain_id {
            return Err(Error::ConnectorChainMismatch {
                connection_chain_id: connection.chain_id,
                connector_chain_id,
            });
        }

        let account = match params.account {
            Some(account) if connection.has_account(&account) => account,
            Some(account) => {
                return Err(Error::ConnectorAccountNotFound {
                    address: account,
                    connector: connection.connector_id.clone(),
                });
            }
            None => connection.account().ok_or(Error::ConnectorNotConnected)?,
        };

        let chain_id = params.chain_id.unwrap_or(connection.chain_id);
        Ok(ConnectorClient {
            connector,
            account,
            chain_id,
            chain: self.chain(chain_id).cloned(),
        })
    }
}
