use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use tracing::info;

use super::ConnectorClientParameters;
use crate::client::Client;
use crate::connection::ConnectorId;
use crate::contracts::ContractCall;
use crate::error::Result;

/// A state-changing contract call.
#[derive(Debug, Clone)]
pub struct WriteContractParameters {
    /// Function, arguments and (optionally) the target chain.
    pub call: ContractCall,
    /// Ether sent with the call.
    pub value: Option<U256>,
    /// Account to send from. Defaults to the connection's primary account.
    pub account: Option<Address>,
    /// Connector to send through. Defaults to the current connection.
    pub connector_id: Option<ConnectorId>,
}

impl WriteContractParameters {
    /// Send `call` from the current account.
    #[must_use]
    pub const fn new(call: ContractCall) -> Self {
        Self {
            call,
            value: None,
            account: None,
            connector_id: None,
        }
    }

    /// Attach `value` wei.
    #[must_use]
    pub const fn value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// Send from `account`.
    #[must_use]
    pub const fn account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// Send through `connector_id`.
    #[must_use]
    pub fn connector(mut self, connector_id: impl Into<ConnectorId>) -> Self {
        self.connector_id = Some(connector_id.into());
        self
    }
}

impl Client {
    /// Encode a contract call and send it as a transaction.
    ///
    /// If the call names a chain other than the connection's, the wallet is
    /// switched first. Returns the transaction hash.
    ///
    /// # Errors
    ///
    /// - Any [`switch_chain`](Client::switch_chain) or
    ///   [`get_connector_client`](Client::get_connector_client) error.
    /// - [`Error::Abi`](crate::Error::Abi) if the call cannot be encoded.
    /// - The wallet's error, e.g.
    ///   [`Error::UserRejectedRequest`](crate::Error::UserRejectedRequest).
    pub async fn write_contract(&self, params: WriteContractParameters) -> Result<B256> {
        let WriteContractParameters {
            call,
            value,
            account,
            connector_id,
        } = params;
        let data = call.calldata()?;

        let connection_chain = {
            let state = self.state();
            match connector_id.as_deref() {
                Some(id) => state.connections.get(id),
                None => state.active_connection(),
            }
            .map(|c| c.chain_id)
        };
        if let (Some(target), Some(current)) = (call.chain_id, connection_chain)
            && target != current
        {
            self.switch_chain(target, connector_id.as_deref()).await?;
        }

        let client = self
            .get_connector_client(ConnectorClientParameters {
                connector_id,
                account,
                chain_id: call.chain_id,
            })
            .await?;

        let mut request = TransactionRequest::default()
            .with_to(call.address)
            .with_input(data);
        if let Some(value) = value {
            request = request.with_value(value);
        }
        let hash = client.send_transaction(request).await?;
        info!(
            connector = %client.connector().id(),
            chain_id = client.chain_id(),
            to = %call.address,
            function = %call.function_name,
            hash = %hash,
            "Contract write sent"
        );
        Ok(hash)
    }
}
