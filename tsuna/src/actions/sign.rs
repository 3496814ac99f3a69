use alloy::primitives::{Address, Signature};
use tracing::debug;

use super::ConnectorClientParameters;
use crate::client::Client;
use crate::error::{Error, Result};

impl Client {
    /// Sign an EIP-191 personal message with a connected account.
    ///
    /// # Errors
    ///
    /// Any [`get_connector_client`](Client::get_connector_client) error, or
    /// the wallet's error (e.g. [`Error::UserRejectedRequest`]).
    pub async fn sign_message(
        &self,
        message: impl AsRef<[u8]> + Send,
        params: ConnectorClientParameters,
    ) -> Result<Signature> {
        let client = self.get_connector_client(params).await?;
        debug!(connector = %client.connector().id(), account = %client.account(), "Signing message");
        client.sign_message(message.as_ref()).await
    }
}

/// Whether `signature` over the EIP-191 `message` was produced by `address`.
///
/// Only externally owned accounts are supported.
///
/// # Errors
///
/// Returns [`Error::Signing`] if no address can be recovered.
pub fn verify_message(
    address: Address,
    message: impl AsRef<[u8]>,
    signature: &Signature,
) -> Result<bool> {
    let recovered = signature
        .recover_address_from_msg(message.as_ref())
        .map_err(|e| Error::signing(format!("recovery failed: {e}")))?;
    Ok(recovered == address)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::Chain;
    use crate::connector::MockConnector;

    #[tokio::test]
    async fn test_sign_and_verify() {
        let mock = Arc::new(MockConnector::anvil(2));
        let client = Client::builder()
            .chain(Chain::mainnet())
            .connector(Arc::clone(&mock))
            .without_persistence()
            .build()
            .unwrap();
        assert_eq!(
            client
                .sign_message("hello", ConnectorClientParameters::default())
                .await
                .err(),
            Some(Error::ConnectorNotConnected)
        );

        client.connect("mock", None).await.unwrap();
        let accounts = mock.accounts();
        let (first, second) = (accounts[0], accounts[1]);
        let signature = client
            .sign_message("hello", ConnectorClientParameters::default().account(second))
            .await
            .unwrap();

        assert!(verify_message(second, "hello", &signature).unwrap());
        assert!(!verify_message(first, "hello", &signature).unwrap());
        assert!(!verify_message(second, "goodbye", &signature).unwrap());
    }
}
