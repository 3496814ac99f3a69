use tracing::{info, warn};

use crate::chain::{Chain, is_unsupported};
use crate::client::Client;
use crate::error::{Error, Result};

impl Client {
    /// Switch to `chain_id`.
    ///
    /// With a connection (the one of `connector_id`, else the current one)
    /// the wallet is asked to switch and the connection's chain is updated.
    /// Without a connection only the default chain changes, and it must be
    /// configured.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectorNotConnected`] if `connector_id` is given but not
    ///   connected.
    /// - [`Error::ChainNotConfigured`] when nothing is connected and the
    ///   chain is not configured.
    /// - Any error from the connector, e.g. [`Error::SwitchChain`] or
    ///   [`Error::UserRejectedRequest`].
    pub async fn switch_chain(&self, chain_id: u64, connector_id: Option<&str>) -> Result<Chain> {
        let state = self.state();
        let target = match connector_id {
            Some(id) if state.connections.contains(id) => Some(id.to_owned()),
            Some(_) => return Err(Error::ConnectorNotConnected),
            None => state.current.clone(),
        };

        let Some(id) = target else {
            let chain = self
                .chain(chain_id)
                .cloned()
                .ok_or(Error::ChainNotConfigured { chain_id })?;
            self.store().set_state(move |s| s.with_chain_id(chain_id));
            info!(chain_id, "Switched default chain");
            return Ok(chain);
        };

        let connector = self.connector(&id).ok_or(Error::ConnectorNotFound)?;
        let chain = connector.switch_chain(chain_id).await?;
        let chain_id = chain.id;
        let updated = id.clone();
        self.store()
            .set_state(move |s| s.with_connection_chain(&updated, chain_id));
        if is_unsupported(self.chains(), chain_id) {
            warn!(connector = %id, chain_id, "Switched to an unsupported chain");
        }
        info!(connector = %id, chain_id, "Switched chain");
        Ok(chain)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connector::{MockConnector, MockFlags};

    fn client() -> (Client, Arc<MockConnector>) {
        let mock = Arc::new(MockConnector::anvil(1));
        let client = Client::builder()
            .chains([Chain::mainnet(), Chain::optimism()])
            .connector(Arc::clone(&mock))
            .without_persistence()
            .build()
            .unwrap();
        (client, mock)
    }

    #[tokio::test]
    async fn test_without_connection_sets_default_chain() {
        let (client, _) = client();
        let chain = client.switch_chain(10, None).await.unwrap();
        assert_eq!(chain.id, 10);
        assert_eq!(client.state().chain_id, 10);

        assert_eq!(
            client.switch_chain(69, None).await.err(),
            Some(Error::ChainNotConfigured { chain_id: 69 })
        );
        assert_eq!(client.state().chain_id, 10);
    }

    #[tokio::test]
    async fn test_with_connection_updates_connection() {
        let (client, _) = client();
        client.connect("mock", None).await.unwrap();
        client.switch_chain(10, None).await.unwrap();
        let state = client.state();
        assert_eq!(state.chain_id, 10);
        assert_eq!(state.connections.get("mock").unwrap().chain_id, 10);
    }

    #[tokio::test]
    async fn test_connector_failure_leaves_state() {
        let (client, mock) = client();
        client.connect("mock", None).await.unwrap();
        mock.set_flags(MockFlags {
            fail_switch_chain: true,
            ..MockFlags::default()
        });
        let before = client.state();
        assert!(matches!(
            client.switch_chain(10, None).await,
            Err(Error::SwitchChain(_))
        ));
        assert_eq!(*client.state(), *before);
        assert_eq!(
            client.switch_chain(10, Some("other")).await.err(),
            Some(Error::ConnectorNotConnected)
        );
    }
}
