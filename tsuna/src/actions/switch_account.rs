use tracing::info;

use crate::client::Client;
use crate::error::{Error, Result};

impl Client {
    /// Make the connection of `connector_id` current.
    ///
    /// The default chain follows the new current connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectorNotConnected`] if the connector has no
    /// connection.
    pub fn switch_account(&self, connector_id: &str) -> Result<()> {
        if !self.state().connections.contains(connector_id) {
            return Err(Error::ConnectorNotConnected);
        }
        let id = connector_id.to_owned();
        self.store().set_state(move |s| s.with_current(&id));
        info!(connector = %connector_id, account = ?self.state().account(), "Switched account");
        Ok(())
    }
}
