use tracing::{info, warn};

use crate::client::Client;
use crate::connection::ConnectorId;
use crate::error::Result;

impl Client {
    /// Disconnect one connector, or every connector when `connector_id` is
    /// `None`.
    ///
    /// Disconnecting a connector without a connection does nothing. The
    /// connector's own teardown is best effort: its failures are logged and
    /// the connection is removed regardless. Disconnecting everything only
    /// touches the connections present when the call starts.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for connectors whose
    /// teardown must be confirmed.
    pub async fn disconnect(&self, connector_id: Option<&str>) -> Result<()> {
        let state = self.state();
        let targets: Vec<ConnectorId> = match connector_id {
            Some(id) if state.connections.contains(id) => vec![id.to_owned()],
            Some(_) => return Ok(()),
            None => state.connections.ids().map(str::to_owned).collect(),
        };

        for id in targets {
            if let Some(connector) = self.connector(&id)
                && let Err(e) = connector.disconnect().await
            {
                warn!(connector = %id, error = %e, "Connector teardown failed");
            }
            let removed = id.clone();
            self.store()
                .set_state(move |s| s.without_connection(&removed));
            info!(connector = %id, "Disconnected");
        }
        Ok(())
    }
}
