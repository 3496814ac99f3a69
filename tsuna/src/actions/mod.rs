//! Client actions.
//!
//! Every action is an `async fn` (or a plain getter) on [`Client`]. Actions
//! validate their preconditions against the current snapshot, perform wallet
//! or RPC I/O through a connector or the read router, and publish the
//! outcome with a single store update.
//!
//! | Action | Effect |
//! |--------|--------|
//! | [`connect`](Client::connect) | Handshake and insert a connection |
//! | [`disconnect`](Client::disconnect) | Remove one or all connections |
//! | [`reconnect`](Client::reconnect) | Silently restore persisted connections |
//! | [`switch_account`](Client::switch_account) | Make another connection current |
//! | [`switch_chain`](Client::switch_chain) | Move a connection (or the default) to a chain |
//! | [`get_account`](Client::get_account) | Derived view of the active connection |
//! | [`get_connector_client`](Client::get_connector_client) | Validated signer handle |
//! | [`sign_message`](Client::sign_message) | EIP-191 signature |
//! | [`write_contract`](Client::write_contract) | Encode and send a contract transaction |
//! | [`read_contracts`](Client::read_contracts) | Batched multi-chain reads |
//!
//! [`Client`]: crate::Client

mod account;
mod connect;
mod connector_client;
mod disconnect;
mod read;
mod reconnect;
mod sign;
mod switch_account;
mod switch_chain;
mod write_contract;

pub use account::Account;
pub use connector_client::{ConnectorClient, ConnectorClientParameters};
pub use sign::verify_message;
pub use write_contract::WriteContractParameters;
