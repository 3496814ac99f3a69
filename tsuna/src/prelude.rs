//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tsuna::prelude::*;
//! ```

pub use crate::actions::{
    Account, ConnectorClient, ConnectorClientParameters, WriteContractParameters, verify_message,
};
pub use crate::chain::Chain;
pub use crate::client::{Client, ClientBuilder};
pub use crate::config::{ClientConfig, load_config_from};
pub use crate::connection::{Connection, ConnectorId};
pub use crate::connector::{
    ConnectOptions, ConnectResult, Connector, ConnectorEvent, Eip1193Provider, InjectedConnector,
    InjectedOptions, MockConnector, MockFlags, MockStep, Target,
};
pub use crate::contracts::{
    ContractCall, HttpReadProvider, MockReadProvider, ReadContractsParameters, ReadProvider,
    ReadResult,
};
pub use crate::error::{Error, Result};
pub use crate::state::{State, Status};
pub use crate::storage::{FileStorage, MemoryStorage, NoopStorage, Storage};
pub use crate::store::{Store, Subscription};
