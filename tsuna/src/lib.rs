//! Tsuna - wallet connections and multi-chain reads for Ethereum clients
//!
//! This crate keeps the connection state of an Ethereum client consistent
//! while wallets connect, switch accounts and chains, and disconnect on
//! their own. It also batches contract reads per chain with Multicall3.
//!
//! A [`Client`] owns the configured chains, the wallet [connectors](connector),
//! a reactive [`Store`](store::Store) of [`State`](state::State), and
//! optional persistence through [`storage`]. Everything the caller can do
//! is an action on the client:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tsuna::prelude::*;
//!
//! let client = Client::builder()
//!     .chains([Chain::mainnet(), Chain::optimism()])
//!     .connector(Arc::new(MockConnector::anvil(1)))
//!     .build()?;
//! let _reconciler = client.spawn_reconciler();
//!
//! client.reconnect(None).await;
//! client.connect("mock", Some(10)).await?;
//! println!("{:?}", client.get_account());
//! ```

pub mod actions;
pub mod chain;
pub mod client;
pub mod config;
pub mod connection;
pub mod connector;
pub mod contracts;
pub mod error;
pub mod prelude;
pub mod state;
pub mod storage;
pub mod store;

pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
