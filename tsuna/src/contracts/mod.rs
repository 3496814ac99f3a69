//! Contract reads across configured chains.
//!
//! A [`ContractCall`] names a function on a deployed contract through a
//! dynamic [`JsonAbi`]. [`ReadRouter`] routes calls to the [`ReadProvider`]
//! of their chain, batching them through the chain's Multicall3 aggregator
//! when one is configured.

mod mock;
mod multicall;
mod read_contract;
mod read_contracts;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes};

use crate::chain::{Chain, find_chain};
use crate::error::{Error, Result};

pub use mock::MockReadProvider;
pub use multicall::{aggregate_calldata, decode_aggregate};
pub use transport::{HttpReadProvider, ReadProvider};

/// Outcome of one request in a batch read.
///
/// `Ok(None)` marks a request that failed under `allow_failure`.
pub type ReadResult = Result<Option<Vec<DynSolValue>>>;

/// A call to a contract function.
#[derive(Debug, Clone)]
pub struct ContractCall {
    /// ABI containing the function.
    pub abi: Arc<JsonAbi>,
    /// Contract address.
    pub address: Address,
    /// Function name.
    pub function_name: String,
    /// Call arguments.
    pub args: Vec<DynSolValue>,
    /// Chain to call; defaults to the client's current chain.
    pub chain_id: Option<u64>,
}

impl ContractCall {
    /// Call `function_name` on `address` without arguments.
    #[must_use]
    pub fn new(abi: Arc<JsonAbi>, address: Address, function_name: impl Into<String>) -> Self {
        Self {
            abi,
            address,
            function_name: function_name.into(),
            args: Vec::new(),
            chain_id: None,
        }
    }

    /// Set the call arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<DynSolValue>) -> Self {
        self.args = args;
        self
    }

    /// Pin the call to a chain.
    #[must_use]
    pub const fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Resolve the ABI function, preferring the overload whose arity
    /// matches the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Abi`] if the ABI has no function with this name.
    pub fn function(&self) -> Result<&Function> {
        let overloads = self
            .abi
            .function(&self.function_name)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                Error::abi(format!("function \"{}\" not found in ABI", self.function_name))
            })?;
        Ok(overloads
            .iter()
            .find(|f| f.inputs.len() == self.args.len())
            .unwrap_or(&overloads[0]))
    }

    /// ABI-encode the calldata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Abi`] if the function is missing or the arguments do
    /// not match its inputs.
    pub fn calldata(&self) -> Result<Bytes> {
        let function = self.function()?;
        function
            .abi_encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|e| {
                Error::abi(format!(
                    "failed to encode arguments for \"{}\": {e}",
                    self.function_name
                ))
            })
    }

    /// Decode return data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContractMethodNoResult`] for empty data and
    /// [`Error::ContractResultDecode`] if the data does not match the ABI.
    pub fn decode(&self, data: &[u8], chain_id: u64) -> Result<Vec<DynSolValue>> {
        if data.is_empty() {
            return Err(Error::ContractMethodNoResult {
                address: self.address,
                function_name: self.function_name.clone(),
                chain_id,
            });
        }
        self.function()?
            .abi_decode_output(data)
            .map_err(|e| Error::ContractResultDecode {
                address: self.address,
                function_name: self.function_name.clone(),
                message: e.to_string(),
            })
    }

    fn reverted(&self, chain_id: u64, message: impl Into<String>) -> Error {
        Error::ContractMethodReverted {
            address: self.address,
            function_name: self.function_name.clone(),
            chain_id,
            message: message.into(),
        }
    }
}

/// Parameters for [`ReadRouter::read_contracts`].
#[derive(Debug, Clone)]
pub struct ReadContractsParameters {
    /// Requests, answered in this order.
    pub contracts: Vec<ContractCall>,
    /// Substitute `None` for failed requests instead of aborting.
    pub allow_failure: bool,
}

impl ReadContractsParameters {
    /// Read `contracts` with `allow_failure` enabled.
    #[must_use]
    pub const fn new(contracts: Vec<ContractCall>) -> Self {
        Self {
            contracts,
            allow_failure: true,
        }
    }

    /// Abort on the first failure.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.allow_failure = false;
        self
    }
}

/// Routes reads to per-chain transports.
#[derive(Debug, Clone)]
pub struct ReadRouter {
    chains: Arc<[Chain]>,
    transports: HashMap<u64, Arc<dyn ReadProvider>>,
}

impl ReadRouter {
    /// Create a router over `chains` with one transport per chain id.
    #[must_use]
    pub const fn new(chains: Arc<[Chain]>, transports: HashMap<u64, Arc<dyn ReadProvider>>) -> Self {
        Self { chains, transports }
    }

    /// Configured chains.
    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Transport of a chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainNotConfigured`] if the chain has no transport.
    pub fn transport(&self, chain_id: u64) -> Result<&Arc<dyn ReadProvider>> {
        self.transports
            .get(&chain_id)
            .ok_or(Error::ChainNotConfigured { chain_id })
    }

    /// Multicall3 address of a chain, if the chain is configured with one.
    #[must_use]
    pub fn multicall_address(&self, chain_id: u64) -> Option<Address> {
        find_chain(&self.chains, chain_id).and_then(|c| c.contracts.multicall3)
    }
}
