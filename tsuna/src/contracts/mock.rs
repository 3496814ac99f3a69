//! Deterministic read transport for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy::dyn_abi::{DynSolValue, FunctionExt};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use parking_lot::RwLock;

use super::multicall::{decode_aggregate_calldata, encode_aggregate_result};
use super::{ContractCall, ReadProvider};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Canned {
    Return(Bytes),
    Revert(String),
}

/// A [`ReadProvider`] answering from canned responses.
///
/// Responses are keyed by `(address, calldata)`. Multicall3 `aggregate`
/// calls are unpacked and answered from the same table, reverting as a whole
/// if any inner call reverts or is unknown, like the real aggregator.
#[derive(Debug, Default)]
pub struct MockReadProvider {
    responses: RwLock<HashMap<(Address, Bytes), Canned>>,
    fail_batches: AtomicBool,
    calls: AtomicUsize,
    batches: AtomicUsize,
}

impl MockReadProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer raw calldata sent to `address` with raw return data.
    pub fn respond_raw(&self, address: Address, calldata: Bytes, result: Bytes) {
        self.responses
            .write()
            .insert((address, calldata), Canned::Return(result));
    }

    /// Answer `call` with ABI-encoded `values`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Abi`] if the call or the values do not match the ABI.
    pub fn respond(&self, call: &ContractCall, values: &[DynSolValue]) -> Result<()> {
        let output = call
            .function()?
            .abi_encode_output(values)
            .map_err(|e| Error::abi(format!("failed to encode mock output: {e}")))?;
        self.respond_raw(call.address, call.calldata()?, Bytes::from(output));
        Ok(())
    }

    /// Make `call` revert with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Abi`] if the call cannot be encoded.
    pub fn revert(&self, call: &ContractCall, message: impl Into<String>) -> Result<()> {
        self.responses.write().insert(
            (call.address, call.calldata()?),
            Canned::Revert(message.into()),
        );
        Ok(())
    }

    /// Make every `aggregate` batch fail at the transport level.
    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    /// Number of `call` invocations, batches included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `aggregate` batches received.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn lookup(&self, to: Address, data: &Bytes) -> Result<Bytes> {
        match self.responses.read().get(&(to, data.clone())) {
            Some(Canned::Return(bytes)) => Ok(bytes.clone()),
            Some(Canned::Revert(message)) => {
                Err(Error::transport(format!("execution reverted: {message}")))
            }
            None => Err(Error::transport("execution reverted")),
        }
    }
}

#[async_trait]
impl ReadProvider for MockReadProvider {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(inner) = decode_aggregate_calldata(&data) else {
            return self.lookup(to, &data);
        };

        self.batches.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(Error::transport("multicall batch rejected"));
        }
        let return_data = inner
            .iter()
            .map(|(target, calldata)| self.lookup(*target, calldata))
            .collect::<Result<Vec<_>>>()?;
        Ok(encode_aggregate_result(1, return_data))
    }
}
