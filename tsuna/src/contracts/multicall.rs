//! Multicall3 batching.
//!
//! All calls of one chain are packed into a single `aggregate` call.
//! `aggregate` reverts as a whole when any inner call reverts; the caller
//! falls back to individual calls in that case.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use tracing::debug;

use super::{ContractCall, ReadRouter};
use crate::error::{Error, Result};

mod abi {
    alloy::sol! {
        struct Call {
            address target;
            bytes callData;
        }

        function aggregate(Call[] calls) external payable returns (uint256 blockNumber, bytes[] returnData);
    }
}

/// Encode an `aggregate((address,bytes)[])` call.
#[must_use]
pub fn aggregate_calldata(calls: &[(Address, Bytes)]) -> Bytes {
    let calls = calls
        .iter()
        .map(|(target, data)| abi::Call {
            target: *target,
            callData: data.clone(),
        })
        .collect();
    Bytes::from(abi::aggregateCall { calls }.abi_encode())
}

/// Decode the `returnData` of an `aggregate` call.
///
/// # Errors
///
/// Returns [`Error::Abi`] if the data is not a valid `aggregate` result.
pub fn decode_aggregate(data: &[u8]) -> Result<Vec<Bytes>> {
    abi::aggregateCall::abi_decode_returns(data)
        .map(|ret| ret.returnData)
        .map_err(|e| Error::abi(format!("aggregate decode failed: {e}")))
}

/// Decode an `aggregate` call's arguments back into `(target, calldata)`
/// pairs.
pub(crate) fn decode_aggregate_calldata(data: &[u8]) -> Option<Vec<(Address, Bytes)>> {
    abi::aggregateCall::abi_decode(data)
        .ok()
        .map(|call| call.calls.into_iter().map(|c| (c.target, c.callData)).collect())
}

/// Encode an `aggregate` result.
pub(crate) fn encode_aggregate_result(block_number: u64, return_data: Vec<Bytes>) -> Bytes {
    Bytes::from(abi::aggregateCall::abi_encode_returns(&abi::aggregateReturn {
        blockNumber: alloy::primitives::U256::from(block_number),
        returnData: return_data,
    }))
}

impl ReadRouter {
    /// Execute `calls` on `chain_id` as one Multicall3 batch.
    ///
    /// The outer `Result` fails when the batch itself could not be executed
    /// (no aggregator, transport failure, an inner revert). Each inner
    /// `Result` carries the decoding outcome of one call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainDoesNotSupportMulticall`] if the chain has no
    /// aggregator, or the batch failure otherwise.
    pub async fn multicall(
        &self,
        chain_id: u64,
        calls: &[&ContractCall],
    ) -> Result<Vec<Result<Vec<DynSolValue>>>> {
        let aggregator = self
            .multicall_address(chain_id)
            .ok_or(Error::ChainDoesNotSupportMulticall { chain_id })?;
        let transport = self.transport(chain_id)?;

        let mut encoded = Vec::with_capacity(calls.len());
        for call in calls {
            encoded.push((call.address, call.calldata()?));
        }

        debug!(chain_id, calls = calls.len(), aggregator = %aggregator, "Multicall batch");
        let raw = transport
            .call(aggregator, aggregate_calldata(&encoded))
            .await?;
        let return_data = decode_aggregate(&raw)?;
        if return_data.len() != calls.len() {
            return Err(Error::abi(format!(
                "aggregate returned {} results for {} calls",
                return_data.len(),
                calls.len()
            )));
        }

        Ok(calls
            .iter()
            .zip(return_data)
            .map(|(call, data)| call.decode(&data, chain_id))
            .collect())
    }
}
