use alloy::dyn_abi::DynSolValue;
use tracing::debug;

use super::{ContractCall, ReadRouter};
use crate::error::Result;

impl ReadRouter {
    /// Execute one call with a plain `eth_call` on `chain_id`.
    ///
    /// # Errors
    ///
    /// - [`ChainNotConfigured`](crate::Error::ChainNotConfigured) if the chain
    ///   has no transport.
    /// - [`ContractMethodReverted`](crate::Error::ContractMethodReverted) if
    ///   the RPC call fails.
    /// - [`ContractMethodNoResult`](crate::Error::ContractMethodNoResult) or
    ///   [`ContractResultDecode`](crate::Error::ContractResultDecode) if the
    ///   result cannot be decoded.
    pub async fn read_contract(&self, call: &ContractCall, chain_id: u64) -> Result<Vec<DynSolValue>> {
        let transport = self.transport(chain_id)?;
        let data = call.calldata()?;
        debug!(
            chain_id,
            address = %call.address,
            function = %call.function_name,
            "Contract read"
        );
        let raw = transport
            .call(call.address, data)
            .await
            .map_err(|e| call.reverted(chain_id, e.to_string()))?;
        call.decode(&raw, chain_id)
    }
}
