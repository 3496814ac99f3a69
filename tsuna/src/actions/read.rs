use alloy::dyn_abi::DynSolValue;

use crate::client::Client;
use crate::contracts::{ContractCall, ReadContractsParameters, ReadResult};
use crate::error::Result;

impl Client {
    /// Read one contract function on `call.chain_id`, else the default chain.
    ///
    /// # Errors
    ///
    /// See [`ReadRouter::read_contract`](crate::contracts::ReadRouter::read_contract).
    pub async fn read_contract(&self, call: &ContractCall) -> Result<Vec<DynSolValue>> {
        let chain_id = call.chain_id.unwrap_or_else(|| self.get_chain_id());
        self.router().read_contract(call, chain_id).await
    }

    /// Read many contract functions, batched per chain with Multicall3.
    ///
    /// Requests without a chain use the default chain.
    ///
    /// # Errors
    ///
    /// See [`ReadRouter::read_contracts`](crate::contracts::ReadRouter::read_contracts).
    pub async fn read_contracts(&self, params: ReadContractsParameters) -> Result<Vec<ReadResult>> {
        let chain_id = self.get_chain_id();
        self.router().read_contracts(params, chain_id).await
    }

    /// Execute `calls` as one Multicall3 batch on `chain_id`, else the default
    /// chain.
    ///
    /// # Errors
    ///
    /// See [`ReadRouter::multicall`](crate::contracts::ReadRouter::multicall).
    pub async fn multicall(
        &self,
        calls: &[&ContractCall],
        chain_id: Option<u64>,
    ) -> Result<Vec<Result<Vec<DynSolValue>>>> {
        let chain_id = chain_id.unwrap_or_else(|| self.get_chain_id());
        self.router().multicall(chain_id, calls).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::{Address, U256, address};

    use super::*;
    use crate::chain::Chain;
    use crate::contracts::MockReadProvider;
    use crate::contracts::test_support::erc20_abi;

    const TOKEN: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");

    #[tokio::test]
    async fn test_reads_follow_default_chain() {
        let mainnet = Arc::new(MockReadProvider::new());
        let optimism = Arc::new(MockReadProvider::new());
        let client = Client::builder()
            .chains([Chain::mainnet(), Chain::optimism()])
            .read_provider(1, Arc::<MockReadProvider>::clone(&mainnet))
            .read_provider(10, Arc::<MockReadProvider>::clone(&optimism))
            .without_persistence()
            .build()
            .unwrap();
        let call = ContractCall::new(erc20_abi(), TOKEN, "decimals");
        mainnet.respond(&call, &[DynSolValue::Uint(U256::from(18), 8)]).unwrap();
        optimism.respond(&call, &[DynSolValue::Uint(U256::from(6), 8)]).unwrap();

        assert_eq!(
            client.read_contract(&call).await.unwrap(),
            vec![DynSolValue::Uint(U256::from(18), 8)]
        );
        client.switch_chain(10, None).await.unwrap();
        assert_eq!(
            client.read_contract(&call).await.unwrap(),
            vec![DynSolValue::Uint(U256::from(6), 8)]
        );

        let results = client
            .read_contracts(ReadContractsParameters::new(vec![call.clone(), call.clone().on_chain(1)]))
            .await
            .unwrap();
        assert_eq!(results[0], Ok(Some(vec![DynSolValue::Uint(U256::from(6), 8)])));
        assert_eq!(results[1], Ok(Some(vec![DynSolValue::Uint(U256::from(18), 8)])));

        let batch = client.multicall(&[&call], Some(1)).await.unwrap();
        assert_eq!(batch.len(), 1);
    }
}
