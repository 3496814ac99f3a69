//! Multi-chain batch reads.

use alloy::dyn_abi::DynSolValue;
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{ContractCall, ReadContractsParameters, ReadResult, ReadRouter};
use crate::error::{Error, Result};

/// What happened to one chain partition.
enum Partition {
    /// The partition could not be read at all.
    Failed { indices: Vec<usize>, error: Error },
    /// Per-request outcomes, by original index.
    Read(Vec<(usize, Result<Vec<DynSolValue>>)>),
}

impl ReadRouter {
    /// Read many contracts across chains.
    ///
    /// Requests are partitioned by chain (`chain_id`, else
    /// `default_chain_id`) and each partition is sent as one Multicall3
    /// batch; partitions run concurrently. If a batch fails for any reason
    /// other than a missing aggregator, its requests are retried as
    /// individual calls.
    ///
    /// The output has the input's length and order. With `allow_failure`,
    /// a failed request yields `Ok(None)`, while every request on a chain
    /// without an aggregator yields
    /// `Err(`[`ChainDoesNotSupportMulticall`](Error::ChainDoesNotSupportMulticall)`)`.
    ///
    /// # Errors
    ///
    /// Without `allow_failure`, the first failure in input order.
    pub async fn read_contracts(
        &self,
        params: ReadContractsParameters,
        default_chain_id: u64,
    ) -> Result<Vec<ReadResult>> {
        let ReadContractsParameters {
            contracts,
            allow_failure,
        } = params;

        let mut partitions: IndexMap<u64, Vec<usize>> = IndexMap::new();
        for (index, call) in contracts.iter().enumerate() {
            partitions
                .entry(call.chain_id.unwrap_or(default_chain_id))
                .or_default()
                .push(index);
        }
        debug!(
            requests = contracts.len(),
            chains = partitions.len(),
            allow_failure,
            "Reading contracts"
        );

        let outcomes = join_all(
            partitions
                .into_iter()
                .map(|(chain_id, indices)| self.read_partition(chain_id, indices, &contracts)),
        )
        .await;

        let mut results: Vec<ReadResult> = contracts.iter().map(|_| Ok(None)).collect();
        for outcome in outcomes {
            match outcome {
                Partition::Failed { indices, error } => {
                    if allow_failure {
                        warn!(error = %error, requests = indices.len(), "Chain partition failed");
                    }
                    for index in indices {
                        results[index] = Err(error.clone());
                    }
                }
                Partition::Read(pairs) => {
                    for (index, outcome) in pairs {
                        results[index] = match outcome {
                            Ok(values) => Ok(Some(values)),
                            Err(error) if allow_failure => {
                                warn!(error = %error, index, "Contract read failed");
                                Ok(None)
                            }
                            Err(error) => Err(error),
                        };
                    }
                }
            }
        }

        if !allow_failure && let Some(Err(error)) = results.iter().find(|r| r.is_err()) {
            return Err(error.clone());
        }
        Ok(results)
    }

    async fn read_partition(
        &self,
        chain_id: u64,
        indices: Vec<usize>,
        contracts: &[ContractCall],
    ) -> Partition {
        let calls: Vec<&ContractCall> = indices.iter().map(|&i| &contracts[i]).collect();
        match self.multicall(chain_id, &calls).await {
            Ok(results) => Partition::Read(indices.into_iter().zip(results).collect()),
            Err(
                error @ (Error::ChainDoesNotSupportMulticall { .. }
                | Error::ChainNotConfigured { .. }),
            ) => Partition::Failed { indices, error },
            Err(error) => {
                warn!(
                    chain_id,
                    error = %error,
                    "Multicall failed, falling back to individual calls"
                );
                let results =
                    join_all(calls.iter().map(|call| self.read_contract(call, chain_id))).await;
                Partition::Read(indices.into_iter().zip(results).collect())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use alloy::primitives::{Address, U256, address};

    use super::*;
    use crate::chain::Chain;
    use crate::contracts::test_support::erc20_abi;
    use crate::contracts::{MockReadProvider, ReadProvider};

    const DAI: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");
    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    fn chains() -> Vec<Chain> {
        vec![
            Chain::mainnet(),
            Chain::optimism(),
            Chain::new(999, "No Multicall"),
        ]
    }

    fn router(mock: &Arc<MockReadProvider>) -> ReadRouter {
        let transport: Arc<dyn ReadProvider> = Arc::<MockReadProvider>::clone(mock);
        let transports = chains()
            .iter()
            .map(|c| (c.id, Arc::clone(&transport)))
            .collect::<HashMap<_, _>>();
        ReadRouter::new(Arc::from(chains()), transports)
    }

    /// One transport per chain, so identical calls can differ by chain.
    fn router_per_chain(mocks: &[(u64, &Arc<MockReadProvider>)]) -> ReadRouter {
        let transports = mocks
            .iter()
            .map(|(chain_id, mock)| {
                let transport: Arc<dyn ReadProvider> = Arc::<MockReadProvider>::clone(mock);
                (*chain_id, transport)
            })
            .collect::<HashMap<_, _>>();
        ReadRouter::new(Arc::from(chains()), transports)
    }

    fn decimals(address: Address) -> ContractCall {
        ContractCall::new(erc20_abi(), address, "decimals")
    }

    fn uint8(n: u64) -> Vec<DynSolValue> {
        vec![DynSolValue::Uint(U256::from(n), 8)]
    }

    #[tokio::test]
    async fn test_preserves_input_order_across_chains() {
        let mainnet = Arc::new(MockReadProvider::new());
        let optimism = Arc::new(MockReadProvider::new());
        let a = decimals(DAI);
        let b = decimals(USDC).on_chain(10);
        let c = decimals(USDC);
        mainnet.respond(&a, &uint8(18)).unwrap();
        optimism.respond(&b, &uint8(6)).unwrap();

        let results = router_per_chain(&[(1, &mainnet), (10, &optimism)])
            .read_contracts(ReadContractsParameters::new(vec![a, b, c.clone(), c]), 1)
            .await
            .unwrap();

        // USDC is only known on optimism, so the mainnet batch falls back.
        assert_eq!(results.len(), 4);
        assert_eq!(results[0], Ok(Some(uint8(18))));
        assert_eq!(results[1], Ok(Some(uint8(6))));
        assert_eq!(results[2], Ok(None));
        assert_eq!(results[3], Ok(None));
        assert_eq!(mainnet.batch_count(), 1);
        assert_eq!(optimism.batch_count(), 1);
        // One batch plus three individual calls after the fallback.
        assert_eq!(mainnet.call_count(), 4);
    }

    #[tokio::test]
    async fn test_unsupported_chain_is_reported_per_request() {
        let mock = Arc::new(MockReadProvider::new());
        let ok = decimals(DAI);
        mock.respond(&ok, &uint8(18)).unwrap();

        let results = router(&mock)
            .read_contracts(
                ReadContractsParameters::new(vec![
                    ok,
                    decimals(DAI).on_chain(999),
                    decimals(USDC).on_chain(999),
                ]),
                1,
            )
            .await
            .unwrap();

        let unsupported = Err(Error::ChainDoesNotSupportMulticall { chain_id: 999 });
        assert_eq!(results[0], Ok(Some(uint8(18))));
        assert_eq!(results[1], unsupported);
        assert_eq!(results[2], unsupported);
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_on_unsupported_chain() {
        let mock = Arc::new(MockReadProvider::new());
        let ok = decimals(DAI);
        mock.respond(&ok, &uint8(18)).unwrap();

        let result = router(&mock)
            .read_contracts(
                ReadContractsParameters::new(vec![ok, decimals(DAI).on_chain(999)]).strict(),
                1,
            )
            .await;
        assert_eq!(
            result.err(),
            Some(Error::ChainDoesNotSupportMulticall { chain_id: 999 })
        );
    }

    #[tokio::test]
    async fn test_strict_mode_returns_first_call_failure() {
        let mock = Arc::new(MockReadProvider::new());
        let ok = decimals(DAI);
        let bad = decimals(USDC);
        mock.respond(&ok, &uint8(18)).unwrap();
        mock.revert(&bad, "paused").unwrap();

        let result = router(&mock)
            .read_contracts(ReadContractsParameters::new(vec![ok, bad]).strict(), 1)
            .await;
        assert!(matches!(
            result,
            Err(Error::ContractMethodReverted { address, .. }) if address == USDC
        ));
    }

    #[tokio::test]
    async fn test_batch_transport_failure_falls_back() {
        let mock = Arc::new(MockReadProvider::new());
        mock.fail_batches(true);
        let a = decimals(DAI);
        let b = decimals(USDC);
        mock.respond(&a, &uint8(18)).unwrap();
        mock.respond(&b, &uint8(6)).unwrap();

        let results = router(&mock)
            .read_contracts(ReadContractsParameters::new(vec![a, b]).strict(), 1)
            .await
            .unwrap();
        assert_eq!(results, vec![Ok(Some(uint8(18))), Ok(Some(uint8(6)))]);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_request_list() {
        let mock = Arc::new(MockReadProvider::new());
        let results = router(&mock)
            .read_contracts(ReadContractsParameters::new(Vec::new()), 1)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(mock.call_count(), 0);
    }
}
