// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy_primitives::{Address, B256};
use eventuals::{timer, Eventual, EventualExt};
use graphql_client::GraphQLQuery;
use thegraph::types::DeploymentId;
use tokio::time::sleep;
use tracing::warn;

use crate::prelude::SubgraphClient;
use crate::protocol_network::ProtocolNetwork;

use super::{Allocation, AllocationStatus};

type BigInt = String;
type Bytes = String;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "../graphql/network.schema.graphql",
    query_path = "../graphql/allocations.query.graphql",
    response_derives = "Debug",
    variables_derives = "Clone"
)]
pub struct AllocationsQuery;

/// Converts a network-subgraph allocation fragment into our domain type.
///
/// `protocol_network` and `indexer` aren't part of the fragment (the
/// query is already scoped to both), so the caller stamps them on.
fn to_allocation(
    value: allocations_query::AllocationFragment,
    indexer: Address,
    protocol_network: ProtocolNetwork,
) -> Allocation {
    Allocation {
        id: Address::from_str(&value.id).expect("network subgraph returns well-formed addresses"),
        deployment: DeploymentId::from_str(&value.subgraph_deployment.id)
            .expect("network subgraph returns well-formed deployment ids"),
        indexer,
        allocated_tokens: value
            .allocated_tokens
            .parse()
            .expect("network subgraph returns well-formed BigInt strings"),
        created_at_epoch: value.created_at_epoch as u64,
        closed_at_epoch: value.closed_at_epoch.map(|e| e as u64),
        status: if value.closed_at_epoch.is_some() {
            AllocationStatus::Closed
        } else {
            AllocationStatus::Active
        },
        protocol_network,
        poi: value
            .poi
            .map(|p| B256::from_str(&p).expect("network subgraph returns well-formed bytes32")),
    }
}

/// An always up-to-date list of an indexer's active and recently closed allocations.
pub fn indexer_allocations(
    network_subgraph: &'static SubgraphClient,
    indexer_address: Address,
    protocol_network: ProtocolNetwork,
    interval: Duration,
    recently_closed_allocation_buffer: Duration,
) -> Eventual<HashMap<Address, Allocation>> {
    // Refresh indexer allocations every now and then
    timer(interval).map_with_retry(
        move |_| {
            let protocol_network = protocol_network.clone();
            async move {
                // Allocations are eligible even if closed for up to `recently_closed_allocation_buffer`
                let start = SystemTime::now();
                let since_the_epoch = start
                    .duration_since(UNIX_EPOCH)
                    .expect("Time went backwards");
                let closed_at_threshold = since_the_epoch - recently_closed_allocation_buffer;

                // Query active and recently closed allocations for the indexer,
                // using the network subgraph
                let response = network_subgraph
                    .query::<AllocationsQuery>(allocations_query::Variables {
                        indexer: format!("{indexer_address:?}"),
                        closed_at_threshold: closed_at_threshold.as_secs() as i64,
                    })
                    .await
                    .map_err(|e| e.to_string())?;

                let indexer = response.map_err(|e| e.to_string()).and_then(|data| {
                    // Verify that the indexer could be found at all
                    data.indexer
                        .ok_or_else(|| format!("Indexer `{indexer_address}` not found on the network"))
                })?;

                // Pull active and recently closed allocations out of the indexer
                let allocations_query::AllocationsQueryIndexer {
                    active_allocations,
                    recently_closed_allocations,
                } = indexer;

                Ok(HashMap::from_iter(
                    active_allocations
                        .into_iter()
                        .chain(recently_closed_allocations)
                        .map(|a| {
                            let allocation =
                                to_allocation(a, indexer_address, protocol_network.clone());
                            (allocation.id, allocation)
                        }),
                ))
            }
        },
        // Need to use string errors here because eventuals `map_with_retry` retries
        // errors that can be cloned
        move |err: String| {
            warn!(
                "Failed to fetch active or recently closed allocations for indexer {:?}: {}",
                indexer_address, err
            );

            // Sleep for a bit before we retry
            sleep(interval.div_f32(2.0))
        },
    )
}

#[cfg(test)]
mod test {
    use std::str::FromStr as _;

    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{prelude::SubgraphClient, subgraph_client::DeploymentDetails};

    use super::*;

    const NETWORK_SUBGRAPH_DEPLOYMENT: &str = "QmUAcGGfLWJgTTo23zaXnasqxq8FS6zZjdm2tvS6GH3uM5";

    const ALLOCATIONS_QUERY_RESPONSE: &str = r#"{
        "data": {
            "indexer": {
                "activeAllocations": [
                    {
                        "id": "0x1111111111111111111111111111111111111111",
                        "allocatedTokens": "1000000000000000000",
                        "createdAtEpoch": 100,
                        "closedAtEpoch": null,
                        "poi": null,
                        "subgraphDeployment": { "id": "0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddead" }
                    }
                ],
                "recentlyClosedAllocations": []
            }
        }
    }"#;

    async fn setup_mock_network_subgraph() -> (&'static SubgraphClient, MockServer) {
        let mock_server = MockServer::start().await;
        let network_subgraph = SubgraphClient::new(
            reqwest::Client::new(),
            None,
            DeploymentDetails::for_query_url(&format!(
                "{}/subgraphs/id/{}",
                &mock_server.uri(),
                NETWORK_SUBGRAPH_DEPLOYMENT
            ))
            .unwrap(),
        );

        mock_server
            .register(
                Mock::given(method("POST"))
                    .and(path(format!(
                        "/subgraphs/id/{}",
                        NETWORK_SUBGRAPH_DEPLOYMENT
                    )))
                    .and(body_string_contains("activeAllocations"))
                    .respond_with(
                        ResponseTemplate::new(200)
                            .set_body_raw(ALLOCATIONS_QUERY_RESPONSE, "application/json"),
                    ),
            )
            .await;

        (Box::leak(Box::new(network_subgraph)), mock_server)
    }

    #[test_log::test(tokio::test)]
    async fn test_parses_allocation_data_from_network_subgraph_correctly() {
        let (network_subgraph, _mock_server) = setup_mock_network_subgraph().await;
        let indexer_address =
            Address::from_str("0x2222222222222222222222222222222222222222").unwrap();

        let allocations = indexer_allocations(
            network_subgraph,
            indexer_address,
            ProtocolNetwork::from_str("mainnet").unwrap(),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );

        let allocations = allocations.value().await.unwrap();
        assert_eq!(allocations.len(), 1);
        let allocation = allocations
            .get(&Address::from_str("0x1111111111111111111111111111111111111111").unwrap())
            .unwrap();
        assert_eq!(allocation.allocated_tokens, 1_000_000_000_000_000_000);
        assert_eq!(allocation.status, AllocationStatus::Active);
    }
}
