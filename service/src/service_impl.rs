// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Wires the generic HTTP ingress in `indexer_common::indexer_service`
//! to component A (the Receipt Store) and proxies the query body to
//! graph-node, which is the only part of query execution this core
//! touches.

use std::sync::Arc;

use async_trait::async_trait;
use indexer_common::indexer_service::http::{IndexerServiceError, IndexerServiceImpl};
use indexer_common::error::CoreError;
use thegraph::types::DeploymentId;

use crate::state::ServiceState;

pub struct SubgraphService {
    state: Arc<ServiceState>,
}

impl SubgraphService {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl IndexerServiceImpl for SubgraphService {
    async fn process_request(
        &self,
        deployment: DeploymentId,
        receipt: Option<String>,
        query_body: String,
    ) -> Result<String, IndexerServiceError> {
        let Some(receipt_bytes) = receipt else {
            return Err(IndexerServiceError::MissingReceipt);
        };

        self.state
            .receipt_store
            .add(&receipt_bytes, &self.state.protocol_network)
            .map_err(|e| match e {
                CoreError::Schema(reason) => IndexerServiceError::Schema(reason),
                CoreError::Auth(reason) => IndexerServiceError::InvalidReceipt(reason),
                other => IndexerServiceError::Backend(other.into()),
            })?;

        let url = format!(
            "{}/subgraphs/id/{}",
            self.state.graph_node_query_base_url, deployment
        );
        let response = self
            .state
            .http_client
            .post(url)
            .header("content-type", "application/json")
            .body(query_body)
            .send()
            .await
            .map_err(|e| IndexerServiceError::Backend(e.into()))?;

        response
            .text()
            .await
            .map_err(|e| IndexerServiceError::Backend(e.into()))
    }
}

#[cfg(test)]
mod test {
    // Integration coverage for the full receipt-then-proxy path lives in
    // tests/service.rs, which spins up a wiremock graph-node stand-in.
}
