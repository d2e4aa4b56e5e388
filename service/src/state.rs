// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use indexer_common::protocol_network::ProtocolNetwork;
use indexer_tap::receipt_store::ReceiptStore;
use sqlx::PgPool;

use crate::routes::cost::CostSchema;

/// Shared state for the HTTP surface: the receipt store (component A)
/// and the database handle cost-model queries and GraphQL resolution
/// read from directly.
pub struct ServiceState {
    pub database: PgPool,
    pub receipt_store: Arc<ReceiptStore>,
    pub cost_schema: CostSchema,
    pub graph_node_query_base_url: String,
    pub http_client: reqwest::Client,
    pub protocol_network: ProtocolNetwork,
}
