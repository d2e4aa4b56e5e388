// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

mod config;
mod database;
mod routes;
mod service_impl;
mod state;

use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use indexer_common::indexer_service::http::{
    IndexerService, IndexerServiceOptions, IndexerServiceRelease,
};
use indexer_common::protocol_network::ProtocolNetwork;
use indexer_tap::receipt_store::ReceiptStore;
use indexer_tap::signer_registry::SignerRegistry;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::routes::cost::build_schema;
use crate::service_impl::SubgraphService;
use crate::state::ServiceState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = config::Cli::parse();
    let config = cli.load_config()?;

    let database = sqlx::postgres::PgPoolOptions::new()
        .max_connections(50)
        .connect(&config.database.postgres_url)
        .await?;
    sqlx::migrate!("../migrations").run(&database).await?;

    let signer_registry = SignerRegistry::new(config.indexer.accepted_signers.clone());
    let receipt_store = Arc::new(ReceiptStore::new(database.clone(), signer_registry));

    let shutdown = CancellationToken::new();
    {
        let receipt_store = receipt_store.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            receipt_store.flush_loop(shutdown).await;
        });
    }

    let protocol_network = ProtocolNetwork::from_str(&config.graph_network.id.to_string())?;

    let state = Arc::new(ServiceState {
        database: database.clone(),
        receipt_store,
        cost_schema: build_schema(),
        graph_node_query_base_url: config.graph_node.query_base_url.clone(),
        http_client: reqwest::Client::new(),
        protocol_network,
    });

    let options = IndexerServiceOptions {
        release: IndexerServiceRelease {
            version: env!("CARGO_PKG_VERSION").to_string(),
            dependencies: vec![],
        },
        url_prefix: config.server.url_prefix.clone(),
        free_query_auth_token: config.server.free_query_auth_token.clone(),
    };

    let service = IndexerService::new(options, SubgraphService::new(state));
    service.run(&config.server).await
}
