// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

mod config;
mod scalar_receipt_header;
mod service;

pub use config::{
    DatabaseConfig, GraphNetworkConfig, GraphNodeConfig, IndexerConfig, IndexerServiceConfig,
    NetworkSubgraphConfig, ServerConfig,
};
pub use scalar_receipt_header::ScalarReceipt;
pub use service::{
    IndexerService, IndexerServiceError, IndexerServiceImpl, IndexerServiceOptions,
    IndexerServiceRelease, IsAttestable,
};
