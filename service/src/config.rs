// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;
use indexer_common::indexer_service::http::IndexerServiceConfig;

#[derive(Debug, Parser)]
#[clap(
    name = "indexer-service",
    about = "Receipt-gated query ingress for The Graph's indexing marketplace"
)]
pub struct Cli {
    #[clap(long, value_name = "FILE", env = "INDEXER_SERVICE_CONFIG")]
    pub config: PathBuf,
}

impl Cli {
    pub fn load_config(&self) -> anyhow::Result<IndexerServiceConfig> {
        let raw = std::fs::read_to_string(&self.config)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}
