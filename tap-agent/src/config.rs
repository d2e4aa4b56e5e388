// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::PathBuf;

use alloy_primitives::Address;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[clap(
    name = "indexer-tap-agent",
    about = "Query-fee receipt aggregation and RAV redemption for the indexing marketplace"
)]
struct Args {
    #[arg(long, value_name = "FILE", env = "TAP_AGENT_CONFIG")]
    config: PathBuf,
}

/// The merged runtime configuration. Named `Cli` (rather than `Config`)
/// to match the rest of this workspace's convention of a single static
/// parsed once at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct Cli {
    pub ethereum: Ethereum,
    pub receipts: Receipts,
    pub tap: Tap,
    pub database: Database,
    pub network_subgraph: NetworkSubgraph,
}

impl Cli {
    pub fn args() -> Self {
        let args = Args::parse();
        let raw = std::fs::read_to_string(&args.config)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", args.config.display()));
        serde_yaml::from_str(&raw).expect("failed to parse tap-agent config file")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ethereum {
    pub indexer_address: Address,
}

/// The EIP-712 domain receipts and RAVs are signed under (§4.C).
#[derive(Clone, Debug, Deserialize)]
pub struct Receipts {
    pub receipts_verifier_chain_id: u64,
    pub receipts_verifier_address: Address,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tap {
    /// Sum of unaggregated receipt value for a sender that triggers a
    /// RAV request (§4.D step 1, branch a).
    pub rav_request_trigger_value: u128,
    pub rav_request_timeout_secs: u64,
    /// How long after closing an allocation is still eligible for a
    /// final RAV request (§4.D step 1, branch b).
    pub rav_request_poll_interval_secs: u64,
    /// How often the Redeem step (§4.D step 4) polls for ready RAVs.
    pub redemption_poll_interval_secs: u64,
    pub sender_aggregator_endpoints: HashMap<Address, String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    pub postgres_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NetworkSubgraph {
    pub query_url: String,
    pub syncing_interval_secs: u64,
    pub recently_closed_allocation_buffer_secs: u64,
    pub protocol_network: String,
}
