// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[clap(
    name = "indexer-agent",
    about = "Action Queue, Allocation Manager, and Management API for the indexing marketplace"
)]
struct Args {
    #[arg(long, value_name = "FILE", env = "INDEXER_AGENT_CONFIG")]
    config: PathBuf,
}

/// The merged runtime configuration, parsed once at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct Cli {
    pub database: Database,
    pub network_subgraph: NetworkSubgraph,
    pub server: Server,
    #[serde(default)]
    pub action_queue: ActionQueue,
}

impl Cli {
    pub fn args() -> Self {
        let args = Args::parse();
        let raw = std::fs::read_to_string(&args.config)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", args.config.display()));
        serde_yaml::from_str(&raw).expect("failed to parse indexer-agent config file")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    pub postgres_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NetworkSubgraph {
    pub protocol_network: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub port: u16,
}

/// A2's cool-off window: how long after an action reaches a terminal
/// status (Success, Failed, Canceled) its (deployment, network) target
/// stays off-limits to a non-forced requeue. 60 seconds mirrors the
/// chain's typical block-confirmation cadence; `spec.md` §9 leaves the
/// exact value an open question, so it's configurable rather than fixed.
#[derive(Clone, Debug, Deserialize)]
pub struct ActionQueue {
    #[serde(default = "default_recently_executed_cooloff_secs")]
    pub recently_executed_cooloff_secs: i64,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self {
            recently_executed_cooloff_secs: default_recently_executed_cooloff_secs(),
        }
    }
}

fn default_recently_executed_cooloff_secs() -> i64 {
    60
}

impl ActionQueue {
    pub fn recently_executed_cooloff(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recently_executed_cooloff_secs)
    }
}
