// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

pub mod monitor;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use thegraph::types::DeploymentId;

use crate::protocol_network::ProtocolNetwork;

/// An indexer's stake commitment to a subgraph deployment over an epoch
/// range. Created by on-chain event ingestion; every other component in
/// this workspace treats it read-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Address,
    pub deployment: DeploymentId,
    pub indexer: Address,
    pub allocated_tokens: u128,
    pub created_at_epoch: u64,
    pub closed_at_epoch: Option<u64>,
    pub protocol_network: ProtocolNetwork,
    pub status: AllocationStatus,
    /// Proof-of-indexing submitted at close time, if any.
    pub poi: Option<B256>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    Active,
    Closed,
}

impl Allocation {
    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }
}
