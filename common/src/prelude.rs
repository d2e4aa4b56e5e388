// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

pub use crate::allocations::{monitor::indexer_allocations, Allocation, AllocationStatus};
pub use crate::cost_model::CostModelSource;
pub use crate::error::{CoreError, CoreResult};
pub use crate::indexing_rule::{DecisionBasis, IdentifierType, IndexingRule};
pub use crate::protocol_network::ProtocolNetwork;
pub use crate::subgraph_client::{DeploymentDetails, SubgraphClient};
