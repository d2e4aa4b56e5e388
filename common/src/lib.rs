// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

pub mod allocations;
pub mod cost_model;
pub mod error;
pub mod indexer_service;
pub mod indexing_rule;
pub mod prelude;
pub mod protocol_network;
pub mod subgraph_client;

#[cfg(test)]
pub mod test_vectors;
