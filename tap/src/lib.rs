// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Query-fee receipt ingress, the write-behind Receipt Store, allocation
//! fee summaries, and the `tap_core` adapter glue shared between
//! `indexer-service` and `indexer-tap-agent`.

pub mod allocation_summary;
pub mod context;
pub mod domain;
pub mod receipt_store;
pub mod signer_registry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
