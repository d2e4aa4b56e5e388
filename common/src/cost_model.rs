// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The cost-model shape shared between the indexer service (which reads
//! it to price queries) and the management API (which writes it). The
//! `$DAI` cost-model language itself is out of scope here; this is just
//! the storage shape and the `global` fallback key.

use serde::{Deserialize, Serialize};

/// The fallback identifier used when no deployment-specific cost model
/// has been set.
pub const GLOBAL_COST_MODEL_DEPLOYMENT: &str = "global";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CostModelSource {
    pub deployment_id: String,
    pub model: String,
    pub variables: String,
}
