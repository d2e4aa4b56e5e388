// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! A read-only view onto indexing-rule decision inputs. Rule *evaluation*
//! (the allocation decision engine) is out of scope; the allocation
//! manager only needs to read a rule's shape when validating an action
//! batch (e.g. whether an allocation's lifetime has been reached).

use serde::{Deserialize, Serialize};

use crate::protocol_network::ProtocolNetwork;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    Deployment,
    Group,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionBasis {
    Rules,
    Always,
    Never,
    Offchain,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexingRule {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub allocation_amount: Option<u128>,
    pub allocation_lifetime: Option<u64>,
    pub auto_renewal: bool,
    pub decision_basis: DecisionBasis,
    pub protocol_network: ProtocolNetwork,
}
