// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The Action Queue's domain types (§3, §4.E).

use async_graphql::Enum;
use bigdecimal::BigDecimal;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Enum, ValueEnum)]
#[sqlx(type_name = "action_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Allocate,
    Unallocate,
    Reallocate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Enum, ValueEnum)]
#[sqlx(type_name = "action_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Queued,
    Approved,
    Pending,
    Success,
    Failed,
    Canceled,
}

impl ActionStatus {
    /// Whether `self -> next` is an edge in the Action Queue's state
    /// machine graph (§4.E).
    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        use ActionStatus::*;
        matches!(
            (self, next),
            (Queued, Approved)
                | (Queued, Canceled)
                | (Approved, Pending)
                | (Approved, Canceled)
                | (Pending, Success)
                | (Pending, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Success | ActionStatus::Failed | ActionStatus::Canceled)
    }
}

/// A queued protocol state-changing intent.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Action {
    pub id: i64,
    #[sqlx(rename = "type")]
    pub action_type: ActionType,
    pub deployment_id: String,
    pub allocation_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub poi: Option<String>,
    pub force: bool,
    pub source: String,
    pub reason: String,
    pub priority: i32,
    pub protocol_network: String,
    pub status: ActionStatus,
    pub transaction: Option<String>,
    pub failure_reason: Option<String>,
    pub updated_at: chrono::NaiveDateTime,
}

/// What a caller proposes to queue; validated and normalized by `db::queue`.
#[derive(Clone, Debug, Deserialize)]
pub struct ActionInput {
    pub action_type: ActionType,
    pub deployment_id: String,
    pub allocation_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub poi: Option<String>,
    pub force: bool,
    pub source: String,
    pub reason: String,
    pub priority: i32,
    pub protocol_network: String,
}

/// Patch fields allowed by `db::update`; `None` leaves a field untouched.
/// Also the GraphQL input for the `updateActions` mutation — every
/// field here is already GraphQL-representable, so this is the input
/// type directly rather than a parallel one.
#[derive(Clone, Debug, Default, Deserialize, async_graphql::InputObject)]
pub struct ActionPatch {
    pub priority: Option<i32>,
    pub status: Option<ActionStatus>,
    pub transaction: Option<String>,
    pub failure_reason: Option<String>,
}

/// Also the GraphQL input for `actions`/`updateActions`, for the same
/// reason as `ActionPatch`.
#[derive(Clone, Debug, Default, Deserialize, async_graphql::InputObject)]
pub struct ActionFilter {
    pub id: Option<i64>,
    pub status: Option<ActionStatus>,
    pub source: Option<String>,
    pub deployment_id: Option<String>,
    pub protocol_network: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// The closed set of fields `list` may sort by (§4.E: "`orderBy` is
/// validated against a closed enum").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum OrderBy {
    Id,
    Priority,
    UpdatedAt,
}

impl OrderBy {
    pub fn column(self) -> &'static str {
        match self {
            OrderBy::Id => "id",
            OrderBy::Priority => "priority",
            OrderBy::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Enum, ValueEnum)]
#[sqlx(type_name = "identifier_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    Deployment,
    Group,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Enum, ValueEnum)]
#[sqlx(type_name = "decision_basis", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DecisionBasis {
    Rules,
    Always,
    Never,
    Offchain,
}

/// Read-only decision inputs the Allocation Manager consults but never
/// owns the lifecycle of (§3: "IndexingRule ... out-of-scope here except
/// that the core consumes a read-only view").
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexingRule {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub allocation_amount: Option<BigDecimal>,
    pub allocation_lifetime: Option<i64>,
    pub auto_renewal: bool,
    pub decision_basis: DecisionBasis,
    pub protocol_network: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CostModel {
    pub deployment: String,
    pub model: Option<String>,
    pub variables: Option<serde_json::Value>,
    pub protocol_network: String,
}

/// The outcome of `AllocationManager::stake_usage_summary` (§4.F).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeUsageSummary {
    pub allocates: BigDecimal,
    pub unallocates: BigDecimal,
    pub rewards: BigDecimal,
    pub balance: BigDecimal,
}
