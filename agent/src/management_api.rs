// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Component G: the Management API. A thin, typed layer over the Action
//! Queue (E) and Allocation Manager (F), plus CRUD for cost models and
//! indexing rules — the surface both the CLI (`main.rs`) and the
//! GraphQL schema (`graphql.rs`) delegate to, so both stay consistent
//! with each other.

use std::sync::Arc;

use chrono::Duration;
use indexer_common::error::CoreResult;
use sqlx::PgPool;

use crate::allocation_manager::{stake_usage_summary, validate_action_batch_feasibility};
use crate::db;
use crate::models::{
    Action, ActionFilter, ActionInput, ActionPatch, ActionStatus, CostModel, IndexingRule,
    OrderBy, OrderDirection, StakeUsageSummary,
};
use crate::protocol_collaborator::{AllocationStateFacts, ExecutionOutcome, ProtocolCollaborator};

#[derive(Clone)]
pub struct ManagementApi {
    pgpool: PgPool,
    collaborator: Arc<dyn ProtocolCollaborator>,
    action_cool_off: Duration,
}

impl ManagementApi {
    pub fn new(
        pgpool: PgPool,
        collaborator: Arc<dyn ProtocolCollaborator>,
        action_cool_off: Duration,
    ) -> Self {
        Self {
            pgpool,
            collaborator,
            action_cool_off,
        }
    }

    pub async fn queue_action(&self, input: ActionInput) -> CoreResult<Action> {
        db::queue(&self.pgpool, input, self.action_cool_off).await
    }

    /// Bulk status transitions (§4.E): every id must exist and accept
    /// the transition, or the whole call fails without updating any row.
    pub async fn approve_actions(&self, ids: &[i64]) -> CoreResult<Vec<Action>> {
        db::approve(&self.pgpool, ids).await
    }

    pub async fn cancel_actions(&self, ids: &[i64]) -> CoreResult<Vec<Action>> {
        db::cancel(&self.pgpool, ids).await
    }

    pub async fn delete_actions(&self, ids: &[i64]) -> CoreResult<()> {
        db::delete(&self.pgpool, ids).await
    }

    /// Mass mutation matching `filter` (§4.E `update(filter, patch)`).
    pub async fn update_actions(
        &self,
        filter: ActionFilter,
        patch: ActionPatch,
    ) -> CoreResult<Vec<Action>> {
        db::update(&self.pgpool, filter, patch).await
    }

    /// Convenience wrapper over `update_actions` for callers acting on a
    /// single known id (e.g. the CLI's per-action commands).
    async fn update_action(&self, id: i64, patch: ActionPatch) -> CoreResult<Action> {
        let updated = self
            .update_actions(
                ActionFilter {
                    id: Some(id),
                    ..Default::default()
                },
                patch,
            )
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| indexer_common::error::CoreError::not_found([id.to_string()]))
    }

    pub async fn get_action(&self, id: i64) -> CoreResult<Action> {
        db::get(&self.pgpool, id).await
    }

    pub async fn list_actions(
        &self,
        filter: ActionFilter,
        order_by: OrderBy,
        direction: OrderDirection,
    ) -> CoreResult<Vec<Action>> {
        db::list(&self.pgpool, filter, order_by, direction).await
    }

    /// Computes the stake impact of a single Approved action against
    /// live on-chain allocation state (§4.F).
    pub async fn stake_usage_summary(&self, id: i64) -> CoreResult<StakeUsageSummary> {
        let action = db::get(&self.pgpool, id).await?;
        let states = self.fetch_relevant_allocation_states(&[action.clone()]).await?;
        let facts = AllocationStateFacts::new(&states);
        Ok(stake_usage_summary(&action, &facts))
    }

    /// Approves every currently Queued action for `protocol_network`,
    /// reorders the resulting Approved batch for stake feasibility, and
    /// hands it to the `ProtocolCollaborator` for execution, recording
    /// each outcome as it comes back.
    pub async fn execute_approved_batch(
        &self,
        protocol_network: &str,
    ) -> CoreResult<Vec<Action>> {
        let approved = db::list(
            &self.pgpool,
            ActionFilter {
                status: Some(ActionStatus::Approved),
                protocol_network: Some(protocol_network.to_string()),
                ..Default::default()
            },
            OrderBy::Priority,
            OrderDirection::Desc,
        )
        .await?;

        if approved.is_empty() {
            return Ok(Vec::new());
        }

        let states = self.fetch_relevant_allocation_states(&approved).await?;
        let facts = AllocationStateFacts::new(&states);
        let ordered = validate_action_batch_feasibility(approved, &facts);

        for action in &ordered {
            db::transition(&self.pgpool, action.id, ActionStatus::Pending).await?;
        }

        let outcomes = self.collaborator.execute_batch(&ordered).await?;
        let mut results = Vec::with_capacity(ordered.len());
        for (action, outcome) in ordered.into_iter().zip(outcomes) {
            let updated = match outcome {
                ExecutionOutcome::Success { transaction } => {
                    self.update_action(
                        action.id,
                        ActionPatch {
                            status: Some(ActionStatus::Success),
                            transaction: Some(transaction),
                            ..Default::default()
                        },
                    )
                    .await?
                }
                ExecutionOutcome::Failed { reason } => {
                    self.update_action(
                        action.id,
                        ActionPatch {
                            status: Some(ActionStatus::Failed),
                            failure_reason: Some(reason),
                            ..Default::default()
                        },
                    )
                    .await?
                }
            };
            results.push(updated);
        }
        Ok(results)
    }

    async fn fetch_relevant_allocation_states(
        &self,
        actions: &[Action],
    ) -> CoreResult<Vec<crate::protocol_collaborator::AllocationState>> {
        let mut states = Vec::new();
        for action in actions {
            if let Some(allocation_id) = &action.allocation_id {
                if let Some(state) = self.collaborator.allocation_state(allocation_id).await? {
                    states.push(state);
                }
            }
        }
        Ok(states)
    }

    pub async fn get_indexing_rule(
        &self,
        identifier: &str,
        protocol_network: &str,
    ) -> CoreResult<Option<IndexingRule>> {
        db::get_indexing_rule(&self.pgpool, identifier, protocol_network).await
    }

    pub async fn list_indexing_rules(&self, protocol_network: &str) -> CoreResult<Vec<IndexingRule>> {
        db::list_indexing_rules(&self.pgpool, protocol_network).await
    }

    pub async fn set_indexing_rule(&self, rule: IndexingRule) -> CoreResult<IndexingRule> {
        db::set_indexing_rule(&self.pgpool, rule).await
    }

    pub async fn delete_indexing_rule(
        &self,
        identifier: &str,
        protocol_network: &str,
    ) -> CoreResult<()> {
        db::delete_indexing_rule(&self.pgpool, identifier, protocol_network).await
    }

    pub async fn get_cost_model(
        &self,
        deployment: &str,
        protocol_network: &str,
    ) -> CoreResult<Option<CostModel>> {
        db::get_cost_model(&self.pgpool, deployment, protocol_network).await
    }

    pub async fn set_cost_model(&self, cost_model: CostModel) -> CoreResult<CostModel> {
        db::set_cost_model(&self.pgpool, cost_model).await
    }
}
