// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The boundary between the Action Queue/Allocation Manager and
//! whatever actually executes approved actions on chain. This crate
//! never submits transactions itself (§3 Non-goals); `ProtocolCollaborator`
//! is the seam a caller plugs a real execution backend into.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use indexer_common::error::CoreResult;

use crate::allocation_manager::AllocationFacts;
use crate::models::Action;

/// An allocation as the on-chain collaborator reports it, independent of
/// this crate's own `Action` rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationState {
    pub allocation_id: String,
    pub deployment_id: String,
    pub staked_amount: BigDecimal,
    pub accrued_rewards: BigDecimal,
    pub active: bool,
}

/// Abstracts the network subgraph / on-chain execution path that the
/// Allocation Manager needs but does not own: current allocation state
/// (feeds `stake_usage_summary`'s `AllocationFacts`) and batch
/// execution of an already-ordered, already-approved set of actions.
#[async_trait]
pub trait ProtocolCollaborator: Send + Sync {
    async fn allocation_state(&self, allocation_id: &str) -> CoreResult<Option<AllocationState>>;

    /// Executes a pre-ordered batch (the output of
    /// `validate_action_batch_feasibility`), returning one outcome per
    /// action in the same order. Implementations are expected to update
    /// each action's status via `db::transition`/`db::update` as they go
    /// rather than only at the end, so a crash partway through still
    /// leaves an accurate queue.
    async fn execute_batch(&self, actions: &[Action]) -> CoreResult<Vec<ExecutionOutcome>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success { transaction: String },
    Failed { reason: String },
}

/// Adapts a snapshot of `AllocationState`s (as fetched once per batch
/// from a `ProtocolCollaborator`) into the `AllocationFacts` the pure
/// `allocation_manager` functions need, so the async network lookup
/// happens exactly once per batch rather than once per action.
pub struct AllocationStateFacts<'a> {
    states: &'a [AllocationState],
}

impl<'a> AllocationStateFacts<'a> {
    pub fn new(states: &'a [AllocationState]) -> Self {
        Self { states }
    }

    fn find(&self, allocation_id: &str) -> Option<&AllocationState> {
        self.states.iter().find(|s| s.allocation_id == allocation_id)
    }
}

impl AllocationFacts for AllocationStateFacts<'_> {
    fn staked_amount(&self, allocation_id: &str) -> Option<BigDecimal> {
        self.find(allocation_id).map(|s| s.staked_amount.clone())
    }

    fn accrued_rewards(&self, allocation_id: &str) -> BigDecimal {
        self.find(allocation_id)
            .map(|s| s.accrued_rewards.clone())
            .unwrap_or_else(|| BigDecimal::from(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_fall_back_to_zero_for_unknown_allocation() {
        let states = vec![AllocationState {
            allocation_id: "0xabc".to_string(),
            deployment_id: "Qm1".to_string(),
            staked_amount: BigDecimal::from(1000),
            accrued_rewards: BigDecimal::from(10),
            active: true,
        }];
        let facts = AllocationStateFacts::new(&states);
        assert_eq!(facts.staked_amount("0xabc"), Some(BigDecimal::from(1000)));
        assert_eq!(facts.staked_amount("0xunknown"), None);
        assert_eq!(facts.accrued_rewards("0xunknown"), BigDecimal::from(0));
    }
}
