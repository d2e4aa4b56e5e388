// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Component F: the Allocation Manager's stake-usage and batch-feasibility
//! algorithms (§4.F, §8). Both functions are pure and synchronous by
//! design so they can be unit tested without a database or network.

use bigdecimal::BigDecimal;

fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

use crate::models::{Action, ActionType, StakeUsageSummary};

/// Per-allocation facts the stake-usage summary needs but that the
/// `Action` row itself doesn't carry: the allocation's current staked
/// amount (for Unallocate/Reallocate, where `action.amount` is the new
/// target rather than a delta) and its accrued, unclaimed indexing
/// rewards.
pub trait AllocationFacts {
    /// Currently staked GRT for an existing allocation, or `None` if the
    /// action's `allocation_id` doesn't reference a known allocation.
    fn staked_amount(&self, allocation_id: &str) -> Option<BigDecimal>;

    /// Unclaimed indexing rewards accrued by an existing allocation.
    fn accrued_rewards(&self, allocation_id: &str) -> BigDecimal;
}

/// Computes how much stake an action would move and the resulting
/// indexing-rewards recovery, per §4.F:
///
/// - Allocate(amount): allocates += amount.
/// - Unallocate(allocation): unallocates += the allocation's current
///   staked amount (`action.amount` plays no role here — unallocating
///   always frees the allocation's full stake); rewards += the
///   allocation's accrued rewards whenever its POI is non-zero.
/// - Reallocate(allocation, amount): unallocates += the old allocation's
///   current stake, allocates += amount, and rewards follow the same
///   POI rule as Unallocate (a reallocation closes the old allocation
///   first).
///
/// `balance = allocates - unallocates - rewards`: the net GRT a batch
/// draws from available stake once claimed rewards are netted back in.
pub fn stake_usage_summary(action: &Action, facts: &impl AllocationFacts) -> StakeUsageSummary {
    let mut allocates = zero();
    let mut unallocates = zero();
    let mut rewards = zero();

    let poi_is_nonzero = |poi: &Option<String>| {
        poi.as_deref()
            .map(|p| !p.trim_start_matches("0x").chars().all(|c| c == '0'))
            .unwrap_or(false)
    };

    match action.action_type {
        ActionType::Allocate => {
            allocates = action.amount.clone().unwrap_or_else(zero);
        }
        ActionType::Unallocate => {
            unallocates = action
                .allocation_id
                .as_deref()
                .and_then(|id| facts.staked_amount(id))
                .unwrap_or_else(zero);
            if poi_is_nonzero(&action.poi) {
                if let Some(id) = action.allocation_id.as_deref() {
                    rewards = facts.accrued_rewards(id);
                }
            }
        }
        ActionType::Reallocate => {
            let existing = action
                .allocation_id
                .as_deref()
                .and_then(|id| facts.staked_amount(id));
            unallocates = existing.unwrap_or_else(zero);
            allocates = action.amount.clone().unwrap_or_else(zero);
            if poi_is_nonzero(&action.poi) {
                if let Some(id) = action.allocation_id.as_deref() {
                    rewards = facts.accrued_rewards(id);
                }
            }
        }
    }

    let balance = &allocates - &unallocates - &rewards;
    StakeUsageSummary {
        allocates,
        unallocates,
        rewards,
        balance,
    }
}

/// Reorders a batch so it can execute without transiently exceeding
/// available stake (§4.F, §8 scenario 3): actions that free up stake
/// (`balance < 0`) run first, stake-neutral actions next, and actions
/// that consume stake (`balance > 0`) last. Within each partition,
/// original relative order is preserved except that higher `priority`
/// sorts earlier — this is a stable partition-then-sort, not a general
/// topological sort, since the spec only requires ordering by the sign
/// of each action's own balance.
pub fn validate_action_batch_feasibility(
    actions: Vec<Action>,
    facts: &impl AllocationFacts,
) -> Vec<Action> {
    let mut negative = Vec::new();
    let mut neutral = Vec::new();
    let mut positive = Vec::new();

    let zero_value = zero();
    for (index, action) in actions.into_iter().enumerate() {
        let balance = stake_usage_summary(&action, facts).balance;
        let bucket = if balance < zero_value {
            &mut negative
        } else if balance > zero_value {
            &mut positive
        } else {
            &mut neutral
        };
        bucket.push((index, action));
    }

    let sort_stable_by_priority = |bucket: &mut Vec<(usize, Action)>| {
        bucket.sort_by(|(i_a, a), (i_b, b)| b.priority.cmp(&a.priority).then(i_a.cmp(i_b)));
    };
    sort_stable_by_priority(&mut negative);
    sort_stable_by_priority(&mut neutral);
    sort_stable_by_priority(&mut positive);

    negative
        .into_iter()
        .chain(neutral)
        .chain(positive)
        .map(|(_, action)| action)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bigdecimal::BigDecimal;
    use chrono::NaiveDateTime;

    use super::*;
    use crate::models::ActionStatus;

    struct FakeFacts {
        staked: HashMap<String, BigDecimal>,
        rewards: HashMap<String, BigDecimal>,
    }

    impl AllocationFacts for FakeFacts {
        fn staked_amount(&self, allocation_id: &str) -> Option<BigDecimal> {
            self.staked.get(allocation_id).cloned()
        }

        fn accrued_rewards(&self, allocation_id: &str) -> BigDecimal {
            self.rewards
                .get(allocation_id)
                .cloned()
                .unwrap_or_else(zero)
        }
    }

    fn action(action_type: ActionType, priority: i32) -> Action {
        Action {
            id: 0,
            action_type,
            deployment_id: "Qm".to_string(),
            allocation_id: None,
            amount: None,
            poi: None,
            force: false,
            source: "test".to_string(),
            reason: "test".to_string(),
            priority,
            protocol_network: "eip155:1".to_string(),
            status: ActionStatus::Queued,
            transaction: None,
            failure_reason: None,
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn allocate_increases_allocates_and_balance() {
        let facts = FakeFacts {
            staked: HashMap::new(),
            rewards: HashMap::new(),
        };
        let mut a = action(ActionType::Allocate, 0);
        a.amount = Some(BigDecimal::from(10_000));
        let summary = stake_usage_summary(&a, &facts);
        assert_eq!(summary.allocates, BigDecimal::from(10_000));
        assert_eq!(summary.unallocates, zero());
        assert_eq!(summary.balance, BigDecimal::from(10_000));
    }

    #[test]
    fn unallocate_with_nonzero_poi_recovers_rewards() {
        let mut staked = HashMap::new();
        staked.insert("0xalloc".to_string(), BigDecimal::from(10_000));
        let mut rewards = HashMap::new();
        rewards.insert("0xalloc".to_string(), BigDecimal::from(500));
        let facts = FakeFacts { staked, rewards };

        let mut a = action(ActionType::Unallocate, 0);
        a.allocation_id = Some("0xalloc".to_string());
        a.amount = Some(BigDecimal::from(10_000));
        a.poi = Some("0xdeadbeef".to_string());
        let summary = stake_usage_summary(&a, &facts);
        assert_eq!(summary.unallocates, BigDecimal::from(10_000));
        assert_eq!(summary.rewards, BigDecimal::from(500));
        assert_eq!(summary.balance, BigDecimal::from(-10_500));
    }

    #[test]
    fn unallocate_ignores_action_amount_and_uses_staked_amount() {
        let mut staked = HashMap::new();
        staked.insert("0xalloc".to_string(), BigDecimal::from(10_000));
        let facts = FakeFacts {
            staked,
            rewards: HashMap::new(),
        };

        let mut a = action(ActionType::Unallocate, 0);
        a.allocation_id = Some("0xalloc".to_string());
        // `amount` is deliberately wrong for Unallocate; it must be ignored.
        a.amount = Some(BigDecimal::from(1));
        let summary = stake_usage_summary(&a, &facts);
        assert_eq!(summary.unallocates, BigDecimal::from(10_000));
        assert_eq!(summary.balance, BigDecimal::from(-10_000));
    }

    #[test]
    fn unallocate_with_zero_poi_forfeits_rewards() {
        let mut staked = HashMap::new();
        staked.insert("0xalloc".to_string(), BigDecimal::from(10_000));
        let mut rewards = HashMap::new();
        rewards.insert("0xalloc".to_string(), BigDecimal::from(500));
        let facts = FakeFacts { staked, rewards };

        let mut a = action(ActionType::Unallocate, 0);
        a.allocation_id = Some("0xalloc".to_string());
        a.amount = Some(BigDecimal::from(10_000));
        a.poi = Some("0x0000000000000000000000000000000000000000000000000000000000000000".to_string());
        let summary = stake_usage_summary(&a, &facts);
        assert_eq!(summary.rewards, zero());
        assert_eq!(summary.balance, BigDecimal::from(-10_000));
    }

    /// §8 scenario 3: `[Allocate(D1,10000), Unallocate(existing,10000,
    /// poi!=0), Reallocate(D1,10000,poi=0)]` must reorder to
    /// `[Unallocate, Reallocate, Allocate]` — the two actions that free
    /// stake (negative balance) run before the one that consumes it.
    #[test]
    fn batch_reorders_by_balance_sign() {
        let mut staked = HashMap::new();
        staked.insert("0xexisting".to_string(), BigDecimal::from(10_000));
        staked.insert("0xd1".to_string(), BigDecimal::from(10_000));
        let mut rewards = HashMap::new();
        rewards.insert("0xexisting".to_string(), BigDecimal::from(500));
        let facts = FakeFacts { staked, rewards };

        let mut allocate = action(ActionType::Allocate, 0);
        allocate.deployment_id = "D1".to_string();
        allocate.amount = Some(BigDecimal::from(10_000));

        let mut unallocate = action(ActionType::Unallocate, 0);
        unallocate.allocation_id = Some("0xexisting".to_string());
        unallocate.amount = Some(BigDecimal::from(10_000));
        unallocate.poi = Some("0xdeadbeef".to_string());

        let mut reallocate = action(ActionType::Reallocate, 0);
        reallocate.deployment_id = "D1".to_string();
        reallocate.allocation_id = Some("0xd1".to_string());
        reallocate.amount = Some(BigDecimal::from(10_000));
        reallocate.poi = Some("0x00".to_string());

        let batch = vec![allocate.clone(), unallocate.clone(), reallocate.clone()];
        let ordered = validate_action_batch_feasibility(batch, &facts);

        assert_eq!(ordered[0].action_type, ActionType::Unallocate);
        assert_eq!(ordered[1].action_type, ActionType::Reallocate);
        assert_eq!(ordered[2].action_type, ActionType::Allocate);
    }

    #[test]
    fn batch_preserves_order_within_same_balance_sign_by_priority() {
        let facts = FakeFacts {
            staked: HashMap::new(),
            rewards: HashMap::new(),
        };
        let mut low = action(ActionType::Allocate, 1);
        low.amount = Some(BigDecimal::from(1));
        let mut high = action(ActionType::Allocate, 5);
        high.amount = Some(BigDecimal::from(1));

        let ordered = validate_action_batch_feasibility(vec![low, high], &facts);
        assert_eq!(ordered[0].priority, 5);
        assert_eq!(ordered[1].priority, 1);
    }
}
