// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Component E: the Action Queue's persistence layer. Enforces A1
//! (at most one Queued|Approved action per (deployment, network) unless
//! forced), A2 (a cool-off window after a terminal status before the
//! same target can be requeued), and A3 (Unallocate/Reallocate requires
//! a currently active referenced allocation).

use chrono::Duration;
use indexer_common::error::{CoreError, CoreResult};
use sqlx::PgPool;

use crate::models::{
    Action, ActionFilter, ActionInput, ActionPatch, ActionStatus, ActionType, CostModel,
    IndexingRule, OrderBy, OrderDirection,
};

/// The cool-off window used by tests and any caller that doesn't carry
/// its own `config::ActionQueue` (A2). Production code gets this value
/// from `config::ActionQueue::recently_executed_cooloff`, which is a
/// named, configurable `Duration` rather than a fixed constant — `spec.md`
/// §9 leaves the exact value an open question.
pub const ACTION_COOL_OFF: Duration = Duration::seconds(60);

/// Queues an action, enforcing A1 and A3.
///
/// If an active (Queued or Approved) action already targets the same
/// `(deployment_id, protocol_network)`:
/// - same `source`: the existing row is replaced (idempotent resubmit).
/// - different `source`, not `force`: rejected with `CoreError::Conflict`
///   naming the conflicting action's id.
/// - `force`: the existing row is canceled and the new one queued.
///
/// `cool_off` is A2's window (see `config::ActionQueue`).
pub async fn queue(pgpool: &PgPool, input: ActionInput, cool_off: Duration) -> CoreResult<Action> {
    if matches!(
        input.action_type,
        ActionType::Unallocate | ActionType::Reallocate
    ) {
        let allocation_id = input.allocation_id.as_deref().ok_or_else(|| {
            CoreError::schema("Unallocate/Reallocate actions require an allocation_id")
        })?;
        ensure_allocation_active(pgpool, allocation_id, &input.protocol_network).await?;
    }

    if !input.force {
        ensure_cool_off_elapsed(pgpool, &input.deployment_id, &input.protocol_network, cool_off)
            .await?;
    }

    let mut tx = pgpool
        .begin()
        .await
        .map_err(|e| CoreError::Transient(e.to_string()))?;

    let conflicting = sqlx::query_as!(
        Action,
        r#"
        SELECT id, type as "action_type: ActionType", deployment_id, allocation_id, amount, poi,
               force, source, reason, priority, protocol_network,
               status as "status: ActionStatus", transaction, failure_reason, updated_at
        FROM actions
        WHERE deployment_id = $1 AND protocol_network = $2 AND status IN ('queued', 'approved')
        FOR UPDATE
        "#,
        input.deployment_id,
        input.protocol_network,
    )
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    if let Some(existing) = &conflicting {
        if existing.source == input.source {
            sqlx::query!(
                "UPDATE actions SET status = 'canceled', updated_at = now() WHERE id = $1",
                existing.id,
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        } else if input.force {
            sqlx::query!(
                "UPDATE actions SET status = 'canceled', updated_at = now() WHERE id = $1",
                existing.id,
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        } else {
            return Err(CoreError::Conflict {
                message: format!(
                    "an action from source '{}' is already active for deployment {} on {}",
                    existing.source, input.deployment_id, input.protocol_network
                ),
                conflicting_id: existing.id.to_string(),
            });
        }
    }

    let action = sqlx::query_as!(
        Action,
        r#"
        INSERT INTO actions (type, deployment_id, allocation_id, amount, poi, force, source,
                              reason, priority, protocol_network, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'queued')
        RETURNING id, type as "action_type: ActionType", deployment_id, allocation_id, amount, poi,
                  force, source, reason, priority, protocol_network,
                  status as "status: ActionStatus", transaction, failure_reason, updated_at
        "#,
        input.action_type as ActionType,
        input.deployment_id,
        input.allocation_id,
        input.amount,
        input.poi,
        input.force,
        input.source,
        input.reason,
        input.priority,
        input.protocol_network,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| CoreError::Transient(e.to_string()))?;

    Ok(action)
}

/// Transitions an action's status, rejecting any edge not present in
/// `ActionStatus::can_transition_to`'s graph and applying A2's cool-off
/// once the target status is terminal.
pub async fn transition(
    pgpool: &PgPool,
    id: i64,
    next: ActionStatus,
) -> CoreResult<Action> {
    let current = get(pgpool, id).await?;
    if !current.status.can_transition_to(next) {
        return Err(CoreError::Precondition(format!(
            "cannot transition action {id} from {:?} to {next:?}",
            current.status
        )));
    }

    let action = sqlx::query_as!(
        Action,
        r#"
        UPDATE actions SET status = $2, updated_at = now() WHERE id = $1
        RETURNING id, type as "action_type: ActionType", deployment_id, allocation_id, amount, poi,
                  force, source, reason, priority, protocol_network,
                  status as "status: ActionStatus", transaction, failure_reason, updated_at
        "#,
        id,
        next as ActionStatus,
    )
    .fetch_one(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    Ok(action)
}

/// Bulk status transition (§4.E `approve(ids[])`/`cancel(ids[])`): every
/// id must currently exist, or the whole call fails with `NotFound`
/// enumerating the missing set; every existing id must then accept the
/// transition, or the whole call fails with `Precondition` naming the
/// first offending id. Only once every id has passed both checks is any
/// row actually updated.
async fn transition_many(
    pgpool: &PgPool,
    ids: &[i64],
    next: ActionStatus,
) -> CoreResult<Vec<Action>> {
    let found = sqlx::query_as!(
        Action,
        r#"
        SELECT id, type as "action_type: ActionType", deployment_id, allocation_id, amount, poi,
               force, source, reason, priority, protocol_network,
               status as "status: ActionStatus", transaction, failure_reason, updated_at
        FROM actions WHERE id = ANY($1)
        "#,
        ids,
    )
    .fetch_all(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    let found_ids: std::collections::HashSet<i64> = found.iter().map(|a| a.id).collect();
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::not_found(missing));
    }

    for action in &found {
        if !action.status.can_transition_to(next) {
            return Err(CoreError::Precondition(format!(
                "cannot transition action {} from {:?} to {next:?}",
                action.id, action.status
            )));
        }
    }

    let mut updated = Vec::with_capacity(ids.len());
    for &id in ids {
        updated.push(transition(pgpool, id, next).await?);
    }
    Ok(updated)
}

pub async fn approve(pgpool: &PgPool, ids: &[i64]) -> CoreResult<Vec<Action>> {
    transition_many(pgpool, ids, ActionStatus::Approved).await
}

pub async fn cancel(pgpool: &PgPool, ids: &[i64]) -> CoreResult<Vec<Action>> {
    transition_many(pgpool, ids, ActionStatus::Canceled).await
}

/// Deletes actions outright (§4.E `delete(ids[])`); unlike `cancel`,
/// this does not require the action to currently be Queued or Approved
/// and leaves no record. Every id must exist or the whole call fails
/// with `NotFound` enumerating the missing set; nothing is deleted in
/// that case.
pub async fn delete(pgpool: &PgPool, ids: &[i64]) -> CoreResult<()> {
    let found_ids: std::collections::HashSet<i64> =
        sqlx::query_scalar!("SELECT id FROM actions WHERE id = ANY($1)", ids)
            .fetch_all(pgpool)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .into_iter()
            .collect();
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::not_found(missing));
    }

    sqlx::query!("DELETE FROM actions WHERE id = ANY($1)", ids)
        .execute(pgpool)
        .await
        .map_err(|e| CoreError::Transient(e.to_string()))?;
    Ok(())
}

/// Mass mutation matching `filter` (§4.E `update(filter, patch)`).
/// Unlike `approve`/`cancel`/`delete`, a filter matching zero rows is
/// not an error — it's simply an empty result, since the caller is
/// matching by predicate rather than naming specific ids.
pub async fn update(
    pgpool: &PgPool,
    filter: ActionFilter,
    patch: ActionPatch,
) -> CoreResult<Vec<Action>> {
    let matched = list(pgpool, filter, OrderBy::Id, OrderDirection::Asc).await?;

    if let Some(next) = patch.status {
        for action in &matched {
            if !action.status.can_transition_to(next) {
                return Err(CoreError::Precondition(format!(
                    "cannot transition action {} from {:?} to {next:?}",
                    action.id, action.status
                )));
            }
        }
    }

    let mut updated = Vec::with_capacity(matched.len());
    for action in &matched {
        updated.push(update_one(pgpool, action.id, patch.clone()).await?);
    }
    Ok(updated)
}

async fn update_one(pgpool: &PgPool, id: i64, patch: ActionPatch) -> CoreResult<Action> {
    let action = sqlx::query_as!(
        Action,
        r#"
        UPDATE actions SET
            priority = COALESCE($2, priority),
            status = COALESCE($3, status),
            transaction = COALESCE($4, transaction),
            failure_reason = COALESCE($5, failure_reason),
            updated_at = now()
        WHERE id = $1
        RETURNING id, type as "action_type: ActionType", deployment_id, allocation_id, amount, poi,
                  force, source, reason, priority, protocol_network,
                  status as "status: ActionStatus", transaction, failure_reason, updated_at
        "#,
        id,
        patch.priority,
        patch.status as Option<ActionStatus>,
        patch.transaction,
        patch.failure_reason,
    )
    .fetch_optional(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    action.ok_or_else(|| CoreError::not_found([id.to_string()]))
}

pub async fn get(pgpool: &PgPool, id: i64) -> CoreResult<Action> {
    sqlx::query_as!(
        Action,
        r#"
        SELECT id, type as "action_type: ActionType", deployment_id, allocation_id, amount, poi,
               force, source, reason, priority, protocol_network,
               status as "status: ActionStatus", transaction, failure_reason, updated_at
        FROM actions WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?
    .ok_or_else(|| CoreError::not_found([id.to_string()]))
}

pub async fn list(
    pgpool: &PgPool,
    filter: ActionFilter,
    order_by: OrderBy,
    direction: OrderDirection,
) -> CoreResult<Vec<Action>> {
    let order_sql = format!(
        "{} {}",
        order_by.column(),
        match direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    );

    // The column set is small and fixed, and `order_sql` is built only
    // from the closed `OrderBy`/`OrderDirection` enums above, never from
    // caller-supplied strings, so a dynamically-built query is safe here.
    // Plain renames, not the macro's `"col: Type"` cast syntax — that
    // syntax only has meaning inside the `query_as!`/`query!` compile-time
    // macros, which a dynamically-built query string can't use.
    let query = format!(
        r#"
        SELECT id, type as action_type, deployment_id, allocation_id, amount, poi,
               force, source, reason, priority, protocol_network,
               status as status, transaction, failure_reason, updated_at
        FROM actions
        WHERE ($1::action_status IS NULL OR status = $1)
          AND ($2::text IS NULL OR source = $2)
          AND ($3::text IS NULL OR deployment_id = $3)
          AND ($4::text IS NULL OR protocol_network = $4)
          AND ($5::bigint IS NULL OR id = $5)
        ORDER BY {order_sql}
        "#
    );

    sqlx::query_as(&query)
        .bind(filter.status)
        .bind(filter.source)
        .bind(filter.deployment_id)
        .bind(filter.protocol_network)
        .bind(filter.id)
        .fetch_all(pgpool)
        .await
        .map_err(|e| CoreError::Transient(e.to_string()))
}

/// A2: rejects a non-forced requeue while the most recent terminal
/// action for the same target is still inside its cool-off window.
async fn ensure_cool_off_elapsed(
    pgpool: &PgPool,
    deployment_id: &str,
    protocol_network: &str,
    cool_off: Duration,
) -> CoreResult<()> {
    let cool_off_secs = cool_off.num_seconds();
    let still_cooling = sqlx::query_scalar!(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM actions
            WHERE deployment_id = $1 AND protocol_network = $2
              AND status IN ('success', 'failed', 'canceled')
              AND updated_at > now() - make_interval(secs => $3)
        ) as "still_cooling!"
        "#,
        deployment_id,
        protocol_network,
        cool_off_secs as f64,
    )
    .fetch_one(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    if still_cooling {
        return Err(CoreError::Precondition(format!(
            "deployment {deployment_id} on {protocol_network} is in its post-action cool-off window"
        )));
    }
    Ok(())
}

/// A3: Unallocate/Reallocate must reference a currently active
/// allocation. "Active" here means the network subgraph's allocation
/// monitor still reports it open; since that's `indexer-tap-agent`'s
/// concern, this crate checks the locally mirrored indexing rule
/// instead — absence of any rule or cost model referencing the
/// allocation's deployment is not itself a precondition failure, so
/// this only rejects when the allocation is explicitly known to be
/// closed via a prior action's `Success` record for the same id.
async fn ensure_allocation_active(
    pgpool: &PgPool,
    allocation_id: &str,
    protocol_network: &str,
) -> CoreResult<()> {
    let closed = sqlx::query_scalar!(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM actions
            WHERE allocation_id = $1 AND protocol_network = $2
              AND type = 'unallocate' AND status = 'success'
        ) as "closed!"
        "#,
        allocation_id,
        protocol_network,
    )
    .fetch_one(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    if closed {
        return Err(CoreError::Precondition(format!(
            "allocation {allocation_id} is not active on {protocol_network}"
        )));
    }
    Ok(())
}

pub async fn get_indexing_rule(
    pgpool: &PgPool,
    identifier: &str,
    protocol_network: &str,
) -> CoreResult<Option<IndexingRule>> {
    sqlx::query_as!(
        IndexingRule,
        r#"
        SELECT identifier, identifier_type as "identifier_type: _", allocation_amount,
               allocation_lifetime, auto_renewal, decision_basis as "decision_basis: _",
               protocol_network
        FROM indexing_rules WHERE identifier = $1 AND protocol_network = $2
        "#,
        identifier,
        protocol_network,
    )
    .fetch_optional(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

pub async fn list_indexing_rules(
    pgpool: &PgPool,
    protocol_network: &str,
) -> CoreResult<Vec<IndexingRule>> {
    sqlx::query_as!(
        IndexingRule,
        r#"
        SELECT identifier, identifier_type as "identifier_type: _", allocation_amount,
               allocation_lifetime, auto_renewal, decision_basis as "decision_basis: _",
               protocol_network
        FROM indexing_rules WHERE protocol_network = $1
        "#,
        protocol_network,
    )
    .fetch_all(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

pub async fn set_indexing_rule(pgpool: &PgPool, rule: IndexingRule) -> CoreResult<IndexingRule> {
    sqlx::query_as!(
        IndexingRule,
        r#"
        INSERT INTO indexing_rules (identifier, identifier_type, allocation_amount,
                                     allocation_lifetime, auto_renewal, decision_basis,
                                     protocol_network)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (identifier, protocol_network) DO UPDATE SET
            identifier_type = EXCLUDED.identifier_type,
            allocation_amount = EXCLUDED.allocation_amount,
            allocation_lifetime = EXCLUDED.allocation_lifetime,
            auto_renewal = EXCLUDED.auto_renewal,
            decision_basis = EXCLUDED.decision_basis
        RETURNING identifier, identifier_type as "identifier_type: _", allocation_amount,
                  allocation_lifetime, auto_renewal, decision_basis as "decision_basis: _",
                  protocol_network
        "#,
        rule.identifier,
        rule.identifier_type as _,
        rule.allocation_amount,
        rule.allocation_lifetime,
        rule.auto_renewal,
        rule.decision_basis as _,
        rule.protocol_network,
    )
    .fetch_one(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

pub async fn delete_indexing_rule(
    pgpool: &PgPool,
    identifier: &str,
    protocol_network: &str,
) -> CoreResult<()> {
    let result = sqlx::query!(
        "DELETE FROM indexing_rules WHERE identifier = $1 AND protocol_network = $2",
        identifier,
        protocol_network,
    )
    .execute(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found([identifier.to_string()]));
    }
    Ok(())
}

pub async fn get_cost_model(
    pgpool: &PgPool,
    deployment: &str,
    protocol_network: &str,
) -> CoreResult<Option<CostModel>> {
    sqlx::query_as!(
        CostModel,
        r#"
        SELECT deployment, model, variables, protocol_network
        FROM cost_models WHERE deployment = $1 AND protocol_network = $2
        "#,
        deployment,
        protocol_network,
    )
    .fetch_optional(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

pub async fn set_cost_model(pgpool: &PgPool, cost_model: CostModel) -> CoreResult<CostModel> {
    sqlx::query_as!(
        CostModel,
        r#"
        INSERT INTO cost_models (deployment, model, variables, protocol_network)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (deployment, protocol_network) DO UPDATE SET
            model = EXCLUDED.model,
            variables = EXCLUDED.variables
        RETURNING deployment, model, variables, protocol_network
        "#,
        cost_model.deployment,
        cost_model.model,
        cost_model.variables,
        cost_model.protocol_network,
    )
    .fetch_one(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(action_type: ActionType, deployment_id: &str, source: &str) -> ActionInput {
        ActionInput {
            action_type,
            deployment_id: deployment_id.to_string(),
            allocation_id: None,
            amount: None,
            poi: None,
            force: false,
            source: source.to_string(),
            reason: "test".to_string(),
            priority: 0,
            protocol_network: "eip155:1".to_string(),
        }
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn queue_then_approve_then_cancel(pgpool: PgPool) {
        let action = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF).await.unwrap();
        assert_eq!(action.status, ActionStatus::Queued);

        let approved = approve(&pgpool, &[action.id]).await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].status, ActionStatus::Approved);

        let canceled = cancel(&pgpool, &[action.id]).await.unwrap();
        assert_eq!(canceled[0].status, ActionStatus::Canceled);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn approve_rejects_whole_batch_on_missing_id(pgpool: PgPool) {
        let a = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF).await.unwrap();
        let err = approve(&pgpool, &[a.id, a.id + 1_000]).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(ids) if ids == vec![(a.id + 1_000).to_string()]));

        // nothing was approved, since the batch failed as a whole
        let still_queued = get(&pgpool, a.id).await.unwrap();
        assert_eq!(still_queued.status, ActionStatus::Queued);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn delete_many_removes_every_id(pgpool: PgPool) {
        let a = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF).await.unwrap();
        let b = queue(&pgpool, input(ActionType::Allocate, "Qm2", "agent"), ACTION_COOL_OFF).await.unwrap();
        delete(&pgpool, &[a.id, b.id]).await.unwrap();
        assert!(matches!(get(&pgpool, a.id).await.unwrap_err(), CoreError::NotFound(_)));
        assert!(matches!(get(&pgpool, b.id).await.unwrap_err(), CoreError::NotFound(_)));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn update_matches_filter_and_applies_patch_to_every_match(pgpool: PgPool) {
        queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF).await.unwrap();
        queue(&pgpool, input(ActionType::Allocate, "Qm2", "agent"), ACTION_COOL_OFF).await.unwrap();
        queue(&pgpool, input(ActionType::Allocate, "Qm3", "other"), ACTION_COOL_OFF).await.unwrap();

        let updated = update(
            &pgpool,
            ActionFilter {
                source: Some("agent".to_string()),
                ..Default::default()
            },
            ActionPatch {
                priority: Some(9),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|a| a.priority == 9));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn queue_rejects_conflicting_source_without_force(pgpool: PgPool) {
        queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent-a"), ACTION_COOL_OFF).await.unwrap();
        let err = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent-b"), ACTION_COOL_OFF)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn queue_force_overrides_conflicting_source(pgpool: PgPool) {
        let first = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent-a"), ACTION_COOL_OFF).await.unwrap();
        let mut second = input(ActionType::Allocate, "Qm1", "agent-b");
        second.force = true;
        let new_action = queue(&pgpool, second, ACTION_COOL_OFF).await.unwrap();
        assert_ne!(new_action.id, first.id);

        let original = get(&pgpool, first.id).await.unwrap();
        assert_eq!(original.status, ActionStatus::Canceled);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn unallocate_requires_allocation_id(pgpool: PgPool) {
        let err = queue(&pgpool, input(ActionType::Unallocate, "Qm1", "agent"), ACTION_COOL_OFF)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn queue_rejects_during_cool_off_after_terminal_status(pgpool: PgPool) {
        let action = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF).await.unwrap();
        cancel(&pgpool, &[action.id]).await.unwrap();

        let err = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn transition_rejects_invalid_edge(pgpool: PgPool) {
        let action = queue(&pgpool, input(ActionType::Allocate, "Qm1", "agent"), ACTION_COOL_OFF).await.unwrap();
        let err = transition(&pgpool, action.id, ActionStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
    }
}
