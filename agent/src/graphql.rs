// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The GraphQL face of the Management API (§4.G), mirroring
//! `indexer-service`'s cost-model schema: plain `async_graphql::Object`
//! types that delegate straight to `ManagementApi`, with no business
//! logic of their own.

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, InputObject, Object, Schema, SimpleObject};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use serde_json::Value;

use crate::management_api::ManagementApi;
use crate::models::{
    Action, ActionFilter, ActionInput, ActionPatch, ActionStatus, ActionType, CostModel,
    DecisionBasis, IdentifierType, IndexingRule, OrderBy, OrderDirection,
};

#[derive(SimpleObject)]
struct GraphQlAction {
    id: i64,
    action_type: ActionType,
    deployment_id: String,
    allocation_id: Option<String>,
    amount: Option<String>,
    poi: Option<String>,
    force: bool,
    source: String,
    reason: String,
    priority: i32,
    protocol_network: String,
    status: ActionStatus,
    transaction: Option<String>,
    failure_reason: Option<String>,
}

impl From<Action> for GraphQlAction {
    fn from(a: Action) -> Self {
        Self {
            id: a.id,
            action_type: a.action_type,
            deployment_id: a.deployment_id,
            allocation_id: a.allocation_id,
            amount: a.amount.map(|v| v.to_string()),
            poi: a.poi,
            force: a.force,
            source: a.source,
            reason: a.reason,
            priority: a.priority,
            protocol_network: a.protocol_network,
            status: a.status,
            transaction: a.transaction,
            failure_reason: a.failure_reason,
        }
    }
}

#[derive(InputObject)]
struct QueueActionInput {
    action_type: ActionType,
    deployment_id: String,
    allocation_id: Option<String>,
    amount: Option<String>,
    poi: Option<String>,
    force: bool,
    source: String,
    reason: String,
    priority: i32,
    protocol_network: String,
}

impl TryFrom<QueueActionInput> for ActionInput {
    type Error = anyhow::Error;

    fn try_from(input: QueueActionInput) -> Result<Self, Self::Error> {
        Ok(ActionInput {
            action_type: input.action_type,
            deployment_id: input.deployment_id,
            allocation_id: input.allocation_id,
            amount: input.amount.map(|v| v.parse()).transpose()?,
            poi: input.poi,
            force: input.force,
            source: input.source,
            reason: input.reason,
            priority: input.priority,
            protocol_network: input.protocol_network,
        })
    }
}

#[derive(SimpleObject)]
struct GraphQlIndexingRule {
    identifier: String,
    identifier_type: IdentifierType,
    allocation_amount: Option<String>,
    allocation_lifetime: Option<i64>,
    auto_renewal: bool,
    decision_basis: DecisionBasis,
    protocol_network: String,
}

impl From<IndexingRule> for GraphQlIndexingRule {
    fn from(r: IndexingRule) -> Self {
        Self {
            identifier: r.identifier,
            identifier_type: r.identifier_type,
            allocation_amount: r.allocation_amount.map(|v| v.to_string()),
            allocation_lifetime: r.allocation_lifetime,
            auto_renewal: r.auto_renewal,
            decision_basis: r.decision_basis,
            protocol_network: r.protocol_network,
        }
    }
}

#[derive(SimpleObject)]
struct GraphQlCostModel {
    deployment: String,
    model: Option<String>,
    variables: Option<Value>,
    protocol_network: String,
}

impl From<CostModel> for GraphQlCostModel {
    fn from(c: CostModel) -> Self {
        Self {
            deployment: c.deployment,
            model: c.model,
            variables: c.variables,
            protocol_network: c.protocol_network,
        }
    }
}

#[derive(Default)]
pub struct Query;

#[Object]
impl Query {
    async fn actions(
        &self,
        ctx: &Context<'_>,
        status: Option<ActionStatus>,
        source: Option<String>,
        deployment_id: Option<String>,
        protocol_network: Option<String>,
    ) -> async_graphql::Result<Vec<GraphQlAction>> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let filter = ActionFilter {
            status,
            source,
            deployment_id,
            protocol_network,
        };
        let actions = api
            .list_actions(filter, OrderBy::Id, OrderDirection::Asc)
            .await?;
        Ok(actions.into_iter().map(GraphQlAction::from).collect())
    }

    async fn action(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<GraphQlAction> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        Ok(api.get_action(id).await?.into())
    }

    async fn indexing_rules(
        &self,
        ctx: &Context<'_>,
        protocol_network: String,
    ) -> async_graphql::Result<Vec<GraphQlIndexingRule>> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let rules = api.list_indexing_rules(&protocol_network).await?;
        Ok(rules.into_iter().map(GraphQlIndexingRule::from).collect())
    }

    async fn cost_model(
        &self,
        ctx: &Context<'_>,
        deployment: String,
        protocol_network: String,
    ) -> async_graphql::Result<Option<GraphQlCostModel>> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let model = api.get_cost_model(&deployment, &protocol_network).await?;
        Ok(model.map(GraphQlCostModel::from))
    }
}

#[derive(Default)]
pub struct Mutation;

#[Object]
impl Mutation {
    async fn queue_action(
        &self,
        ctx: &Context<'_>,
        input: QueueActionInput,
    ) -> async_graphql::Result<GraphQlAction> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let action = api.queue_action(input.try_into()?).await?;
        Ok(action.into())
    }

    /// Bulk status transition (§4.E `approve(ids[])`): every id must
    /// exist and accept the transition, or nothing is approved.
    async fn approve_actions(
        &self,
        ctx: &Context<'_>,
        ids: Vec<i64>,
    ) -> async_graphql::Result<Vec<GraphQlAction>> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let actions = api.approve_actions(&ids).await?;
        Ok(actions.into_iter().map(GraphQlAction::from).collect())
    }

    async fn cancel_actions(
        &self,
        ctx: &Context<'_>,
        ids: Vec<i64>,
    ) -> async_graphql::Result<Vec<GraphQlAction>> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let actions = api.cancel_actions(&ids).await?;
        Ok(actions.into_iter().map(GraphQlAction::from).collect())
    }

    async fn delete_actions(&self, ctx: &Context<'_>, ids: Vec<i64>) -> async_graphql::Result<bool> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        api.delete_actions(&ids).await?;
        Ok(true)
    }

    /// Mass mutation matching `filter` (§4.E `update(filter, patch)`).
    async fn update_actions(
        &self,
        ctx: &Context<'_>,
        filter: ActionFilter,
        patch: ActionPatch,
    ) -> async_graphql::Result<Vec<GraphQlAction>> {
        let api = ctx.data_unchecked::<Arc<ManagementApi>>();
        let actions = api.update_actions(filter, patch).await?;
        Ok(actions.into_iter().map(GraphQlAction::from).collect())
    }
}

pub type ManagementSchema = Schema<Query, Mutation, EmptySubscription>;

pub fn build_schema(api: Arc<ManagementApi>) -> ManagementSchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .data(api)
        .finish()
}

pub async fn graphql_handler(
    State(schema): State<ManagementSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}
