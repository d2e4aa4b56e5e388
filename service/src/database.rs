// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use sqlx::PgPool;
use thegraph::types::DeploymentId;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CostModel {
    pub deployment: String,
    pub model: Option<String>,
    pub variables: Option<Value>,
}

pub async fn cost_models(
    pool: &PgPool,
    deployments: &[DeploymentId],
) -> Result<Vec<CostModel>, sqlx::Error> {
    let deployments: Vec<String> = deployments.iter().map(|d| d.to_string()).collect();
    sqlx::query_as!(
        CostModel,
        r#"
        SELECT deployment, model, variables
        FROM cost_models
        WHERE deployment = ANY($1)
        "#,
        &deployments,
    )
    .fetch_all(pool)
    .await
}

pub async fn cost_model(
    pool: &PgPool,
    deployment: &DeploymentId,
) -> Result<Option<CostModel>, sqlx::Error> {
    sqlx::query_as!(
        CostModel,
        r#"
        SELECT deployment, model, variables
        FROM cost_models
        WHERE deployment = $1
        "#,
        deployment.to_string(),
    )
    .fetch_optional(pool)
    .await
}
