// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

mod allocation_manager;
mod config;
mod db;
mod graphql;
mod management_api;
mod models;
mod protocol_collaborator;

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use clap::{Parser, Subcommand};
use indexer_common::error::CoreError;
use indexer_common::protocol_network::ProtocolNetwork;
use sqlx::postgres::PgPoolOptions;
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::graphql::{build_schema, graphql_handler};
use crate::management_api::ManagementApi;
use crate::models::{
    ActionFilter, ActionInput, ActionPatch, ActionStatus, ActionType, CostModel, DecisionBasis,
    IdentifierType, IndexingRule, OrderBy, OrderDirection,
};
use crate::protocol_collaborator::{AllocationState, ExecutionOutcome, ProtocolCollaborator};

#[derive(Parser, Debug)]
#[clap(
    name = "indexer-agent",
    about = "Action Queue, Allocation Manager, and Management API for the indexing marketplace"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the Management API's GraphQL server.
    Serve,
    /// Queues a new action.
    #[command(name = "action-queue")]
    ActionQueue {
        #[arg(long, value_enum)]
        action_type: ActionType,
        #[arg(long)]
        deployment_id: String,
        #[arg(long)]
        allocation_id: Option<String>,
        #[arg(long)]
        amount: Option<bigdecimal::BigDecimal>,
        #[arg(long)]
        poi: Option<String>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        source: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        protocol_network: String,
    },
    /// Approves one or more actions; rejects the whole batch if any id
    /// is missing or can't currently accept the transition.
    #[command(name = "action-approve")]
    ActionApprove {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    #[command(name = "action-cancel")]
    ActionCancel {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    #[command(name = "action-delete")]
    ActionDelete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    #[command(name = "action-update-priority")]
    ActionUpdatePriority { id: i64, priority: i32 },
    #[command(name = "action-list")]
    ActionList {
        #[arg(long, value_enum)]
        status: Option<ActionStatus>,
        #[arg(long)]
        protocol_network: Option<String>,
    },
    #[command(name = "indexing-rule-get")]
    IndexingRuleGet {
        identifier: String,
        protocol_network: String,
    },
    #[command(name = "indexing-rule-set")]
    IndexingRuleSet {
        identifier: String,
        #[arg(long, value_enum, default_value = "deployment")]
        identifier_type: IdentifierType,
        #[arg(long, value_enum, default_value = "rules")]
        decision_basis: DecisionBasis,
        #[arg(long)]
        allocation_amount: Option<bigdecimal::BigDecimal>,
        #[arg(long)]
        allocation_lifetime: Option<i64>,
        #[arg(long, default_value_t = true)]
        auto_renewal: bool,
        #[arg(long)]
        protocol_network: String,
    },
    #[command(name = "cost-model-get")]
    CostModelGet {
        deployment: String,
        protocol_network: String,
    },
    #[command(name = "cost-model-set")]
    CostModelSet {
        deployment: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        variables: Option<String>,
        #[arg(long)]
        protocol_network: String,
    },
}

/// A stand-in `ProtocolCollaborator` that reports every allocation as
/// active with zero accrued rewards and fails every batch — the real
/// execution backend (on-chain submission, network subgraph polling) is
/// out of this crate's scope (§3 Non-goals) and is the integration
/// point named in `DESIGN.md`.
struct NullProtocolCollaborator;

#[async_trait::async_trait]
impl ProtocolCollaborator for NullProtocolCollaborator {
    async fn allocation_state(
        &self,
        _allocation_id: &str,
    ) -> indexer_common::error::CoreResult<Option<AllocationState>> {
        Ok(None)
    }

    async fn execute_batch(
        &self,
        actions: &[models::Action],
    ) -> indexer_common::error::CoreResult<Vec<ExecutionOutcome>> {
        Ok(actions
            .iter()
            .map(|_| ExecutionOutcome::Failed {
                reason: "no protocol collaborator configured".to_string(),
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = config::Cli::args();
    let cli = Cli::parse();

    let pgpool = match PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database.postgres_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("failed to connect to database: {e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = sqlx::migrate!("../migrations").run(&pgpool).await {
        error!("failed to run migrations: {e}");
        return ExitCode::from(1);
    }

    let api = Arc::new(ManagementApi::new(
        pgpool,
        Arc::new(NullProtocolCollaborator),
        config.action_queue.recently_executed_cooloff(),
    ));

    match run(cli.command, api, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

async fn run(
    command: Command,
    api: Arc<ManagementApi>,
    config: &config::Cli,
) -> anyhow::Result<()> {
    match command {
        Command::Serve => {
            let _protocol_network = ProtocolNetwork::from_str(&config.network_subgraph.protocol_network)?;
            let schema = build_schema(api);
            let app = Router::new().route("/graphql", post(graphql_handler)).with_state(schema);
            let listener =
                tokio::net::TcpListener::bind(("0.0.0.0", config.server.port)).await?;
            axum::serve(listener, app).await?;
            Ok(())
        }
        Command::ActionQueue {
            action_type,
            deployment_id,
            allocation_id,
            amount,
            poi,
            force,
            source,
            reason,
            priority,
            protocol_network,
        } => {
            let action = api
                .queue_action(ActionInput {
                    action_type,
                    deployment_id,
                    allocation_id,
                    amount,
                    poi,
                    force,
                    source,
                    reason,
                    priority,
                    protocol_network,
                })
                .await?;
            println!("queued action {}", action.id);
            Ok(())
        }
        Command::ActionApprove { ids } => {
            let actions = api.approve_actions(&ids).await?;
            for action in actions {
                println!("approved action {}", action.id);
            }
            Ok(())
        }
        Command::ActionCancel { ids } => {
            let actions = api.cancel_actions(&ids).await?;
            for action in actions {
                println!("canceled action {}", action.id);
            }
            Ok(())
        }
        Command::ActionDelete { ids } => {
            api.delete_actions(&ids).await?;
            for id in ids {
                println!("deleted action {id}");
            }
            Ok(())
        }
        Command::ActionUpdatePriority { id, priority } => {
            let updated = api
                .update_actions(
                    ActionFilter {
                        id: Some(id),
                        ..Default::default()
                    },
                    ActionPatch {
                        priority: Some(priority),
                        ..Default::default()
                    },
                )
                .await?;
            match updated.into_iter().next() {
                Some(action) => println!("updated action {}", action.id),
                None => println!("no action with id {id}"),
            }
            Ok(())
        }
        Command::ActionList {
            status,
            protocol_network,
        } => {
            let actions = api
                .list_actions(
                    ActionFilter {
                        status,
                        protocol_network,
                        ..Default::default()
                    },
                    OrderBy::Id,
                    OrderDirection::Asc,
                )
                .await?;
            for action in actions {
                println!(
                    "{}\t{:?}\t{:?}\t{}\t{}",
                    action.id, action.action_type, action.status, action.deployment_id, action.priority
                );
            }
            Ok(())
        }
        Command::IndexingRuleGet {
            identifier,
            protocol_network,
        } => {
            match api.get_indexing_rule(&identifier, &protocol_network).await? {
                Some(rule) => println!("{rule:?}"),
                None => println!("no indexing rule for {identifier} on {protocol_network}"),
            }
            Ok(())
        }
        Command::IndexingRuleSet {
            identifier,
            identifier_type,
            decision_basis,
            allocation_amount,
            allocation_lifetime,
            auto_renewal,
            protocol_network,
        } => {
            api.set_indexing_rule(IndexingRule {
                identifier: identifier.clone(),
                identifier_type,
                allocation_amount,
                allocation_lifetime,
                auto_renewal,
                decision_basis,
                protocol_network: protocol_network.clone(),
            })
            .await?;
            println!("set indexing rule for {identifier} on {protocol_network}");
            Ok(())
        }
        Command::CostModelGet {
            deployment,
            protocol_network,
        } => {
            match api.get_cost_model(&deployment, &protocol_network).await? {
                Some(model) => println!("{model:?}"),
                None => println!("no cost model for {deployment} on {protocol_network}"),
            }
            Ok(())
        }
        Command::CostModelSet {
            deployment,
            model,
            variables,
            protocol_network,
        } => {
            let variables = variables
                .map(|v| serde_json::from_str(&v))
                .transpose()
                .map_err(|e| CoreError::schema(format!("invalid variables JSON: {e}")))?;
            api.set_cost_model(CostModel {
                deployment: deployment.clone(),
                model,
                variables,
                protocol_network: protocol_network.clone(),
            })
            .await?;
            println!("set cost model for {deployment} on {protocol_network}");
            Ok(())
        }
    }
}
