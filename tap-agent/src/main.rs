// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use indexer_common::allocations::monitor::indexer_allocations;
use indexer_common::prelude::{DeploymentDetails, SubgraphClient};
use indexer_common::protocol_network::ProtocolNetwork;
use indexer_tap_agent::agent::sender_accounts_manager::{
    NewReceiptNotification, SenderAccountsManager,
};
use indexer_tap_agent::redemption::{NullRavRedeemer, RedemptionLoop};
use indexer_tap_agent::{CONFIG, EIP_712_DOMAIN};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Mirrors the JSON payload `scalar_tap_receipt_notify_trigger` sends.
#[derive(Deserialize)]
struct ReceiptNotifyPayload {
    allocation_id: String,
    signer_address: String,
    id: i64,
    fees: String,
    timestamp_ns: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let database = sqlx::postgres::PgPoolOptions::new()
        .max_connections(50)
        .connect(&CONFIG.database.postgres_url)
        .await?;
    sqlx::migrate!("../migrations").run(&database).await?;

    let protocol_network = ProtocolNetwork::from_str(&CONFIG.network_subgraph.protocol_network)?;

    let network_subgraph: &'static SubgraphClient = Box::leak(Box::new(SubgraphClient::new(
        reqwest::Client::new(),
        None,
        DeploymentDetails::for_query_url(&CONFIG.network_subgraph.query_url)?,
    )));

    let allocations = indexer_allocations(
        network_subgraph,
        CONFIG.ethereum.indexer_address,
        protocol_network.clone(),
        Duration::from_secs(CONFIG.network_subgraph.syncing_interval_secs),
        Duration::from_secs(CONFIG.network_subgraph.recently_closed_allocation_buffer_secs),
    );

    let manager = SenderAccountsManager::new(
        &CONFIG,
        database.clone(),
        allocations,
        EIP_712_DOMAIN.clone(),
        protocol_network.to_string(),
    );

    let shutdown = CancellationToken::new();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();

    {
        let mut listener = PgListener::connect_with(&database).await?;
        listener
            .listen("scalar_tap_receipt_notification")
            .await?;
        let shutdown = shutdown.clone();
        tokio::spawn(async move { listen_for_receipts(listener, notify_tx, shutdown).await });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { manager.run(shutdown, notify_rx).await });
    }

    {
        let redemption = RedemptionLoop::new(
            &CONFIG,
            database.clone(),
            Box::new(NullRavRedeemer),
            protocol_network.to_string(),
        );
        let shutdown = shutdown.clone();
        tokio::spawn(async move { redemption.run(shutdown).await });
    }

    tokio::signal::ctrl_c().await?;
    shutdown.cancel();
    Ok(())
}

/// Forwards `scalar_tap_receipt_notification` payloads to the manager
/// task, so a fresh receipt's fees are folded into the sender's running
/// total without the manager polling the table itself.
async fn listen_for_receipts(
    mut listener: PgListener,
    notify_tx: mpsc::UnboundedSender<(Address, NewReceiptNotification)>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            notification = listener.recv() => {
                match notification {
                    Ok(notification) => {
                        if let Err(e) = forward(&notify_tx, notification.payload()) {
                            warn!("dropping malformed receipt notification: {e}");
                        }
                    }
                    Err(e) => {
                        error!("receipt notification listener error: {e}");
                        break;
                    }
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

fn forward(
    notify_tx: &mpsc::UnboundedSender<(Address, NewReceiptNotification)>,
    payload: &str,
) -> anyhow::Result<()> {
    let payload: ReceiptNotifyPayload = serde_json::from_str(payload)?;
    let allocation_id = Address::from_str(&payload.allocation_id)?;
    let signer_address = Address::from_str(&payload.signer_address)?;
    let value: u128 = payload.fees.parse()?;

    let notification = NewReceiptNotification {
        allocation_id,
        signer_address,
        id: payload.id,
        value,
        timestamp_ns: payload.timestamp_ns,
    };

    // No separate on-chain signer-authorization lookup is modeled; the
    // configured signer acts as its own sender for RAV accounting.
    notify_tx.send((signer_address, notification))?;
    Ok(())
}
