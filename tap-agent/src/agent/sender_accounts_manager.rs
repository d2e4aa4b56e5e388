// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Top-level driver: watches the tracked allocation set (the same
//! `Eventual` the receipt ingress and the RAV loop both read) and keeps
//! one `SenderAllocation` actor running per `(sender, allocation)` pair
//! that currently has an active or recently-closed allocation,
//! triggering RAV requests as allocations become eligible (§4.D step 1).

use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;
use alloy_sol_types::Eip712Domain;
use eventuals::Eventual;
use indexer_common::allocations::{Allocation, AllocationStatus};
use ractor::{Actor, ActorRef};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::sender_account::{SenderAccount, SenderAccountMessage};
use crate::agent::sender_allocation::{SenderAllocation, SenderAllocationMessage};
use crate::aggregator_endpoints::aggregator_endpoint;
use crate::config;

/// Emitted whenever a new receipt lands for an allocation this agent
/// tracks, so the corresponding `SenderAllocation` can fold it into its
/// running tally without a DB round trip.
#[derive(Clone, Debug)]
pub struct NewReceiptNotification {
    pub allocation_id: Address,
    pub signer_address: Address,
    pub id: i64,
    pub value: u128,
    pub timestamp_ns: i64,
}

pub struct SenderAccountsManager {
    config: &'static config::Cli,
    pgpool: PgPool,
    indexer_allocations: Eventual<HashMap<Address, Allocation>>,
    tap_eip712_domain_separator: Eip712Domain,
    protocol_network: String,

    sender_accounts: HashMap<Address, ActorRef<SenderAccountMessage>>,
    sender_allocations: HashMap<(Address, Address), ActorRef<SenderAllocationMessage>>,
    /// Allocations we've already requested a final RAV for, so a later
    /// tick doesn't request it again while the closed-allocation buffer
    /// still reports it.
    closed_out: HashSet<(Address, Address)>,
}

impl SenderAccountsManager {
    pub fn new(
        config: &'static config::Cli,
        pgpool: PgPool,
        indexer_allocations: Eventual<HashMap<Address, Allocation>>,
        tap_eip712_domain_separator: Eip712Domain,
        protocol_network: String,
    ) -> Self {
        Self {
            config,
            pgpool,
            indexer_allocations,
            tap_eip712_domain_separator,
            protocol_network,
            sender_accounts: HashMap::new(),
            sender_allocations: HashMap::new(),
            closed_out: HashSet::new(),
        }
    }

    /// Drives the RAV Processing Loop (§4.D): polls for closed
    /// allocations at `tap.rav_request_poll_interval_secs` (branch b)
    /// and routes incoming receipt notifications (branch a, via
    /// `SenderAccount`'s running total) until `shutdown` fires or
    /// `receipts` closes.
    pub async fn run(
        mut self,
        shutdown: CancellationToken,
        mut receipts: mpsc::UnboundedReceiver<(Address, NewReceiptNotification)>,
    ) {
        let mut ticker = interval(Duration::from_secs(
            self.config.tap.rav_request_poll_interval_secs,
        ));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("sender accounts manager tick failed: {e}");
                    }
                }
                received = receipts.recv() => {
                    match received {
                        Some((sender, notification)) => {
                            if let Err(e) = self.notify_new_receipt(sender, notification).await {
                                warn!("failed to route receipt notification: {e}");
                            }
                        }
                        None => {
                            info!("receipt notification channel closed, shutting down");
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("sender accounts manager shutting down");
                    break;
                }
            }
        }
    }

    /// Forces a final RAV request (§4.D step 1, branch b) for every
    /// tracked `(sender, allocation)` pair whose allocation has
    /// transitioned to `Closed`. Branch (a) — an `Active` allocation
    /// crossing the trigger value — is driven continuously by
    /// `SenderAccount` as receipts arrive, not by this poll.
    async fn tick(&mut self) -> anyhow::Result<()> {
        let allocations = self.indexer_allocations.value().await.unwrap_or_default();

        let closed: HashSet<Address> = allocations
            .values()
            .filter(|a| a.status == AllocationStatus::Closed)
            .map(|a| a.id)
            .collect();

        for (&(sender, allocation_id), actor) in self.sender_allocations.iter() {
            let key = (sender, allocation_id);
            if closed.contains(&allocation_id) && !self.closed_out.contains(&key) {
                if actor.cast(SenderAllocationMessage::CloseAllocation).is_ok() {
                    self.closed_out.insert(key);
                }
            }
        }

        Ok(())
    }

    /// Ensures a `SenderAccount` and a `SenderAllocation` exist for the
    /// pair named by a newly observed receipt, then forwards the
    /// notification. Called from the receipt ingress path.
    pub async fn notify_new_receipt(
        &mut self,
        sender: Address,
        notification: NewReceiptNotification,
    ) -> anyhow::Result<()> {
        let account_ref = self.get_or_spawn_sender_account(sender).await?;
        let allocation_ref = self
            .get_or_spawn_sender_allocation(sender, notification.allocation_id, account_ref)
            .await?;
        allocation_ref.cast(SenderAllocationMessage::NewReceipt(notification))?;
        Ok(())
    }

    async fn get_or_spawn_sender_account(
        &mut self,
        sender: Address,
    ) -> anyhow::Result<ActorRef<SenderAccountMessage>> {
        if let Some(existing) = self.sender_accounts.get(&sender) {
            return Ok(existing.clone());
        }
        let (actor_ref, _handle) = Actor::spawn(
            None,
            SenderAccount {
                sender,
                rav_request_trigger_value: self.config.tap.rav_request_trigger_value,
            },
            (),
        )
        .await?;
        info!(%sender, "spawned sender account actor");
        self.sender_accounts.insert(sender, actor_ref.clone());
        Ok(actor_ref)
    }

    async fn get_or_spawn_sender_allocation(
        &mut self,
        sender: Address,
        allocation_id: Address,
        sender_account_ref: ActorRef<SenderAccountMessage>,
    ) -> anyhow::Result<ActorRef<SenderAllocationMessage>> {
        let key = (sender, allocation_id);
        if let Some(existing) = self.sender_allocations.get(&key) {
            return Ok(existing.clone());
        }

        let endpoint = match aggregator_endpoint(&self.config.tap.sender_aggregator_endpoints, sender)
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("{e}; receipts for this sender will accumulate without a RAV request");
                return Err(e);
            }
        };

        let (actor_ref, _handle) = Actor::spawn(
            None,
            SenderAllocation::new(
                self.config,
                self.pgpool.clone(),
                allocation_id,
                sender,
                self.tap_eip712_domain_separator.clone(),
                self.protocol_network.clone(),
                endpoint,
                sender_account_ref,
            ),
            (),
        )
        .await?;
        info!(%sender, %allocation_id, "spawned sender allocation actor");
        self.sender_allocations.insert(key, actor_ref.clone());
        Ok(actor_ref)
    }
}
