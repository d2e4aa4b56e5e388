// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Aggregates per-allocation unaggregated-fee updates into a per-sender
//! view, and triggers a RAV request on every allocation it tracks once
//! the sender's total crosses the configured trigger value (§4.D step
//! 1, branch a).

use std::collections::HashMap;

use alloy_primitives::Address;
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{debug, warn};

use crate::agent::sender_allocation::SenderAllocationMessage;
use crate::agent::unaggregated_receipts::UnaggregatedReceipts;

pub enum SenderAccountMessage {
    /// A `SenderAllocation` actor now exists for this allocation; start
    /// tracking it so a trigger can fan out to it.
    AddSenderAllocation(Address, ActorRef<SenderAllocationMessage>),
    RemoveSenderAllocation(Address),
    UpdateReceiptFees(Address, UnaggregatedReceipts),
}

pub struct SenderAccount {
    pub sender: Address,
    pub rav_request_trigger_value: u128,
}

#[derive(Default)]
pub struct SenderAccountState {
    unaggregated: HashMap<Address, UnaggregatedReceipts>,
    allocations: HashMap<Address, ActorRef<SenderAllocationMessage>>,
}

#[async_trait]
impl Actor for SenderAccount {
    type Msg = SenderAccountMessage;
    type State = SenderAccountState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(SenderAccountState::default())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SenderAccountMessage::AddSenderAllocation(allocation_id, actor_ref) => {
                state.allocations.insert(allocation_id, actor_ref);
            }
            SenderAccountMessage::RemoveSenderAllocation(allocation_id) => {
                state.allocations.remove(&allocation_id);
                state.unaggregated.remove(&allocation_id);
            }
            SenderAccountMessage::UpdateReceiptFees(allocation_id, unaggregated) => {
                state.unaggregated.insert(allocation_id, unaggregated);
                let total: u128 = state.unaggregated.values().map(|u| u.value).sum();
                if total >= self.rav_request_trigger_value {
                    debug!(
                        sender = %self.sender,
                        total,
                        trigger = self.rav_request_trigger_value,
                        "sender crossed the RAV request trigger value, requesting RAVs"
                    );
                    for (allocation_id, actor_ref) in &state.allocations {
                        if let Err(e) = actor_ref.cast(SenderAllocationMessage::RavRequestDue) {
                            warn!(%allocation_id, "failed to trigger RAV request: {e}");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
