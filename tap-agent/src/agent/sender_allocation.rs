// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use alloy_primitives::Address;
use alloy_sol_types::Eip712Domain;
use anyhow::{anyhow, ensure, Result};
use bigdecimal::BigDecimal;
use indexer_tap::context::checks::Signature;
use indexer_tap::context::{last_rav, pending_receipts, store_rav, value_aggregate_as_u128};
use jsonrpsee::{core::client::ClientT, http_client::HttpClientBuilder, rpc_params};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::PgPool;
use tap_aggregator::jsonrpsee_helpers::JsonRpcResponse;
use tap_core::eip_712_signed_message::EIP712SignedMessage;
use tap_core::receipt_aggregate_voucher::ReceiptAggregateVoucher;
use tracing::{error, warn};

use crate::agent::sender_account::SenderAccountMessage;
use crate::agent::sender_accounts_manager::NewReceiptNotification;
use crate::agent::unaggregated_receipts::UnaggregatedReceipts;
use crate::config;

/// Manages unaggregated fees and the RAV lifecycle (4.C and 4.D) for a
/// specific (allocation, sender) pair. One actor per pair, spawned and
/// torn down as allocations come and go.
pub struct SenderAllocation {
    pgpool: PgPool,
    allocation_id: Address,
    sender: Address,
    sender_aggregator_endpoint: String,
    config: &'static config::Cli,
    tap_eip712_domain_separator: Eip712Domain,
    protocol_network: String,
    sender_account_ref: ActorRef<SenderAccountMessage>,
}

pub enum SenderAllocationMessage {
    NewReceipt(NewReceiptNotification),
    /// Requests a RAV and waits for the resulting unaggregated-fee
    /// total. Used by tests and by anything driving the loop
    /// synchronously; the sender-level trigger in `SenderAccount` uses
    /// `RavRequestDue` instead, since it fans out to many allocations
    /// at once and has nothing useful to do with the reply.
    TriggerRAVRequest(RpcReplyPort<UnaggregatedReceipts>),
    RavRequestDue,
    CloseAllocation,

    #[cfg(any(test, feature = "test-utils"))]
    GetUnaggregatedReceipts(RpcReplyPort<UnaggregatedReceipts>),
}

#[async_trait::async_trait]
impl Actor for SenderAllocation {
    type Msg = SenderAllocationMessage;
    type State = UnaggregatedReceipts;
    type Arguments = ();

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        let unaggregated_fees = self.calculate_unaggregated_fee().await?;
        self.sender_account_ref
            .cast(SenderAccountMessage::AddSenderAllocation(
                self.allocation_id,
                myself,
            ))?;
        self.sender_account_ref
            .cast(SenderAccountMessage::UpdateReceiptFees(
                self.allocation_id,
                unaggregated_fees.clone(),
            ))?;
        Ok(unaggregated_fees)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        self.sender_account_ref
            .cast(SenderAccountMessage::RemoveSenderAllocation(
                self.allocation_id,
            ))?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            SenderAllocationMessage::NewReceipt(NewReceiptNotification { id, value, .. }) => {
                if id > state.last_id {
                    state.last_id = id;
                    state.value = state.value.checked_add(value).unwrap_or_else(|| {
                        error!(
                            "Overflow adding receipt value {} to unaggregated fees {} for \
                             allocation {} and sender {}; clamping to u128::MAX",
                            value, state.value, self.allocation_id, self.sender
                        );
                        u128::MAX
                    });
                    self.sender_account_ref
                        .cast(SenderAccountMessage::UpdateReceiptFees(
                            self.allocation_id,
                            state.clone(),
                        ))?;
                }
            }
            SenderAllocationMessage::TriggerRAVRequest(reply) => {
                self.rav_requester_single().await.map_err(|e| {
                    anyhow!(
                        "error requesting RAV for sender {} allocation {}: {e}",
                        self.sender,
                        self.allocation_id
                    )
                })?;
                *state = self.calculate_unaggregated_fee().await?;
                if !reply.is_closed() {
                    let _ = reply.send(state.clone());
                }
            }
            SenderAllocationMessage::RavRequestDue => {
                if let Err(e) = self.rav_requester_single().await {
                    error!(
                        "error requesting RAV for sender {} allocation {}: {e}",
                        self.sender, self.allocation_id
                    );
                }
                *state = self.calculate_unaggregated_fee().await?;
            }
            SenderAllocationMessage::CloseAllocation => {
                self.rav_requester_single().await.inspect_err(|e| {
                    error!(
                        "error requesting final RAV for sender {} allocation {}: {e}",
                        self.sender, self.allocation_id
                    );
                })?;
                self.mark_rav_last().await.inspect_err(|e| {
                    error!(
                        "error marking allocation {} final for sender {}: {e}",
                        self.allocation_id, self.sender
                    );
                })?;
                myself.stop(None);
            }
            #[cfg(any(test, feature = "test-utils"))]
            SenderAllocationMessage::GetUnaggregatedReceipts(reply) => {
                if !reply.is_closed() {
                    let _ = reply.send(state.clone());
                }
            }
        }
        Ok(())
    }
}

impl SenderAllocation {
    pub fn new(
        config: &'static config::Cli,
        pgpool: PgPool,
        allocation_id: Address,
        sender: Address,
        tap_eip712_domain_separator: Eip712Domain,
        protocol_network: String,
        sender_aggregator_endpoint: String,
        sender_account_ref: ActorRef<SenderAccountMessage>,
    ) -> Self {
        Self {
            pgpool,
            allocation_id,
            sender,
            sender_aggregator_endpoint,
            config,
            tap_eip712_domain_separator,
            protocol_network,
            sender_account_ref,
        }
    }

    /// Sums fees for receipts newer than the last RAV (Sampling, 4.D step 1).
    async fn calculate_unaggregated_fee(&self) -> Result<UnaggregatedReceipts> {
        let receipts = pending_receipts(
            &self.pgpool,
            &self.allocation_id.to_string(),
            &self.protocol_network,
        )
        .await
        .map_err(|e| anyhow!(e))?;

        let last_id = receipts.iter().map(|r| r.id).max().unwrap_or(0);
        let mut value: u128 = 0;
        for receipt in &receipts {
            let fees: u128 = receipt
                .fees
                .to_string()
                .parse()
                .map_err(|_| anyhow!("receipt fees do not fit in u128"))?;
            value = value
                .checked_add(fees)
                .ok_or_else(|| anyhow!("unaggregated fee sum overflowed u128"))?;
        }

        Ok(UnaggregatedReceipts { last_id, value })
    }

    /// Builds a RAV request from pending receipts and the previous RAV
    /// (4.C), calls the sender's aggregator, verifies the response, and
    /// writes it back (4.D's Aggregating -> Persisting transition).
    async fn rav_requester_single(&self) -> Result<()> {
        let allocation_id = self.allocation_id.to_string();
        let receipts = pending_receipts(&self.pgpool, &allocation_id, &self.protocol_network)
            .await
            .map_err(|e| anyhow!(e))?;
        ensure!(
            !receipts.is_empty(),
            "no pending receipts to aggregate for allocation {}",
            self.allocation_id
        );

        let previous_rav = last_rav(&self.pgpool, &allocation_id, &self.protocol_network)
            .await
            .map_err(|e| anyhow!(e))?;
        let previous_timestamp_ns = previous_rav.as_ref().map(|r| r.timestamp_ns);

        Signature::check_contiguous(&receipts, previous_timestamp_ns)?;

        let previous_value_aggregate = previous_rav
            .as_ref()
            .map(value_aggregate_as_u128)
            .transpose()
            .map_err(|e| anyhow!(e))?
            .unwrap_or(0);

        let mut value_aggregate = previous_value_aggregate;
        let mut timestamp_max = previous_timestamp_ns.unwrap_or(0);
        for receipt in &receipts {
            let fees: u128 = receipt.fees.to_string().parse()?;
            value_aggregate = value_aggregate
                .checked_add(fees)
                .ok_or_else(|| anyhow!("RAV value_aggregate overflowed u128"))?;
            timestamp_max = timestamp_max.max(receipt.timestamp_ns);
        }

        let expected_rav = ReceiptAggregateVoucher {
            allocationId: self.allocation_id,
            timestampNs: timestamp_max as u64,
            valueAggregate: value_aggregate,
        };

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(self.config.tap.rav_request_timeout_secs))
            .build(&self.sender_aggregator_endpoint)?;

        let response: JsonRpcResponse<EIP712SignedMessage<ReceiptAggregateVoucher>> = client
            .request(
                "aggregate_receipts",
                rpc_params!("0.0", &receipts, previous_rav.as_ref()),
            )
            .await?;

        if let Some(warnings) = response.warnings {
            warn!("warnings from sender's TAP aggregator: {:?}", warnings);
        }

        let signed_rav = response.data;
        let recovered = signed_rav
            .recover_signer(&self.tap_eip712_domain_separator)
            .map_err(|e| anyhow!("RAV signature does not recover: {e}"))?;
        ensure!(
            recovered == self.sender,
            "RAV was signed by {recovered}, expected sender {}; treating as AggregatorFraud",
            self.sender
        );
        ensure!(
            signed_rav.message.valueAggregate == expected_rav.valueAggregate,
            "aggregator returned valueAggregate {} but expected {} (V1 violation)",
            signed_rav.message.valueAggregate,
            expected_rav.valueAggregate
        );

        store_rav(
            &self.pgpool,
            &allocation_id,
            &self.sender.to_string(),
            &self.protocol_network,
            signed_rav.message.timestampNs as i64,
            &BigDecimal::from(signed_rav.message.valueAggregate),
            &signed_rav.signature.to_vec(),
            false,
            false,
        )
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(())
    }

    /// Forces the allocation's last RAV (written moments earlier by
    /// `rav_requester_single`, via `CloseAllocation`) into its terminal
    /// state: no further receipt can ever be aggregated against this
    /// allocation once both flags are set.
    pub async fn mark_rav_last(&self) -> Result<()> {
        let updated_rows = sqlx::query!(
            r#"UPDATE scalar_tap_ravs SET last = true, final_ = true WHERE allocation_id = $1 AND sender_address = $2"#,
            self.allocation_id.to_string(),
            self.sender.to_string(),
        )
        .execute(&self.pgpool)
        .await?;
        ensure!(
            updated_rows.rows_affected() == 1,
            "expected exactly one RAV row to be marked last, got {}",
            updated_rows.rows_affected()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSenderAccount;

    #[async_trait::async_trait]
    impl Actor for MockSenderAccount {
        type Msg = SenderAccountMessage;
        type State = ();
        type Arguments = ();

        async fn pre_start(
            &self,
            _myself: ActorRef<Self::Msg>,
            _args: Self::Arguments,
        ) -> std::result::Result<Self::State, ActorProcessingErr> {
            Ok(())
        }
    }

    // Full RAV-request round trips (including a live tap_aggregator
    // server) are exercised in tests/sender_allocation.rs, since they
    // need a wiremock graph-node stand-in and a real Postgres instance
    // via `sqlx::test`.
    #[tokio::test]
    async fn unaggregated_receipts_defaults_to_zero() {
        assert_eq!(UnaggregatedReceipts::default().value, 0);
    }
}
