// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Persistence helpers the RAV Aggregator Client and RAV Processing
//! Loop use to read ripe receipts and write back `SignedRav`s.
//!
//! This pipeline's receipts use the wire format fixed by the external
//! interface (`allocation || fees || id || signature`), not
//! `tap_core`'s default EIP-712 `SignedReceipt`. Rather than force that
//! shape through `tap_core::manager::Manager`'s generic adapter traits,
//! the loop talks to `tap_core`/`tap_aggregator`'s request and
//! response types directly (`RAVRequest`, `ReceiptAggregateVoucher`,
//! `EIP712SignedMessage`), the same way `SenderAllocation` calls the
//! aggregator's JSON-RPC endpoint directly rather than through the
//! manager's `rav_request` helper.

pub mod checks;

use bigdecimal::{BigDecimal, ToPrimitive};
use indexer_common::error::{CoreError, CoreResult};
use sqlx::PgPool;

use crate::allocation_summary::record_collected_fees;
use crate::domain::{Receipt, Rav};

/// Receipts for `(allocation_id, protocol_network)` not yet covered by
/// the last RAV, ordered by `timestamp_ns` ascending as the aggregator
/// client's contract requires.
pub async fn pending_receipts(
    pgpool: &PgPool,
    allocation_id: &str,
    protocol_network: &str,
) -> CoreResult<Vec<Receipt>> {
    let last_rav_timestamp = last_rav(pgpool, allocation_id, protocol_network)
        .await?
        .map(|rav| rav.timestamp_ns)
        .unwrap_or(0);

    sqlx::query_as!(
        Receipt,
        r#"
        SELECT allocation_id, signer_address, id, fees, signature, timestamp_ns, nonce, protocol_network
        FROM scalar_tap_receipts
        WHERE allocation_id = $1 AND protocol_network = $2 AND timestamp_ns > $3
        ORDER BY timestamp_ns ASC
        "#,
        allocation_id,
        protocol_network,
        last_rav_timestamp,
    )
    .fetch_all(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

pub async fn last_rav(
    pgpool: &PgPool,
    allocation_id: &str,
    protocol_network: &str,
) -> CoreResult<Option<Rav>> {
    sqlx::query_as!(
        Rav,
        r#"
        SELECT allocation_id, sender_address, timestamp_ns, value_aggregate, signature, last, "final_", redeemed_at, protocol_network
        FROM scalar_tap_ravs
        WHERE allocation_id = $1 AND protocol_network = $2
        "#,
        allocation_id,
        protocol_network,
    )
    .fetch_optional(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

/// Writes back the aggregator's response, enforcing V1 (monotone
/// `valueAggregate`) before the row ever reaches storage, and advancing
/// `AllocationSummary.collectedFees` by the newly-aggregated delta in
/// the same transaction (4.D step 3, invariant S1).
pub async fn store_rav(
    pgpool: &PgPool,
    allocation_id: &str,
    sender_address: &str,
    protocol_network: &str,
    timestamp_ns: i64,
    value_aggregate: &BigDecimal,
    signature: &[u8],
    last: bool,
    final_: bool,
) -> CoreResult<()> {
    let mut tx = pgpool
        .begin()
        .await
        .map_err(|e| CoreError::Transient(e.to_string()))?;

    let previous = sqlx::query_as!(
        Rav,
        r#"
        SELECT allocation_id, sender_address, timestamp_ns, value_aggregate, signature, last, "final_", redeemed_at, protocol_network
        FROM scalar_tap_ravs
        WHERE allocation_id = $1 AND protocol_network = $2
        FOR UPDATE
        "#,
        allocation_id,
        protocol_network,
    )
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    let previous_value_aggregate = match &previous {
        Some(previous) => {
            if value_aggregate < &previous.value_aggregate {
                return Err(CoreError::Precondition(format!(
                    "RAV value_aggregate {value_aggregate} is lower than the previous {}",
                    previous.value_aggregate
                )));
            }
            if previous.final_ {
                return Err(CoreError::Precondition(
                    "allocation already has a final RAV; no further aggregation is allowed".into(),
                ));
            }
            previous.value_aggregate.clone()
        }
        None => BigDecimal::from(0),
    };

    sqlx::query!(
        r#"
        INSERT INTO scalar_tap_ravs
            (allocation_id, sender_address, timestamp_ns, value_aggregate, signature, last, final_, protocol_network)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (allocation_id, sender_address) DO UPDATE SET
            timestamp_ns = EXCLUDED.timestamp_ns,
            value_aggregate = EXCLUDED.value_aggregate,
            signature = EXCLUDED.signature,
            last = EXCLUDED.last,
            final_ = EXCLUDED.final_
        "#,
        allocation_id,
        sender_address,
        timestamp_ns,
        value_aggregate,
        signature,
        last,
        final_,
        protocol_network,
    )
    .execute(&mut *tx)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    let delta = value_aggregate.clone() - previous_value_aggregate;
    record_collected_fees(&mut tx, allocation_id, protocol_network, &delta).await?;

    tx.commit()
        .await
        .map_err(|e| CoreError::Transient(e.to_string()))?;
    Ok(())
}

pub fn value_aggregate_as_u128(rav: &Rav) -> CoreResult<u128> {
    rav.value_aggregate
        .to_u128()
        .ok_or_else(|| CoreError::Fatal("value_aggregate does not fit in u128".into()))
}

/// RAVs that have reached their terminal state (`last ∧ final_`) but
/// haven't yet been confirmed on chain (4.D step 4, Redeem). Ordered by
/// `timestamp_ns` so the oldest outstanding redemption is attempted first.
pub async fn ready_for_redemption(pgpool: &PgPool, protocol_network: &str) -> CoreResult<Vec<Rav>> {
    sqlx::query_as!(
        Rav,
        r#"
        SELECT allocation_id, sender_address, timestamp_ns, value_aggregate, signature, last, "final_", redeemed_at, protocol_network
        FROM scalar_tap_ravs
        WHERE protocol_network = $1 AND last = true AND final_ = true AND redeemed_at IS NULL
        ORDER BY timestamp_ns ASC
        "#,
        protocol_network,
    )
    .fetch_all(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))
}

/// Records on-chain redemption confirmation for a ready RAV (4.D step 4).
pub async fn mark_redeemed(
    pgpool: &PgPool,
    allocation_id: &str,
    sender_address: &str,
    protocol_network: &str,
) -> CoreResult<()> {
    let updated_rows = sqlx::query!(
        r#"
        UPDATE scalar_tap_ravs SET redeemed_at = now()
        WHERE allocation_id = $1 AND sender_address = $2 AND protocol_network = $3
        "#,
        allocation_id,
        sender_address,
        protocol_network,
    )
    .execute(pgpool)
    .await
    .map_err(|e| CoreError::Transient(e.to_string()))?;

    if updated_rows.rows_affected() != 1 {
        return Err(CoreError::not_found([allocation_id]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::test_utils::{store_rav, ALLOCATION_ID_0, SENDER};

    #[sqlx::test(migrations = "../migrations")]
    async fn ready_for_redemption_excludes_non_terminal_ravs(pgpool: PgPool) {
        store_rav(&pgpool, *ALLOCATION_ID_0, 100, false, false).await;
        assert!(ready_for_redemption(&pgpool, "eip155:1").await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn mark_redeemed_removes_it_from_the_ready_set(pgpool: PgPool) {
        store_rav(&pgpool, *ALLOCATION_ID_0, 100, true, true).await;

        let ready = ready_for_redemption(&pgpool, "eip155:1").await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].allocation_id, ALLOCATION_ID_0.to_string());

        mark_redeemed(&pgpool, &ALLOCATION_ID_0.to_string(), &SENDER.to_string(), "eip155:1")
            .await
            .unwrap();

        assert!(ready_for_redemption(&pgpool, "eip155:1").await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn mark_redeemed_rejects_unknown_rav(pgpool: PgPool) {
        let err = mark_redeemed(&pgpool, "0xunknown", &SENDER.to_string(), "eip155:1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
