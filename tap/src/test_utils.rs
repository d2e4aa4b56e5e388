// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Fixtures shared by this crate's and `indexer-tap-agent`'s test suites.

use alloy_primitives::Address;
use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use sqlx::PgPool;

use crate::domain::Receipt;

lazy_static! {
    pub static ref ALLOCATION_ID_0: Address =
        Address::from_slice(&[0x11u8; 20]);
    pub static ref INDEXER: Address = Address::from_slice(&[0x22u8; 20]);
    pub static ref SENDER: Address = Address::from_slice(&[0x33u8; 20]);
    pub static ref SIGNER: Address = Address::from_slice(&[0x44u8; 20]);
}

/// Inserts a receipt directly, bypassing the write-behind buffer, for
/// tests that only need rows already settled in storage.
pub async fn store_receipt(pgpool: &PgPool, id: i64, allocation_id: Address, fees: u64) -> Receipt {
    sqlx::query_as!(
        Receipt,
        r#"
        INSERT INTO scalar_tap_receipts
            (id, allocation_id, signer_address, fees, signature, timestamp_ns, nonce, protocol_network)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING allocation_id, signer_address, id, fees, signature, timestamp_ns, nonce, protocol_network
        "#,
        id,
        allocation_id.to_string(),
        SIGNER.to_string(),
        BigDecimal::from(fees),
        vec![0u8; 65],
        id,
        id,
        "eip155:1",
    )
    .fetch_one(pgpool)
    .await
    .expect("failed to insert fixture receipt")
}

/// Inserts a RAV directly, for tests asserting on downstream state
/// rather than the aggregation path itself.
pub async fn store_rav(
    pgpool: &PgPool,
    allocation_id: Address,
    value_aggregate: u128,
    last: bool,
    final_: bool,
) {
    sqlx::query!(
        r#"
        INSERT INTO scalar_tap_ravs
            (allocation_id, sender_address, timestamp_ns, value_aggregate, signature, last, final_, protocol_network)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
        allocation_id.to_string(),
        SENDER.to_string(),
        0i64,
        BigDecimal::from(value_aggregate),
        vec![0u8; 65],
        last,
        final_,
        "eip155:1",
    )
    .execute(pgpool)
    .await
    .expect("failed to insert fixture RAV");
}
