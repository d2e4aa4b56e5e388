// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Wire parsing and row shapes for the query-fee receipt pipeline.
//!
//! The receipt wire format is fixed: 264 hex characters decoding to
//! `allocation(20) || fees(32) || id(15) || signature(65)`. The
//! signature covers the first 67 bytes (`allocation || fees || id`).
//! Persisted rows additionally carry `timestamp_ns` (wall-clock arrival
//! time, used to order receipts into aggregator batches) and `nonce`
//! (mirrors `id`, kept as its own column since the entity description
//! names it separately) — see DESIGN.md for why `fees` and `value` name
//! the same quantity in this pipeline.

use alloy_primitives::{Address, U256};
use bigdecimal::BigDecimal;
use indexer_common::error::CoreError;
use indexer_common::protocol_network::ProtocolNetwork;
use serde::{Deserialize, Serialize};

pub const RECEIPT_WIRE_LEN_BYTES: usize = 20 + 32 + 15 + 65;
pub const RECEIPT_WIRE_LEN_HEX: usize = RECEIPT_WIRE_LEN_BYTES * 2;
const SIGNED_PREFIX_LEN_BYTES: usize = 20 + 32 + 15;
const SIGNATURE_LEN_BYTES: usize = 65;

/// A receipt as decoded off the wire, before signature verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireReceipt {
    pub allocation_id: Address,
    pub fees: U256,
    pub id: u128,
    pub signature: [u8; SIGNATURE_LEN_BYTES],
}

impl WireReceipt {
    /// The bytes the signature was computed over: `allocation || fees || id`.
    pub fn signed_bytes(&self) -> [u8; SIGNED_PREFIX_LEN_BYTES] {
        let mut buf = [0u8; SIGNED_PREFIX_LEN_BYTES];
        buf[0..20].copy_from_slice(self.allocation_id.as_slice());
        buf[20..52].copy_from_slice(&self.fees.to_be_bytes::<32>());
        buf[52..67].copy_from_slice(&self.id.to_be_bytes()[1..16]);
        buf
    }
}

/// Decodes the 264-hex-character receipt blob described in the external
/// interfaces contract. Never touches the database; pure parsing.
pub fn decode_receipt_hex(blob: &str) -> Result<WireReceipt, CoreError> {
    if blob.len() != RECEIPT_WIRE_LEN_HEX {
        return Err(CoreError::schema(format!(
            "receipt blob must be {RECEIPT_WIRE_LEN_HEX} hex characters, got {}",
            blob.len()
        )));
    }
    let bytes = hex::decode(blob)
        .map_err(|e| CoreError::schema(format!("receipt blob is not valid hex: {e}")))?;
    debug_assert_eq!(bytes.len(), RECEIPT_WIRE_LEN_BYTES);

    let allocation_id = Address::from_slice(&bytes[0..20]);
    let fees = U256::from_be_slice(&bytes[20..52]);

    let mut id_bytes = [0u8; 16];
    id_bytes[1..16].copy_from_slice(&bytes[52..67]);
    let id = u128::from_be_bytes(id_bytes);

    let mut signature = [0u8; SIGNATURE_LEN_BYTES];
    signature.copy_from_slice(&bytes[67..132]);

    Ok(WireReceipt {
        allocation_id,
        fees,
        id,
        signature,
    })
}

fn u256_to_bigdecimal(value: U256) -> BigDecimal {
    value
        .to_string()
        .parse()
        .expect("U256's decimal string is always a valid BigDecimal")
}

/// A persisted, signature-verified query-fee receipt.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct Receipt {
    pub allocation_id: String,
    pub signer_address: String,
    pub id: i64,
    #[sqlx(try_from = "BigDecimal")]
    pub fees: BigDecimal,
    pub signature: Vec<u8>,
    pub timestamp_ns: i64,
    pub nonce: i64,
    pub protocol_network: String,
}

/// A receipt that failed schema validation or signature verification
/// (R2), kept for audit and never counted toward aggregation.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct InvalidReceipt {
    pub allocation_id: String,
    pub signer_address: Option<String>,
    pub id: Option<i64>,
    pub fees: Option<BigDecimal>,
    pub signature: Vec<u8>,
    pub error_log: String,
    pub protocol_network: String,
}

/// A Receipt Aggregate Voucher, signed by the aggregator.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct Rav {
    pub allocation_id: String,
    pub sender_address: String,
    pub timestamp_ns: i64,
    #[sqlx(try_from = "BigDecimal")]
    pub value_aggregate: BigDecimal,
    pub signature: Vec<u8>,
    pub last: bool,
    pub final_: bool,
    pub redeemed_at: Option<chrono::NaiveDateTime>,
    pub protocol_network: String,
}

/// One per `(allocation_id, protocol_network)`. The single source of
/// truth for downstream consumers of fee/RAV state.
#[derive(Clone, Debug, sqlx::FromRow, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub allocation_id: String,
    pub protocol_network: String,
    pub closed_at: Option<chrono::NaiveDateTime>,
    #[sqlx(try_from = "BigDecimal")]
    pub collected_fees: BigDecimal,
    #[sqlx(try_from = "BigDecimal")]
    pub withdrawn_fees: BigDecimal,
}

pub(crate) fn fees_as_bigdecimal(fees: U256) -> BigDecimal {
    u256_to_bigdecimal(fees)
}

pub(crate) fn protocol_network_column(network: &ProtocolNetwork) -> String {
    network.as_str().to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_hex() -> String {
        let allocation = "ab".repeat(20);
        let fees = "00".repeat(31) + "64"; // 100
        let id = "00".repeat(14) + "01"; // 1
        let signature = "11".repeat(65);
        format!("{allocation}{fees}{id}{signature}")
    }

    #[test]
    fn decodes_well_formed_receipt() {
        let receipt = decode_receipt_hex(&sample_hex()).unwrap();
        assert_eq!(receipt.fees, U256::from(100u64));
        assert_eq!(receipt.id, 1);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(decode_receipt_hex("abcd").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let mut bad = sample_hex();
        bad.replace_range(0..2, "zz");
        assert!(decode_receipt_hex(&bad).is_err());
    }
}
