// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Standalone checks applied before a batch of receipts is handed to
//! the aggregator client (§4.C's input contract).

use alloy_primitives::Address;
use eventuals::Eventual;
use indexer_common::allocations::Allocation;
use indexer_common::error::CoreError;
use std::collections::HashMap;

use crate::domain::Receipt;

/// Confirms the allocation a receipt batch targets is one this indexer
/// currently tracks. Receipts for unknown allocations are dropped
/// rather than aggregated, since there would be nothing to redeem
/// against.
pub struct AllocationId {
    indexer_allocations: Eventual<HashMap<Address, Allocation>>,
}

impl AllocationId {
    pub fn new(indexer_allocations: Eventual<HashMap<Address, Allocation>>) -> Self {
        Self { indexer_allocations }
    }

    pub async fn check(&self, allocation_id: Address) -> Result<(), CoreError> {
        let known = self
            .indexer_allocations
            .value()
            .await
            .map(|allocations| allocations.contains_key(&allocation_id))
            .unwrap_or(false);
        if known {
            Ok(())
        } else {
            Err(CoreError::Precondition(format!(
                "allocation {allocation_id} is not tracked by this indexer"
            )))
        }
    }
}

/// Enforces the aggregator client's input contract: receipts sorted by
/// `timestampNs` ascending, contiguous with `previousRav.timestampNs`.
pub struct Signature;

impl Signature {
    /// Returns an error naming the first offending receipt if the batch
    /// is not sorted, or if any receipt is not strictly newer than
    /// `previous_rav_timestamp_ns`.
    pub fn check_contiguous(
        receipts: &[Receipt],
        previous_rav_timestamp_ns: Option<i64>,
    ) -> Result<(), CoreError> {
        let floor = previous_rav_timestamp_ns.unwrap_or(0);
        let mut last_seen = floor;
        for receipt in receipts {
            if receipt.timestamp_ns <= floor {
                return Err(CoreError::Precondition(format!(
                    "receipt {} has timestamp_ns {} which is not after the previous RAV's {}",
                    receipt.id, receipt.timestamp_ns, floor
                )));
            }
            if receipt.timestamp_ns < last_seen {
                return Err(CoreError::Precondition(format!(
                    "receipt {} is out of order in the aggregator batch",
                    receipt.id
                )));
            }
            last_seen = receipt.timestamp_ns;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bigdecimal::BigDecimal;

    fn receipt(id: i64, timestamp_ns: i64) -> Receipt {
        Receipt {
            allocation_id: "a".into(),
            signer_address: "s".into(),
            id,
            fees: BigDecimal::from(1),
            signature: vec![],
            timestamp_ns,
            nonce: id,
            protocol_network: "eip155:1".into(),
        }
    }

    #[test]
    fn accepts_sorted_contiguous_batch() {
        let receipts = vec![receipt(1, 10), receipt(2, 20)];
        assert!(Signature::check_contiguous(&receipts, Some(5)).is_ok());
    }

    #[test]
    fn rejects_receipt_at_or_before_previous_rav() {
        let receipts = vec![receipt(1, 5)];
        assert!(Signature::check_contiguous(&receipts, Some(5)).is_err());
    }

    #[test]
    fn rejects_out_of_order_batch() {
        let receipts = vec![receipt(1, 20), receipt(2, 10)];
        assert!(Signature::check_contiguous(&receipts, None).is_err());
    }
}
