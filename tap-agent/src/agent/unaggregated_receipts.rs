// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

/// Running tally of receipts this indexer has seen for an allocation
/// but not yet folded into a RAV.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnaggregatedReceipts {
    pub last_id: i64,
    pub value: u128,
}
