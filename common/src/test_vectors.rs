// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for tests within this crate.

use std::str::FromStr;

use alloy_primitives::Address;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref INDEXER_ADDRESS: Address =
        Address::from_str("0x2222222222222222222222222222222222222222").unwrap();
}
