// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Looks up the JSON-RPC endpoint a sender's TAP aggregator listens on
//! (statically configured, since there is no on-chain aggregator
//! registry this workspace resolves against).

use std::collections::HashMap;

use alloy_primitives::Address;
use anyhow::{anyhow, Result};

pub fn aggregator_endpoint(endpoints: &HashMap<Address, String>, sender: Address) -> Result<String> {
    endpoints
        .get(&sender)
        .cloned()
        .ok_or_else(|| anyhow!("no TAP aggregator endpoint configured for sender {sender}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_on_unknown_sender() {
        let endpoints = HashMap::new();
        assert!(aggregator_endpoint(&endpoints, Address::ZERO).is_err());
    }

    #[test]
    fn resolves_configured_sender() {
        let sender = Address::repeat_byte(0xab);
        let mut endpoints = HashMap::new();
        endpoints.insert(sender, "http://localhost:8080".to_string());
        assert_eq!(
            aggregator_endpoint(&endpoints, sender).unwrap(),
            "http://localhost:8080"
        );
    }
}
