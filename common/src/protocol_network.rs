// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! CAIP-2 protocol network identifiers.
//!
//! Inputs accept either a human network name (`goerli`), a bare chain id,
//! or an already-normalized CAIP-2 string (`eip155:5`); everything that
//! leaves this process is CAIP-2 only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A stable, CAIP-2 normalized chain identifier, e.g. `eip155:1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolNetwork(String);

impl ProtocolNetwork {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_chain_id(namespace: &str, chain_id: &str) -> Self {
        Self(format!("{namespace}:{chain_id}"))
    }

    fn alias(name: &str) -> Option<&'static str> {
        match name {
            "mainnet" => Some("1"),
            "goerli" => Some("5"),
            "sepolia" => Some("11155111"),
            "arbitrum-one" => Some("42161"),
            "arbitrum-sepolia" => Some("421614"),
            _ => None,
        }
    }
}

impl FromStr for ProtocolNetwork {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((namespace, chain_id)) = s.split_once(':') {
            if namespace != "eip155" || chain_id.is_empty() || !chain_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(CoreError::schema(format!(
                    "`{s}` is not a valid CAIP-2 protocol network identifier"
                )));
            }
            return Ok(Self(s.to_string()));
        }

        if let Some(chain_id) = Self::alias(s) {
            return Ok(Self::from_chain_id("eip155", chain_id));
        }

        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::from_chain_id("eip155", s));
        }

        Err(CoreError::schema(format!(
            "`{s}` is not a recognized protocol network name or CAIP-2 id"
        )))
    }
}

impl TryFrom<String> for ProtocolNetwork {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<ProtocolNetwork> for String {
    fn from(value: ProtocolNetwork) -> Self {
        value.0
    }
}

impl fmt::Display for ProtocolNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_caip2_unchanged() {
        assert_eq!(
            ProtocolNetwork::from_str("eip155:1").unwrap().as_str(),
            "eip155:1"
        );
    }

    #[test]
    fn parses_human_alias() {
        assert_eq!(
            ProtocolNetwork::from_str("goerli").unwrap().as_str(),
            "eip155:5"
        );
    }

    #[test]
    fn parses_bare_chain_id() {
        assert_eq!(
            ProtocolNetwork::from_str("42161").unwrap().as_str(),
            "eip155:42161"
        );
    }

    #[test]
    fn rejects_unknown_namespace() {
        assert!(ProtocolNetwork::from_str("cosmos:hub").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(ProtocolNetwork::from_str("not a network").is_err());
    }
}
