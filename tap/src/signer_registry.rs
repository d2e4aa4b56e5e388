// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Recovers and authorizes the signer of an incoming receipt (R2).
//!
//! The receipt primary key carries a `signerAddress`, so more than one
//! key may be configured at once (key rotation without a flag day).
//! Recovery uses the same `secp256k1` ECDSA recovery the aggregator and
//! `tap_core` use elsewhere in this workspace.

use alloy_primitives::Address;
use indexer_common::error::CoreError;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};

/// The set of signer addresses this indexer currently accepts receipts from.
#[derive(Clone, Debug)]
pub struct SignerRegistry {
    allowed: Vec<Address>,
}

impl SignerRegistry {
    pub fn new(allowed: Vec<Address>) -> Self {
        Self { allowed }
    }

    pub fn is_authorized(&self, signer: &Address) -> bool {
        self.allowed.iter().any(|a| a == signer)
    }
}

/// Recovers the signer address from a 65-byte `(r, s, v)` signature over
/// `message`, per the wire format's `signed_bytes()`.
pub fn recover_signer(message: &[u8], signature: &[u8; 65]) -> Result<Address, CoreError> {
    let recovery_id = RecoveryId::from_i32(i32::from(signature[64].saturating_sub(27)))
        .map_err(|e| CoreError::schema(format!("invalid recovery id: {e}")))?;
    let recoverable = RecoverableSignature::from_compact(&signature[0..64], recovery_id)
        .map_err(|e| CoreError::schema(format!("malformed signature: {e}")))?;

    let digest = keccak_hash::keccak(message);
    let message = Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| CoreError::schema(format!("bad message digest: {e}")))?;

    let secp = Secp256k1::verification_only();
    let public_key = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| CoreError::schema(format!("signature does not recover: {e}")))?;

    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak_hash::keccak(&uncompressed[1..]);
    Ok(Address::from_slice(&hash.as_bytes()[12..]))
}

/// Verifies the wire receipt's signature (R2) and returns the recovered
/// signer, checked against `registry`.
pub fn verify_receipt_signature(
    registry: &SignerRegistry,
    signed_bytes: &[u8],
    signature: &[u8; 65],
) -> Result<Address, CoreError> {
    let signer = recover_signer(signed_bytes, signature)?;
    if !registry.is_authorized(&signer) {
        return Err(CoreError::Auth(format!(
            "signer {signer} is not in the configured allowlist"
        )));
    }
    Ok(signer)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_unauthorized_signer() {
        let registry = SignerRegistry::new(vec![Address::ZERO]);
        assert!(!registry.is_authorized(&Address::repeat_byte(1)));
    }

    #[test]
    fn accepts_configured_signer() {
        let signer = Address::repeat_byte(7);
        let registry = SignerRegistry::new(vec![signer]);
        assert!(registry.is_authorized(&signer));
    }
}
