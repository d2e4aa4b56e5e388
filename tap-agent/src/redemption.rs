// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The RAV Processing Loop's Redeem step (§4.D step 4, optional): hands
//! every `last ∧ final ∧ ¬redeemed` RAV to an external redemption
//! collaborator and stamps `redeemedAt` on confirmation. Failures are
//! retried with exponential backoff, the same shape `receipt_store.rs`
//! uses for its own write-behind retries.

use std::time::Duration;

use async_trait::async_trait;
use indexer_common::error::CoreResult;
use indexer_tap::context::{mark_redeemed, ready_for_redemption};
use indexer_tap::domain::Rav;
use sqlx::PgPool;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config;

const MAX_REDEMPTION_ATTEMPTS: usize = 5;

/// The boundary between this loop and whatever actually submits a RAV
/// on chain. This crate never submits transactions itself (§3
/// Non-goals); `RavRedeemer` is the seam a caller plugs a real
/// submission backend into.
#[async_trait]
pub trait RavRedeemer: Send + Sync {
    async fn redeem(&self, rav: &Rav) -> CoreResult<()>;
}

/// A stand-in `RavRedeemer` that reports every RAV as unredeemable — the
/// real on-chain submission path is out of this crate's scope and is the
/// integration point named here.
pub struct NullRavRedeemer;

#[async_trait]
impl RavRedeemer for NullRavRedeemer {
    async fn redeem(&self, rav: &Rav) -> CoreResult<()> {
        Err(indexer_common::error::CoreError::Transient(format!(
            "no RAV redeemer configured for allocation {}",
            rav.allocation_id
        )))
    }
}

/// Polls `ready_for_redemption` at `tap.redemption_poll_interval_secs`
/// and drives each ready RAV through `redeemer` until `shutdown` fires.
pub struct RedemptionLoop {
    config: &'static config::Cli,
    pgpool: PgPool,
    redeemer: Box<dyn RavRedeemer>,
    protocol_network: String,
}

impl RedemptionLoop {
    pub fn new(
        config: &'static config::Cli,
        pgpool: PgPool,
        redeemer: Box<dyn RavRedeemer>,
        protocol_network: String,
    ) -> Self {
        Self {
            config,
            pgpool,
            redeemer,
            protocol_network,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(
            self.config.tap.redemption_poll_interval_secs,
        ));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("redemption loop tick failed: {e}");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn tick(&self) -> CoreResult<()> {
        let ready = ready_for_redemption(&self.pgpool, &self.protocol_network).await?;
        for rav in &ready {
            self.redeem_with_backoff(rav).await;
        }
        Ok(())
    }

    /// Retries `redeemer.redeem` up to `MAX_REDEMPTION_ATTEMPTS` times
    /// with exponential backoff before giving up for this tick; a RAV
    /// that exhausts its budget stays `redeemed_at IS NULL` and is
    /// retried on the next poll.
    async fn redeem_with_backoff(&self, rav: &Rav) {
        let mut attempt = 0;
        loop {
            match self.redeemer.redeem(rav).await {
                Ok(()) => {
                    if let Err(e) = mark_redeemed(
                        &self.pgpool,
                        &rav.allocation_id,
                        &rav.sender_address,
                        &rav.protocol_network,
                    )
                    .await
                    {
                        error!(
                            allocation_id = %rav.allocation_id,
                            error = %e,
                            "redeemed RAV but failed to record redeemedAt"
                        );
                    }
                    return;
                }
                Err(e) if e.is_retryable() && attempt < MAX_REDEMPTION_ATTEMPTS => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200).saturating_mul(1 << attempt.min(8));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        allocation_id = %rav.allocation_id,
                        error = %e,
                        "giving up on RAV redemption after exhausting retry budget this tick"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl RavRedeemer for AlwaysFails {
        async fn redeem(&self, rav: &Rav) -> CoreResult<()> {
            Err(indexer_common::error::CoreError::Fatal(format!(
                "cannot redeem {}",
                rav.allocation_id
            )))
        }
    }

    fn rav(allocation_id: &str) -> Rav {
        Rav {
            allocation_id: allocation_id.to_string(),
            sender_address: "0xsender".to_string(),
            timestamp_ns: 0,
            value_aggregate: bigdecimal::BigDecimal::from(100),
            signature: vec![0u8; 65],
            last: true,
            final_: true,
            redeemed_at: None,
            protocol_network: "eip155:1".to_string(),
        }
    }

    #[tokio::test]
    async fn null_redeemer_reports_transient_failure() {
        let err = NullRavRedeemer.redeem(&rav("0xalloc")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn non_retryable_failure_is_not_retried() {
        // `AlwaysFails` returns `Fatal`, not `Transient`; `is_retryable()`
        // must be false so `redeem_with_backoff` gives up on first try.
        let err = AlwaysFails.redeem(&rav("0xalloc")).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
