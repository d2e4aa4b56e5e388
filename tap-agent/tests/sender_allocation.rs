// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use alloy_sol_types::eip712_domain;
use indexer_tap::test_utils::{store_receipt, ALLOCATION_ID_0, SENDER};
use indexer_tap_agent::agent::sender_account::SenderAccount;
use indexer_tap_agent::agent::sender_accounts_manager::NewReceiptNotification;
use indexer_tap_agent::agent::sender_allocation::{SenderAllocation, SenderAllocationMessage};
use indexer_tap_agent::config;
use ractor::{call, Actor};
use sqlx::PgPool;

fn leaked_config() -> &'static config::Cli {
    Box::leak(Box::new(config::Cli {
        ethereum: config::Ethereum {
            indexer_address: *SENDER,
        },
        receipts: config::Receipts {
            receipts_verifier_chain_id: 1,
            receipts_verifier_address: *SENDER,
        },
        tap: config::Tap {
            rav_request_trigger_value: 1_000_000,
            rav_request_timeout_secs: 5,
            rav_request_poll_interval_secs: 30,
            redemption_poll_interval_secs: 30,
            sender_aggregator_endpoints: Default::default(),
        },
        database: config::Database {
            postgres_url: String::new(),
        },
        network_subgraph: config::NetworkSubgraph {
            query_url: "http://localhost".to_string(),
            syncing_interval_secs: 60,
            recently_closed_allocation_buffer_secs: 3600,
            protocol_network: "eip155:1".to_string(),
        },
    }))
}

#[sqlx::test(migrations = "../migrations")]
async fn tracks_unaggregated_fees_as_receipts_land(pgpool: PgPool) {
    store_receipt(&pgpool, 1, *ALLOCATION_ID_0, 100).await;
    store_receipt(&pgpool, 2, *ALLOCATION_ID_0, 200).await;

    let config = leaked_config();
    let domain = eip712_domain! {
        name: "TAP",
        version: "1",
        chain_id: config.receipts.receipts_verifier_chain_id,
        verifying_contract: config.receipts.receipts_verifier_address,
    };

    let (sender_account_ref, _handle) = Actor::spawn(
        None,
        SenderAccount {
            sender: *SENDER,
            rav_request_trigger_value: config.tap.rav_request_trigger_value,
        },
        (),
    )
    .await
    .unwrap();

    let (allocation_ref, _handle) = Actor::spawn(
        None,
        SenderAllocation::new(
            config,
            pgpool.clone(),
            *ALLOCATION_ID_0,
            *SENDER,
            domain,
            "eip155:1".to_string(),
            "http://localhost:0".to_string(),
            sender_account_ref.clone(),
        ),
        (),
    )
    .await
    .unwrap();

    // pre_start already loaded the two receipts seeded above.
    let unaggregated = call!(
        allocation_ref,
        SenderAllocationMessage::GetUnaggregatedReceipts
    )
    .unwrap();
    assert_eq!(unaggregated.last_id, 2);
    assert_eq!(unaggregated.value, 300);

    allocation_ref
        .cast(SenderAllocationMessage::NewReceipt(NewReceiptNotification {
            allocation_id: *ALLOCATION_ID_0,
            signer_address: *SENDER,
            id: 3,
            value: 50,
            timestamp_ns: 3,
        }))
        .unwrap();

    let unaggregated = call!(
        allocation_ref,
        SenderAllocationMessage::GetUnaggregatedReceipts
    )
    .unwrap();
    assert_eq!(unaggregated.last_id, 3);
    assert_eq!(unaggregated.value, 350);

    allocation_ref.stop(None);
    sender_account_ref.stop(None);
}
