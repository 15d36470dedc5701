#![cfg(feature = "memory")]

//! Integration tests for wallet switching.

mod common;

use std::time::Duration;

use wdkit_core::memory::{LoopbackWorklet, MemoryVault};
use wdkit_core::{SwitchOptions, SwitchOutcome, WalletCredentials, WalletLoadingState, WdkError};

#[tokio::test]
async fn test_switching_to_active_wallet_touches_nothing() {
    let h = common::Harness::new();
    h.provision(&["alice"]);
    h.orchestrator
        .switch_to_wallet("alice", common::start_options())
        .await
        .expect("first switch");

    let vault_calls = h.vault.call_count();
    let rpc_calls = h.worklet.rpc_calls();
    let outcome = h
        .orchestrator
        .switch_to_wallet("alice", common::start_options())
        .await
        .expect("second switch");

    assert_eq!(outcome, SwitchOutcome::AlreadyActive);
    assert_eq!(h.vault.call_count(), vault_calls);
    assert_eq!(h.worklet.rpc_calls(), rpc_calls);
}

#[tokio::test]
async fn test_failed_initialize_keeps_previous_wallet_active() {
    let h = common::Harness::new();
    h.provision(&["alice", "bob"]);
    h.orchestrator
        .switch_to_wallet("alice", common::start_options())
        .await
        .expect("switch to alice");

    h.worklet.fail_next("initializeWDK", "worklet crashed");
    let err = h
        .orchestrator
        .switch_to_wallet("bob", SwitchOptions::default())
        .await
        .expect_err("bob fails");

    assert!(matches!(
        err,
        WdkError::Transport { ref operation, .. } if operation == "initializeWDK"
    ));
    assert_eq!(h.orchestrator.active_wallet_id().as_deref(), Some("alice"));
    match h.orchestrator.loading_state() {
        WalletLoadingState::Error { identifier, error } => {
            assert_eq!(identifier, "bob");
            assert!(error.contains("worklet crashed"));
        }
        other => panic!("unexpected loading state {other:?}"),
    }

    // The worklet stays up and a retry recovers without a stale error.
    assert!(h.orchestrator.snapshot().is_started);
    h.orchestrator
        .switch_to_wallet("bob", SwitchOptions::default())
        .await
        .expect("retry");
    assert_eq!(h.orchestrator.active_wallet_id().as_deref(), Some("bob"));
    assert!(h.orchestrator.snapshot().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_switches_end_on_the_last_issued() {
    let h = common::Harness::with(
        MemoryVault::new(),
        LoopbackWorklet::new().with_latency(Duration::from_millis(10)),
    );
    h.provision(&["alice", "bob"]);
    h.orchestrator
        .start_worklet(common::config())
        .await
        .expect("start");

    let (alice, bob) = tokio::join!(
        h.orchestrator
            .switch_to_wallet("alice", SwitchOptions::default()),
        h.orchestrator.switch_to_wallet("bob", SwitchOptions::default())
    );
    let alice = alice.expect("alice switch");
    assert!(
        matches!(alice, SwitchOutcome::Switched | SwitchOutcome::Superseded),
        "unexpected outcome {alice:?}"
    );
    assert_eq!(bob.expect("bob switch"), SwitchOutcome::Switched);

    // Only bob's commit is left standing, in the selection and the worklet.
    assert_eq!(h.orchestrator.active_wallet_id().as_deref(), Some("bob"));
    assert!(h
        .orchestrator
        .lifecycle()
        .is_initialized_with(&credentials(&h, "bob")));
    assert!(!h
        .orchestrator
        .lifecycle()
        .is_initialized_with(&credentials(&h, "alice")));
    assert_eq!(h.worklet.initialize_calls(), 2);
    assert_eq!(
        h.orchestrator.loading_state(),
        WalletLoadingState::Ready {
            identifier: "bob".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_fetch_for_previous_wallet_is_dropped_after_switch() {
    let h = common::Harness::with(
        MemoryVault::new(),
        LoopbackWorklet::new().with_latency(Duration::from_millis(10)),
    );
    h.provision(&["alice", "bob"]);
    let o = &h.orchestrator;
    o.switch_to_wallet("alice", common::start_options())
        .await
        .expect("alice");

    // The address request for alice is answered after bob took the worklet.
    let (switched, fetched) = tokio::join!(
        o.switch_to_wallet("bob", SwitchOptions::default()),
        async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            o.accounts().address("ethereum", 1, Some("alice")).await
        }
    );
    assert_eq!(switched.expect("bob"), SwitchOutcome::Switched);
    assert_eq!(
        fetched,
        Err(WdkError::Superseded {
            target: "alice".to_string()
        })
    );

    // Nothing was cached for alice, and she is no longer served.
    assert!(matches!(
        o.accounts().address("ethereum", 1, Some("alice")).await,
        Err(WdkError::NotInitialized(_))
    ));
    let bob_address = o
        .accounts()
        .address("ethereum", 1, None)
        .await
        .expect("bob address");
    assert_eq!(o.addresses().len(), 1);
    assert!(o.wallet_addresses("bob").is_some());
    assert!(!bob_address.is_empty());
}

#[tokio::test]
async fn test_unknown_wallet_fails_before_worklet_or_cache() {
    let h = common::Harness::new();
    let err = h
        .orchestrator
        .switch_to_wallet("carol", common::start_options())
        .await
        .expect_err("carol does not exist");

    assert_eq!(
        err,
        WdkError::WalletNotFound {
            wallet_id: "carol".to_string()
        }
    );
    assert_eq!(h.vault.call_count(), 1);
    assert_eq!(h.vault.biometric_prompts(), 0);
    assert_eq!(h.worklet.runtimes_spawned(), 0);
    assert_eq!(h.orchestrator.active_wallet_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_recent_wallets_skip_biometrics_until_ttl() {
    let h = common::Harness::new();
    h.provision(&["alice", "bob"]);
    let o = &h.orchestrator;

    o.switch_to_wallet("alice", common::start_options())
        .await
        .expect("alice");
    o.switch_to_wallet("bob", SwitchOptions::default())
        .await
        .expect("bob");
    o.switch_to_wallet("alice", SwitchOptions::default())
        .await
        .expect("alice again");
    assert_eq!(h.vault.biometric_prompts(), 2);

    // The harness configures a one minute TTL.
    tokio::time::advance(Duration::from_secs(61)).await;
    o.switch_to_wallet("bob", SwitchOptions::default())
        .await
        .expect("bob after expiry");
    assert_eq!(h.vault.biometric_prompts(), 3);
}

#[tokio::test]
async fn test_account_data_is_scoped_per_wallet() {
    let h = common::Harness::new();
    h.provision(&["alice", "bob"]);
    let o = &h.orchestrator;

    o.switch_to_wallet("alice", common::start_options())
        .await
        .expect("alice");
    let alice_address = o
        .accounts()
        .address("ethereum", 0, None)
        .await
        .expect("alice address");

    o.switch_to_wallet("bob", SwitchOptions::default())
        .await
        .expect("bob");
    let bob_address = o
        .accounts()
        .address("ethereum", 0, None)
        .await
        .expect("bob address");
    assert_ne!(alice_address, bob_address);

    // Alice's address is still served from the store.
    let calls = h.worklet.call_method_calls();
    let cached = o
        .accounts()
        .address("ethereum", 0, Some("alice"))
        .await
        .expect("cached alice address");
    assert_eq!(cached, alice_address);
    assert_eq!(h.worklet.call_method_calls(), calls);
    assert_eq!(o.addresses().len(), 2);
}

fn credentials(h: &common::Harness, name: &str) -> WalletCredentials {
    let material = h.worklet.material_for(name);
    WalletCredentials::new(material.encryption_key, material.encrypted_seed)
}
