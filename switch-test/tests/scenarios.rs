//! End-to-end scenarios S1-S6, implemented against the real
//! `switch-client` owner/recovery flows and real `switch-watcher`
//! `Monitor` instances - one per watcher, sharing one in-memory
//! substrate - exactly as the corresponding CLI/daemon binaries in this
//! workspace would drive them.

mod common;

use std::time::{Duration, SystemTime};

use switch_client::recovery::{self, RecoveryParams};
use switch_client::Error;
use switch_types::error::SwitchError;
use switch_types::switch::SwitchState;
use switch_types::SwitchStore as _;

use common::{enroll_switch, monitor_config, publish_corrupted_release, release_count, rng, tick_all, watcher_node};

/// S1 - Basic release, N=5, M=3. Three watchers publish 25h after the
/// last heartbeat with a 24h interval and no grace; recovery returns the
/// enrolled plaintext.
#[tokio::test]
async fn s1_basic_release_recovers_payload() {
    let mut r = rng(1);
    let interval = Duration::from_secs(24 * 3600);
    let enrolled = enroll_switch(5, 3, b"hello", interval, SystemTime::UNIX_EPOCH, &mut r).await;

    let mut nodes = Vec::new();
    for (i, watcher) in enrolled.watchers.iter().take(3).enumerate() {
        nodes.push(
            watcher_node(
                watcher.clone(),
                &enrolled.switch,
                enrolled.substrate.clone(),
                monitor_config(Duration::ZERO),
                10 + i as u64,
            )
            .await,
        );
    }

    let release_at = SystemTime::UNIX_EPOCH + Duration::from_secs(25 * 3600);
    tick_all(&nodes, release_at).await;
    assert_eq!(release_count(&enrolled.substrate, enrolled.switch.id()), 3);

    let recovered = recovery::recover(
        RecoveryParams {
            switch_id: enrolled.switch.id(),
            recipient_id: enrolled.recipient_id,
            recipient_keys: &enrolled.recipient_keys,
            auth_key: &enrolled.auth_key,
            owner_signing_public_key: enrolled.owner_key.public_key(),
            threshold: enrolled.switch.threshold().m() as usize,
            sealed_payload: enrolled.switch.sealed_payload(),
            overall_timeout: Duration::from_millis(300),
        },
        enrolled.substrate.as_ref(),
    )
    .await
    .unwrap();

    assert_eq!(recovered, b"hello");
}

/// S2 - Threshold not met: only two of the three required watchers
/// publish. Recovery reports `InsufficientShares` once its overall
/// timeout elapses.
#[tokio::test]
async fn s2_recovery_fails_below_threshold() {
    let mut r = rng(2);
    let interval = Duration::from_secs(24 * 3600);
    let enrolled = enroll_switch(5, 3, b"hello", interval, SystemTime::UNIX_EPOCH, &mut r).await;

    let mut nodes = Vec::new();
    for (i, watcher) in enrolled.watchers.iter().take(2).enumerate() {
        nodes.push(
            watcher_node(
                watcher.clone(),
                &enrolled.switch,
                enrolled.substrate.clone(),
                monitor_config(Duration::ZERO),
                20 + i as u64,
            )
            .await,
        );
    }
    let release_at = SystemTime::UNIX_EPOCH + Duration::from_secs(25 * 3600);
    tick_all(&nodes, release_at).await;
    assert_eq!(release_count(&enrolled.substrate, enrolled.switch.id()), 2);

    let result = recovery::recover(
        RecoveryParams {
            switch_id: enrolled.switch.id(),
            recipient_id: enrolled.recipient_id,
            recipient_keys: &enrolled.recipient_keys,
            auth_key: &enrolled.auth_key,
            owner_signing_public_key: enrolled.owner_key.public_key(),
            threshold: enrolled.switch.threshold().m() as usize,
            sealed_payload: enrolled.switch.sealed_payload(),
            overall_timeout: Duration::from_millis(100),
        },
        enrolled.substrate.as_ref(),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::RecoveryFailed(SwitchError::InsufficientShares))
    ));
}

/// S3 - One of three release records is corrupted. Recovery discards it
/// and, once a fourth watcher's valid record arrives, still reaches
/// quorum and returns the plaintext.
#[tokio::test]
async fn s3_corrupt_share_is_skipped_fourth_record_recovers() {
    let mut r = rng(3);
    let interval = Duration::from_secs(24 * 3600);
    let enrolled = enroll_switch(5, 3, b"hello", interval, SystemTime::UNIX_EPOCH, &mut r).await;
    let release_at = SystemTime::UNIX_EPOCH + Duration::from_secs(25 * 3600);

    let mut nodes = Vec::new();
    for (i, watcher) in [0usize, 1, 3].into_iter().enumerate() {
        nodes.push(
            watcher_node(
                enrolled.watchers[watcher].clone(),
                &enrolled.switch,
                enrolled.substrate.clone(),
                monitor_config(Duration::ZERO),
                30 + i as u64,
            )
            .await,
        );
    }
    tick_all(&nodes, release_at).await;

    // Watcher index 2's record is corrupted rather than published by its
    // own (correctly-behaving) monitor.
    publish_corrupted_release(&enrolled, &enrolled.watchers[2], release_at).await;
    assert_eq!(release_count(&enrolled.substrate, enrolled.switch.id()), 4);

    let recovered = recovery::recover(
        RecoveryParams {
            switch_id: enrolled.switch.id(),
            recipient_id: enrolled.recipient_id,
            recipient_keys: &enrolled.recipient_keys,
            auth_key: &enrolled.auth_key,
            owner_signing_public_key: enrolled.owner_key.public_key(),
            threshold: enrolled.switch.threshold().m() as usize,
            sealed_payload: enrolled.switch.sealed_payload(),
            overall_timeout: Duration::from_millis(300),
        },
        enrolled.substrate.as_ref(),
    )
    .await
    .unwrap();

    assert_eq!(recovered, b"hello");
}

/// S4 - A refresh published just before the deadline must be observed by
/// a watcher that wakes after the old deadline; it must not expire the
/// switch or publish a release record.
#[tokio::test]
async fn s4_refresh_before_deadline_defeats_release() {
    let mut r = rng(4);
    let interval = Duration::from_secs(3600);
    let enrolled = enroll_switch(3, 2, b"hello", interval, SystemTime::UNIX_EPOCH, &mut r).await;

    switch_client::owner::refresh(
        &enrolled.owner_key,
        enrolled.switch.id(),
        1,
        SystemTime::UNIX_EPOCH + Duration::from_secs(3550),
        enrolled.substrate.as_ref(),
        switch_client::owner::PublishRetry::default(),
    )
    .await
    .unwrap();

    let node = watcher_node(
        enrolled.watchers[0].clone(),
        &enrolled.switch,
        enrolled.substrate.clone(),
        monitor_config(Duration::ZERO),
        40,
    )
    .await;

    node.monitor
        .tick(SystemTime::UNIX_EPOCH + Duration::from_secs(3700))
        .await
        .unwrap();

    let observed = node.store.get(enrolled.switch.id()).await.unwrap().unwrap();
    assert_eq!(observed.state(), SwitchState::Armed);
    assert_eq!(release_count(&enrolled.substrate, enrolled.switch.id()), 0);
}

/// S5 - A watcher races ahead and publishes before a valid cancellation
/// reaches it. Recipients must evict that release and report
/// `InsufficientShares` even though enough raw records exist.
#[tokio::test]
async fn s5_cancellation_races_release() {
    let mut r = rng(5);
    let interval = Duration::from_secs(3600);
    // M=2 so two releases would otherwise be sufficient - the
    // cancellation, not the threshold, is what defeats recovery here.
    let enrolled = enroll_switch(3, 2, b"hello", interval, SystemTime::UNIX_EPOCH, &mut r).await;

    let mut nodes = Vec::new();
    for (i, watcher) in enrolled.watchers.iter().take(2).enumerate() {
        nodes.push(
            watcher_node(
                watcher.clone(),
                &enrolled.switch,
                enrolled.substrate.clone(),
                monitor_config(Duration::ZERO),
                50 + i as u64,
            )
            .await,
        );
    }
    let release_at = SystemTime::UNIX_EPOCH + Duration::from_secs(3601);
    tick_all(&nodes, release_at).await;
    assert_eq!(release_count(&enrolled.substrate, enrolled.switch.id()), 2);

    switch_client::owner::cancel(
        &enrolled.owner_key,
        enrolled.switch.id(),
        SystemTime::UNIX_EPOCH + Duration::from_secs(3605),
        enrolled.substrate.as_ref(),
        switch_client::owner::PublishRetry::default(),
    )
    .await
    .unwrap();

    let result = recovery::recover(
        RecoveryParams {
            switch_id: enrolled.switch.id(),
            recipient_id: enrolled.recipient_id,
            recipient_keys: &enrolled.recipient_keys,
            auth_key: &enrolled.auth_key,
            owner_signing_public_key: enrolled.owner_key.public_key(),
            threshold: enrolled.switch.threshold().m() as usize,
            sealed_payload: enrolled.switch.sealed_payload(),
            overall_timeout: Duration::from_millis(100),
        },
        enrolled.substrate.as_ref(),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::RecoveryFailed(SwitchError::InsufficientShares))
    ));
}

/// S6 - After a successful quorum, the stored ciphertext is tampered
/// with. The key still reconstructs correctly, but decryption fails and
/// no plaintext is ever returned.
#[tokio::test]
async fn s6_tampered_ciphertext_fails_authentication() {
    let mut r = rng(6);
    let interval = Duration::from_secs(24 * 3600);
    let enrolled = enroll_switch(5, 3, b"hello", interval, SystemTime::UNIX_EPOCH, &mut r).await;

    let mut nodes = Vec::new();
    for (i, watcher) in enrolled.watchers.iter().take(3).enumerate() {
        nodes.push(
            watcher_node(
                watcher.clone(),
                &enrolled.switch,
                enrolled.substrate.clone(),
                monitor_config(Duration::ZERO),
                60 + i as u64,
            )
            .await,
        );
    }
    let release_at = SystemTime::UNIX_EPOCH + Duration::from_secs(25 * 3600);
    tick_all(&nodes, release_at).await;

    // Simulates a bit flip in the persisted row, e.g. disk corruption or
    // an attacker who can write but not read the store - the switch
    // object itself is untouched, only the bytes handed to recovery.
    let mut tampered_payload = enrolled.switch.sealed_payload().to_vec();
    tampered_payload[0] ^= 0x01;

    let result = recovery::recover(
        RecoveryParams {
            switch_id: enrolled.switch.id(),
            recipient_id: enrolled.recipient_id,
            recipient_keys: &enrolled.recipient_keys,
            auth_key: &enrolled.auth_key,
            owner_signing_public_key: enrolled.owner_key.public_key(),
            threshold: enrolled.switch.threshold().m() as usize,
            sealed_payload: &tampered_payload,
            overall_timeout: Duration::from_millis(300),
        },
        enrolled.substrate.as_ref(),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::RecoveryFailed(SwitchError::AuthenticationFailed))
    ));
}
