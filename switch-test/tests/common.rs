//! Shared black-box harness for the scenario and property tests.
//!
//! Builds a switch the way `switch-cli` would (through `switch-client`'s
//! public enroll/owner/recovery flows) and a fleet of watcher daemons the
//! way `switch-watcher`'s binary would (one [`Monitor`] per watcher
//! identity, each with its own switch-table row, all sharing one
//! [`InMemorySubstrate`]). Nothing here reaches into `switch-watcher`'s
//! private `release_fsm` module - a watcher's own release record is
//! produced by ticking its `Monitor`, exactly as a real daemon would.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use secrecy::SecretString;

use switch_client::enroll::{self, EnrollParams, WatcherTarget};
use switch_core::kdf;
use switch_core::schnorr::PrivateKey;
use switch_core::sealed_box::{self, RecipientKeyPair};
use switch_core::shamir;
use switch_test_utils::{InMemorySubstrate, InMemorySwitchStore};
use switch_types::records::ReleaseRecord;
use switch_types::substrate::{Record, Substrate, Topic};
use switch_types::switch::{Switch, ThresholdParams};
use switch_types::{RecipientId, SwitchId, SwitchStore as _};
use switch_watcher::identity::WatcherIdentity;
use switch_watcher::services::monitor::{Monitor, MonitorConfig, TracingReminderSink};

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A valid secp256k1 scalar is not guaranteed on the first 32 random
/// bytes; retry until [`PrivateKey::from_bytes`] accepts one.
fn random_signing_hex(r: &mut StdRng) -> SecretString {
    loop {
        let mut bytes = [0u8; 32];
        r.fill_bytes(&mut bytes);
        if PrivateKey::from_bytes(&bytes).is_ok() {
            return SecretString::from(hex::encode(bytes));
        }
    }
}

fn random_unseal_hex(r: &mut StdRng) -> SecretString {
    let mut bytes = [0u8; 32];
    r.fill_bytes(&mut bytes);
    SecretString::from(hex::encode(bytes))
}

/// Output of [`enroll_switch`]: everything a test needs to drive the
/// pipeline from enrollment through recovery.
pub struct Enrolled {
    pub switch: Switch,
    pub auth_key: shamir::AuthKey,
    pub watchers: Vec<Arc<WatcherIdentity>>,
    pub recipient_id: RecipientId,
    pub recipient_keys: RecipientKeyPair,
    pub owner_key: PrivateKey,
    pub substrate: Arc<InMemorySubstrate>,
}

/// Enrolls a fresh switch with `n` watchers at threshold `m`, guarding
/// `payload` with one recipient. Mirrors the owner-side flow a real
/// `switch-cli enroll` invocation would perform.
pub async fn enroll_switch(
    n: u8,
    m: u8,
    payload: &[u8],
    interval: Duration,
    created_at: SystemTime,
    r: &mut StdRng,
) -> Enrolled {
    let substrate = Arc::new(InMemorySubstrate::new());
    let owner_key = PrivateKey::generate(r);
    let recipient_keys = RecipientKeyPair::generate(r);
    let recipient_id = RecipientId::generate();

    let watchers: Vec<Arc<WatcherIdentity>> = (0..n)
        .map(|_| {
            let identity = WatcherIdentity::load(&random_signing_hex(r), &random_unseal_hex(r)).unwrap();
            Arc::new(identity)
        })
        .collect();

    let targets: Vec<WatcherTarget> = watchers
        .iter()
        .map(|w| WatcherTarget {
            watcher_id: w.id(),
            public_key: w.unseal_keys().public_key(),
        })
        .collect();

    let params = EnrollParams {
        owner_id: uuid::Uuid::new_v4(),
        payload,
        password: b"correct horse battery staple",
        kdf_salt: b"0123456789abcdef",
        kdf_iterations: kdf::MIN_KDF_ITERATIONS,
        threshold: ThresholdParams::new(n, m).unwrap(),
        watchers: &targets,
        recipients: &[(recipient_id, recipient_keys.public_key())],
        interval,
        owner_signing_key: &owner_key,
        publish_commitments: true,
        created_at,
    };

    let output = enroll::enroll(params, substrate.as_ref(), Duration::from_secs(5), r)
        .await
        .unwrap();
    assert!(output.watcher_acks.iter().all(|ack| ack.result.is_ok()));

    Enrolled {
        switch: output.switch,
        auth_key: output.auth_key,
        watchers,
        recipient_id,
        recipient_keys,
        owner_key,
        substrate,
    }
}

/// A standalone watcher daemon instance under test: its own identity and
/// switch-table row, sharing the scenario's substrate.
pub struct WatcherNode {
    pub identity: Arc<WatcherIdentity>,
    pub store: Arc<InMemorySwitchStore>,
    pub monitor: Monitor<InMemorySwitchStore, InMemorySubstrate, TracingReminderSink, StdRng>,
}

/// The watcher-side configuration a `switch-watcher` binary would build
/// from `WatcherConfig`, with a grace period the scenario controls.
pub fn monitor_config(grace: Duration) -> MonitorConfig {
    MonitorConfig {
        tick_interval: Duration::from_secs(1),
        grace,
        warning_fraction: 0.75,
        reminder_thresholds: vec![
            Duration::from_secs(24 * 3600),
            Duration::from_secs(6 * 3600),
            Duration::from_secs(3600),
        ],
        clock_skew_tolerance: Duration::from_secs(300),
        snapshot_timeout: Duration::from_millis(200),
    }
}

/// Spins up the watcher daemon for `identity`: inserts `switch` into its
/// own fresh store and builds the [`Monitor`] that will observe
/// `enrolled.substrate`.
pub async fn watcher_node(
    identity: Arc<WatcherIdentity>,
    switch: &Switch,
    substrate: Arc<InMemorySubstrate>,
    config: MonitorConfig,
    seed: u64,
) -> WatcherNode {
    let store = Arc::new(InMemorySwitchStore::new());
    store.insert(switch.clone()).await.unwrap();
    let monitor = Monitor::new(
        store.clone(),
        substrate,
        identity.clone(),
        Arc::new(TracingReminderSink),
        StdRng::seed_from_u64(seed),
        config,
    );
    WatcherNode {
        identity,
        store,
        monitor,
    }
}

/// Ticks every node in `nodes` at `now`, in order. A real deployment has
/// no such ordering guarantee - the scenarios that care about ordering
/// say so explicitly by ticking nodes one at a time instead of calling
/// this helper.
pub async fn tick_all(nodes: &[WatcherNode], now: SystemTime) {
    for node in nodes {
        node.monitor.tick(now).await.unwrap();
    }
}

/// Publishes a release record for `identity`'s envelope in `switch`
/// whose share bytes have had their first byte flipped, simulating a
/// malicious or corrupted watcher - without going through the (private)
/// `release_fsm` publish path, which would refuse to produce anything
/// but a correct share.
pub async fn publish_corrupted_release(
    enrolled: &Enrolled,
    identity: &WatcherIdentity,
    now: SystemTime,
) {
    let envelope = enrolled.switch.envelope_for(identity.id()).expect("envelope for watcher");
    let opened = sealed_box::open(identity.unseal_keys(), envelope.sealed_share()).unwrap();
    let mut share: shamir::Share = serde_json::from_slice(&opened).unwrap();
    share.bytes[0] ^= 0x01;

    let mut rng = rng(0xC0FFEE);
    let share_bytes = serde_json::to_vec(&share).unwrap();
    let mut per_recipient = Vec::new();
    for &(recipient_id, recipient_public) in enrolled.switch.recipients() {
        let resealed = sealed_box::seal(&recipient_public, &share_bytes, &mut rng);
        per_recipient.push((recipient_id, resealed));
    }
    let record = ReleaseRecord::sign(
        identity.signing_key(),
        enrolled.switch.id(),
        envelope.share_index(),
        per_recipient,
        now,
    );
    enrolled
        .substrate
        .publish(Topic::Release(enrolled.switch.id()), Record::Release(record))
        .await
        .unwrap();
}

/// Counts release records currently on the substrate for `switch_id`.
pub fn release_count(substrate: &InMemorySubstrate, switch_id: SwitchId) -> usize {
    substrate
        .snapshot(Topic::Release(switch_id))
        .into_iter()
        .filter(|r| matches!(r, Record::Release(_)))
        .count()
}
