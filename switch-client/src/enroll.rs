//! Packages a plaintext payload into a [`switch_types::Switch`]: derives
//! the encryption and authentication keys for the switch from the
//! owner's password, seals the payload, splits the resulting encryption
//! key into authenticated shares, and publishes one
//! [`switch_types::ShareEnvelope`] per watcher (§4.7).
//!
//! The owner never sees the payload key or the shares themselves - only
//! the [`EnrollmentOutput::auth_key`] (needed to verify shares on
//! combine, later handed to recipients out of band) and the password
//! that can reconstruct everything else.

use std::time::{Duration, SystemTime};

use rand::{CryptoRng, RngCore};
use switch_core::{
    kdf::{self, Purpose},
    sealed_box, shamir,
};
use switch_types::{
    RecipientId, Substrate, SwitchError, SwitchId, ThresholdParams, WatcherId,
    records::ShareEnvelope,
    substrate::{Record, Topic},
    switch::Switch,
};
use tracing::instrument;

/// One watcher to enroll: its identifier and the X25519 public key its
/// share will be sealed to.
#[derive(Debug, Clone, Copy)]
pub struct WatcherTarget {
    /// The watcher's identifier, recorded in the resulting switch.
    pub watcher_id: WatcherId,
    /// The watcher's long-term sealed-box public key.
    pub public_key: [u8; 32],
}

/// Inputs to [`enroll`]. Borrowed rather than owned so the caller
/// controls how long the password stays resident in memory.
pub struct EnrollParams<'a> {
    /// The owner's local database/account identifier. Opaque to this crate.
    pub owner_id: uuid::Uuid,
    /// The plaintext payload to seal. Zeroized by the caller after this
    /// call returns; this crate never retains a copy past `enroll`'s stack.
    pub payload: &'a [u8],
    /// The owner's password, used only to derive the Level-0 master key.
    pub password: &'a [u8],
    /// Persisted alongside the resulting switch so `password` can
    /// reconstruct the same master key later.
    pub kdf_salt: &'a [u8],
    /// Must be `>= switch_core::kdf::MIN_KDF_ITERATIONS`.
    pub kdf_iterations: u32,
    /// Total watchers and reconstruction threshold.
    pub threshold: ThresholdParams,
    /// One target per watcher; `targets.len()` must equal `threshold.n()`.
    pub watchers: &'a [WatcherTarget],
    /// Recipients who may later recover the payload, and the sealed-box
    /// public key watchers must reseal shares to at release time.
    pub recipients: &'a [(RecipientId, [u8; 32])],
    /// Refresh period; the switch's initial deadline is `created_at + interval`.
    pub interval: Duration,
    /// The owner's long-lived signing key. Retained locally by the
    /// caller; this crate only reads its public half.
    pub owner_signing_key: &'a switch_core::schnorr::PrivateKey,
    /// Whether to publish per-coefficient commitments alongside each
    /// share envelope (§4.2's optional tamper-evident audit log).
    pub publish_commitments: bool,
    /// Wall-clock time of enrollment.
    pub created_at: SystemTime,
}

/// Per-watcher publish outcome, recorded but never blocking enrollment
/// as a whole - the owner is notified of failures, not stalled by them.
#[derive(Debug, Clone)]
pub struct WatcherAck {
    /// Which watcher this outcome is for.
    pub watcher_id: WatcherId,
    /// `Ok(())` if the envelope was accepted by the substrate within
    /// `ack_timeout`; the error otherwise.
    pub result: Result<(), SwitchError>,
}

/// Result of a successful [`enroll`] call.
pub struct EnrollmentOutput {
    /// The newly constructed switch, already in the `Armed` state.
    pub switch: Switch,
    /// The share-authentication key. The owner must retain this (or be
    /// able to re-derive it from `password`) to verify shares during
    /// recovery; it must be distributed to recipients out of band.
    pub auth_key: shamir::AuthKey,
    /// Per-watcher publish outcomes.
    pub watcher_acks: Vec<WatcherAck>,
}

/// Enrolls a new switch: derives keys, seals the payload, splits the
/// resulting key, publishes a [`ShareEnvelope`] to each watcher, and
/// returns the constructed [`Switch`] plus the authentication key the
/// owner must retain.
///
/// Fails only on parameter or entropy errors; per-watcher publish
/// failures are recorded in [`EnrollmentOutput::watcher_acks`] instead of
/// aborting the whole enrollment, matching §4.7's "records timeouts but
/// does not block the owner".
#[instrument(skip_all, fields(n = params.threshold.n(), m = params.threshold.m()))]
pub async fn enroll(
    params: EnrollParams<'_>,
    substrate: &dyn Substrate,
    ack_timeout: Duration,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<EnrollmentOutput, SwitchError> {
    if params.watchers.len() != params.threshold.n() as usize {
        return Err(SwitchError::InvalidParameters(format!(
            "enrolled {} watchers, threshold declares n={}",
            params.watchers.len(),
            params.threshold.n()
        )));
    }

    let master = kdf::derive_master(params.password, params.kdf_salt, params.kdf_iterations)
        .ok_or_else(|| {
            SwitchError::InvalidParameters(format!(
                "kdf_iterations {} below minimum {}",
                params.kdf_iterations,
                kdf::MIN_KDF_ITERATIONS
            ))
        })?;
    let switch_id = SwitchId::generate();
    let switch_key = kdf::derive_switch_key(&master, switch_id.into_uuid());
    let encryption_key = kdf::derive_purpose_key(&switch_key, Purpose::Encryption);
    let mac_key = kdf::derive_purpose_key(&switch_key, Purpose::Mac);
    let auth_key = shamir::AuthKey::from_bytes(*mac_key.expose());

    let aad = switch_id.into_uuid().into_bytes();
    let sealed_payload = switch_core::aead::encrypt(encryption_key.expose(), &aad, params.payload, rng);

    let split = shamir::split_with_auth_key(
        encryption_key.expose(),
        params.threshold.n() as usize,
        params.threshold.m() as usize,
        auth_key.clone(),
        rng,
    )?;

    let mut envelopes = Vec::with_capacity(params.watchers.len());
    for (target, share) in params.watchers.iter().zip(split.shares.iter()) {
        let share_bytes =
            serde_json::to_vec(share).expect("Share serialization to JSON cannot fail");
        let sealed_share = sealed_box::seal(&target.public_key, &share_bytes, rng);
        envelopes.push(ShareEnvelope::new(
            switch_id,
            target.watcher_id,
            share.index,
            sealed_share,
            share.mac,
            params.publish_commitments.then(|| split.commitments.clone()),
        ));
    }

    let switch = Switch::new(
        params.owner_id,
        sealed_payload.as_bytes().to_vec(),
        params.threshold,
        params.interval,
        params.created_at,
        envelopes.clone(),
        params.owner_signing_key.public_key(),
        params.recipients.to_vec(),
    );

    let mut watcher_acks = Vec::with_capacity(envelopes.len());
    for envelope in envelopes {
        let watcher_id = envelope.watcher_id();
        let topic = Topic::ShareEnvelope(switch_id);
        let result = match tokio::time::timeout(ack_timeout, substrate.publish(topic, Record::Share(envelope))).await
        {
            Ok(inner) => inner,
            Err(_) => Err(SwitchError::Timeout),
        };
        if let Err(ref err) = result {
            tracing::warn!(%watcher_id, %err, "share envelope publish did not complete within ack timeout");
        }
        watcher_acks.push(WatcherAck { watcher_id, result });
    }

    Ok(EnrollmentOutput {
        switch,
        auth_key,
        watcher_acks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch_core::sealed_box::RecipientKeyPair;
    use switch_core::schnorr::PrivateKey as SigningKey;
    use switch_test_utils::InMemorySubstrate;

    fn rng() -> rand::rngs::StdRng {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(99)
    }

    #[tokio::test]
    async fn enroll_produces_n_envelopes_and_a_recoverable_key() {
        let mut r = rng();
        let watcher_keys: Vec<_> = (0..5).map(|_| RecipientKeyPair::generate(&mut r)).collect();
        let watchers: Vec<WatcherTarget> = watcher_keys
            .iter()
            .map(|kp| WatcherTarget {
                watcher_id: WatcherId::generate(),
                public_key: kp.public_key(),
            })
            .collect();
        let signing_key = SigningKey::generate(&mut r);
        let substrate = InMemorySubstrate::new();
        let recipient_keys = RecipientKeyPair::generate(&mut r);
        let recipients = vec![(switch_types::RecipientId::generate(), recipient_keys.public_key())];

        let params = EnrollParams {
            owner_id: uuid::Uuid::new_v4(),
            payload: b"hello",
            password: b"hunter2 hunter2",
            kdf_salt: b"salt-bytes-16Byt",
            kdf_iterations: kdf::MIN_KDF_ITERATIONS,
            threshold: ThresholdParams::new(5, 3).unwrap(),
            watchers: &watchers,
            recipients: &recipients,
            interval: Duration::from_secs(3600 * 24),
            owner_signing_key: &signing_key,
            publish_commitments: true,
            created_at: SystemTime::now(),
        };

        let out = enroll(params, &substrate, Duration::from_secs(5), &mut r)
            .await
            .unwrap();
        assert_eq!(out.switch.envelopes().len(), 5);
        assert!(out.watcher_acks.iter().all(|a| a.result.is_ok()));
    }
}
