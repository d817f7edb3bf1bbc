//! Wire-visible records published to the substrate: share envelopes
//! produced once at enrollment, and the heartbeat / release /
//! cancellation records that drive the release state machine.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::ids::{RecipientId, SwitchId, WatcherId};

/// A single watcher's encrypted share, produced once at enrollment and
/// never modified afterward.
///
/// Invariant: `share_index` equals the index recorded against this
/// watcher in the owning [`crate::Switch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEnvelope {
    switch_id: SwitchId,
    watcher_id: WatcherId,
    share_index: u8,
    /// The share, sealed to the watcher's public key (§4.7).
    sealed_share: Vec<u8>,
    mac: [u8; 32],
    /// Per-byte, per-coefficient hash commitments, published as a
    /// tamper-evident audit log only (see `DESIGN.md` for why this
    /// workspace does not implement interactive commitment verification).
    commitments: Option<switch_core::shamir::CommitmentSet>,
}

impl ShareEnvelope {
    /// Constructs a new envelope. Called once, at enrollment.
    pub fn new(
        switch_id: SwitchId,
        watcher_id: WatcherId,
        share_index: u8,
        sealed_share: Vec<u8>,
        mac: [u8; 32],
        commitments: Option<switch_core::shamir::CommitmentSet>,
    ) -> Self {
        Self {
            switch_id,
            watcher_id,
            share_index,
            sealed_share,
            mac,
            commitments,
        }
    }

    /// The switch this envelope belongs to.
    pub fn switch_id(&self) -> SwitchId {
        self.switch_id
    }

    /// The watcher this envelope is addressed to.
    pub fn watcher_id(&self) -> WatcherId {
        self.watcher_id
    }

    /// The share's `x` coordinate.
    pub fn share_index(&self) -> u8 {
        self.share_index
    }

    /// The share, sealed under the watcher's public key.
    pub fn sealed_share(&self) -> &[u8] {
        &self.sealed_share
    }

    /// The share's MAC, to be checked after unsealing.
    pub fn mac(&self) -> &[u8; 32] {
        &self.mac
    }

    /// The published commitment set, if the switch was enrolled with one.
    pub fn commitments(&self) -> Option<&switch_core::shamir::CommitmentSet> {
        self.commitments.as_ref()
    }
}

/// A signed proof-of-life. Semantically replaceable: for a given
/// `(signer, switch_id)` only the record with the greatest timestamp is
/// authoritative; ties are broken by comparing signature bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    switch_id: SwitchId,
    signer: switch_core::schnorr::PublicKey,
    /// Strictly-increasing per-signer counter, independent of clock time.
    counter: u64,
    timestamp: SystemTime,
    signature: [u8; 64],
}

impl HeartbeatRecord {
    /// Builds the byte string that gets signed: the switch id, signer,
    /// counter, and timestamp, each length-prefixed-free but
    /// unambiguous because every field has a fixed width.
    fn signing_bytes(switch_id: SwitchId, counter: u64, timestamp: SystemTime) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + 8 + 8);
        buf.extend_from_slice(switch_id.into_uuid().as_bytes());
        buf.extend_from_slice(&counter.to_be_bytes());
        let secs = timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        buf.extend_from_slice(&secs.to_be_bytes());
        buf
    }

    /// Signs and constructs a new heartbeat record.
    pub fn sign(
        signing_key: &switch_core::schnorr::PrivateKey,
        switch_id: SwitchId,
        counter: u64,
        timestamp: SystemTime,
    ) -> Self {
        let message = Self::signing_bytes(switch_id, counter, timestamp);
        let signature = signing_key.sign(&message);
        Self {
            switch_id,
            signer: signing_key.public_key(),
            counter,
            timestamp,
            signature,
        }
    }

    /// Verifies the record's signature against `owner_public_key` and
    /// checks that its timestamp is not further in the future than
    /// `skew_tolerance`. Does not check the switch id matches the
    /// caller's expectation - callers must compare [`HeartbeatRecord::switch_id`] themselves.
    pub fn verify(&self, owner_public_key: switch_core::schnorr::PublicKey, now: SystemTime, skew_tolerance: Duration) -> bool {
        if self.signer != owner_public_key {
            return false;
        }
        if self.timestamp > now + skew_tolerance {
            return false;
        }
        let message = Self::signing_bytes(self.switch_id, self.counter, self.timestamp);
        owner_public_key.verify(&message, &self.signature)
    }

    /// The switch this heartbeat attests to.
    pub fn switch_id(&self) -> SwitchId {
        self.switch_id
    }

    /// The owner's signing public key.
    pub fn signer(&self) -> switch_core::schnorr::PublicKey {
        self.signer
    }

    /// The heartbeat's timestamp.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// The raw signature bytes, used only for the latest-wins tiebreak.
    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    /// Selects the authoritative record among heartbeats for a single
    /// `(signer, switch_id)`: the greatest timestamp wins, with ties
    /// broken by the greater signature bytes.
    pub fn authoritative(records: &[HeartbeatRecord]) -> Option<&HeartbeatRecord> {
        records.iter().max_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.signature.cmp(&b.signature))
        })
    }
}

/// A watcher's publication of its share, addressed individually to each
/// recipient. At most one authoritative record per `(switch, watcher)`:
/// the record is idempotent by construction, keyed by that pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    switch_id: SwitchId,
    watcher_signer: switch_core::schnorr::PublicKey,
    share_index: u8,
    per_recipient: Vec<(RecipientId, Vec<u8>)>,
    timestamp: SystemTime,
    signature: [u8; 64],
}

impl ReleaseRecord {
    fn signing_bytes(switch_id: SwitchId, share_index: u8, timestamp: SystemTime) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + 1 + 8);
        buf.extend_from_slice(switch_id.into_uuid().as_bytes());
        buf.push(share_index);
        let secs = timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        buf.extend_from_slice(&secs.to_be_bytes());
        buf
    }

    /// Signs and constructs a release record for a watcher's share,
    /// already sealed individually to each recipient.
    pub fn sign(
        watcher_signing_key: &switch_core::schnorr::PrivateKey,
        switch_id: SwitchId,
        share_index: u8,
        per_recipient: Vec<(RecipientId, Vec<u8>)>,
        timestamp: SystemTime,
    ) -> Self {
        let message = Self::signing_bytes(switch_id, share_index, timestamp);
        let signature = watcher_signing_key.sign(&message);
        Self {
            switch_id,
            watcher_signer: watcher_signing_key.public_key(),
            share_index,
            per_recipient,
            timestamp,
            signature,
        }
    }

    /// Verifies the record's signature against the watcher's recorded
    /// public key.
    pub fn verify(&self, watcher_public_key: switch_core::schnorr::PublicKey) -> bool {
        if self.watcher_signer != watcher_public_key {
            return false;
        }
        let message = Self::signing_bytes(self.switch_id, self.share_index, self.timestamp);
        watcher_public_key.verify(&message, &self.signature)
    }

    /// The switch this release record pertains to.
    pub fn switch_id(&self) -> SwitchId {
        self.switch_id
    }

    /// The watcher's signing public key.
    pub fn watcher_signer(&self) -> switch_core::schnorr::PublicKey {
        self.watcher_signer
    }

    /// The share's `x` coordinate.
    pub fn share_index(&self) -> u8 {
        self.share_index
    }

    /// The record's timestamp, used to detect retraction races against
    /// a cancellation record.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// The sealed share addressed to `recipient`, if this record
    /// addresses that recipient.
    pub fn sealed_share_for(&self, recipient: RecipientId) -> Option<&[u8]> {
        self.per_recipient
            .iter()
            .find(|(id, _)| *id == recipient)
            .map(|(_, sealed)| sealed.as_slice())
    }
}

/// An owner-signed suppression of a scheduled release, published after
/// a refresh is missed but before - or racing - watcher release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRecord {
    switch_id: SwitchId,
    signer: switch_core::schnorr::PublicKey,
    timestamp: SystemTime,
    signature: [u8; 64],
}

impl CancellationRecord {
    fn signing_bytes(switch_id: SwitchId, timestamp: SystemTime) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + 8);
        buf.extend_from_slice(switch_id.into_uuid().as_bytes());
        let secs = timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        buf.extend_from_slice(&secs.to_be_bytes());
        buf
    }

    /// Signs and constructs a cancellation record.
    pub fn sign(
        owner_signing_key: &switch_core::schnorr::PrivateKey,
        switch_id: SwitchId,
        timestamp: SystemTime,
    ) -> Self {
        let message = Self::signing_bytes(switch_id, timestamp);
        let signature = owner_signing_key.sign(&message);
        Self {
            switch_id,
            signer: owner_signing_key.public_key(),
            timestamp,
            signature,
        }
    }

    /// Verifies the record's signature against the owner's recorded
    /// public key.
    pub fn verify(&self, owner_public_key: switch_core::schnorr::PublicKey) -> bool {
        if self.signer != owner_public_key {
            return false;
        }
        let message = Self::signing_bytes(self.switch_id, self.timestamp);
        owner_public_key.verify(&message, &self.signature)
    }

    /// The switch this cancellation pertains to.
    pub fn switch_id(&self) -> SwitchId {
        self.switch_id
    }

    /// The cancellation's timestamp, compared against a release
    /// record's timestamp to decide whether the watcher must retract.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn signing_key() -> switch_core::schnorr::PrivateKey {
        switch_core::schnorr::PrivateKey::generate(&mut StdRng::seed_from_u64(11))
    }

    #[test]
    fn heartbeat_sign_verify_roundtrip() {
        let key = signing_key();
        let switch_id = SwitchId::generate();
        let hb = HeartbeatRecord::sign(&key, switch_id, 1, SystemTime::UNIX_EPOCH);
        assert!(hb.verify(key.public_key(), SystemTime::UNIX_EPOCH, Duration::from_secs(300)));
    }

    #[test]
    fn heartbeat_rejects_future_beyond_skew() {
        let key = signing_key();
        let switch_id = SwitchId::generate();
        let future = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        let hb = HeartbeatRecord::sign(&key, switch_id, 1, future);
        assert!(!hb.verify(key.public_key(), SystemTime::UNIX_EPOCH, Duration::from_secs(300)));
    }

    #[test]
    fn heartbeat_authoritative_picks_greatest_timestamp() {
        let key = signing_key();
        let switch_id = SwitchId::generate();
        let older = HeartbeatRecord::sign(&key, switch_id, 1, SystemTime::UNIX_EPOCH);
        let newer = HeartbeatRecord::sign(
            &key,
            switch_id,
            2,
            SystemTime::UNIX_EPOCH + Duration::from_secs(10),
        );
        let records = vec![older.clone(), newer.clone()];
        let chosen = HeartbeatRecord::authoritative(&records).unwrap();
        assert_eq!(chosen.timestamp(), newer.timestamp());
    }

    #[test]
    fn heartbeat_authoritative_breaks_ties_by_signature() {
        // Two records with identical timestamps but from different
        // counters will generally carry different signatures; the
        // larger signature bytes must win regardless of insertion order.
        let key = signing_key();
        let switch_id = SwitchId::generate();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(500);
        let a = HeartbeatRecord::sign(&key, switch_id, 1, t);
        let b = HeartbeatRecord::sign(&key, switch_id, 2, t);
        let expected = if a.signature() >= b.signature() { a.signature().to_vec() } else { b.signature().to_vec() };
        let chosen = HeartbeatRecord::authoritative(&[a, b]).unwrap();
        assert_eq!(chosen.signature().to_vec(), expected);
    }

    #[test]
    fn release_record_sign_verify_roundtrip() {
        let key = signing_key();
        let switch_id = SwitchId::generate();
        let recipient = RecipientId::generate();
        let record = ReleaseRecord::sign(
            &key,
            switch_id,
            3,
            vec![(recipient, vec![1, 2, 3])],
            SystemTime::UNIX_EPOCH,
        );
        assert!(record.verify(key.public_key()));
        assert_eq!(record.sealed_share_for(recipient), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn release_record_wrong_key_fails() {
        let key = signing_key();
        let other = signing_key();
        let switch_id = SwitchId::generate();
        let record = ReleaseRecord::sign(&key, switch_id, 3, Vec::new(), SystemTime::UNIX_EPOCH);
        assert!(!record.verify(other.public_key()));
    }

    #[test]
    fn cancellation_sign_verify_roundtrip() {
        let key = signing_key();
        let switch_id = SwitchId::generate();
        let record = CancellationRecord::sign(&key, switch_id, SystemTime::UNIX_EPOCH);
        assert!(record.verify(key.public_key()));
    }
}
