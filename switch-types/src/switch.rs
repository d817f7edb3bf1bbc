//! The [`Switch`] aggregate: a switch's identity, threshold policy, and
//! lifecycle state, independent of the payload bytes it guards.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::SwitchError;
use crate::ids::{RecipientId, SwitchId, WatcherId};
use crate::records::ShareEnvelope;

/// The `(N, M)` threshold policy of a switch: `M` of `N` watchers must
/// publish a verifying release record to reconstruct the payload key.
///
/// Immutable after creation. Constructed only through [`ThresholdParams::new`],
/// which enforces `2 <= M <= N <= 15` and `2M >= N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParams {
    n: u8,
    m: u8,
}

impl ThresholdParams {
    /// The largest number of watchers a switch may enroll.
    pub const MAX_WATCHERS: u8 = 15;

    /// Validates and constructs a threshold policy.
    pub fn new(n: u8, m: u8) -> Result<Self, SwitchError> {
        if m < 2 || n > Self::MAX_WATCHERS || n == 0 || m > n || 2 * m < n {
            return Err(SwitchError::InvalidParameters(format!(
                "threshold policy n={n}, m={m} violates 2 <= m <= n <= {}, 2m >= n",
                Self::MAX_WATCHERS
            )));
        }
        Ok(Self { n, m })
    }

    /// Total watcher count.
    pub fn n(self) -> u8 {
        self.n
    }

    /// Required quorum size.
    pub fn m(self) -> u8 {
        self.m
    }
}

/// The lifecycle state of a switch. See the release state machine for
/// the transitions between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchState {
    /// Heartbeats are current; no release condition is pending.
    Armed,
    /// A configured proportion of the interval elapsed without a
    /// refresh; the owner has been notified but watchers see no
    /// externally visible change.
    Warning,
    /// The deadline plus grace period has passed without a newer
    /// authoritative heartbeat. Watchers may begin publishing release
    /// records.
    Expired,
    /// At least one watcher has published a release record but fewer
    /// than `M` verifying records have been observed yet.
    Releasing,
    /// A recipient (or any observer) has assembled `M` verifying
    /// release records. Terminal.
    Released,
    /// The owner published a cancellation record before quorum was
    /// reached. Terminal.
    Cancelled,
}

impl SwitchState {
    /// Terminal states never transition to any other state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Cancelled)
    }
}

/// The root aggregate: a switch's identity, policy, lifecycle, and the
/// per-watcher share envelopes produced at enrollment.
///
/// Invariants upheld by the methods on this type, not by callers
/// mutating fields directly:
/// - `deadline == last_refresh + interval` while `Armed`.
/// - `state` transitions are monotonic except that `Armed` is
///   re-entered only via [`Switch::refresh`].
/// - `threshold` is immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Switch {
    id: SwitchId,
    owner_id: uuid::Uuid,
    sealed_payload: Vec<u8>,
    threshold: ThresholdParams,
    interval: Duration,
    deadline: SystemTime,
    created_at: SystemTime,
    last_refresh: SystemTime,
    state: SwitchState,
    envelopes: Vec<ShareEnvelope>,
    owner_signing_public_key: switch_core::schnorr::PublicKey,
    notarization_anchor: Option<String>,
    recipients: Vec<(RecipientId, [u8; 32])>,
}

impl Switch {
    /// Constructs a new switch in the `Armed` state with
    /// `deadline = created_at + interval`.
    ///
    /// `recipients` lists the sealed-box public key each watcher must
    /// reseal its share to once the switch releases (§4.8); it is fixed
    /// at enrollment time, same as `envelopes`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner_id: uuid::Uuid,
        sealed_payload: Vec<u8>,
        threshold: ThresholdParams,
        interval: Duration,
        created_at: SystemTime,
        envelopes: Vec<ShareEnvelope>,
        owner_signing_public_key: switch_core::schnorr::PublicKey,
        recipients: Vec<(RecipientId, [u8; 32])>,
    ) -> Self {
        Self {
            id: SwitchId::generate(),
            owner_id,
            sealed_payload,
            threshold,
            interval,
            deadline: created_at + interval,
            created_at,
            last_refresh: created_at,
            state: SwitchState::Armed,
            envelopes,
            owner_signing_public_key,
            notarization_anchor: None,
            recipients,
        }
    }

    /// The recipients this switch releases to, and the sealed-box public
    /// key each watcher must reseal its share under once the switch
    /// expires.
    pub fn recipients(&self) -> &[(RecipientId, [u8; 32])] {
        &self.recipients
    }

    /// The switch's stable identifier.
    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// The owner's account id, opaque to this crate beyond addressing
    /// reminders and other owner-facing notifications.
    pub fn owner_id(&self) -> uuid::Uuid {
        self.owner_id
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SwitchState {
        self.state
    }

    /// The currently configured deadline.
    pub fn deadline(&self) -> SystemTime {
        self.deadline
    }

    /// Threshold policy, immutable after construction.
    pub fn threshold(&self) -> ThresholdParams {
        self.threshold
    }

    /// The owner's signing public key, used to verify heartbeats and
    /// cancellation records for this switch.
    pub fn owner_signing_public_key(&self) -> switch_core::schnorr::PublicKey {
        self.owner_signing_public_key
    }

    /// The sealed payload: `nonce || ciphertext || tag`.
    pub fn sealed_payload(&self) -> &[u8] {
        &self.sealed_payload
    }

    /// The share envelope addressed to `watcher`, if this switch
    /// enrolled that watcher.
    pub fn envelope_for(&self, watcher: WatcherId) -> Option<&ShareEnvelope> {
        self.envelopes.iter().find(|e| e.watcher_id() == watcher)
    }

    /// All share envelopes produced at enrollment.
    pub fn envelopes(&self) -> &[ShareEnvelope] {
        &self.envelopes
    }

    /// Attaches an opaque notarization anchor (e.g. a Bitcoin timelock
    /// reference). Out of scope for this crate beyond storage.
    pub fn set_notarization_anchor(&mut self, anchor: String) {
        self.notarization_anchor = Some(anchor);
    }

    /// The opaque notarization anchor, if any.
    pub fn notarization_anchor(&self) -> Option<&str> {
        self.notarization_anchor.as_deref()
    }

    /// Accepts a refresh: only valid from `Armed` or `Warning`, and only
    /// when `heartbeat_time` is strictly newer than the last refresh.
    /// Resets `deadline = heartbeat_time + interval` and re-enters `Armed`.
    pub fn refresh(&mut self, heartbeat_time: SystemTime) -> Result<(), SwitchError> {
        if self.state.is_terminal() {
            return Err(SwitchError::StateConflict(format!(
                "refresh rejected: switch is in terminal state {:?}",
                self.state
            )));
        }
        if !matches!(self.state, SwitchState::Armed | SwitchState::Warning) {
            return Err(SwitchError::StateConflict(format!(
                "refresh rejected from state {:?}",
                self.state
            )));
        }
        if heartbeat_time <= self.last_refresh {
            return Err(SwitchError::StateConflict(
                "heartbeat is not newer than the last refresh".to_string(),
            ));
        }
        self.last_refresh = heartbeat_time;
        self.deadline = heartbeat_time + self.interval;
        self.state = SwitchState::Armed;
        Ok(())
    }

    /// Time-driven: moves `Armed` to `Warning` once `warning_threshold`
    /// of the interval has elapsed without a refresh. A no-op once the
    /// switch has already progressed past `Armed`.
    pub fn evaluate_warning(&mut self, now: SystemTime, warning_fraction: f64) {
        if self.state != SwitchState::Armed {
            return;
        }
        let Ok(elapsed) = now.duration_since(self.last_refresh) else {
            return;
        };
        let threshold = self.interval.mul_f64(warning_fraction.clamp(0.0, 1.0));
        if elapsed >= threshold {
            self.state = SwitchState::Warning;
        }
    }

    /// Time-driven: moves `Armed`/`Warning` to `Expired` once
    /// `now > deadline + grace`. A no-op once the switch is terminal or
    /// already expired or later.
    pub fn evaluate_expiry(&mut self, now: SystemTime, grace: Duration) {
        if !matches!(self.state, SwitchState::Armed | SwitchState::Warning) {
            return;
        }
        if now > self.deadline + grace {
            self.state = SwitchState::Expired;
        }
    }

    /// Records that at least one watcher has begun publishing a release
    /// record. Valid only from `Expired`.
    pub fn begin_releasing(&mut self) -> Result<(), SwitchError> {
        if self.state != SwitchState::Expired {
            return Err(SwitchError::StateConflict(format!(
                "cannot begin releasing from state {:?}",
                self.state
            )));
        }
        self.state = SwitchState::Releasing;
        Ok(())
    }

    /// Marks the switch `Released`. This is a derived fact computed by
    /// whichever observer assembled `M` verifying release records; it
    /// is never reversible.
    pub fn mark_released(&mut self) {
        if !self.state.is_terminal() {
            self.state = SwitchState::Released;
        }
    }

    /// Authenticated by the owner's signing key at the call site; marks
    /// the switch `Cancelled`. Rejected once the switch has already
    /// reached a terminal state.
    pub fn cancel(&mut self) -> Result<(), SwitchError> {
        if self.state.is_terminal() {
            return Err(SwitchError::StateConflict(format!(
                "cannot cancel from terminal state {:?}",
                self.state
            )));
        }
        self.state = SwitchState::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn public_key() -> switch_core::schnorr::PublicKey {
        switch_core::schnorr::PrivateKey::generate(&mut StdRng::seed_from_u64(7)).public_key()
    }

    fn new_switch(interval: Duration) -> Switch {
        Switch::new(
            uuid::Uuid::new_v4(),
            vec![0u8; 16],
            ThresholdParams::new(5, 3).unwrap(),
            interval,
            SystemTime::UNIX_EPOCH,
            Vec::new(),
            public_key(),
            Vec::new(),
        )
    }

    #[test]
    fn threshold_rejects_invalid_policies() {
        assert!(ThresholdParams::new(5, 1).is_err()); // m < 2
        assert!(ThresholdParams::new(0, 2).is_err()); // n == 0
        assert!(ThresholdParams::new(3, 5).is_err()); // m > n
        assert!(ThresholdParams::new(10, 3).is_err()); // 2m < n
        assert!(ThresholdParams::new(20, 15).is_err()); // n > 15
        assert!(ThresholdParams::new(5, 3).is_ok());
    }

    #[test]
    fn refresh_extends_deadline_and_stays_armed() {
        let interval = Duration::from_secs(3600);
        let mut switch = new_switch(interval);
        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        switch.refresh(t1).unwrap();
        assert_eq!(switch.state(), SwitchState::Armed);
        assert_eq!(switch.deadline(), t1 + interval);
    }

    #[test]
    fn refresh_rejects_non_newer_heartbeat() {
        let mut switch = new_switch(Duration::from_secs(3600));
        assert!(switch.refresh(SystemTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn warning_then_expiry_then_terminal_is_monotonic() {
        let interval = Duration::from_secs(3600);
        let mut switch = new_switch(interval);
        let warn_at = SystemTime::UNIX_EPOCH + Duration::from_secs(2800);
        switch.evaluate_warning(warn_at, 0.75);
        assert_eq!(switch.state(), SwitchState::Warning);

        let expire_at = SystemTime::UNIX_EPOCH + interval + Duration::from_secs(1);
        switch.evaluate_expiry(expire_at, Duration::ZERO);
        assert_eq!(switch.state(), SwitchState::Expired);

        switch.begin_releasing().unwrap();
        switch.mark_released();
        assert_eq!(switch.state(), SwitchState::Released);

        // Released is terminal: refresh, cancel, and re-expiry must not move it.
        assert!(switch.refresh(SystemTime::now()).is_err());
        assert!(switch.cancel().is_err());
        switch.evaluate_expiry(SystemTime::now(), Duration::ZERO);
        assert_eq!(switch.state(), SwitchState::Released);
    }

    #[test]
    fn cancel_from_expired_is_terminal() {
        let mut switch = new_switch(Duration::from_secs(3600));
        switch.evaluate_expiry(
            SystemTime::UNIX_EPOCH + Duration::from_secs(7200),
            Duration::ZERO,
        );
        switch.cancel().unwrap();
        assert_eq!(switch.state(), SwitchState::Cancelled);
        assert!(switch.cancel().is_err());
    }
}
