//! This watcher's side of the release state machine (§4.8): once a
//! switch's deadline plus grace has passed, a watcher unseals its own
//! enrollment share, reseals it individually to every recipient, and
//! publishes the resulting [`ReleaseRecord`]. Separately, it observes
//! the release topic to track whether `M` distinct, self-consistently
//! signed shares have appeared - a bookkeeping signal surfaced through
//! this watcher's view of [`SwitchState`], not the security boundary
//! itself (that boundary is the per-share MAC, checked by whoever
//! actually reconstructs the key in `switch-client::recovery`).

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use rand::{CryptoRng, RngCore};
use switch_core::sealed_box;
use switch_types::error::SwitchError;
use switch_types::records::ReleaseRecord;
use switch_types::substrate::{Record, Substrate, Topic};
use switch_types::switch::{Switch, SwitchState};
use tracing::instrument;

use crate::identity::WatcherIdentity;

use super::collect;

/// Publishes this watcher's own release record for `switch`, if it has
/// expired and this watcher has not already published one. Returns
/// `Ok(false)` without publishing if the switch is not `Expired`, has no
/// envelope addressed to this watcher, or a release for this watcher's
/// share index is already on the substrate.
#[instrument(skip_all, fields(switch_id = %switch.id(), watcher = %identity.id()))]
pub(crate) async fn publish_release_if_expired(
    switch: &Switch,
    identity: &WatcherIdentity,
    substrate: &dyn Substrate,
    snapshot_timeout: Duration,
    now: SystemTime,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<bool, SwitchError> {
    if switch.state() != SwitchState::Expired {
        return Ok(false);
    }
    let Some(envelope) = switch.envelope_for(identity.id()) else {
        return Ok(false);
    };

    let already_published = collect::snapshot(substrate, Topic::Release(switch.id()), snapshot_timeout)
        .await?
        .into_iter()
        .any(|record| match record {
            Record::Release(release) => {
                release.share_index() == envelope.share_index()
                    && release.watcher_signer() == identity.signing_key().public_key()
            }
            _ => false,
        });
    if already_published {
        return Ok(false);
    }

    let share_bytes = sealed_box::open(identity.unseal_keys(), envelope.sealed_share())
        .map_err(SwitchError::from)?;

    let mut per_recipient = Vec::with_capacity(switch.recipients().len());
    for &(recipient_id, recipient_public) in switch.recipients() {
        let resealed = sealed_box::seal(&recipient_public, &share_bytes, rng);
        per_recipient.push((recipient_id, resealed));
    }

    let record = ReleaseRecord::sign(
        identity.signing_key(),
        switch.id(),
        envelope.share_index(),
        per_recipient,
        now,
    );
    substrate
        .publish(Topic::Release(switch.id()), Record::Release(record))
        .await?;
    tracing::info!(share_index = envelope.share_index(), "published release record");
    Ok(true)
}

/// Counts distinct, self-consistently-signed release indices observed
/// for `switch`, and reports whether that count has reached the
/// switch's threshold.
#[instrument(skip_all, fields(switch_id = %switch.id()))]
pub(crate) async fn quorum_reached(
    switch: &Switch,
    substrate: &dyn Substrate,
    snapshot_timeout: Duration,
) -> Result<bool, SwitchError> {
    let records = collect::snapshot(substrate, Topic::Release(switch.id()), snapshot_timeout).await?;
    let mut indices = HashSet::new();
    for record in records {
        let Record::Release(release) = record else { continue };
        if release.verify(release.watcher_signer()) {
            indices.insert(release.share_index());
        }
    }
    Ok(indices.len() >= switch.threshold().m() as usize)
}
