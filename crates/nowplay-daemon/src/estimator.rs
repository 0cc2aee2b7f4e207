//! Local playback-position interpolation between server updates.
//!
//! The poller syncs `progress_ms` from the server every 10 s at best; without
//! interpolation the displayed position would freeze between polls.  A 1 Hz
//! tick advances it locally, but only when no server value landed within the
//! last 2 s — otherwise a poll and a tick in the same second would
//! double-advance the position.

use crate::clock::Clock;
use nowplay_proto::model::PlaybackSnapshot;
use nowplay_proto::snapshot::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TICK_MS: u64 = 1_000;
/// A server sync younger than this suppresses the local advance.
const SERVER_FRESHNESS_MS: i64 = 2_000;

/// One estimation step.  Returns the new `progress_ms` when a local advance
/// should be written, None when the tick is a no-op (not playing, no track,
/// or a fresh server value exists).
pub fn estimate_tick(snap: &PlaybackSnapshot, now: chrono::DateTime<chrono::Utc>) -> Option<u64> {
    if !snap.is_playing {
        return None;
    }
    let track = snap.track.as_ref()?;
    let since_sync = (now - snap.last_server_sync_at).num_milliseconds();
    if since_sync <= SERVER_FRESHNESS_MS {
        return None;
    }
    let advanced = snap.progress_ms + TICK_MS;
    if advanced >= track.duration_ms {
        // Anticipate the track change the next poll will confirm.
        Some(0)
    } else {
        Some(advanced)
    }
}

/// Apply one tick against the live snapshot, inside a single store critical
/// section — a reconciled replace can never land between the read the
/// estimate was computed from and its write.  Returns the written position,
/// if any.
async fn apply_tick(store: &SnapshotStore, now: chrono::DateTime<chrono::Utc>) -> Option<u64> {
    let mut written = None;
    store
        .update(|snap| match estimate_tick(snap, now) {
            Some(progress_ms) => {
                snap.progress_ms = progress_ms;
                written = Some(progress_ms);
                true
            }
            None => false,
        })
        .await;
    written
}

/// 1 Hz estimation task.  Writes back only the position.  Exits when the
/// token is cancelled.
pub async fn run(store: SnapshotStore, clock: Arc<dyn Clock>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("estimator stopped");
                return;
            }
            _ = ticker.tick() => {
                if apply_tick(&store, clock.now()).await == Some(0) {
                    debug!("estimated position wrapped at track end");
                }
            }
        }
    }
}
