//! The scheduling loop driving the upstream polls.
//!
//! One sequential loop: fetch → reconcile → store → sleep.  Being a single
//! task, at most one fetch is ever in flight and outcomes are reconciled in
//! issue order with no extra coordination.  The sleep is the base interval
//! (10 s playing / 30 s idle) unless the backoff controller holds a penalty,
//! which then takes precedence until a successful call clears it.
//!
//! Cancellation is a token, checked both in the select arm and after each
//! await, so results completing after shutdown are never applied.

use crate::backoff::Backoff;
use crate::clock::Clock;
use crate::fetch::UpstreamClient;
use crate::reconcile::{reconcile_playback, reconcile_recent, PlaybackStep};
use nowplay_proto::config::PollConfig;
use nowplay_proto::snapshot::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before the next poll.  A backoff penalty suspends the base interval
/// entirely; otherwise the interval follows the playing state.
pub fn next_poll_delay(is_playing: bool, backoff: &Backoff, poll: &PollConfig) -> Duration {
    if backoff.is_penalized() {
        Duration::from_millis(backoff.current_delay_ms())
    } else if is_playing {
        Duration::from_secs(poll.playing_interval_secs)
    } else {
        Duration::from_secs(poll.idle_interval_secs)
    }
}

pub struct Poller {
    client: UpstreamClient,
    store: SnapshotStore,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
    poll: PollConfig,
}

impl Poller {
    pub fn new(
        client: UpstreamClient,
        store: SnapshotStore,
        clock: Arc<dyn Clock>,
        poll: PollConfig,
    ) -> Self {
        let backoff = Backoff::new(poll.backoff_floor_ms, poll.backoff_cap_ms);
        Self {
            client,
            store,
            backoff,
            clock,
            poll,
        }
    }

    /// Poll loop.  The first fetch happens immediately; after that each
    /// iteration sleeps for the scheduling decision's delay.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "poller started (playing interval {}s, idle interval {}s)",
            self.poll.playing_interval_secs, self.poll.idle_interval_secs
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.poll_once(&cancel).await;

            let is_playing = self.store.get().await.is_playing;
            let delay = next_poll_delay(is_playing, &self.backoff, &self.poll);
            if self.backoff.is_penalized() {
                warn!("upstream penalty active, next poll in {:?}", delay);
            } else {
                debug!("next poll in {:?}", delay);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("poller stopped");
    }

    async fn poll_once(&mut self, cancel: &CancellationToken) {
        let prev = self.store.get().await;

        let outcome = self.client.current_playback().await;
        if cancel.is_cancelled() {
            return;
        }
        debug!("current-playback outcome: {:?}", outcome);

        match reconcile_playback(&outcome, &prev, self.clock.now()) {
            PlaybackStep::Apply { snapshot, signal } => {
                self.backoff.apply(&signal);
                self.store.replace(snapshot).await;
            }
            PlaybackStep::Unchanged { signal } => {
                self.backoff.apply(&signal);
            }
            PlaybackStep::FetchRecent => {
                let recent = self.client.recently_played().await;
                if cancel.is_cancelled() {
                    return;
                }
                let (snapshot, signal) = reconcile_recent(&recent, &prev);
                self.backoff.apply(&signal);
                if let Some(snapshot) = snapshot {
                    self.store.replace(snapshot).await;
                }
            }
        }
    }
}
