//! Decision logic merging the two upstream reads into the next snapshot.
//!
//! Pure functions: the poller hands in the classified outcome and the
//! previous snapshot, and gets back what to store plus what to tell the
//! backoff controller.  Degradation policy throughout: keep last-known-good
//! data rather than surfacing a transient failure to the consumer.

use crate::backoff::BackoffSignal;
use crate::fetch::{PlaybackOutcome, RecentOutcome};
use chrono::{DateTime, Utc};
use nowplay_proto::model::PlaybackSnapshot;
use tracing::{debug, info};

/// What to do after the current-playback read.
#[derive(Debug)]
pub enum PlaybackStep {
    /// Store the new snapshot.
    Apply {
        snapshot: PlaybackSnapshot,
        signal: BackoffSignal,
    },
    /// Leave the snapshot alone.
    Unchanged { signal: BackoffSignal },
    /// Idle or ad break — resolve the display from the recently-played read.
    FetchRecent,
}

pub fn reconcile_playback(
    outcome: &PlaybackOutcome,
    prev: &PlaybackSnapshot,
    now: DateTime<Utc>,
) -> PlaybackStep {
    match outcome {
        PlaybackOutcome::Unauthorized => {
            // A single transient 401 must not blank an already-displayed
            // track.  Only flip the flag when there is nothing to fall
            // back on.
            if prev.track.is_some() {
                debug!("401 suppressed: cached track still displayed");
                PlaybackStep::Unchanged {
                    signal: BackoffSignal::Success,
                }
            } else {
                let mut next = prev.clone();
                next.is_authorized = false;
                next.is_playing = false;
                PlaybackStep::Apply {
                    snapshot: next,
                    signal: BackoffSignal::Success,
                }
            }
        }
        PlaybackOutcome::RateLimited { retry_after_ms } => PlaybackStep::Unchanged {
            signal: BackoffSignal::Failure {
                hint_ms: *retry_after_ms,
            },
        },
        PlaybackOutcome::NetworkError => PlaybackStep::Unchanged {
            signal: BackoffSignal::Failure { hint_ms: None },
        },
        PlaybackOutcome::Playing { track, progress_ms } => {
            let mut next = prev.clone();
            let same_track = prev
                .track
                .as_ref()
                .map(|t| t.id == track.id)
                .unwrap_or(false);
            if !same_track {
                info!(
                    "now playing: {} — {}",
                    track.artist_line(),
                    track.title
                );
                next.track = Some(track.clone());
            }
            // Same id: keep the displayed track value stable and only take
            // the server's position, which is authoritative over estimation
            // drift.
            next.progress_ms = *progress_ms;
            next.last_server_sync_at = now;
            next.is_playing = true;
            next.last_played_at = None;
            next.is_authorized = true;
            PlaybackStep::Apply {
                snapshot: next,
                signal: BackoffSignal::Success,
            }
        }
        PlaybackOutcome::NoContent | PlaybackOutcome::AdBreak => PlaybackStep::FetchRecent,
    }
}

/// Resolve the idle/ad-break display from the recently-played read.  Returns
/// the snapshot to store, if any.
pub fn reconcile_recent(
    outcome: &RecentOutcome,
    prev: &PlaybackSnapshot,
) -> (Option<PlaybackSnapshot>, BackoffSignal) {
    match outcome {
        RecentOutcome::Unauthorized => {
            if prev.track.is_some() {
                debug!("401 on recently-played suppressed: cached track still displayed");
                (None, BackoffSignal::Success)
            } else {
                let mut next = prev.clone();
                next.is_authorized = false;
                next.is_playing = false;
                (Some(next), BackoffSignal::Success)
            }
        }
        RecentOutcome::RateLimited { retry_after_ms } => (
            None,
            BackoffSignal::Failure {
                hint_ms: *retry_after_ms,
            },
        ),
        RecentOutcome::NetworkError => (None, BackoffSignal::Failure { hint_ms: None }),
        RecentOutcome::Items(items) => match items.first() {
            Some(entry) => {
                let mut next = prev.clone();
                next.track = Some(entry.track.clone());
                next.is_playing = false;
                next.progress_ms = 0;
                next.last_played_at = Some(entry.played_at);
                next.is_authorized = true;
                (Some(next), BackoffSignal::Success)
            }
            // Empty history between polls must not clear a displayed track.
            None => (None, BackoffSignal::Success),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RecentEntry;
    use nowplay_proto::model::Track;

    fn track(id: &str, duration_ms: u64) -> Track {
        Track {
            id: id.into(),
            title: format!("Title {id}"),
            artists: vec!["Artist".into()],
            duration_ms,
            ..Default::default()
        }
    }

    fn playing_snapshot(id: &str, progress_ms: u64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            track: Some(track(id, 200_000)),
            is_playing: true,
            progress_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_playing_outcome_populates_snapshot() {
        let now = Utc::now();
        let outcome = PlaybackOutcome::Playing {
            track: track("A", 200_000),
            progress_ms: 5_000,
        };
        match reconcile_playback(&outcome, &PlaybackSnapshot::default(), now) {
            PlaybackStep::Apply { snapshot, signal } => {
                assert_eq!(signal, BackoffSignal::Success);
                assert_eq!(snapshot.track.as_ref().unwrap().id, "A");
                assert!(snapshot.is_playing);
                assert_eq!(snapshot.progress_ms, 5_000);
                assert_eq!(snapshot.last_server_sync_at, now);
                assert!(snapshot.last_played_at.is_none());
            }
            other => panic!("expected Apply, got {:?}", other),
        }
    }

    #[test]
    fn test_same_track_keeps_identity_and_takes_server_progress() {
        let now = Utc::now();
        let mut prev = playing_snapshot("A", 9_000);
        // the displayed value may carry state the wire copy lacks
        prev.track.as_mut().unwrap().album = "Local Album".into();

        let outcome = PlaybackOutcome::Playing {
            track: track("A", 200_000),
            progress_ms: 8_500,
        };
        match reconcile_playback(&outcome, &prev, now) {
            PlaybackStep::Apply { snapshot, .. } => {
                // server position is authoritative even when it moves back
                assert_eq!(snapshot.progress_ms, 8_500);
                assert_eq!(snapshot.last_server_sync_at, now);
                // track value untouched — no remount-equivalent reset
                assert_eq!(snapshot.track.as_ref().unwrap().album, "Local Album");
            }
            other => panic!("expected Apply, got {:?}", other),
        }
    }

    #[test]
    fn test_track_change_replaces_wholesale() {
        let prev = playing_snapshot("A", 190_000);
        let outcome = PlaybackOutcome::Playing {
            track: track("B", 180_000),
            progress_ms: 1_000,
        };
        match reconcile_playback(&outcome, &prev, Utc::now()) {
            PlaybackStep::Apply { snapshot, .. } => {
                assert_eq!(snapshot.track.as_ref().unwrap().id, "B");
                assert_eq!(snapshot.progress_ms, 1_000);
            }
            other => panic!("expected Apply, got {:?}", other),
        }
    }

    #[test]
    fn test_unauthorized_suppressed_with_cached_track() {
        let prev = playing_snapshot("A", 5_000);
        match reconcile_playback(&PlaybackOutcome::Unauthorized, &prev, Utc::now()) {
            PlaybackStep::Unchanged { signal } => assert_eq!(signal, BackoffSignal::Success),
            other => panic!("expected Unchanged, got {:?}", other),
        }
    }

    #[test]
    fn test_unauthorized_without_cached_track_flips_flag() {
        match reconcile_playback(
            &PlaybackOutcome::Unauthorized,
            &PlaybackSnapshot::default(),
            Utc::now(),
        ) {
            PlaybackStep::Apply { snapshot, .. } => {
                assert!(!snapshot.is_authorized);
                assert!(snapshot.track.is_none());
            }
            other => panic!("expected Apply, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limited_keeps_snapshot_and_passes_hint() {
        let prev = playing_snapshot("A", 5_000);
        match reconcile_playback(
            &PlaybackOutcome::RateLimited {
                retry_after_ms: Some(2_000),
            },
            &prev,
            Utc::now(),
        ) {
            PlaybackStep::Unchanged { signal } => assert_eq!(
                signal,
                BackoffSignal::Failure {
                    hint_ms: Some(2_000)
                }
            ),
            other => panic!("expected Unchanged, got {:?}", other),
        }
    }

    #[test]
    fn test_network_error_is_hintless_failure() {
        match reconcile_playback(
            &PlaybackOutcome::NetworkError,
            &PlaybackSnapshot::default(),
            Utc::now(),
        ) {
            PlaybackStep::Unchanged { signal } => {
                assert_eq!(signal, BackoffSignal::Failure { hint_ms: None })
            }
            other => panic!("expected Unchanged, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_and_ad_break_fall_through_to_recent() {
        let prev = playing_snapshot("A", 5_000);
        assert!(matches!(
            reconcile_playback(&PlaybackOutcome::NoContent, &prev, Utc::now()),
            PlaybackStep::FetchRecent
        ));
        assert!(matches!(
            reconcile_playback(&PlaybackOutcome::AdBreak, &prev, Utc::now()),
            PlaybackStep::FetchRecent
        ));
    }

    #[test]
    fn test_recent_items_take_first_entry() {
        let prev = playing_snapshot("A", 5_000);
        let played_at = Utc::now();
        let outcome = RecentOutcome::Items(vec![
            RecentEntry {
                track: track("R1", 100_000),
                played_at,
            },
            RecentEntry {
                track: track("R2", 100_000),
                played_at,
            },
        ]);
        let (snapshot, signal) = reconcile_recent(&outcome, &prev);
        assert_eq!(signal, BackoffSignal::Success);
        let snapshot = snapshot.expect("snapshot");
        assert_eq!(snapshot.track.as_ref().unwrap().id, "R1");
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.progress_ms, 0);
        assert_eq!(snapshot.last_played_at, Some(played_at));
    }

    #[test]
    fn test_empty_recent_is_a_no_op() {
        let prev = playing_snapshot("A", 5_000);
        let (snapshot, signal) = reconcile_recent(&RecentOutcome::Items(vec![]), &prev);
        assert!(snapshot.is_none());
        assert_eq!(signal, BackoffSignal::Success);
    }

    #[test]
    fn test_recent_unauthorized_suppression_mirrors_playback() {
        let prev = playing_snapshot("A", 5_000);
        let (snapshot, signal) = reconcile_recent(&RecentOutcome::Unauthorized, &prev);
        assert!(snapshot.is_none());
        assert_eq!(signal, BackoffSignal::Success);

        let (snapshot, _) =
            reconcile_recent(&RecentOutcome::Unauthorized, &PlaybackSnapshot::default());
        assert!(!snapshot.expect("snapshot").is_authorized);
    }

    #[test]
    fn test_recent_failures_feed_backoff() {
        let prev = PlaybackSnapshot::default();
        let (snapshot, signal) = reconcile_recent(&RecentOutcome::NetworkError, &prev);
        assert!(snapshot.is_none());
        assert_eq!(signal, BackoffSignal::Failure { hint_ms: None });

        let (_, signal) = reconcile_recent(
            &RecentOutcome::RateLimited {
                retry_after_ms: Some(7_000),
            },
            &prev,
        );
        assert_eq!(
            signal,
            BackoffSignal::Failure {
                hint_ms: Some(7_000)
            }
        );
    }
}
