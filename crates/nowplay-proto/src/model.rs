use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A track as reported by the upstream service.  Immutable once received —
/// the reconciler replaces the whole value when the track changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: String,
    /// URL of the album art, when the upstream provided one.
    #[serde(default)]
    pub album_art_url: Option<String>,
    /// Total track length in milliseconds.
    pub duration_ms: u64,
    /// Link to the track on the upstream service.
    #[serde(default)]
    pub external_url: Option<String>,
}

impl Track {
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// The single reconciled playback state shared by all consumers.  `rev` is a
/// monotonically increasing counter incremented on every store write, so a
/// consumer can detect missed updates.
///
/// `progress_ms` only moves backwards when a server value supersedes the
/// local estimate or when it wraps to 0 at track completion.  `last_played_at`
/// is populated from the recently-played source and is only meaningful while
/// `is_playing` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    #[serde(default)]
    pub rev: u64,
    pub track: Option<Track>,
    pub is_playing: bool,
    pub progress_ms: u64,
    /// When `progress_ms` was last set from a server response (not from local
    /// estimation).  The estimator uses this to avoid double-advancing.
    pub last_server_sync_at: DateTime<Utc>,
    /// Timestamp of the last play, from the recently-played source.
    pub last_played_at: Option<DateTime<Utc>>,
    pub is_authorized: bool,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            rev: 0,
            track: None,
            is_playing: false,
            progress_ms: 0,
            last_server_sync_at: DateTime::<Utc>::UNIX_EPOCH,
            last_played_at: None,
            is_authorized: true,
        }
    }
}

impl PlaybackSnapshot {
    /// Playback position as a fraction of track length, for the consuming
    /// view's progress bar.  None when no track is loaded.
    pub fn progress_percent(&self) -> Option<f64> {
        let track = self.track.as_ref()?;
        if track.duration_ms == 0 {
            return Some(0.0);
        }
        Some((self.progress_ms as f64 / track.duration_ms as f64).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(duration_ms: u64) -> Track {
        Track {
            id: "t1".into(),
            title: "Song".into(),
            artists: vec!["A".into(), "B".into()],
            duration_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_percent() {
        let snap = PlaybackSnapshot {
            track: Some(track(200_000)),
            progress_ms: 50_000,
            ..Default::default()
        };
        assert_eq!(snap.progress_percent(), Some(0.25));
    }

    #[test]
    fn test_progress_percent_clamps_past_duration() {
        let snap = PlaybackSnapshot {
            track: Some(track(100)),
            progress_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(snap.progress_percent(), Some(1.0));
    }

    #[test]
    fn test_progress_percent_without_track() {
        assert!(PlaybackSnapshot::default().progress_percent().is_none());
    }

    #[test]
    fn test_artist_line() {
        assert_eq!(track(1).artist_line(), "A, B");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snap = PlaybackSnapshot {
            rev: 7,
            track: Some(track(180_000)),
            is_playing: true,
            progress_ms: 42_000,
            ..Default::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: PlaybackSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rev, 7);
        assert_eq!(back.track.unwrap().id, "t1");
        assert!(back.is_playing);
        assert_eq!(back.progress_ms, 42_000);
    }
}
