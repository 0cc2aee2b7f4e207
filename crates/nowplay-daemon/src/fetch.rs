//! Upstream reads and HTTP-outcome classification.
//!
//! The playback API is consumed through exactly two GETs: current playback
//! and recently played.  Each response is decoded **here**, once, into a
//! tagged outcome — the reconciler never inspects raw status codes or JSON.
//! Request failures of any kind are absorbed into the outcome taxonomy; no
//! error type escapes this module.

use chrono::{DateTime, Utc};
use nowplay_proto::model::Track;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// Classified result of the current-playback read.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    /// Credential invalid or absent.
    Unauthorized,
    /// Upstream asked for backoff; hint from the Retry-After header.
    RateLimited { retry_after_ms: Option<u64> },
    /// Nothing currently playing.
    NoContent,
    /// A track is actively playing.
    Playing { track: Track, progress_ms: u64 },
    /// Playback active but no track payload (e.g. an advertisement).  Not
    /// idle — the caller must fall through to recently-played.
    AdBreak,
    /// Request failed before a classifiable response was obtained.
    NetworkError,
}

/// Classified result of the recently-played read.
#[derive(Debug, Clone, PartialEq)]
pub enum RecentOutcome {
    Unauthorized,
    RateLimited { retry_after_ms: Option<u64> },
    /// Most-recent-first play history.
    Items(Vec<RecentEntry>),
    NetworkError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentEntry {
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("playing response carried no progress_ms")]
    MissingProgress,
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CurrentPlaybackBody {
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    #[serde(default)]
    album: Option<AlbumRef>,
    duration_ms: u64,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayedBody {
    #[serde(default)]
    items: Vec<RecentItem>,
}

#[derive(Debug, Deserialize)]
struct RecentItem {
    track: TrackItem,
    played_at: DateTime<Utc>,
}

impl From<TrackItem> for Track {
    fn from(item: TrackItem) -> Self {
        let (album, album_art_url) = match item.album {
            Some(a) => (a.name, a.images.into_iter().next().map(|i| i.url)),
            None => (String::new(), None),
        };
        Track {
            id: item.id,
            title: item.name,
            artists: item.artists.into_iter().map(|a| a.name).collect(),
            album,
            album_art_url,
            duration_ms: item.duration_ms,
            external_url: item.external_urls.spotify,
        }
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Map a current-playback response to its outcome.  Pure so the status table
/// is testable without a socket.
fn classify_playback(status: u16, retry_after_ms: Option<u64>, body: &str) -> PlaybackOutcome {
    match status {
        204 => PlaybackOutcome::NoContent,
        401 => PlaybackOutcome::Unauthorized,
        429 => PlaybackOutcome::RateLimited { retry_after_ms },
        200 => match decode_playback(body) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("current-playback body rejected: {}", e);
                PlaybackOutcome::NetworkError
            }
        },
        other => {
            debug!("current-playback returned unexpected status {}", other);
            PlaybackOutcome::NetworkError
        }
    }
}

fn decode_playback(body: &str) -> Result<PlaybackOutcome, DecodeError> {
    let parsed: CurrentPlaybackBody = serde_json::from_str(body)?;
    if !parsed.is_playing {
        // A paused player is "nothing currently playing" for our purposes.
        return Ok(PlaybackOutcome::NoContent);
    }
    match parsed.item {
        Some(item) => {
            let progress_ms = parsed.progress_ms.ok_or(DecodeError::MissingProgress)?;
            Ok(PlaybackOutcome::Playing {
                track: item.into(),
                progress_ms,
            })
        }
        None => Ok(PlaybackOutcome::AdBreak),
    }
}

fn classify_recent(status: u16, retry_after_ms: Option<u64>, body: &str) -> RecentOutcome {
    match status {
        401 => RecentOutcome::Unauthorized,
        429 => RecentOutcome::RateLimited { retry_after_ms },
        200 => match serde_json::from_str::<RecentlyPlayedBody>(body) {
            Ok(parsed) => RecentOutcome::Items(
                parsed
                    .items
                    .into_iter()
                    .map(|i| RecentEntry {
                        track: i.track.into(),
                        played_at: i.played_at,
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("recently-played body rejected: {}", e);
                RecentOutcome::NetworkError
            }
        },
        other => {
            debug!("recently-played returned unexpected status {}", other);
            RecentOutcome::NetworkError
        }
    }
}

/// Retry-After arrives in whole seconds.
fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1_000)
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Shared HTTP client for the playback API.  One reqwest `Client` for both
/// reads so TLS sessions are reused across polls.
pub struct UpstreamClient {
    http: Client,
    api_base: String,
    token: Option<String>,
}

impl UpstreamClient {
    pub fn new(api_base: String, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.api_base, path);
        let mut req = self.http.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req.send().await
    }

    pub async fn current_playback(&self) -> PlaybackOutcome {
        // No credential at all behaves like a rejected one.
        if self.token.is_none() {
            return PlaybackOutcome::Unauthorized;
        }
        let response = match self.get("/me/player/currently-playing").await {
            Ok(r) => r,
            Err(e) => {
                warn!("current-playback request failed: {}", e);
                return PlaybackOutcome::NetworkError;
            }
        };
        let status = response.status().as_u16();
        let hint = retry_after_ms(&response);
        let body = response.text().await.unwrap_or_default();
        classify_playback(status, hint, &body)
    }

    pub async fn recently_played(&self) -> RecentOutcome {
        if self.token.is_none() {
            return RecentOutcome::Unauthorized;
        }
        let response = match self.get("/me/player/recently-played?limit=10").await {
            Ok(r) => r,
            Err(e) => {
                warn!("recently-played request failed: {}", e);
                return RecentOutcome::NetworkError;
            }
        };
        let status = response.status().as_u16();
        let hint = retry_after_ms(&response);
        let body = response.text().await.unwrap_or_default();
        classify_recent(status, hint, &body)
    }
}
