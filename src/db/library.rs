/// Track library collaborator
///
/// The scheduler never owns the music library. It asks a `TrackLibrary` for
/// random candidates, the ordered playlist (for repeat), and whether a queued
/// track still exists.
use std::sync::{Arc, PoisonError, RwLock};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub type TrackId = i64;

// ── Track model ───────────────────────────────────────────────────────────────

/// Cue points in seconds from track start. Any of them may be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CuePoints {
    pub intro_start: Option<f64>,
    pub intro_end: Option<f64>,
    pub outro_start: Option<f64>,
    pub outro_end: Option<f64>,
}

impl CuePoints {
    /// Length of the intro, if an intro end is marked.
    ///
    /// A missing intro start means the intro begins at 0.
    pub fn intro_len(&self, duration_sec: f64) -> Option<f64> {
        let end = valid_cue(self.intro_end, duration_sec)?;
        let start = valid_cue(self.intro_start, duration_sec).unwrap_or(0.0);
        positive(end - start)
    }

    /// Length of the outro, if an outro start is marked.
    ///
    /// A missing outro end means the outro runs to the end of the track.
    pub fn outro_len(&self, duration_sec: f64) -> Option<f64> {
        let start = valid_cue(self.outro_start, duration_sec)?;
        let end = valid_cue(self.outro_end, duration_sec).unwrap_or(duration_sec);
        positive(end - start)
    }

    /// Outro start clamped into the track, if marked.
    pub fn outro_start_in(&self, duration_sec: f64) -> Option<f64> {
        valid_cue(self.outro_start, duration_sec)
    }
}

fn valid_cue(cue: Option<f64>, duration_sec: f64) -> Option<f64> {
    cue.filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.min(duration_sec.max(0.0)))
}

fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    /// Seconds
    pub duration_sec: f64,
    #[serde(default)]
    pub cues: CuePoints,
    /// Near-silent tail length in seconds, supplied by the analyzer.
    #[serde(default)]
    pub trailing_silence_sec: Option<f64>,
}

impl Track {
    pub fn new(id: TrackId, title: impl Into<String>, duration_sec: f64) -> Self {
        Self {
            id,
            title: title.into(),
            duration_sec,
            cues: CuePoints::default(),
            trailing_silence_sec: None,
        }
    }

    pub fn with_cues(mut self, cues: CuePoints) -> Self {
        self.cues = cues;
        self
    }

    pub fn with_trailing_silence(mut self, seconds: f64) -> Self {
        self.trailing_silence_sec = Some(seconds);
        self
    }
}

// ── Library contract ──────────────────────────────────────────────────────────

pub trait TrackLibrary: Send + Sync {
    /// Up to `n` randomly chosen tracks.
    fn select_random(&self, n: usize) -> Vec<Track>;

    /// The full AutoDJ playlist in play order.
    fn ordered_tracks(&self) -> Vec<Track>;

    /// Current record for `id`, or `None` if the track was removed.
    fn resolve(&self, id: TrackId) -> Option<Track>;
}

// ── In-memory library ─────────────────────────────────────────────────────────

/// Shared in-memory playlist. Clones see the same tracks.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    tracks: Arc<RwLock<Vec<Track>>>,
}

impl MemoryLibrary {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks: Arc::new(RwLock::new(tracks)) }
    }

    pub fn insert(&self, track: Track) {
        self.tracks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(track);
    }

    /// Remove a track. Returns true if it was present.
    pub fn remove(&self, id: TrackId) -> bool {
        let mut tracks = self.tracks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tracks.len();
        tracks.retain(|t| t.id != id);
        tracks.len() != before
    }

    pub fn len(&self) -> usize {
        self.tracks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackLibrary for MemoryLibrary {
    fn select_random(&self, n: usize) -> Vec<Track> {
        let tracks = self.tracks.read().unwrap_or_else(PoisonError::into_inner);
        let mut rng = rand::thread_rng();
        tracks.choose_multiple(&mut rng, n).cloned().collect()
    }

    fn ordered_tracks(&self) -> Vec<Track> {
        self.tracks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn resolve(&self, id: TrackId) -> Option<Track> {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }
}
