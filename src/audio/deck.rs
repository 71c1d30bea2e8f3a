use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::{
    db::library::{Track, TrackId},
    error::DeckError,
};

// ── DeckId ────────────────────────────────────────────────────────────────────

/// The two AutoDJ decks. DeckA is the left deck, DeckB the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckId {
    DeckA,
    DeckB,
}

impl DeckId {
    pub const BOTH: [DeckId; 2] = [DeckId::DeckA, DeckId::DeckB];

    pub fn index(self) -> usize {
        match self {
            DeckId::DeckA => 0,
            DeckId::DeckB => 1,
        }
    }

    pub fn other(self) -> DeckId {
        match self {
            DeckId::DeckA => DeckId::DeckB,
            DeckId::DeckB => DeckId::DeckA,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::DeckA => write!(f, "deck_a"),
            DeckId::DeckB => write!(f, "deck_b"),
        }
    }
}

// ── DeckHandle ────────────────────────────────────────────────────────────────

/// One playback unit as the scheduler sees it.
///
/// Commands are fire-and-forget: the implementation renders audio on its own
/// threads and reports state back through the query methods. Positions are in
/// seconds from track start.
pub trait DeckHandle: Send {
    fn position_sec(&self) -> f64;
    fn duration_sec(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn loaded_track(&self) -> Option<Track>;

    fn load(&mut self, track: &Track) -> Result<(), DeckError>;
    fn unload(&mut self);
    fn play(&mut self);
    fn stop(&mut self);
    /// Output level, 0.0 – 1.0.
    fn set_volume(&mut self, ratio: f32);

    fn remaining_sec(&self) -> f64 {
        (self.duration_sec() - self.position_sec()).max(0.0)
    }
}

// ── SimDeck ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckState {
    Idle,
    Ready,
    Playing,
    Stopped,
}

#[derive(Debug)]
struct SimDeckInner {
    state: DeckState,
    track: Option<Track>,
    /// Position when playback last started or the deck was seeked/stopped.
    base_position: f64,
    play_started: Option<Instant>,
    volume: f32,
    /// Playback rate relative to wall-clock time.
    speed: f64,
    rejected: HashSet<TrackId>,
}

impl SimDeckInner {
    fn duration(&self) -> f64 {
        self.track.as_ref().map(|t| t.duration_sec).unwrap_or(0.0)
    }

    fn position(&self) -> f64 {
        let elapsed = self
            .play_started
            .map(|started| started.elapsed().as_secs_f64() * self.speed)
            .unwrap_or(0.0);
        (self.base_position + elapsed).min(self.duration())
    }

    fn freeze(&mut self) {
        self.base_position = self.position();
        self.play_started = None;
    }
}

/// In-process deck whose position follows the wall clock.
///
/// Clones share one deck, so a caller can hand a clone to the scheduler and
/// keep another to observe or override it (seek, manual stop).
#[derive(Debug, Clone)]
pub struct SimDeck {
    inner: Arc<Mutex<SimDeckInner>>,
}

impl Default for SimDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDeck {
    pub fn new() -> Self {
        Self::with_speed(1.0)
    }

    /// `speed` > 1.0 runs tracks faster than real time.
    pub fn with_speed(speed: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimDeckInner {
                state: DeckState::Idle,
                track: None,
                base_position: 0.0,
                play_started: None,
                volume: 1.0,
                speed: speed.max(0.0),
                rejected: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimDeckInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> DeckState {
        let inner = self.lock();
        if inner.state == DeckState::Playing && inner.position() >= inner.duration() {
            DeckState::Stopped
        } else {
            inner.state
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn track_id(&self) -> Option<TrackId> {
        self.lock().track.as_ref().map(|t| t.id)
    }

    /// Jump to `position_sec`, keeping the play state.
    pub fn seek(&self, position_sec: f64) {
        let mut inner = self.lock();
        let duration = inner.duration();
        inner.base_position = position_sec.clamp(0.0, duration);
        if inner.play_started.is_some() {
            inner.play_started = Some(Instant::now());
        }
    }

    /// Make every future `load` of `track_id` fail, as a corrupt file would.
    pub fn reject_track(&self, track_id: TrackId) {
        self.lock().rejected.insert(track_id);
    }
}

impl DeckHandle for SimDeck {
    fn position_sec(&self) -> f64 {
        self.lock().position()
    }

    fn duration_sec(&self) -> f64 {
        self.lock().duration()
    }

    fn is_playing(&self) -> bool {
        self.state() == DeckState::Playing
    }

    fn loaded_track(&self) -> Option<Track> {
        self.lock().track.clone()
    }

    fn load(&mut self, track: &Track) -> Result<(), DeckError> {
        let mut inner = self.lock();
        if inner.rejected.contains(&track.id) {
            return Err(DeckError::Load {
                track_id: track.id,
                reason: "decoder rejected file".to_string(),
            });
        }
        if !(track.duration_sec.is_finite() && track.duration_sec > 0.0) {
            return Err(DeckError::EmptyTrack(track.id));
        }
        inner.play_started = None;
        inner.base_position = 0.0;
        inner.track = Some(track.clone());
        inner.state = DeckState::Ready;
        Ok(())
    }

    fn unload(&mut self) {
        let mut inner = self.lock();
        inner.play_started = None;
        inner.base_position = 0.0;
        inner.track = None;
        inner.state = DeckState::Idle;
    }

    fn play(&mut self) {
        let mut inner = self.lock();
        if inner.track.is_none() || inner.position() >= inner.duration() {
            return;
        }
        if inner.play_started.is_none() {
            inner.play_started = Some(Instant::now());
        }
        inner.state = DeckState::Playing;
    }

    fn stop(&mut self) {
        let mut inner = self.lock();
        inner.freeze();
        if inner.track.is_some() {
            inner.state = DeckState::Stopped;
        }
    }

    fn set_volume(&mut self, ratio: f32) {
        self.lock().volume = ratio.clamp(0.0, 1.0);
    }
}
