//! Error types for the AutoDJ scheduler.
//!
//! Precondition failures are returned, never panicked on, and leave the
//! scheduler untouched. Deck command failures belong to the deck adapter.

use thiserror::Error;

use crate::db::library::TrackId;

/// Reasons `AutoDjProcessor::enable(true)` can refuse to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AutoDjError {
    /// Both AutoDJ decks are playing, so neither can be chosen as the live deck.
    #[error("one deck must be stopped to enable Auto DJ mode")]
    BothDecksPlaying,

    /// A deck outside the AutoDJ pair is playing.
    #[error("decks other than the first two must be stopped to enable Auto DJ mode")]
    OtherDecksPlaying,
}

/// Failures reported by a deck adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeckError {
    /// The deck could not open or decode the track.
    #[error("failed to load track {track_id}: {reason}")]
    Load { track_id: TrackId, reason: String },

    /// The track has no usable duration.
    #[error("track {0} has no playable duration")]
    EmptyTrack(TrackId),
}
