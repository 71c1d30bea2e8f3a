use std::time::{Duration, Instant};

use super::deck::DeckId;

/// Gains for the two decks at one point of a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeGains {
    pub gain_out: f32,
    pub gain_in: f32,
    pub complete: bool,
}

// ── CrossfadeState ────────────────────────────────────────────────────────────

/// Wall-clock crossfade state machine owned by the scheduler.
///
/// Progress is derived from the time elapsed since the fade began, never from
/// deck positions, so the ramp finishes on schedule even if a deck drifts.
/// Gains are linear: `out = 1 − p`, `in = p`.
#[derive(Debug, Clone, Default)]
pub enum CrossfadeState {
    #[default]
    Idle,
    Fading {
        outgoing: DeckId,
        incoming: DeckId,
        started_at: Instant,
        /// Overlap length. Zero means a cut.
        duration: Duration,
        /// Silence inserted between the outgoing end and the incoming start.
        /// When non-zero there is no overlap.
        gap: Duration,
    },
    /// Fade finished; the scheduler still has to swap deck roles.
    Complete { new_active: DeckId },
}

impl CrossfadeState {
    pub fn start(
        outgoing: DeckId,
        incoming: DeckId,
        now: Instant,
        duration: Duration,
        gap: Duration,
    ) -> Self {
        CrossfadeState::Fading {
            outgoing,
            incoming,
            started_at: now,
            duration,
            gap,
        }
    }

    /// Gains at `now`. Moves to `Complete` once the fade (or gap) has elapsed.
    ///
    /// Repeated calls with the same `now` return the same gains.
    pub fn advance(&mut self, now: Instant) -> FadeGains {
        match *self {
            CrossfadeState::Fading { incoming, started_at, duration, gap, .. } => {
                let elapsed = now.saturating_duration_since(started_at);
                let window = if gap.is_zero() { duration } else { gap };

                if elapsed >= window {
                    *self = CrossfadeState::Complete { new_active: incoming };
                    return FadeGains { gain_out: 0.0, gain_in: 1.0, complete: true };
                }
                if !gap.is_zero() {
                    // Outgoing already ended; incoming waits in silence.
                    return FadeGains { gain_out: 0.0, gain_in: 0.0, complete: false };
                }

                let t = (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32;
                FadeGains { gain_out: 1.0 - t, gain_in: t, complete: false }
            }
            CrossfadeState::Idle => FadeGains { gain_out: 1.0, gain_in: 0.0, complete: false },
            CrossfadeState::Complete { .. } => {
                FadeGains { gain_out: 0.0, gain_in: 1.0, complete: true }
            }
        }
    }

    /// Fade progress in [0.0, 1.0], or `None` when not fading.
    pub fn progress(&self, now: Instant) -> Option<f32> {
        match *self {
            CrossfadeState::Fading { started_at, duration, gap, .. } => {
                let window = if gap.is_zero() { duration } else { gap };
                if window.is_zero() {
                    return Some(1.0);
                }
                let elapsed = now.saturating_duration_since(started_at);
                Some((elapsed.as_secs_f64() / window.as_secs_f64()).min(1.0) as f32)
            }
            _ => None,
        }
    }

    /// Time left until completion, or `None` when not fading.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match *self {
            CrossfadeState::Fading { started_at, duration, gap, .. } => {
                let window = if gap.is_zero() { duration } else { gap };
                Some(window.saturating_sub(now.saturating_duration_since(started_at)))
            }
            _ => None,
        }
    }

    pub fn outgoing(&self) -> Option<DeckId> {
        match self {
            CrossfadeState::Fading { outgoing, .. } => Some(*outgoing),
            _ => None,
        }
    }

    pub fn incoming(&self) -> Option<DeckId> {
        match self {
            CrossfadeState::Fading { incoming, .. } => Some(*incoming),
            _ => None,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, CrossfadeState::Fading { gap, .. } if !gap.is_zero())
    }

    pub fn is_fading(&self) -> bool {
        matches!(self, CrossfadeState::Fading { .. })
    }

    /// Back to `Idle`, dropping any in-progress ramp.
    pub fn reset(&mut self) {
        *self = CrossfadeState::Idle;
    }
}
