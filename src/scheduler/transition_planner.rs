use serde::{Deserialize, Serialize};

use crate::db::library::Track;

use super::autodj::TransitionMode;

// ── Plan ──────────────────────────────────────────────────────────────────────

/// When and how the live track hands over to the armed one.
///
/// All values are seconds on the outgoing track's timeline, except the two
/// lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionPlan {
    /// Position at which the transition starts. May lie past `end_sec` when a
    /// gap is requested.
    pub trigger_sec: f64,
    /// Overlap length. Zero means a hard cut.
    pub fade_sec: f64,
    /// Where the outgoing track's audio is considered finished.
    pub end_sec: f64,
    /// Silence between the outgoing end and the incoming start.
    pub gap_sec: f64,
}

impl TransitionPlan {
    /// Trigger clamped into the playable part of the outgoing track.
    pub fn effective_trigger(&self) -> f64 {
        self.trigger_sec.min(self.end_sec).max(0.0)
    }

    pub fn has_gap(&self) -> bool {
        self.gap_sec > 0.0
    }

    fn cut_at(end_sec: f64) -> Self {
        Self { trigger_sec: end_sec, fade_sec: 0.0, end_sec, gap_sec: 0.0 }
    }
}

// ── Strategies ────────────────────────────────────────────────────────────────

pub trait TransitionStrategy: Send + Sync {
    /// `incoming` is `None` when nothing is armed yet.
    fn plan(
        &self,
        outgoing: &Track,
        incoming: Option<&Track>,
        transition_time_sec: i32,
    ) -> TransitionPlan;
}

pub struct FullIntroOutro;
pub struct FadeAtOutroStart;
pub struct FixedFullTrack;
pub struct FixedSkipSilence;

impl TransitionMode {
    pub fn strategy(self) -> &'static dyn TransitionStrategy {
        match self {
            TransitionMode::FullIntroOutro => &FullIntroOutro,
            TransitionMode::FadeAtOutroStart => &FadeAtOutroStart,
            TransitionMode::FixedFullTrack => &FixedFullTrack,
            TransitionMode::FixedSkipSilence => &FixedSkipSilence,
        }
    }
}

pub fn calculate_transition_plan(
    mode: TransitionMode,
    outgoing: &Track,
    incoming: Option<&Track>,
    transition_time_sec: i32,
) -> TransitionPlan {
    mode.strategy().plan(outgoing, incoming, transition_time_sec)
}

fn playable_duration(track: &Track) -> f64 {
    if track.duration_sec.is_finite() {
        track.duration_sec.max(0.0)
    } else {
        0.0
    }
}

/// Intro/outro modes never insert silence.
fn overlap_time(transition_time_sec: i32) -> f64 {
    f64::from(transition_time_sec.max(0))
}

impl TransitionStrategy for FullIntroOutro {
    fn plan(
        &self,
        outgoing: &Track,
        incoming: Option<&Track>,
        transition_time_sec: i32,
    ) -> TransitionPlan {
        let duration = playable_duration(outgoing);
        let mut fade = overlap_time(transition_time_sec);
        if let Some(outro) = outgoing.cues.outro_len(duration) {
            fade = fade.min(outro);
        }
        if let Some(intro) = incoming.and_then(|t| t.cues.intro_len(playable_duration(t))) {
            fade = fade.min(intro);
        }
        let fade = fade.min(duration);
        TransitionPlan {
            trigger_sec: duration - fade,
            fade_sec: fade,
            end_sec: duration,
            gap_sec: 0.0,
        }
    }
}

impl TransitionStrategy for FadeAtOutroStart {
    fn plan(
        &self,
        outgoing: &Track,
        _incoming: Option<&Track>,
        transition_time_sec: i32,
    ) -> TransitionPlan {
        let duration = playable_duration(outgoing);
        let time = overlap_time(transition_time_sec);
        let trigger = outgoing
            .cues
            .outro_start_in(duration)
            .unwrap_or(duration - time)
            .max(0.0);
        let mut fade = time;
        if let Some(outro) = outgoing.cues.outro_len(duration) {
            fade = fade.min(outro);
        }
        let fade = fade.min(duration - trigger).max(0.0);
        TransitionPlan {
            trigger_sec: trigger,
            fade_sec: fade,
            end_sec: duration,
            gap_sec: 0.0,
        }
    }
}

/// Fixed-time plan ending at `end_sec`. Negative time becomes a gap.
fn fixed_plan(end_sec: f64, transition_time_sec: i32) -> TransitionPlan {
    let time = f64::from(transition_time_sec);
    if transition_time_sec < 0 {
        return TransitionPlan {
            trigger_sec: end_sec - time,
            fade_sec: 0.0,
            end_sec,
            gap_sec: -time,
        };
    }
    if end_sec <= 0.0 {
        return TransitionPlan::cut_at(0.0);
    }
    TransitionPlan {
        trigger_sec: end_sec - time,
        fade_sec: time.min(end_sec),
        end_sec,
        gap_sec: 0.0,
    }
}

impl TransitionStrategy for FixedFullTrack {
    fn plan(
        &self,
        outgoing: &Track,
        _incoming: Option<&Track>,
        transition_time_sec: i32,
    ) -> TransitionPlan {
        fixed_plan(playable_duration(outgoing), transition_time_sec)
    }
}

impl TransitionStrategy for FixedSkipSilence {
    fn plan(
        &self,
        outgoing: &Track,
        incoming: Option<&Track>,
        transition_time_sec: i32,
    ) -> TransitionPlan {
        let duration = playable_duration(outgoing);
        let last_sound = outgoing
            .trailing_silence_sec
            .filter(|s| s.is_finite() && *s > 0.0 && *s < duration)
            .map(|s| duration - s);
        match last_sound {
            Some(last) => fixed_plan(last, transition_time_sec),
            None => FixedFullTrack.plan(outgoing, incoming, transition_time_sec),
        }
    }
}
