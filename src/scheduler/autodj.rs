/// AutoDJ configuration and state types
///
/// Shared vocabulary for the scheduler: the state machine states, the four
/// transition modes, the persisted configuration, and the record of the last
/// transition decision.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    audio::deck::DeckId,
    db::settings::{ConfigKey, SettingsStore},
};

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoDjState {
    #[default]
    Disabled,
    /// First deck armed with a track, waiting for playback to begin.
    P1Loaded,
    /// One deck playing, the other stopped holding the next track.
    Idle,
    /// DeckA fading out into DeckB.
    LeftFading,
    /// DeckB fading out into DeckA.
    RightFading,
}

impl AutoDjState {
    pub fn fading_out_of(deck: DeckId) -> Self {
        match deck {
            DeckId::DeckA => Self::LeftFading,
            DeckId::DeckB => Self::RightFading,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }

    pub fn is_fading(self) -> bool {
        matches!(self, Self::LeftFading | Self::RightFading)
    }

    /// Whether an operator may press "fade now" in this state.
    pub fn can_fade_now(self) -> bool {
        self == Self::Idle
    }
}

// ── Transition mode ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Play the full intro and outro; fade over the shorter of the two.
    #[default]
    FullIntroOutro,
    /// Start fading at the outro start; cut off any excess outro.
    FadeAtOutroStart,
    /// Play the whole track, fade the configured time before the end.
    FixedFullTrack,
    /// Like `FixedFullTrack`, measured against the last sound.
    FixedSkipSilence,
}

impl TransitionMode {
    pub const ALL: [TransitionMode; 4] = [
        TransitionMode::FullIntroOutro,
        TransitionMode::FadeAtOutroStart,
        TransitionMode::FixedFullTrack,
        TransitionMode::FixedSkipSilence,
    ];

    /// Integer code used in the settings store.
    pub fn code(self) -> i32 {
        match self {
            Self::FullIntroOutro => 0,
            Self::FadeAtOutroStart => 1,
            Self::FixedFullTrack => 2,
            Self::FixedSkipSilence => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullIntroOutro => "full_intro_outro",
            Self::FadeAtOutroStart => "fade_at_outro_start",
            Self::FixedFullTrack => "fixed_full_track",
            Self::FixedSkipSilence => "fixed_skip_silence",
        }
    }

    /// Whether a negative transition time inserts silence in this mode.
    pub fn allows_gap(self) -> bool {
        matches!(self, Self::FixedFullTrack | Self::FixedSkipSilence)
    }
}

impl std::str::FromStr for TransitionMode {
    type Err = String;

    /// Accepts the snake_case name or the integer code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(mode) = Self::ALL.into_iter().find(|m| m.as_str() == s) {
            return Ok(mode);
        }
        s.parse::<i32>()
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(|| format!("unknown transition mode {s:?}"))
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

pub const PREFERENCE_GROUP: &str = "[Auto DJ]";
pub const KEY_TRANSITION_TIME: &str = "Transition";
pub const KEY_TRANSITION_MODE: &str = "TransitionMode";
pub const KEY_REPEAT_PLAYLIST: &str = "Requeue";
pub const KEY_RANDOM_QUEUE: &str = "EnableRandomQueue";
pub const KEY_RANDOM_QUEUE_MIN: &str = "RandomQueueMinimumAllowed";

pub fn config_key(name: &str) -> ConfigKey {
    ConfigKey::new(PREFERENCE_GROUP, name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDjConfig {
    /// Positive: overlap time. Negative: silence between tracks (fixed modes).
    pub transition_time_sec: i32,
    pub mode: TransitionMode,
    /// Reload the full playlist when the queue runs dry.
    pub repeat_playlist: bool,
    /// Top the queue up with random library tracks.
    pub random_queue_enabled: bool,
    pub random_queue_min_tracks: u32,
}

impl Default for AutoDjConfig {
    fn default() -> Self {
        Self {
            transition_time_sec: 10,
            mode: TransitionMode::FullIntroOutro,
            repeat_playlist: false,
            random_queue_enabled: false,
            random_queue_min_tracks: 5,
        }
    }
}

impl AutoDjConfig {
    /// Read every recognised key, keeping the default for anything missing or
    /// unparseable.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            transition_time_sec: read_setting(store, KEY_TRANSITION_TIME, parse_int)
                .unwrap_or(defaults.transition_time_sec),
            mode: read_setting(store, KEY_TRANSITION_MODE, |raw| {
                parse_int(raw).and_then(TransitionMode::from_code)
            })
            .unwrap_or(defaults.mode),
            repeat_playlist: read_setting(store, KEY_REPEAT_PLAYLIST, parse_bool)
                .unwrap_or(defaults.repeat_playlist),
            random_queue_enabled: read_setting(store, KEY_RANDOM_QUEUE, parse_bool)
                .unwrap_or(defaults.random_queue_enabled),
            random_queue_min_tracks: read_setting(store, KEY_RANDOM_QUEUE_MIN, |raw| {
                parse_int(raw).and_then(|v| u32::try_from(v).ok())
            })
            .unwrap_or(defaults.random_queue_min_tracks),
        }
    }

    /// Write every key back.
    pub fn save(&self, store: &mut dyn SettingsStore) {
        store.set(&config_key(KEY_TRANSITION_TIME), self.transition_time_sec.to_string());
        store.set(&config_key(KEY_TRANSITION_MODE), self.mode.code().to_string());
        store.set(&config_key(KEY_REPEAT_PLAYLIST), bool_setting(self.repeat_playlist));
        store.set(&config_key(KEY_RANDOM_QUEUE), bool_setting(self.random_queue_enabled));
        store.set(&config_key(KEY_RANDOM_QUEUE_MIN), self.random_queue_min_tracks.to_string());
    }

    /// Import a JSON snapshot. Missing fields take their defaults; a document
    /// that is not a JSON object yields the default config.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<AutoDjConfig>(json) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring invalid AutoDJ config JSON: {e}");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

fn read_setting<T>(
    store: &dyn SettingsStore,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let key = config_key(name);
    let raw = store.get(&key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        log::warn!("Unrecognised value {raw:?} for {key}, using default");
    }
    parsed
}

fn parse_int(raw: &str) -> Option<i32> {
    raw.parse().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_setting(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

// ── Decision record ───────────────────────────────────────────────────────────

/// Why the scheduler did (or did not) start the last transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDecision {
    pub mode: TransitionMode,
    pub from_deck: Option<DeckId>,
    pub to_deck: Option<DeckId>,
    pub trigger_sec: Option<f64>,
    pub fade_sec: Option<f64>,
    pub gap_sec: Option<f64>,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

impl TransitionDecision {
    pub fn new(mode: TransitionMode, reason: impl Into<String>) -> Self {
        Self {
            mode,
            from_deck: None,
            to_deck: None,
            trigger_sec: None,
            fade_sec: None,
            gap_sec: None,
            reason: reason.into(),
            decided_at: Utc::now(),
        }
    }
}
