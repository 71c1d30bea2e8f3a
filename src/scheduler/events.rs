/// AutoDJ notifications
///
/// The processor publishes `AutoDjEvent`s on a tokio broadcast channel after
/// its internal state is consistent. UI layers and the simulator subscribe;
/// slow subscribers lag and drop events rather than block the scheduler.
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{audio::deck::DeckId, db::library::TrackId};

use super::autodj::{AutoDjState, TransitionMode};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutoDjEvent {
    StateChanged { from: AutoDjState, to: AutoDjState },
    TransitionTimeChanged { seconds: i32 },
    TransitionModeChanged { mode: TransitionMode },
    /// A track was loaded into the waiting deck.
    TrackArmed { deck: DeckId, track_id: TrackId, title: String },
    FadeStarted { from: DeckId, to: DeckId, fade_sec: f64, gap_sec: f64 },
    /// The waiting deck could not be armed because the queue is empty.
    QueueStalled { deck: DeckId },
}

impl AutoDjEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AutoDjEvent::StateChanged { .. } => "state_changed",
            AutoDjEvent::TransitionTimeChanged { .. } => "transition_time_changed",
            AutoDjEvent::TransitionModeChanged { .. } => "transition_mode_changed",
            AutoDjEvent::TrackArmed { .. } => "track_armed",
            AutoDjEvent::FadeStarted { .. } => "fade_started",
            AutoDjEvent::QueueStalled { .. } => "queue_stalled",
        }
    }
}

/// Sending half owned by the processor.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AutoDjEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish; having no subscribers is not an error.
    pub fn emit(&self, event: AutoDjEvent) {
        log::debug!("AutoDJ event: {}", event.event_type());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutoDjEvent> {
        self.tx.subscribe()
    }
}
