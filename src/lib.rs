pub mod audio;
pub mod db;
pub mod error;
pub mod scheduler;

pub use audio::{DeckHandle, DeckId, SimDeck};
pub use db::{CuePoints, MemoryLibrary, MemorySettings, SettingsStore, Track, TrackLibrary};
pub use error::{AutoDjError, DeckError};
pub use scheduler::{
    spawn_ticker, AutoDjConfig, AutoDjEvent, AutoDjProcessor, AutoDjState, TransitionMode,
};
