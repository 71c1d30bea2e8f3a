pub mod library;
pub mod settings;

pub use library::{CuePoints, MemoryLibrary, Track, TrackId, TrackLibrary};
pub use settings::{ConfigKey, MemorySettings, SettingsStore};
