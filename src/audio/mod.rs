pub mod crossfade;
pub mod deck;

pub use crossfade::{CrossfadeState, FadeGains};
pub use deck::{DeckHandle, DeckId, DeckState, SimDeck};
