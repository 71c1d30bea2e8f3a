pub mod autodj;
pub mod events;
pub mod processor;
pub mod queue;
pub mod shuffle;
pub mod ticker;
pub mod transition_planner;

pub use autodj::{AutoDjConfig, AutoDjState, TransitionDecision, TransitionMode};
pub use events::AutoDjEvent;
pub use processor::{AutoDjProcessor, DEFAULT_TICK_INTERVAL};
pub use queue::{SelectionInfo, TrackQueue};
pub use ticker::{spawn_ticker, AutoDjTicker};
pub use transition_planner::{TransitionPlan, TransitionStrategy};
