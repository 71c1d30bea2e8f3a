/// Background driver for `AutoDjProcessor::tick`.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use super::processor::AutoDjProcessor;

pub struct AutoDjTicker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutoDjTicker {
    /// Ask the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::warn!("AutoDJ ticker task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Tick `processor` every `period` on the current tokio runtime.
pub fn spawn_ticker(processor: Arc<Mutex<AutoDjProcessor>>, period: Duration) -> AutoDjTicker {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::debug!("AutoDJ ticker started ({period:?})");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let poisoned = match processor.lock() {
                        Ok(mut dj) => {
                            dj.tick();
                            false
                        }
                        Err(_) => true,
                    };
                    if poisoned {
                        log::error!("AutoDJ processor lock poisoned, stopping ticker");
                        break;
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        log::debug!("AutoDJ ticker stopped");
    });
    AutoDjTicker { shutdown, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::deck::SimDeck,
        db::{
            library::{MemoryLibrary, Track},
            settings::MemorySettings,
        },
        scheduler::autodj::AutoDjState,
    };

    fn processor(a: &SimDeck, b: &SimDeck) -> AutoDjProcessor {
        let tracks: Vec<Track> = (1..=3).map(|i| Track::new(i, format!("t{i}"), 60.0)).collect();
        let mut dj = AutoDjProcessor::new(
            Box::new(a.clone()),
            Box::new(b.clone()),
            Arc::new(MemoryLibrary::new(tracks.clone())),
            Box::new(MemorySettings::new()),
        );
        for t in tracks {
            dj.enqueue(t);
        }
        dj
    }

    #[tokio::test]
    async fn ticker_drives_the_processor_until_stopped() {
        let (a, b) = (SimDeck::new(), SimDeck::new());
        let dj = Arc::new(Mutex::new(processor(&a, &b)));
        dj.lock().unwrap().enable(true).unwrap();

        let ticker = spawn_ticker(Arc::clone(&dj), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(dj.lock().unwrap().state(), AutoDjState::Idle);
        assert_eq!(b.track_id(), Some(2));

        ticker.stop().await;
        assert_eq!(Arc::strong_count(&dj), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_side_stops_the_loop() {
        let (a, b) = (SimDeck::new(), SimDeck::new());
        let dj = Arc::new(Mutex::new(processor(&a, &b)));
        let AutoDjTicker { shutdown, handle } =
            spawn_ticker(Arc::clone(&dj), Duration::from_millis(5));
        drop(shutdown);
        handle.await.unwrap();
        assert_eq!(dj.lock().unwrap().state(), AutoDjState::Disabled);
    }
}
