//! AutoDJ simulator
//!
//! Runs the scheduler against two simulated decks and a synthetic library,
//! logging every notification.
//!
//! ```bash
//! RUST_LOG=debug autodj-sim --tracks 6 --track-length 40 --speed 4 --run-secs 30
//! ```

use std::{
    error::Error,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use desizone_autodj::{
    audio::DeckHandle,
    db::{CuePoints, MemoryLibrary, MemorySettings, Track},
    scheduler::{
        spawn_ticker, AutoDjConfig, AutoDjProcessor, TransitionMode, DEFAULT_TICK_INTERVAL,
    },
    SimDeck,
};

/// Two-deck AutoDJ simulation
#[derive(Parser, Debug)]
#[clap(name = "autodj-sim")]
#[clap(about = "Run the AutoDJ scheduler against simulated decks")]
struct Args {
    /// Number of synthetic tracks in the library
    #[clap(long, default_value = "8")]
    tracks: i64,

    /// Length of each synthetic track (seconds)
    #[clap(long, default_value = "30")]
    track_length: f64,

    /// Deck playback speed relative to wall-clock time
    #[clap(long, default_value = "1.0")]
    speed: f64,

    /// Seconds between status lines; 0 disables them
    #[clap(long, default_value = "5")]
    status_secs: f64,

    /// How long to run (wall-clock seconds)
    #[clap(long, default_value = "60")]
    run_secs: f64,

    /// Scheduler tick period in milliseconds [default: 50]
    #[clap(long)]
    tick_ms: Option<u64>,

    /// Transition time in seconds; negative inserts silence
    #[clap(long, allow_hyphen_values = true)]
    transition: Option<i32>,

    /// Transition mode name or code (0-3)
    #[clap(long)]
    mode: Option<TransitionMode>,

    /// Re-queue the library when the queue runs dry
    #[clap(long)]
    repeat: bool,

    /// Keep at least this many random tracks queued
    #[clap(long, value_name = "N")]
    random_queue: Option<u32>,

    /// JSON config snapshot to start from
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn synthetic_library(count: i64, length: f64) -> Vec<Track> {
    (1..=count)
        .map(|id| {
            let intro = (length * 0.1).min(8.0);
            let outro = (length * 0.15).min(12.0);
            Track::new(id, format!("Sim Track {id:02}"), length)
                .with_cues(CuePoints {
                    intro_start: Some(0.0),
                    intro_end: Some(intro),
                    outro_start: Some(length - outro),
                    outro_end: None,
                })
                .with_trailing_silence((length * 0.02).min(2.0))
        })
        .collect()
}

fn log_status(dj: &Mutex<AutoDjProcessor>, deck_a: &SimDeck, deck_b: &SimDeck) {
    let (state, progress) = {
        let dj = match dj.lock() {
            Ok(dj) => dj,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = dj.state();
        (state, dj.fade_progress_at(Instant::now()))
    };
    let fade = match progress {
        Some(p) if state.is_fading() => format!(" fade {:.0}%", p * 100.0),
        _ => String::new(),
    };
    log::info!(
        "{state:?}{fade}: deck_a {:?} {:.1}s left, deck_b {:?} {:.1}s left",
        deck_a.track_id(),
        deck_a.remaining_sec(),
        deck_b.track_id(),
        deck_b.remaining_sec(),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let mut settings = MemorySettings::new();
    if let Some(path) = &args.config {
        let json = std::fs::read_to_string(path)?;
        AutoDjConfig::from_json(&json).save(&mut settings);
        log::info!("Loaded config from {}", path.display());
    }

    let tracks = synthetic_library(args.tracks, args.track_length);
    let library = MemoryLibrary::new(tracks.clone());
    let deck_a = SimDeck::with_speed(args.speed);
    let deck_b = SimDeck::with_speed(args.speed);

    let mut dj = AutoDjProcessor::new(
        Box::new(deck_a.clone()),
        Box::new(deck_b.clone()),
        Arc::new(library),
        Box::new(settings),
    );
    if let Some(mode) = args.mode {
        dj.set_transition_mode(mode);
    }
    if let Some(seconds) = args.transition {
        dj.set_transition_time(seconds);
    }
    if args.repeat {
        dj.set_repeat_playlist(true);
    }
    let mode = dj.transition_mode();
    if dj.transition_time() < 0 && !mode.allows_gap() {
        log::warn!(
            "{} never inserts silence; transition {}s overlaps by 0s",
            mode.as_str(),
            dj.transition_time()
        );
    }
    match args.random_queue {
        Some(min) => dj.set_random_queue(true, min),
        None => tracks.into_iter().for_each(|t| dj.enqueue(t)),
    }

    let queued = dj.selection_info(&(0..dj.queue().len()).collect::<Vec<_>>());
    log::info!("Queue: {}", queued.label());

    let mut events = dj.subscribe();
    dj.enable(true)?;

    let dj = Arc::new(Mutex::new(dj));
    let tick = args
        .tick_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or(DEFAULT_TICK_INTERVAL);
    let ticker = spawn_ticker(Arc::clone(&dj), tick);

    let status_every = Duration::from_secs_f64(args.status_secs.max(0.0));
    let mut status = tokio::time::interval(status_every.max(Duration::from_millis(100)));
    status.tick().await;

    let deadline = tokio::time::sleep(Duration::from_secs_f64(args.run_secs.max(0.0)));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = status.tick(), if !status_every.is_zero() => {
                log_status(&dj, &deck_a, &deck_b);
            }
            event = events.recv() => match event {
                Ok(event) => log::info!("event {}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(n)) => log::warn!("missed {n} events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    ticker.stop().await;

    let state = match dj.lock() {
        Ok(dj) => dj.state(),
        Err(poisoned) => poisoned.into_inner().state(),
    };
    log::info!(
        "Finished in {state:?}: deck_a {:?} @ {:.1}s vol {:.2}, deck_b {:?} @ {:.1}s vol {:.2}",
        deck_a.track_id(),
        deck_a.position_sec(),
        deck_a.volume(),
        deck_b.track_id(),
        deck_b.position_sec(),
        deck_b.volume(),
    );
    Ok(())
}
