/// AutoDJ transition scheduler
///
/// Owns the two AutoDJ decks while enabled: keeps one on air, holds the next
/// queued track ready on the other, and crossfades between them at the point
/// the active transition strategy picks. Driven by `tick`, normally from
/// `scheduler::ticker`.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::broadcast;

use crate::{
    audio::{
        crossfade::CrossfadeState,
        deck::{DeckHandle, DeckId},
    },
    db::{
        library::{Track, TrackId, TrackLibrary},
        settings::SettingsStore,
    },
    error::AutoDjError,
};

use super::{
    autodj::{
        config_key, AutoDjConfig, AutoDjState, TransitionDecision, TransitionMode,
        KEY_RANDOM_QUEUE, KEY_RANDOM_QUEUE_MIN, KEY_REPEAT_PLAYLIST, KEY_TRANSITION_MODE,
        KEY_TRANSITION_TIME,
    },
    events::{AutoDjEvent, EventBus},
    queue::{SelectionInfo, TrackQueue},
    transition_planner::{calculate_transition_plan, TransitionPlan},
};

/// A fade this close to its end is completed rather than cancelled on disable.
pub const FADE_COMPLETION_EPSILON: Duration = Duration::from_millis(50);
/// A deck this close to its track end counts as finished.
pub const END_OF_TRACK_TOLERANCE_SEC: f64 = 0.1;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Queue entries tried per arming attempt before waiting for the next tick.
const MAX_LOAD_ATTEMPTS: usize = 16;

const REASON_NOTHING_ARMED: &str = "trigger reached with nothing armed";

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

fn at_end(deck: &dyn DeckHandle) -> bool {
    deck.position_sec() >= deck.duration_sec() - END_OF_TRACK_TOLERANCE_SEC
}

pub struct AutoDjProcessor {
    decks: [Box<dyn DeckHandle>; 2],
    /// Decks outside the AutoDJ pair; only checked when enabling.
    other_decks: Vec<Box<dyn DeckHandle>>,
    library: Arc<dyn TrackLibrary>,
    settings: Box<dyn SettingsStore>,
    config: AutoDjConfig,
    queue: TrackQueue,
    state: AutoDjState,
    /// On-air deck while `Idle`.
    live: DeckId,
    crossfade: CrossfadeState,
    last_decision: Option<TransitionDecision>,
    /// Set once `QueueStalled` has been reported, cleared by the next arm.
    stalled: bool,
    events: EventBus,
    rng: StdRng,
}

impl AutoDjProcessor {
    pub fn new(
        deck_a: Box<dyn DeckHandle>,
        deck_b: Box<dyn DeckHandle>,
        library: Arc<dyn TrackLibrary>,
        settings: Box<dyn SettingsStore>,
    ) -> Self {
        let config = AutoDjConfig::load(settings.as_ref());
        log::info!(
            "AutoDJ: mode={} transition={}s repeat={}",
            config.mode.as_str(),
            config.transition_time_sec,
            config.repeat_playlist
        );
        Self {
            decks: [deck_a, deck_b],
            other_decks: Vec::new(),
            library,
            settings,
            config,
            queue: TrackQueue::new(),
            state: AutoDjState::Disabled,
            live: DeckId::DeckA,
            crossfade: CrossfadeState::Idle,
            last_decision: None,
            stalled: false,
            events: EventBus::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_other_decks(mut self, decks: Vec<Box<dyn DeckHandle>>) -> Self {
        self.other_decks = decks;
        self
    }

    /// Deterministic shuffles.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn state(&self) -> AutoDjState {
        self.state
    }

    pub fn config(&self) -> &AutoDjConfig {
        &self.config
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    /// The deck on air (the outgoing one while fading).
    pub fn live_deck(&self) -> DeckId {
        self.live
    }

    pub fn last_decision(&self) -> Option<&TransitionDecision> {
        self.last_decision.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutoDjEvent> {
        self.events.subscribe()
    }

    pub fn fade_progress_at(&self, now: Instant) -> Option<f32> {
        self.crossfade.progress(now)
    }

    fn deck(&self, id: DeckId) -> &dyn DeckHandle {
        self.decks[id.index()].as_ref()
    }

    fn deck_mut(&mut self, id: DeckId) -> &mut dyn DeckHandle {
        self.decks[id.index()].as_mut()
    }

    fn set_state(&mut self, to: AutoDjState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        log::info!("AutoDJ: {from:?} -> {to:?}");
        self.events.emit(AutoDjEvent::StateChanged { from, to });
    }

    // ── Enable / disable ──────────────────────────────────────────────────

    pub fn enable(&mut self, on: bool) -> Result<(), AutoDjError> {
        self.enable_at(on, Instant::now())
    }

    pub fn enable_at(&mut self, on: bool, now: Instant) -> Result<(), AutoDjError> {
        if !on {
            if self.state.is_enabled() {
                self.shut_down(now, true);
            }
            return Ok(());
        }
        if self.state.is_enabled() {
            return Ok(());
        }

        let a_playing = self.deck(DeckId::DeckA).is_playing();
        let b_playing = self.deck(DeckId::DeckB).is_playing();
        if a_playing && b_playing {
            log::warn!("AutoDJ: refusing to enable, both decks are playing");
            return Err(AutoDjError::BothDecksPlaying);
        }
        if self.other_decks.iter().any(|d| d.is_playing()) {
            log::warn!("AutoDJ: refusing to enable, another deck is playing");
            return Err(AutoDjError::OtherDecksPlaying);
        }

        self.crossfade.reset();
        self.stalled = false;

        if a_playing || b_playing {
            let live = if a_playing { DeckId::DeckA } else { DeckId::DeckB };
            self.live = live;
            self.deck_mut(live).set_volume(1.0);
            self.arm_deck(live.other());
            self.set_state(AutoDjState::Idle);
        } else {
            self.live = DeckId::DeckA;
            self.start_first_deck();
            self.set_state(AutoDjState::P1Loaded);
        }
        Ok(())
    }

    /// Leave the decks in a non-fading state and go to `Disabled`.
    ///
    /// `allow_completion` lets a fade that is nearly over finish instead of
    /// being rolled back.
    fn shut_down(&mut self, now: Instant, allow_completion: bool) {
        if self.crossfade.is_fading() {
            let nearly_done = self
                .crossfade
                .remaining(now)
                .is_some_and(|left| left <= FADE_COMPLETION_EPSILON);
            if allow_completion && nearly_done {
                self.finish_fade(false);
            } else {
                self.cancel_fade();
            }
        }
        self.crossfade.reset();
        for id in DeckId::BOTH {
            if !self.deck(id).is_playing() {
                self.deck_mut(id).set_volume(1.0);
            }
        }
        self.set_state(AutoDjState::Disabled);
    }

    /// Roll back a fade: the outgoing deck stays on air at full level, the
    /// incoming deck stops but keeps its track.
    fn cancel_fade(&mut self) {
        let (Some(outgoing), Some(incoming)) =
            (self.crossfade.outgoing(), self.crossfade.incoming())
        else {
            return;
        };
        log::info!("AutoDJ: cancelling fade {outgoing} -> {incoming}");
        self.deck_mut(outgoing).set_volume(1.0);
        let incoming_deck = self.deck_mut(incoming);
        incoming_deck.stop();
        incoming_deck.set_volume(1.0);
        self.live = outgoing;
        self.crossfade.reset();
    }

    // ── Arming ────────────────────────────────────────────────────────────

    /// Load the next playable queue entry into `id`, stopped and silent.
    ///
    /// Returns false when nothing could be loaded; the deck is then left empty,
    /// never holding a track the queue did not supply.
    fn arm_deck(&mut self, id: DeckId) -> bool {
        {
            let deck = self.deck_mut(id);
            deck.stop();
            deck.unload();
            deck.set_volume(0.0);
        }
        if self.config.random_queue_enabled {
            let threshold = self.config.random_queue_min_tracks as usize;
            self.queue.refill_if_below(threshold, self.library.as_ref());
        }

        for _ in 0..MAX_LOAD_ATTEMPTS {
            let Some(track) = self
                .queue
                .dequeue_front(self.library.as_ref(), self.config.repeat_playlist)
            else {
                if !self.stalled {
                    self.stalled = true;
                    log::warn!("AutoDJ: queue empty, {id} left unloaded");
                    self.events.emit(AutoDjEvent::QueueStalled { deck: id });
                }
                return false;
            };

            match self.deck_mut(id).load(&track) {
                Ok(()) => {
                    self.stalled = false;
                    log::info!("AutoDJ: armed {id} with #{} {}", track.id, track.title);
                    self.events.emit(AutoDjEvent::TrackArmed {
                        deck: id,
                        track_id: track.id,
                        title: track.title,
                    });
                    return true;
                }
                Err(e) => log::warn!("AutoDJ: {e}, skipping to next queued track"),
            }
        }
        log::warn!("AutoDJ: no loadable track for {id} after {MAX_LOAD_ATTEMPTS} attempts");
        false
    }

    /// Arm deck A and start it at full level.
    fn start_first_deck(&mut self) {
        if self.arm_deck(DeckId::DeckA) {
            let deck = self.deck_mut(DeckId::DeckA);
            deck.set_volume(1.0);
            deck.play();
        }
    }

    // ── Tick ──────────────────────────────────────────────────────────────

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        match self.state {
            AutoDjState::Disabled => {}
            AutoDjState::P1Loaded => self.tick_first_deck(),
            AutoDjState::Idle => self.tick_idle(now),
            AutoDjState::LeftFading | AutoDjState::RightFading => self.tick_fading(now),
        }
    }

    fn tick_first_deck(&mut self) {
        let first = DeckId::DeckA;
        if self.deck(first).loaded_track().is_none() {
            self.start_first_deck();
            return;
        }
        if self.deck(first).is_playing() {
            self.live = first;
            self.arm_deck(first.other());
            self.set_state(AutoDjState::Idle);
        }
    }

    fn tick_idle(&mut self, now: Instant) {
        let live = self.live;
        let waiting = live.other();
        if self.deck(waiting).loaded_track().is_none() {
            self.arm_deck(waiting);
        }

        let Some(track) = self.deck(live).loaded_track() else {
            log::warn!("AutoDJ: live {live} was unloaded, disabling");
            self.shut_down(now, false);
            return;
        };
        let finished = at_end(self.deck(live));
        if !self.deck(live).is_playing() && !finished {
            log::info!("AutoDJ: live {live} stopped manually, disabling");
            self.shut_down(now, false);
            return;
        }

        let incoming = self.deck(waiting).loaded_track();
        let plan = self.plan_for(&track, incoming.as_ref());
        let position = self.deck(live).position_sec();
        if !finished && position < plan.effective_trigger() {
            return;
        }
        if incoming.is_none() {
            let last_reason = self.last_decision.as_ref().map(|d| d.reason.as_str());
            if last_reason != Some(REASON_NOTHING_ARMED) {
                let mut decision = TransitionDecision::new(self.config.mode, REASON_NOTHING_ARMED);
                decision.from_deck = Some(live);
                decision.trigger_sec = Some(plan.effective_trigger());
                self.last_decision = Some(decision);
            }
            return;
        }
        self.start_fade(live, plan, position, now, "trigger reached");
    }

    fn plan_for(&self, outgoing: &Track, incoming: Option<&Track>) -> TransitionPlan {
        calculate_transition_plan(
            self.config.mode,
            outgoing,
            incoming,
            self.config.transition_time_sec,
        )
    }

    fn start_fade(
        &mut self,
        outgoing: DeckId,
        plan: TransitionPlan,
        position: f64,
        now: Instant,
        reason: &str,
    ) {
        let incoming = outgoing.other();
        let remaining = (plan.end_sec - position).max(0.0);
        let fade_sec = plan.fade_sec.min(remaining).max(0.0);
        let gap_sec = plan.gap_sec.max(0.0);

        if gap_sec > 0.0 {
            self.deck_mut(outgoing).stop();
            self.deck_mut(incoming).set_volume(0.0);
        } else {
            let deck = self.deck_mut(incoming);
            deck.set_volume(0.0);
            deck.play();
        }
        self.crossfade =
            CrossfadeState::start(outgoing, incoming, now, secs(fade_sec), secs(gap_sec));

        let mut decision = TransitionDecision::new(self.config.mode, reason);
        decision.from_deck = Some(outgoing);
        decision.to_deck = Some(incoming);
        decision.trigger_sec = Some(plan.effective_trigger());
        decision.fade_sec = Some(fade_sec);
        decision.gap_sec = Some(gap_sec);
        self.last_decision = Some(decision);

        log::info!(
            "AutoDJ: fading {outgoing} -> {incoming} at {position:.2}s (fade {fade_sec:.2}s, gap {gap_sec:.2}s, {reason})"
        );
        self.events.emit(AutoDjEvent::FadeStarted {
            from: outgoing,
            to: incoming,
            fade_sec,
            gap_sec,
        });
        self.set_state(AutoDjState::fading_out_of(outgoing));
    }

    fn tick_fading(&mut self, now: Instant) {
        let (Some(outgoing), Some(incoming)) =
            (self.crossfade.outgoing(), self.crossfade.incoming())
        else {
            self.set_state(AutoDjState::Idle);
            return;
        };

        if !self.crossfade.is_gap() {
            let out_deck = self.deck(outgoing);
            let in_deck = self.deck(incoming);
            let out_stopped = !out_deck.is_playing() && !at_end(out_deck);
            let in_stopped = !in_deck.is_playing() && !at_end(in_deck);
            if out_stopped || in_stopped {
                let which = if out_stopped { outgoing } else { incoming };
                log::info!("AutoDJ: {which} stopped during fade, disabling");
                self.shut_down(now, false);
                return;
            }
            if at_end(self.deck(outgoing)) {
                log::debug!("AutoDJ: {outgoing} ended before the fade finished");
                self.finish_fade(true);
                self.set_state(AutoDjState::Idle);
                return;
            }
        }

        let gains = self.crossfade.advance(now);
        if gains.complete {
            self.finish_fade(true);
            self.set_state(AutoDjState::Idle);
            return;
        }
        self.deck_mut(outgoing).set_volume(gains.gain_out);
        self.deck_mut(incoming).set_volume(gains.gain_in);
    }

    /// Swap roles: incoming on air at full level, outgoing stopped and
    /// emptied, then optionally re-armed with the next queue entry.
    fn finish_fade(&mut self, rearm: bool) {
        let (outgoing, incoming) = match self.crossfade {
            CrossfadeState::Fading { outgoing, incoming, .. } => (outgoing, incoming),
            CrossfadeState::Complete { new_active } => (new_active.other(), new_active),
            CrossfadeState::Idle => return,
        };

        {
            let deck = self.deck_mut(outgoing);
            deck.stop();
            deck.unload();
            deck.set_volume(0.0);
        }
        {
            let deck = self.deck_mut(incoming);
            deck.set_volume(1.0);
            if !deck.is_playing() {
                deck.play();
            }
        }
        self.crossfade.reset();
        self.live = incoming;
        log::info!("AutoDJ: {incoming} is live");

        if rearm {
            self.arm_deck(outgoing);
        }
    }

    // ── Operator actions ──────────────────────────────────────────────────

    pub fn fade_now(&mut self) {
        self.fade_now_at(Instant::now());
    }

    /// Start the transition immediately. Only meaningful in `Idle` with the
    /// waiting deck armed; a silence plan becomes a cut.
    pub fn fade_now_at(&mut self, now: Instant) {
        if !self.state.can_fade_now() {
            return;
        }
        let live = self.live;
        let Some(incoming) = self.deck(live.other()).loaded_track() else {
            return;
        };
        let Some(track) = self.deck(live).loaded_track() else {
            return;
        };
        let mut plan = self.plan_for(&track, Some(&incoming));
        if plan.has_gap() {
            plan.gap_sec = 0.0;
            plan.fade_sec = 0.0;
        }
        let position = self.deck(live).position_sec();
        self.start_fade(live, plan, position, now, "fade now");
    }

    /// Replace the waiting deck's track with the next queue entry.
    pub fn skip_next(&mut self) {
        if self.state != AutoDjState::Idle {
            return;
        }
        let waiting = self.live.other();
        if let Some(track) = self.deck(waiting).loaded_track() {
            log::info!("AutoDJ: skipping #{} {}", track.id, track.title);
        }
        self.deck_mut(waiting).unload();
        self.arm_deck(waiting);
    }

    /// Shuffle the queue entries at `selection` (the whole queue when empty).
    /// Entries whose track sits in either deck keep their position.
    pub fn shuffle_playlist(&mut self, selection: &[usize]) -> usize {
        let pinned: Vec<TrackId> = DeckId::BOTH
            .iter()
            .filter_map(|&id| self.deck(id).loaded_track())
            .map(|t| t.id)
            .collect();
        self.queue.shuffle(selection, &pinned, &mut self.rng)
    }

    // ── Queue ─────────────────────────────────────────────────────────────

    pub fn enqueue(&mut self, track: Track) {
        self.queue.enqueue(track);
    }

    pub fn remove_from_queue(&mut self, index: usize) -> Option<Track> {
        self.queue.remove(index)
    }

    /// Append up to `n` random library tracks. Returns how many were added.
    pub fn add_random_tracks(&mut self, n: usize) -> usize {
        let target = self.queue.len() + n;
        self.queue.refill_if_below(target, self.library.as_ref())
    }

    pub fn selection_info(&self, indices: &[usize]) -> SelectionInfo {
        self.queue.selection_info(indices)
    }

    // ── Configuration ─────────────────────────────────────────────────────

    pub fn transition_mode(&self) -> TransitionMode {
        self.config.mode
    }

    /// Applies from the next transition; a fade in progress keeps its plan.
    pub fn set_transition_mode(&mut self, mode: TransitionMode) {
        self.config.mode = mode;
        self.settings.set(&config_key(KEY_TRANSITION_MODE), mode.code().to_string());
        self.events.emit(AutoDjEvent::TransitionModeChanged { mode });
    }

    pub fn transition_time(&self) -> i32 {
        self.config.transition_time_sec
    }

    /// Negative values insert silence in the fixed modes.
    pub fn set_transition_time(&mut self, seconds: i32) {
        self.config.transition_time_sec = seconds;
        self.settings.set(&config_key(KEY_TRANSITION_TIME), seconds.to_string());
        self.events.emit(AutoDjEvent::TransitionTimeChanged { seconds });
    }

    pub fn repeat_playlist(&self) -> bool {
        self.config.repeat_playlist
    }

    pub fn set_repeat_playlist(&mut self, repeat: bool) {
        self.config.repeat_playlist = repeat;
        self.settings
            .set(&config_key(KEY_REPEAT_PLAYLIST), if repeat { "1" } else { "0" }.to_string());
    }

    pub fn set_random_queue(&mut self, enabled: bool, min_tracks: u32) {
        self.config.random_queue_enabled = enabled;
        self.config.random_queue_min_tracks = min_tracks;
        self.settings
            .set(&config_key(KEY_RANDOM_QUEUE), if enabled { "1" } else { "0" }.to_string());
        self.settings.set(&config_key(KEY_RANDOM_QUEUE_MIN), min_tracks.to_string());
        if enabled {
            self.queue.refill_if_below(min_tracks as usize, self.library.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::deck::SimDeck,
        db::{
            library::{CuePoints, MemoryLibrary},
            settings::{ConfigKey, MemorySettings},
        },
        scheduler::autodj::PREFERENCE_GROUP,
    };

    const LEN: f64 = 200.0;

    struct Rig {
        dj: AutoDjProcessor,
        a: SimDeck,
        b: SimDeck,
        library: MemoryLibrary,
        settings: MemorySettings,
    }

    fn track(id: TrackId) -> Track {
        Track::new(id, format!("track {id}"), LEN)
    }

    fn rig_with(settings: MemorySettings, queued: &[TrackId]) -> Rig {
        rig_from((1..=10).map(track).collect(), settings, queued)
    }

    /// Queued ids are looked up in `tracks`, so cue points carry through.
    fn rig_from(tracks: Vec<Track>, settings: MemorySettings, queued: &[TrackId]) -> Rig {
        let a = SimDeck::new();
        let b = SimDeck::new();
        let library = MemoryLibrary::new(tracks.clone());
        let mut dj = AutoDjProcessor::new(
            Box::new(a.clone()),
            Box::new(b.clone()),
            Arc::new(library.clone()),
            Box::new(settings.clone()),
        )
        .with_rng_seed(5);
        for &id in queued {
            if let Some(t) = tracks.iter().find(|t| t.id == id) {
                dj.enqueue(t.clone());
            }
        }
        Rig { dj, a, b, library, settings }
    }

    fn rig(queued: &[TrackId]) -> Rig {
        rig_with(MemorySettings::new(), queued)
    }

    fn fixed(seconds: i32) -> MemorySettings {
        MemorySettings::new()
            .with_value(ConfigKey::new(PREFERENCE_GROUP, KEY_TRANSITION_MODE), "2")
            .with_value(ConfigKey::new(PREFERENCE_GROUP, KEY_TRANSITION_TIME), seconds.to_string())
    }

    /// Enable from two stopped decks and tick into `Idle`.
    fn running(rig: &mut Rig) {
        rig.dj.enable(true).unwrap();
        rig.dj.tick();
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
    }

    /// Put deck A at its trigger and start the fade at `t0`.
    fn fading(rig: &mut Rig, position: f64, t0: Instant) {
        running(rig);
        rig.a.seek(position);
        rig.dj.tick_at(t0);
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
    }

    fn drain(rx: &mut broadcast::Receiver<AutoDjEvent>) -> Vec<AutoDjEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn play(deck: &SimDeck, id: TrackId) {
        let mut deck = deck.clone();
        deck.load(&track(id)).unwrap();
        deck.play();
    }

    #[test]
    fn enabling_with_stopped_decks_starts_deck_a() {
        let mut rig = rig(&[1, 2, 3]);
        let mut rx = rig.dj.subscribe();
        rig.dj.enable(true).unwrap();
        assert_eq!(rig.dj.state(), AutoDjState::P1Loaded);
        assert_eq!(rig.a.track_id(), Some(1));
        assert!(rig.a.is_playing());
        assert_eq!(rig.a.volume(), 1.0);

        rig.dj.tick();
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.b.track_id(), Some(2));
        assert!(!rig.b.is_playing());
        assert_eq!(rig.b.volume(), 0.0);

        let events = drain(&mut rx);
        assert!(events.contains(&AutoDjEvent::StateChanged {
            from: AutoDjState::Disabled,
            to: AutoDjState::P1Loaded,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            AutoDjEvent::TrackArmed { deck: DeckId::DeckB, track_id: 2, .. }
        )));
    }

    #[test]
    fn enabling_with_one_deck_playing_keeps_it_live() {
        let mut rig = rig(&[1, 2]);
        play(&rig.b, 9);
        rig.dj.enable(true).unwrap();
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.dj.live_deck(), DeckId::DeckB);
        assert_eq!(rig.b.volume(), 1.0);
        assert_eq!(rig.a.track_id(), Some(1));
        assert_eq!(rig.a.volume(), 0.0);
        assert!(!rig.a.is_playing());
    }

    #[test]
    fn enabling_with_both_decks_playing_fails_without_side_effects() {
        let mut rig = rig(&[1, 2]);
        play(&rig.a, 8);
        play(&rig.b, 9);
        assert_eq!(rig.dj.enable(true), Err(AutoDjError::BothDecksPlaying));
        assert_eq!(rig.dj.state(), AutoDjState::Disabled);
        assert_eq!(rig.a.track_id(), Some(8));
        assert_eq!(rig.b.track_id(), Some(9));
        assert_eq!(rig.dj.queue().len(), 2);
    }

    #[test]
    fn enabling_with_another_deck_playing_fails() {
        let a = SimDeck::new();
        let b = SimDeck::new();
        let third = SimDeck::new();
        play(&third, 3);
        let mut dj = AutoDjProcessor::new(
            Box::new(a),
            Box::new(b),
            Arc::new(MemoryLibrary::default()),
            Box::new(MemorySettings::new()),
        )
        .with_other_decks(vec![Box::new(third)]);
        assert_eq!(dj.enable(true), Err(AutoDjError::OtherDecksPlaying));
        assert_eq!(dj.state(), AutoDjState::Disabled);
    }

    #[test]
    fn enabling_twice_is_a_no_op() {
        let mut rig = rig(&[1, 2]);
        running(&mut rig);
        assert_eq!(rig.dj.enable(true), Ok(()));
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.a.track_id(), Some(1));
    }

    #[test]
    fn full_cycle_hands_over_to_the_armed_deck() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3]);
        let t0 = Instant::now();
        fading(&mut rig, LEN - 10.0, t0);
        assert!(rig.b.is_playing());
        assert_eq!(rig.b.volume(), 0.0);

        rig.dj.tick_at(t0 + Duration::from_secs(5));
        assert!((rig.a.volume() - 0.5).abs() < 0.01);
        assert!((rig.b.volume() - 0.5).abs() < 0.01);
        assert!((rig.a.volume() + rig.b.volume() - 1.0).abs() < 1e-5);

        rig.dj.tick_at(t0 + Duration::from_secs(10));
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.dj.live_deck(), DeckId::DeckB);
        assert_eq!(rig.b.volume(), 1.0);
        assert!(rig.b.is_playing());
        assert_eq!(rig.a.volume(), 0.0);
        assert!(!rig.a.is_playing());
        assert_eq!(rig.a.track_id(), Some(3), "outgoing deck re-armed from the queue");
    }

    #[test]
    fn second_cycle_hands_back_to_deck_a() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3, 4]);
        let t0 = Instant::now();
        fading(&mut rig, LEN - 10.0, t0);
        rig.dj.tick_at(t0 + Duration::from_secs(10));
        assert_eq!(rig.dj.live_deck(), DeckId::DeckB);

        rig.b.seek(LEN - 10.0);
        let t1 = t0 + Duration::from_secs(20);
        rig.dj.tick_at(t1);
        assert_eq!(rig.dj.state(), AutoDjState::RightFading);
        assert!(rig.a.is_playing());

        rig.dj.tick_at(t1 + Duration::from_secs(5));
        assert!((rig.a.volume() - 0.5).abs() < 0.01);

        rig.dj.tick_at(t1 + Duration::from_secs(10));
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.dj.live_deck(), DeckId::DeckA);
        assert_eq!((rig.a.volume(), rig.b.volume()), (1.0, 0.0));
        assert_eq!(rig.a.track_id(), Some(3));
        assert_eq!(rig.b.track_id(), Some(4));
        assert!(!rig.b.is_playing());
    }

    #[test]
    fn fade_at_outro_start_cuts_the_rest_of_the_outro() {
        let cues = CuePoints { outro_start: Some(170.0), ..Default::default() };
        let tracks = (1..=4).map(|id| track(id).with_cues(cues)).collect();
        let settings = MemorySettings::new()
            .with_value(ConfigKey::new(PREFERENCE_GROUP, KEY_TRANSITION_MODE), "1")
            .with_value(ConfigKey::new(PREFERENCE_GROUP, KEY_TRANSITION_TIME), "10");
        let mut rig = rig_from(tracks, settings, &[1, 2, 3]);
        running(&mut rig);

        let t0 = Instant::now();
        rig.a.seek(160.0);
        rig.dj.tick_at(t0);
        assert_eq!(rig.dj.state(), AutoDjState::Idle, "before the outro cue");

        rig.a.seek(170.0);
        rig.dj.tick_at(t0);
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
        let decision = rig.dj.last_decision().unwrap();
        assert_eq!(decision.trigger_sec, Some(170.0));
        assert_eq!(decision.fade_sec, Some(10.0));

        rig.dj.tick_at(t0 + Duration::from_secs(5));
        assert!(rig.a.is_playing());

        rig.dj.tick_at(t0 + Duration::from_secs(10));
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.b.volume(), 1.0);
        assert_eq!(rig.a.volume(), 0.0);
        assert_eq!(rig.a.track_id(), Some(3), "outro dropped, next track armed");
        assert_eq!(rig.a.position_sec(), 0.0);
    }

    #[test]
    fn every_mode_ends_with_one_deck_full_and_one_silent() {
        for mode in TransitionMode::ALL {
            let mut rig = rig(&[1, 2, 3]);
            rig.dj.set_transition_mode(mode);
            rig.dj.set_transition_time(8);
            let t0 = Instant::now();
            fading(&mut rig, LEN - 8.0, t0);
            rig.dj.tick_at(t0 + Duration::from_secs(8));
            assert_eq!(rig.dj.state(), AutoDjState::Idle, "{mode:?}");
            assert_eq!(rig.b.volume(), 1.0, "{mode:?}");
            assert_eq!(rig.a.volume(), 0.0, "{mode:?}");
        }
    }

    #[test]
    fn negative_time_waits_in_silence_before_starting_the_next_track() {
        let mut rig = rig_with(fixed(-3), &[1, 2, 3]);
        let mut rx = rig.dj.subscribe();
        let t0 = Instant::now();
        fading(&mut rig, LEN, t0);
        assert!(!rig.a.is_playing());
        assert!(!rig.b.is_playing());

        rig.dj.tick_at(t0 + Duration::from_secs(1));
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
        assert!(!rig.b.is_playing());

        rig.dj.tick_at(t0 + Duration::from_secs(3));
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert!(rig.b.is_playing());
        assert_eq!(rig.b.volume(), 1.0);
        assert!(drain(&mut rx).contains(&AutoDjEvent::FadeStarted {
            from: DeckId::DeckA,
            to: DeckId::DeckB,
            fade_sec: 0.0,
            gap_sec: 3.0,
        }));
    }

    #[test]
    fn disabling_mid_fade_restores_the_outgoing_deck() {
        for step in 1..10 {
            let mut rig = rig_with(fixed(10), &[1, 2, 3]);
            let t0 = Instant::now();
            fading(&mut rig, LEN - 10.0, t0);
            let now = t0 + Duration::from_secs(step);
            rig.dj.tick_at(now);
            rig.dj.enable_at(false, now).unwrap();

            assert_eq!(rig.dj.state(), AutoDjState::Disabled);
            assert_eq!(rig.a.volume(), 1.0);
            assert!(rig.a.is_playing());
            assert!(!rig.b.is_playing());
            assert_eq!(rig.b.track_id(), Some(2), "incoming keeps its track");
            assert_eq!(rig.b.volume(), 1.0);
        }
    }

    #[test]
    fn disabling_at_the_very_end_of_a_fade_completes_it() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3]);
        let t0 = Instant::now();
        fading(&mut rig, LEN - 10.0, t0);
        rig.dj.enable_at(false, t0 + Duration::from_millis(9_970)).unwrap();

        assert_eq!(rig.dj.state(), AutoDjState::Disabled);
        assert!(rig.b.is_playing());
        assert_eq!(rig.b.volume(), 1.0);
        assert!(!rig.a.is_playing());
        assert_eq!(rig.a.volume(), 1.0);
    }

    #[test]
    fn manual_stop_of_live_deck_disables() {
        let mut rig = rig(&[1, 2]);
        running(&mut rig);
        let mut a = rig.a.clone();
        a.stop();
        rig.dj.tick();
        assert_eq!(rig.dj.state(), AutoDjState::Disabled);
        assert_eq!(rig.b.volume(), 1.0);
    }

    #[test]
    fn manual_stop_of_incoming_deck_mid_fade_disables() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3]);
        let t0 = Instant::now();
        fading(&mut rig, LEN - 10.0, t0);
        rig.dj.tick_at(t0 + Duration::from_secs(4));
        let mut b = rig.b.clone();
        b.stop();
        rig.dj.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(rig.dj.state(), AutoDjState::Disabled);
        assert!(rig.a.is_playing());
        assert_eq!(rig.a.volume(), 1.0);
    }

    #[test]
    fn outgoing_ending_early_completes_the_fade() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3]);
        let t0 = Instant::now();
        fading(&mut rig, LEN - 10.0, t0);
        rig.a.seek(LEN);
        rig.dj.tick_at(t0 + Duration::from_secs(1));
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.dj.live_deck(), DeckId::DeckB);
        assert_eq!(rig.b.volume(), 1.0);
    }

    #[test]
    fn empty_queue_stalls_in_idle_until_a_track_arrives() {
        let mut rig = rig(&[1]);
        let mut rx = rig.dj.subscribe();
        running(&mut rig);
        assert!(rig.b.track_id().is_none());

        rig.a.seek(LEN);
        rig.dj.tick();
        rig.dj.tick();
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        let stalls = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, AutoDjEvent::QueueStalled { .. }))
            .count();
        assert_eq!(stalls, 1);
        assert_eq!(
            rig.dj.last_decision().map(|d| d.reason.as_str()),
            Some(REASON_NOTHING_ARMED)
        );

        rig.dj.enqueue(track(2));
        rig.dj.tick();
        assert_eq!(rig.b.track_id(), Some(2));
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
    }

    #[test]
    fn repeat_reloads_the_playlist_when_the_queue_runs_dry() {
        let mut rig = rig(&[1]);
        rig.dj.set_repeat_playlist(true);
        running(&mut rig);
        assert!(rig.b.track_id().is_some());
        assert_eq!(
            rig.settings.get(&ConfigKey::new(PREFERENCE_GROUP, KEY_REPEAT_PLAYLIST)).as_deref(),
            Some("1")
        );
    }

    #[test]
    fn load_failures_skip_to_the_next_entry() {
        let mut rig = rig(&[1, 2, 3]);
        rig.b.reject_track(2);
        running(&mut rig);
        assert_eq!(rig.b.track_id(), Some(3));
    }

    #[test]
    fn failed_arming_leaves_the_waiting_deck_empty() {
        let (a, b) = (SimDeck::new(), SimDeck::new());
        play(&a, 98);
        b.clone().load(&track(99)).unwrap();
        b.reject_track(1);
        let mut dj = AutoDjProcessor::new(
            Box::new(a.clone()),
            Box::new(b.clone()),
            Arc::new(MemoryLibrary::new(vec![track(1)])),
            Box::new(MemorySettings::new()),
        );
        dj.set_repeat_playlist(true);
        dj.enqueue(track(1));

        dj.enable(true).unwrap();
        assert_eq!(dj.state(), AutoDjState::Idle);
        assert_eq!(b.track_id(), None, "cued track is not treated as armed");

        a.seek(LEN - 5.0);
        dj.tick();
        assert_eq!(dj.state(), AutoDjState::Idle);
        let reason = dj.last_decision().map(|d| d.reason.as_str());
        assert_eq!(reason, Some(REASON_NOTHING_ARMED));
        assert!(a.is_playing());
        assert!(!b.is_playing());
    }

    #[test]
    fn failed_first_load_retries_instead_of_sticking() {
        let (a, b) = (SimDeck::new(), SimDeck::new());
        a.clone().load(&track(97)).unwrap();
        a.reject_track(1);
        let mut dj = AutoDjProcessor::new(
            Box::new(a.clone()),
            Box::new(b.clone()),
            Arc::new(MemoryLibrary::new(vec![track(1), track(2)])),
            Box::new(MemorySettings::new()),
        );
        dj.enqueue(track(1));

        dj.enable(true).unwrap();
        assert_eq!(dj.state(), AutoDjState::P1Loaded);
        assert_eq!(a.track_id(), None);
        assert!(!a.is_playing());

        dj.enqueue(track(2));
        dj.tick();
        assert_eq!(a.track_id(), Some(2));
        assert!(a.is_playing());
        dj.tick();
        assert_eq!(dj.state(), AutoDjState::Idle);
    }

    #[test]
    fn removed_tracks_are_not_armed() {
        let mut rig = rig(&[1, 2, 3]);
        rig.library.remove(2);
        running(&mut rig);
        assert_eq!(rig.b.track_id(), Some(3));
    }

    #[test]
    fn fade_now_starts_immediately_and_only_when_idle() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3]);
        rig.dj.enable(true).unwrap();
        rig.dj.fade_now();
        assert_eq!(rig.dj.state(), AutoDjState::P1Loaded);

        rig.dj.tick();
        rig.a.seek(50.0);
        rig.dj.fade_now();
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
        let decision = rig.dj.last_decision().unwrap();
        assert_eq!(decision.fade_sec, Some(10.0));
        assert_eq!(decision.from_deck, Some(DeckId::DeckA));

        rig.dj.fade_now();
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
    }

    #[test]
    fn fade_now_with_a_silence_plan_cuts() {
        let mut rig = rig_with(fixed(-5), &[1, 2, 3]);
        running(&mut rig);
        let t0 = Instant::now();
        rig.dj.fade_now_at(t0);
        let decision = rig.dj.last_decision().unwrap();
        assert_eq!(decision.fade_sec, Some(0.0));
        assert_eq!(decision.gap_sec, Some(0.0));
        assert!(rig.b.is_playing());

        rig.dj.tick_at(t0);
        assert_eq!(rig.dj.state(), AutoDjState::Idle);
        assert_eq!(rig.dj.live_deck(), DeckId::DeckB);
    }

    #[test]
    fn skip_next_replaces_the_armed_track() {
        let mut rig = rig(&[1, 2, 3, 4]);
        running(&mut rig);
        rig.dj.skip_next();
        assert_eq!(rig.b.track_id(), Some(3));
        assert_eq!(rig.dj.queue().len(), 1);
    }

    #[test]
    fn shuffle_leaves_tracks_in_decks_in_place() {
        let mut rig = rig(&[1, 2, 3, 4, 5, 6]);
        running(&mut rig);
        rig.dj.enqueue(track(1));
        let moved = rig.dj.shuffle_playlist(&[0, 1, 2, 3, 4]);
        assert_eq!(moved, 4);
        let ids: Vec<TrackId> = rig.dj.queue().iter().map(|t| t.id).collect();
        assert_eq!(ids[4], 1);
    }

    #[test]
    fn settings_are_read_at_construction_and_persisted_on_change() {
        let mut rig = rig_with(fixed(-5), &[]);
        assert_eq!(rig.dj.transition_mode(), TransitionMode::FixedFullTrack);
        assert_eq!(rig.dj.transition_time(), -5);

        let mut rx = rig.dj.subscribe();
        rig.dj.set_transition_time(-5);
        rig.dj.set_transition_mode(TransitionMode::FadeAtOutroStart);
        assert_eq!(
            drain(&mut rx),
            vec![
                AutoDjEvent::TransitionTimeChanged { seconds: -5 },
                AutoDjEvent::TransitionModeChanged { mode: TransitionMode::FadeAtOutroStart },
            ]
        );
        assert_eq!(
            rig.settings.get(&ConfigKey::new(PREFERENCE_GROUP, KEY_TRANSITION_MODE)).as_deref(),
            Some("1")
        );
    }

    #[test]
    fn config_changes_do_not_disturb_a_running_fade() {
        let mut rig = rig_with(fixed(10), &[1, 2, 3]);
        let t0 = Instant::now();
        fading(&mut rig, LEN - 10.0, t0);
        rig.dj.set_transition_time(2);
        rig.dj.set_transition_mode(TransitionMode::FullIntroOutro);
        rig.dj.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(rig.dj.state(), AutoDjState::LeftFading);
        assert!((rig.b.volume() - 0.5).abs() < 0.01);
    }

    #[test]
    fn random_queue_keeps_the_queue_topped_up() {
        let mut rig = rig(&[]);
        rig.dj.set_random_queue(true, 3);
        assert_eq!(rig.dj.queue().len(), 3);
        running(&mut rig);
        assert!(rig.a.track_id().is_some());
        assert!(rig.b.track_id().is_some());
        // Topped up before each dequeue.
        assert_eq!(rig.dj.queue().len(), 2);
    }

    #[test]
    fn add_random_and_selection_info() {
        let mut rig = rig(&[]);
        assert_eq!(rig.dj.add_random_tracks(4), 4);
        let info = rig.dj.selection_info(&[0, 1]);
        assert_eq!(info.count, 2);
        assert_eq!(info.total_duration_sec, 2.0 * LEN);
        assert!(rig.dj.remove_from_queue(0).is_some());
        assert_eq!(rig.dj.queue().len(), 3);
    }

    #[test]
    fn ticks_while_disabled_do_nothing() {
        let mut rig = rig(&[1, 2]);
        rig.dj.tick();
        assert_eq!(rig.dj.state(), AutoDjState::Disabled);
        assert!(rig.a.track_id().is_none());
    }
}
