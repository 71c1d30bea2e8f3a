/// AutoDJ track queue
///
/// Ordered list of tracks waiting to be armed. Entries are validated lazily
/// against the library when they reach the front, so removing a track from
/// the library never requires touching the queue.
use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::library::{Track, TrackId, TrackLibrary};

use super::shuffle::shuffle_selection;

/// Upper bound on `select_random` calls per refill.
const MAX_REFILL_ROUNDS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct TrackQueue {
    entries: VecDeque<Track>,
    /// Most recently dequeued track, so a refill of an empty queue does not
    /// immediately repeat it.
    last_dequeued: Option<TrackId>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, track: Track) {
        self.entries.push_back(track);
    }

    pub fn peek_front(&self) -> Option<&Track> {
        self.entries.front()
    }

    /// Pop the next playable track.
    ///
    /// Entries the library no longer knows are dropped. With `repeat` set, an
    /// exhausted queue is reloaded from the ordered playlist (at most once per
    /// call).
    pub fn dequeue_front(&mut self, library: &dyn TrackLibrary, repeat: bool) -> Option<Track> {
        let mut reloaded = false;
        loop {
            while let Some(entry) = self.entries.pop_front() {
                match library.resolve(entry.id) {
                    Some(track) => {
                        self.last_dequeued = Some(track.id);
                        return Some(track);
                    }
                    None => log::warn!(
                        "AutoDJ: dropping queued track {} ({}), no longer in library",
                        entry.id,
                        entry.title
                    ),
                }
            }

            if !repeat || reloaded {
                return None;
            }
            reloaded = true;
            let playlist = library.ordered_tracks();
            if playlist.is_empty() {
                return None;
            }
            log::info!("AutoDJ: queue empty, re-queueing {} playlist tracks", playlist.len());
            self.entries.extend(playlist);
        }
    }

    /// Top the queue up to `threshold` entries with random library tracks.
    ///
    /// Returns how many tracks were appended.
    pub fn refill_if_below(&mut self, threshold: usize, library: &dyn TrackLibrary) -> usize {
        let mut added = 0;
        for _ in 0..MAX_REFILL_ROUNDS {
            let missing = threshold.saturating_sub(self.entries.len());
            if missing == 0 {
                break;
            }
            let candidates = library.select_random(missing);
            if candidates.is_empty() {
                break;
            }
            for track in candidates {
                if self.entries.len() >= threshold {
                    break;
                }
                let previous = self.entries.back().map(|t| t.id).or(self.last_dequeued);
                if previous == Some(track.id) {
                    continue;
                }
                self.entries.push_back(track);
                added += 1;
            }
        }
        if added > 0 {
            log::debug!("AutoDJ: random queue added {added} track(s)");
        }
        added
    }

    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.entries.remove(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }

    /// Shuffle the entries at `selection` (whole queue when empty), leaving
    /// entries whose id is in `pinned` where they are.
    pub fn shuffle<R: Rng + ?Sized>(
        &mut self,
        selection: &[usize],
        pinned: &[TrackId],
        rng: &mut R,
    ) -> usize {
        shuffle_selection(
            self.entries.make_contiguous(),
            selection,
            |track| pinned.contains(&track.id),
            rng,
        )
    }

    /// Count and total length of the entries at `indices`.
    pub fn selection_info(&self, indices: &[usize]) -> SelectionInfo {
        let mut picked: Vec<usize> =
            indices.iter().copied().filter(|&i| i < self.entries.len()).collect();
        picked.sort_unstable();
        picked.dedup();
        let total_duration_sec = picked
            .iter()
            .map(|&i| self.entries[i].duration_sec)
            .filter(|d| d.is_finite() && *d > 0.0)
            .sum();
        SelectionInfo { count: picked.len(), total_duration_sec }
    }
}

// ── Selection info ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionInfo {
    pub count: usize,
    pub total_duration_sec: f64,
}

impl SelectionInfo {
    /// Operator-facing summary, e.g. `3 tracks (10:05)`. Empty when nothing is
    /// selected.
    pub fn label(&self) -> String {
        match self.count {
            0 => String::new(),
            1 => format!("1 track ({})", format_duration(self.total_duration_sec)),
            n => format!("{n} tracks ({})", format_duration(self.total_duration_sec)),
        }
    }
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0).round() as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
