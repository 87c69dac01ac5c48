//! Detected events and their per-frame bookkeeping.
//!
//! A counting run produces a full set of [`ParticleEvent`]s. The
//! [`ParticleRegistry`] turns that set into an immutable [`RegistrySnapshot`]
//! (events, frame index and counters built together) and swaps it in as a
//! whole, so readers never observe a half-updated registry.

use std::sync::{Arc, RwLock};

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::image_proc::AABB;

/// Direction of the refractive-index change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// A particle binding to the surface
    Adsorption,
    /// A particle leaving the surface
    Desorption,
}

impl Polarity {
    /// Positive thresholds search adsorption, negative ones desorption.
    pub fn from_threshold(threshold: f64) -> Self {
        if threshold < 0.0 {
            Polarity::Desorption
        } else {
            Polarity::Adsorption
        }
    }

    /// Multiplier turning the correlation volume into the working volume.
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Adsorption => 1.0,
            Polarity::Desorption => -1.0,
        }
    }
}

/// Outcome of candidate validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Counted binding event
    Accepted,
    /// Explained by a stronger neighbour
    Minor,
    /// Duplicate of a stronger, simultaneous neighbour
    Blacklisted,
    /// Shorter than half an integration window
    TooShort,
    /// Accepted, but centred inside the exclusion mask
    Excluded,
}

/// A single detection. Never modified once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleEvent {
    /// Sequential id within its run
    pub id: usize,
    pub first_frame: usize,
    /// Number of frames the blob spans
    pub duration: usize,
    /// Bounding-box centre as (row, col)
    pub position: (f64, f64),
    pub polarity: Polarity,
    pub status: EventStatus,
    /// Working-volume maximum inside the box
    pub peak_value: f64,
    pub peak_frame: usize,
    /// Occupancy bounding box the event was derived from
    pub bounds: AABB,
}

impl ParticleEvent {
    /// Frame after the last active one.
    pub fn end_frame(&self) -> usize {
        self.first_frame + self.duration
    }

    /// Whether the event is active in frame `f`.
    pub fn is_active(&self, f: usize) -> bool {
        (self.first_frame..self.end_frame()).contains(&f)
    }

    /// Whether the event is drawn on the mask volume.
    pub fn is_marked(&self) -> bool {
        matches!(self.status, EventStatus::Accepted | EventStatus::Excluded)
    }
}

/// Events of one run plus everything derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    events: Vec<ParticleEvent>,
    /// Indices into `events` per frame
    frame_index: Vec<Vec<usize>>,
    count_per_frame: Vec<usize>,
    cumulative_count: Vec<usize>,
}

impl RegistrySnapshot {
    /// Index `events` over `frame_count` frames.
    ///
    /// Events are listed in every frame of `[first_frame, first_frame + duration)`
    /// that exists. Only accepted events are counted, in their first frame.
    pub fn build(events: Vec<ParticleEvent>, frame_count: usize) -> Self {
        let mut frame_index = vec![Vec::new(); frame_count];
        let mut count_per_frame = vec![0usize; frame_count];

        for (position, event) in events.iter().enumerate() {
            for entry in frame_index
                .iter_mut()
                .take(event.end_frame().min(frame_count))
                .skip(event.first_frame)
            {
                entry.push(position);
            }
            if event.status == EventStatus::Accepted && event.first_frame < frame_count {
                count_per_frame[event.first_frame] += 1;
            }
        }

        let cumulative_count = count_per_frame
            .iter()
            .scan(0usize, |total, &count| {
                *total += count;
                Some(*total)
            })
            .collect();

        Self {
            events,
            frame_index,
            count_per_frame,
            cumulative_count,
        }
    }

    pub fn events(&self) -> &[ParticleEvent] {
        &self.events
    }

    pub fn frame_count(&self) -> usize {
        self.frame_index.len()
    }

    /// Events active in frame `f`; empty for frames outside the index.
    pub fn events_in_frame(&self, f: usize) -> impl Iterator<Item = &ParticleEvent> + '_ {
        self.frame_index
            .get(f)
            .into_iter()
            .flatten()
            .map(move |&position| &self.events[position])
    }

    /// Ids of the events active in frame `f`.
    pub fn ids_in_frame(&self, f: usize) -> Vec<usize> {
        self.events_in_frame(f).map(|event| event.id).collect()
    }

    /// Events with the given status, in id order.
    pub fn with_status(&self, status: EventStatus) -> impl Iterator<Item = &ParticleEvent> + '_ {
        self.events.iter().filter(move |event| event.status == status)
    }

    /// Newly accepted events per frame.
    pub fn count_per_frame(&self) -> &[usize] {
        &self.count_per_frame
    }

    /// Running sum of [`RegistrySnapshot::count_per_frame`].
    pub fn cumulative_count(&self) -> &[usize] {
        &self.cumulative_count
    }

    /// Total accepted events.
    pub fn accepted_total(&self) -> usize {
        self.cumulative_count.last().copied().unwrap_or(0)
    }

    /// Boolean volume marking the box of every accepted or excluded event
    /// in each of its active frames.
    pub fn mask_volume(&self, shape: (usize, usize, usize)) -> Array3<bool> {
        let (rows, cols, frames) = shape;
        let mut mask = Array3::from_elem(shape, false);
        for event in self.events.iter().filter(|e| e.is_marked()) {
            let bounds = &event.bounds;
            if bounds.min_row >= rows || bounds.min_col >= cols || event.first_frame >= frames {
                continue;
            }
            mask.slice_mut(s![
                bounds.min_row..(bounds.max_row + 1).min(rows),
                bounds.min_col..(bounds.max_col + 1).min(cols),
                event.first_frame..event.end_frame().min(frames)
            ])
            .fill(true);
        }
        mask
    }
}

/// Holder of the current snapshot.
///
/// Readers clone an `Arc` and keep a consistent view for as long as they
/// need it; [`ParticleRegistry::register`] swaps in a complete new snapshot.
#[derive(Debug, Default)]
pub struct ParticleRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl ParticleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole event set and return the new snapshot.
    pub fn register(&self, events: Vec<ParticleEvent>, frame_count: usize) -> Arc<RegistrySnapshot> {
        let snapshot = Arc::new(RegistrySnapshot::build(events, frame_count));
        log::info!(
            "Registered {} events, {} accepted over {} frames",
            snapshot.events().len(),
            snapshot.accepted_total(),
            frame_count
        );
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::clone(&snapshot);
        snapshot
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let current = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: usize, first_frame: usize, duration: usize, status: EventStatus) -> ParticleEvent {
        ParticleEvent {
            id,
            first_frame,
            duration,
            position: (2.0, 3.0),
            polarity: Polarity::Adsorption,
            status,
            peak_value: 1.0,
            peak_frame: first_frame,
            bounds: AABB::from_coords((1, 3), (2, 4), (first_frame, first_frame + duration - 1)),
        }
    }

    #[test]
    fn test_polarity_from_threshold() {
        assert_eq!(Polarity::from_threshold(0.4), Polarity::Adsorption);
        assert_eq!(Polarity::from_threshold(-0.4), Polarity::Desorption);
        assert_eq!(Polarity::Desorption.sign(), -1.0);
    }

    #[test]
    fn test_frame_index_is_half_open() {
        let snapshot = RegistrySnapshot::build(vec![event(0, 2, 3, EventStatus::Accepted)], 10);
        assert!(snapshot.ids_in_frame(1).is_empty());
        assert_eq!(snapshot.ids_in_frame(2), vec![0]);
        assert_eq!(snapshot.ids_in_frame(4), vec![0]);
        assert!(snapshot.ids_in_frame(5).is_empty());
        assert!(snapshot.ids_in_frame(50).is_empty());
    }

    #[test]
    fn test_counts_only_accepted_events() {
        let snapshot = RegistrySnapshot::build(
            vec![
                event(0, 2, 3, EventStatus::Accepted),
                event(1, 2, 4, EventStatus::Excluded),
                event(2, 4, 2, EventStatus::Accepted),
                event(3, 4, 2, EventStatus::Blacklisted),
                event(4, 5, 1, EventStatus::TooShort),
                event(5, 7, 2, EventStatus::Accepted),
            ],
            8,
        );
        assert_eq!(snapshot.count_per_frame(), &[0, 0, 1, 0, 1, 0, 0, 1]);
        assert_eq!(snapshot.cumulative_count(), &[0, 0, 1, 1, 2, 2, 2, 3]);
        assert_eq!(snapshot.accepted_total(), 3);
        // every status appears in the index
        assert_eq!(snapshot.ids_in_frame(4), vec![0, 1, 2, 3]);
        // clamped to the last frame
        assert_eq!(snapshot.ids_in_frame(7), vec![5]);
        assert_eq!(snapshot.with_status(EventStatus::Accepted).count(), 3);
    }

    #[test]
    fn test_mask_volume_marks_accepted_and_excluded() {
        let snapshot = RegistrySnapshot::build(
            vec![
                event(0, 2, 2, EventStatus::Accepted),
                event(1, 6, 2, EventStatus::Minor),
            ],
            10,
        );
        let mask = snapshot.mask_volume((6, 6, 10));
        assert!(mask[[1, 2, 2]]);
        assert!(mask[[3, 4, 3]]);
        assert!(!mask[[3, 4, 4]]);
        assert!(!mask[[0, 2, 2]]);
        assert!(!mask[[2, 3, 6]]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 3 * 3 * 2);
    }

    #[test]
    fn test_register_swaps_whole_snapshot() {
        let registry = ParticleRegistry::new();
        assert!(registry.snapshot().events().is_empty());

        let first = registry.register(vec![event(0, 1, 2, EventStatus::Accepted)], 5);
        let held = registry.snapshot();
        assert_eq!(held, first);

        registry.register(
            vec![
                event(0, 0, 1, EventStatus::Accepted),
                event(1, 3, 1, EventStatus::Accepted),
            ],
            5,
        );
        // an old reader keeps its consistent view
        assert_eq!(held.events().len(), 1);
        assert_eq!(held.accepted_total(), 1);
        assert_eq!(registry.snapshot().accepted_total(), 2);
    }
}
