//! Candidate detection on a correlated SPR volume.
//!
//! A counting run over `[start, stop)` proceeds in fixed steps:
//!
//! 1. **Binarize** the differenced (and filtered) volume at a fraction of its
//!    full scale. Differencing removes the reflectivity baseline; occupancy
//!    only seeds the spatial and temporal extent of candidates.
//! 2. **Label** 26-connected occupancy blobs; each label is a candidate.
//! 3. **Select polarity**: the working volume is the correlation for a
//!    positive threshold and its negation for a negative one.
//! 4. **Validate** every candidate: duration, peak, neighbours.
//! 5. **Arbitrate** overlapping candidates ([`arbitration`]).
//! 6. **Gate** on the adaptive threshold at the peak frame and tag events
//!    centred inside the exclusion mask.
//!
//! Frames before `2k` are never considered: the differencing has no valid
//! value there.

pub mod arbitration;

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{s, Array3, ArrayView1, ArrayView3};
use thiserror::Error;

use crate::aggregate::ExclusionMask;
use crate::config::{ConfigError, DetectionConfig};
use crate::correlation::CorrelationVolume;
use crate::image_proc::labeling::binarize_frame;
use crate::image_proc::{connected_components, AABB};
use crate::pattern::ReferencePattern;
use crate::registry::{EventStatus, ParticleEvent, Polarity};
use crate::volume::{VolumeAccessor, VolumeError};

use arbitration::{arbitrate, Contender, Verdict};

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid detection config: {0}")]
    Config(#[from] ConfigError),
    #[error("Frame range [{start}, {stop}) is empty")]
    InvalidFrameRange { start: usize, stop: usize },
    #[error("Correlation volume {correlation:?} does not match the raw volume {volume:?}")]
    ShapeMismatch {
        volume: (usize, usize, usize),
        correlation: (usize, usize, usize),
    },
    #[error("Exclusion mask {mask:?} does not match the frame shape {frame:?}")]
    MaskShapeMismatch {
        mask: (usize, usize),
        frame: (usize, usize),
    },
    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),
    #[error("Detection was cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared with the caller.
///
/// Checked between frames while binarizing and between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), DetectionError> {
        if self.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }
        Ok(())
    }
}

/// Events of one counting run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutcome {
    /// Emitted events in label order
    pub events: Vec<ParticleEvent>,
    /// Frames actually searched after the warmup adjustment
    pub frames: Range<usize>,
    /// Number of labeled candidates before validation
    pub candidates: usize,
}

impl DetectionOutcome {
    pub fn accepted(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.status == EventStatus::Accepted)
            .count()
    }
}

/// A labeled blob with its measured peak.
#[derive(Debug, Clone)]
struct Candidate {
    label: u32,
    bounds: AABB,
    too_short: bool,
    peak_value: f64,
    /// (row, col, frame)
    peak: (usize, usize, usize),
}

/// Runs the detection steps with a fixed configuration.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    config: DetectionConfig,
}

impl DetectionEngine {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Frames searched by a run over a volume of `frames` frames.
    ///
    /// `stop` is clamped to the volume and `start` advanced past the warmup.
    /// The result may be empty.
    pub fn effective_range(&self, frames: usize) -> Result<Range<usize>, DetectionError> {
        let start = self.config.start_frame;
        let stop = self.config.stop_frame.unwrap_or(frames);
        if stop <= start {
            return Err(DetectionError::InvalidFrameRange { start, stop });
        }
        let warmup = 2 * self.config.integration_window;
        let start = start.max(warmup);
        let stop = stop.min(frames);
        Ok(start..stop.max(start))
    }

    /// Detect binding events.
    ///
    /// Identical inputs always give identical outcomes: labels follow a
    /// fixed scan order and arbitration breaks ties by label.
    pub fn run(
        &self,
        volume: &VolumeAccessor,
        correlation: &CorrelationVolume,
        pattern: &ReferencePattern,
        exclusion: Option<&ExclusionMask>,
        cancel: &CancellationToken,
    ) -> Result<DetectionOutcome, DetectionError> {
        self.config.validate()?;
        if correlation.dim() != volume.dim() {
            return Err(DetectionError::ShapeMismatch {
                volume: volume.dim(),
                correlation: correlation.dim(),
            });
        }
        if let Some(mask) = exclusion {
            if mask.shape() != volume.frame_shape() {
                return Err(DetectionError::MaskShapeMismatch {
                    mask: mask.shape(),
                    frame: volume.frame_shape(),
                });
            }
        }

        let frames = self.effective_range(volume.frames())?;
        if frames.is_empty() {
            log::warn!(
                "No frames left to search after warmup (requested start {}, k = {})",
                self.config.start_frame,
                self.config.integration_window
            );
            return Ok(DetectionOutcome {
                frames,
                ..Default::default()
            });
        }

        log::info!(
            "Detecting over frames {:?} (threshold {}, d = {}, {:?})",
            frames,
            self.config.threshold,
            self.config.min_distance,
            self.config.arbitration
        );

        let difference =
            volume.difference_volume(self.config.integration_window, &self.config.filters)?;
        let occupancy = self.occupancy(difference.view(), frames.clone(), cancel)?;
        let labeling = connected_components(occupancy.view());
        log::debug!("Labeled {} candidate regions", labeling.len());

        let polarity = Polarity::from_threshold(self.config.threshold);
        let working = correlation.view();
        let sign = polarity.sign();

        let mut candidates = Vec::with_capacity(labeling.len());
        let mut contenders = Vec::new();
        for (index, bounds) in labeling.regions.iter().enumerate() {
            cancel.check()?;
            let label = index as u32 + 1;
            let (peak_value, peak) = peak_in_box(working, sign, bounds);
            let too_short =
                (bounds.frame_span() as f64) < self.config.integration_window as f64 / 2.0;

            if !too_short {
                let search =
                    bounds.with_spatial_padding(self.config.min_distance, volume.frame_shape());
                let mut neighbours = labeling.labels_in_box(&search);
                neighbours.remove(&label);
                contenders.push(Contender {
                    label,
                    peak_value,
                    peak,
                    neighbours,
                });
            }
            candidates.push(Candidate {
                label,
                bounds: *bounds,
                too_short,
                peak_value,
                peak,
            });
        }

        let verdicts = arbitrate(
            &contenders,
            self.config.arbitration,
            self.config.min_distance,
        );
        // labels are dense in 1..=n
        let mut verdict_by_label: Vec<Option<Verdict>> = vec![None; labeling.len() + 1];
        for (contender, verdict) in contenders.iter().zip(&verdicts) {
            verdict_by_label[contender.label as usize] = Some(*verdict);
        }

        let gate = ThresholdGate::new(
            self.config.threshold.abs() * pattern.autocorrelation_peak(),
            correlation.std_per_frame().view(),
            frames.clone(),
            self.config.adaptive_exponent,
        );

        let mut events = Vec::new();
        for candidate in &candidates {
            cancel.check()?;
            if !gate.passes(candidate.peak_value, candidate.peak.2) {
                continue;
            }
            let position = candidate.bounds.center();
            let status = if candidate.too_short {
                EventStatus::TooShort
            } else {
                match verdict_by_label[candidate.label as usize] {
                    Some(Verdict::Minor) => EventStatus::Minor,
                    Some(Verdict::Blacklisted) => EventStatus::Blacklisted,
                    _ if exclusion.is_some_and(|m| m.contains(position)) => EventStatus::Excluded,
                    _ => EventStatus::Accepted,
                }
            };
            events.push(ParticleEvent {
                id: events.len(),
                first_frame: candidate.bounds.min_frame,
                duration: candidate.bounds.frame_span(),
                position,
                polarity,
                status,
                peak_value: candidate.peak_value,
                peak_frame: candidate.peak.2,
                bounds: candidate.bounds,
            });
        }

        let outcome = DetectionOutcome {
            events,
            frames,
            candidates: candidates.len(),
        };
        log::info!(
            "Found {} events from {} candidates, {} accepted",
            outcome.events.len(),
            outcome.candidates,
            outcome.accepted()
        );
        Ok(outcome)
    }

    /// Occupancy of every frame in `frames`, thresholded against the full
    /// scale of the differenced signal over that range.
    fn occupancy(
        &self,
        difference: ArrayView3<f64>,
        frames: Range<usize>,
        cancel: &CancellationToken,
    ) -> Result<Array3<bool>, DetectionError> {
        let full_scale = difference
            .slice(s![.., .., frames.clone()])
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let level = self.config.occupancy_fraction * full_scale;
        log::debug!("Occupancy level {level} (full scale {full_scale})");

        let mut mask = Array3::from_elem(difference.dim(), false);
        if full_scale == 0.0 {
            return Ok(mask);
        }
        for f in frames {
            cancel.check()?;
            binarize_frame(
                difference.slice(s![.., .., f]),
                level,
                mask.slice_mut(s![.., .., f]),
            );
        }
        Ok(mask)
    }
}

/// Maximum of `sign * data` inside `bounds`, with its (row, col, frame).
///
/// Boxes come from the occupancy labeling and never leave the searched
/// frame range. Ties keep the first sample in row, column, frame order.
fn peak_in_box(
    data: ArrayView3<f64>,
    sign: f64,
    bounds: &AABB,
) -> (f64, (usize, usize, usize)) {
    let (rows, cols, frames) = bounds.ranges();
    let mut best = (f64::NEG_INFINITY, (bounds.min_row, bounds.min_col, bounds.min_frame));
    for ((r, c, f), &value) in data.slice(s![rows, cols, frames]).indexed_iter() {
        let value = sign * value;
        if value > best.0 {
            best = (
                value,
                (bounds.min_row + r, bounds.min_col + c, bounds.min_frame + f),
            );
        }
    }
    best
}

/// Adaptive threshold `base * (std[f] / std_ref)^exponent`.
///
/// `std_ref` is the median of the non-zero per-frame stds in range. Without
/// a usable reference, or at a flat frame, the factor is 1.
struct ThresholdGate<'a> {
    base: f64,
    std_per_frame: ArrayView1<'a, f64>,
    reference: Option<f64>,
    exponent: f64,
}

impl<'a> ThresholdGate<'a> {
    fn new(
        base: f64,
        std_per_frame: ArrayView1<'a, f64>,
        frames: Range<usize>,
        exponent: f64,
    ) -> Self {
        let end = frames.end.min(std_per_frame.len());
        let start = frames.start.min(end);
        let mut active: Vec<f64> = std_per_frame
            .slice(s![start..end])
            .iter()
            .copied()
            .filter(|&v| v > 0.0)
            .collect();
        active.sort_by(f64::total_cmp);
        let reference = match active.len() {
            0 => None,
            n if n % 2 == 1 => Some(active[n / 2]),
            n => Some((active[n / 2 - 1] + active[n / 2]) / 2.0),
        };
        Self {
            base,
            std_per_frame,
            reference,
            exponent,
        }
    }

    fn level(&self, frame: usize) -> f64 {
        let std = self.std_per_frame.get(frame).copied().unwrap_or(0.0);
        match self.reference {
            Some(reference) if std > 0.0 && self.exponent != 0.0 => {
                self.base * (std / reference).powf(self.exponent)
            }
            _ => self.base,
        }
    }

    fn passes(&self, peak_value: f64, frame: usize) -> bool {
        peak_value >= self.level(frame)
    }
}
