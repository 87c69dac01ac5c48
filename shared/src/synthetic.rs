//! Synthetic SPR volumes with known binding events.
//!
//! A binding event is modelled as a rectangular patch of pixels whose
//! intensity ramps linearly up and back down over a fixed number of frames.
//! The amplitude is signed: positive amplitudes model adsorption, negative
//! amplitudes desorption.
//!
//! # Examples
//!
//! ```rust
//! use shared::synthetic::{BindingEvent, SyntheticVolume};
//!
//! let volume = SyntheticVolume::new(20, 20, 40)
//!     .with_event(BindingEvent::new((8, 8), (3, 3), 10, 5, 3.0))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(volume.dim(), (20, 20, 40));
//! assert_eq!(volume[[9, 9, 12]], 3.0);
//! assert_eq!(volume[[9, 9, 9]], 0.0);
//! ```

use ndarray::Array3;

use crate::image_proc::noise::{add_normal_noise, NoiseError};

/// A single triangular binding event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindingEvent {
    /// Top-left (row, col) of the affected patch
    pub origin: (usize, usize),
    /// Patch size as (rows, cols)
    pub size: (usize, usize),
    /// First frame with a non-zero signal
    pub first_frame: usize,
    /// Number of frames with a non-zero signal
    pub duration: usize,
    /// Peak intensity change, signed
    pub amplitude: f64,
}

impl BindingEvent {
    pub fn new(
        origin: (usize, usize),
        size: (usize, usize),
        first_frame: usize,
        duration: usize,
        amplitude: f64,
    ) -> Self {
        Self {
            origin,
            size,
            first_frame,
            duration,
            amplitude,
        }
    }

    /// Intensity of the event `offset` frames after `first_frame`.
    ///
    /// Rises linearly to `amplitude` at the middle frame and falls back
    /// symmetrically, e.g. `[1, 2, 3, 2, 1] / 3 * amplitude` for five frames.
    pub fn profile(&self, offset: usize) -> f64 {
        if offset >= self.duration {
            return 0.0;
        }
        let mid = (self.duration as f64 - 1.0) / 2.0;
        let distance = (offset as f64 - mid).abs();
        self.amplitude * (1.0 - distance / (mid + 1.0))
    }

    /// Frame at which the event reaches its peak amplitude.
    pub fn peak_frame(&self) -> usize {
        self.first_frame + self.duration.saturating_sub(1) / 2
    }

    /// Centre of the patch in (row, col) pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.origin.0 as f64 + (self.size.0 as f64 - 1.0) / 2.0,
            self.origin.1 as f64 + (self.size.1 as f64 - 1.0) / 2.0,
        )
    }
}

/// Builder for a synthetic (rows, cols, frames) intensity volume.
#[derive(Debug, Clone)]
pub struct SyntheticVolume {
    shape: (usize, usize, usize),
    baseline: f64,
    noise: Option<(f64, u64)>,
    events: Vec<BindingEvent>,
}

impl SyntheticVolume {
    pub fn new(rows: usize, cols: usize, frames: usize) -> Self {
        Self {
            shape: (rows, cols, frames),
            baseline: 0.0,
            noise: None,
            events: Vec::new(),
        }
    }

    /// Constant intensity added to every sample.
    pub fn with_baseline(mut self, baseline: f64) -> Self {
        self.baseline = baseline;
        self
    }

    /// Zero-mean Gaussian noise with the given standard deviation and seed.
    pub fn with_noise(mut self, std_dev: f64, seed: u64) -> Self {
        self.noise = Some((std_dev, seed));
        self
    }

    pub fn with_event(mut self, event: BindingEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = BindingEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn events(&self) -> &[BindingEvent] {
        &self.events
    }

    /// Render the volume. Events are clipped to the volume bounds.
    pub fn build(&self) -> Result<Array3<f64>, NoiseError> {
        let (rows, cols, frames) = self.shape;
        let mut volume = Array3::from_elem(self.shape, self.baseline);

        for event in &self.events {
            let row_end = (event.origin.0 + event.size.0).min(rows);
            let col_end = (event.origin.1 + event.size.1).min(cols);
            let frame_end = (event.first_frame + event.duration).min(frames);

            for f in event.first_frame..frame_end {
                let value = event.profile(f - event.first_frame);
                for r in event.origin.0..row_end {
                    for c in event.origin.1..col_end {
                        volume[[r, c, f]] += value;
                    }
                }
            }
        }

        if let Some((std_dev, seed)) = self.noise {
            log::debug!("Adding synthetic noise: std dev {std_dev}, seed {seed}");
            add_normal_noise(&mut volume, 0.0, std_dev, seed)?;
        }

        Ok(volume)
    }
}
