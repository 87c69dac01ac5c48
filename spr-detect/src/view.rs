//! Frame images for display collaborators.
//!
//! Which image is produced is chosen by an explicit [`ViewKind`] on every
//! call; the renderer holds no mode of its own.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlation::CorrelationVolume;
use crate::image_proc::FilterChain;
use crate::volume::{FrameTime, VolumeAccessor, VolumeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("Correlation view requested before a correlation volume exists")]
    NoCorrelation,
    #[error("Volume access failed: {0}")]
    Volume(#[from] VolumeError),
}

/// Image kind to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewKind {
    Raw,
    /// Block average relative to the average starting at `reference_frame`
    Integral { reference_frame: usize },
    Differential,
    Correlation,
}

/// A rendered frame with its timing and display range.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    pub time: FrameTime,
    /// (low, high) display limits
    pub range: (f64, f64),
    pub image: Array2<f64>,
}

/// Read-only view over the session data.
#[derive(Debug, Clone, Copy)]
pub struct FrameRenderer<'a> {
    pub volume: &'a VolumeAccessor,
    pub correlation: Option<&'a CorrelationVolume>,
    pub integration_window: usize,
    pub filters: &'a FilterChain,
    /// Fixed display range; derived from each image when `None`
    pub display_range: Option<(f64, f64)>,
}

impl<'a> FrameRenderer<'a> {
    pub fn new(
        volume: &'a VolumeAccessor,
        integration_window: usize,
        filters: &'a FilterChain,
    ) -> Self {
        Self {
            volume,
            correlation: None,
            integration_window,
            filters,
            display_range: None,
        }
    }

    pub fn with_correlation(mut self, correlation: &'a CorrelationVolume) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_display_range(mut self, range: (f64, f64)) -> Self {
        self.display_range = Some(range);
        self
    }

    /// Render frame `f` as `kind`.
    ///
    /// Differenced kinds are zero before the `2k` warmup. The filter chain
    /// applies to raw, integral and differential images; correlation frames
    /// were filtered before correlating.
    pub fn render(&self, kind: ViewKind, f: usize) -> Result<FrameImage, ViewError> {
        let k = self.integration_window;
        let raw = self.volume.raw_frame(f)?;
        let time = self.volume.time_index().get(f).copied().unwrap_or_default();
        let warm = f >= 2 * k;

        let image = match kind {
            ViewKind::Raw => self.filters.apply(raw),
            _ if !warm => Array2::zeros(raw.dim()),
            ViewKind::Integral { reference_frame } => {
                let integral = self.volume.integral_frame(f, k, reference_frame)?;
                self.filters.apply(integral.view())
            }
            ViewKind::Differential => {
                let difference = self.volume.frame_difference(f, k)?;
                self.filters.apply(difference.view())
            }
            ViewKind::Correlation => self
                .correlation
                .ok_or(ViewError::NoCorrelation)?
                .frame(f)
                .map(|frame| frame.to_owned())
                .ok_or(VolumeError::FrameOutOfRange {
                    frame: f,
                    frames: self.volume.frames(),
                })?,
        };

        let range = match (self.display_range, kind, self.correlation) {
            (Some(range), _, _) => range,
            (None, ViewKind::Correlation, Some(correlation)) => correlation.value_range(),
            (None, ViewKind::Raw, _) => min_max(&image),
            (None, _, _) => {
                let max = image.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
                (-max, max)
            }
        };

        Ok(FrameImage { time, range, image })
    }
}

fn min_max(image: &Array2<f64>) -> (f64, f64) {
    image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}
