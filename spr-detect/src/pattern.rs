//! Learned spatio-temporal template of a single binding event.

use std::ops::Range;
use std::path::Path;

use ndarray::{s, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlation::CORRELATION_GAIN;
use crate::image_proc::{correlate_same, CorrelationMethod, FilterChain};
use crate::volume::{VolumeAccessor, VolumeError};

/// Errors raised while building or loading a reference pattern.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Reference pattern must not be empty, got shape {0:?}")]
    Empty((usize, usize, usize)),
    #[error("Pattern region {rows:?} x {cols:?} is empty or outside the frame shape {shape:?}")]
    InvalidRegion {
        rows: Range<usize>,
        cols: Range<usize>,
        shape: (usize, usize),
    },
    #[error("Frame difference failed while learning the pattern: {0}")]
    Volume(#[from] VolumeError),
    #[error("Pattern file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dense (rows, cols, 4k) template compared against the differenced volume.
///
/// Immutable once built. The serialized form is an opaque JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePattern {
    data: Array3<f64>,
}

impl ReferencePattern {
    /// Wrap an externally learned template.
    pub fn from_array(data: Array3<f64>) -> Result<Self, PatternError> {
        if data.is_empty() {
            return Err(PatternError::Empty(data.dim()));
        }
        Ok(Self { data })
    }

    /// Learn a pattern from a user-marked event.
    ///
    /// Stacks the `4k` frame differences `center_frame - 2k + 1 ..= center_frame + 2k`
    /// in ascending time, restricted to `rows x cols`.
    ///
    /// # Errors
    ///
    /// Any of those frames violating the [`VolumeAccessor::frame_difference`]
    /// preconditions, or a region outside the frame.
    pub fn from_region(
        volume: &VolumeAccessor,
        rows: Range<usize>,
        cols: Range<usize>,
        center_frame: usize,
        k: usize,
    ) -> Result<Self, PatternError> {
        Self::from_region_filtered(volume, rows, cols, center_frame, k, &FilterChain::empty())
    }

    /// Like [`ReferencePattern::from_region`], filtering every full
    /// differenced frame before cropping it to the region.
    pub fn from_region_filtered(
        volume: &VolumeAccessor,
        rows: Range<usize>,
        cols: Range<usize>,
        center_frame: usize,
        k: usize,
        filters: &FilterChain,
    ) -> Result<Self, PatternError> {
        let shape = volume.frame_shape();
        if rows.is_empty() || cols.is_empty() || rows.end > shape.0 || cols.end > shape.1 {
            return Err(PatternError::InvalidRegion { rows, cols, shape });
        }
        if k == 0 {
            return Err(VolumeError::InvalidWindow(k).into());
        }

        let first = (center_frame + 1)
            .checked_sub(2 * k)
            .ok_or(VolumeError::FrameBeforeWarmup {
                frame: 0,
                warmup: 2 * k,
            })?;
        let last = center_frame + 2 * k;

        let mut data = Array3::<f64>::zeros((rows.len(), cols.len(), 4 * k));
        for (slot, f) in (first..=last).enumerate() {
            let difference = volume.frame_difference(f, k)?;
            let difference = if filters.is_empty() {
                difference
            } else {
                filters.apply(difference.view())
            };
            data.index_axis_mut(Axis(2), slot)
                .assign(&difference.slice(s![rows.clone(), cols.clone()]));
        }

        log::info!(
            "Learned reference pattern {:?} around frame {} (k = {})",
            data.dim(),
            center_frame,
            k
        );
        Ok(Self { data })
    }

    pub fn view(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    /// Shape as (rows, cols, frames).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Maximum of the pattern correlated with itself, times the correlation gain.
    ///
    /// Thresholds are expressed as fractions of this value.
    pub fn autocorrelation_peak(&self) -> f64 {
        correlate_same(self.data.view(), self.data.view(), CorrelationMethod::Auto)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
            * CORRELATION_GAIN
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), PatternError> {
        let json = serde_json::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, PatternError> {
        let json = std::fs::read_to_string(path)?;
        let pattern: Self = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Self::from_array(pattern.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shared::{BindingEvent, SyntheticVolume};

    fn event_volume(k_frames: usize) -> VolumeAccessor {
        let data = SyntheticVolume::new(20, 20, k_frames)
            .with_event(BindingEvent::new((8, 8), (3, 3), 10, 5, 3.0))
            .build()
            .unwrap();
        VolumeAccessor::with_uniform_times(data, 0.1).unwrap()
    }

    #[test]
    fn test_from_region_shape_and_order() {
        let volume = event_volume(40);
        let pattern = ReferencePattern::from_region(&volume, 7..12, 7..12, 12, 2).unwrap();
        assert_eq!(pattern.dim(), (5, 5, 8));

        // slot 0 is frame 9, the last slot is frame 16
        let first = volume.frame_difference(9, 2).unwrap();
        let last = volume.frame_difference(16, 2).unwrap();
        assert_relative_eq!(pattern.view()[[2, 2, 0]], first[[9, 9]]);
        assert_relative_eq!(pattern.view()[[2, 2, 7]], last[[9, 9]]);
    }

    #[test]
    fn test_from_region_needs_warm_frames() {
        let volume = event_volume(40);
        assert!(matches!(
            ReferencePattern::from_region(&volume, 7..12, 7..12, 2, 2),
            Err(PatternError::Volume(VolumeError::FrameBeforeWarmup { .. }))
        ));
        assert!(matches!(
            ReferencePattern::from_region(&volume, 7..12, 7..12, 5, 2),
            Err(PatternError::Volume(VolumeError::FrameBeforeWarmup { .. }))
        ));
        assert!(matches!(
            ReferencePattern::from_region(&volume, 7..12, 7..12, 37, 2),
            Err(PatternError::Volume(VolumeError::FrameOutOfRange { .. }))
        ));
        assert!(matches!(
            ReferencePattern::from_region(&volume, 7..25, 7..12, 12, 2),
            Err(PatternError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn test_autocorrelation_peak_is_scaled_energy() {
        let data = Array3::from_shape_fn((3, 3, 4), |(r, c, f)| (r + 2 * c) as f64 - f as f64);
        let energy: f64 = data.iter().map(|v| v * v).sum();
        let pattern = ReferencePattern::from_array(data).unwrap();
        assert_relative_eq!(
            pattern.autocorrelation_peak(),
            energy * CORRELATION_GAIN,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_from_array_rejects_empty() {
        assert!(matches!(
            ReferencePattern::from_array(Array3::zeros((0, 3, 4))),
            Err(PatternError::Empty(_))
        ));
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.json");
        let pattern =
            ReferencePattern::from_array(Array3::from_shape_fn((2, 3, 4), |(r, c, f)| {
                (r * 12 + c * 4 + f) as f64 * 0.25
            }))
            .unwrap();

        pattern.save_to_file(&path).unwrap();
        let loaded = ReferencePattern::load_from_file(&path).unwrap();
        assert_eq!(loaded, pattern);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ReferencePattern::load_from_file(&path),
            Err(PatternError::Io(_))
        ));
    }
}
