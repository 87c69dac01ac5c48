//! Matched filtering of the differenced volume against the reference pattern.

use ndarray::{s, Array1, Array3, ArrayView2, ArrayView3, Axis};
use thiserror::Error;

use crate::image_proc::{correlate_same, CorrelationMethod, FilterChain};
use crate::pattern::ReferencePattern;
use crate::volume::{VolumeAccessor, VolumeError};

/// Scale applied to every correlation value, and to the pattern's
/// autocorrelation peak, so that magnitudes land in a convenient range.
pub const CORRELATION_GAIN: f64 = 1e5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
    #[error("No reference pattern has been created for this volume")]
    NoReferencePattern,
    #[error("Failed to build the differenced volume: {0}")]
    Volume(#[from] VolumeError),
}

/// Correlation of a whole session, same shape as the raw volume.
///
/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct CorrelationVolume {
    data: Array3<f64>,
    std_per_frame: Array1<f64>,
    diff_std_per_frame: Array1<f64>,
    value_range: (f64, f64),
}

impl CorrelationVolume {
    /// Wrap precomputed correlation values, deriving the per-frame noise
    /// and the display range with warmup window `k`.
    ///
    /// No differenced volume is known, so its per-frame std is zero.
    pub fn from_data(data: Array3<f64>, k: usize) -> Self {
        let frames = data.dim().2;
        Self::with_diff_std(data, Array1::zeros(frames), k)
    }

    fn with_diff_std(data: Array3<f64>, diff_std_per_frame: Array1<f64>, k: usize) -> Self {
        let std_per_frame = per_frame_std(data.view());
        let value_range = value_range(data.view(), 3 * k);
        Self {
            data,
            std_per_frame,
            diff_std_per_frame,
            value_range,
        }
    }

    pub fn view(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn frame(&self, f: usize) -> Option<ArrayView2<f64>> {
        (f < self.data.dim().2).then(|| self.data.slice(s![.., .., f]))
    }

    /// Population std of every correlation frame.
    pub fn std_per_frame(&self) -> &Array1<f64> {
        &self.std_per_frame
    }

    /// Population std of every differenced frame fed into the correlation.
    pub fn diff_std_per_frame(&self) -> &Array1<f64> {
        &self.diff_std_per_frame
    }

    /// Default symmetric display range `(-max, max)`.
    pub fn value_range(&self) -> (f64, f64) {
        self.value_range
    }

    /// Same statistics over the negated values, for desorption searches.
    pub fn negated(&self) -> Self {
        Self {
            data: self.data.mapv(|v| -v),
            std_per_frame: self.std_per_frame.clone(),
            diff_std_per_frame: self.diff_std_per_frame.clone(),
            value_range: self.value_range,
        }
    }
}

fn per_frame_std(data: ArrayView3<f64>) -> Array1<f64> {
    data.axis_iter(Axis(2)).map(|frame| frame.std(0.0)).collect()
}

/// `(-max, max)` over frames from `skip` on, or over everything when no
/// frame is left.
fn value_range(data: ArrayView3<f64>, skip: usize) -> (f64, f64) {
    let frames = data.dim().2;
    let settled = if skip < frames {
        data.slice_move(s![.., .., skip..])
    } else {
        data
    };
    let max = settled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() {
        (-max, max)
    } else {
        (0.0, 0.0)
    }
}

/// Builds correlation volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationEngine {
    method: CorrelationMethod,
}

impl CorrelationEngine {
    pub fn new(method: CorrelationMethod) -> Self {
        Self { method }
    }

    /// Difference, filter and correlate the whole volume with `pattern`.
    ///
    /// # Errors
    ///
    /// [`CorrelationError::NoReferencePattern`] when no pattern is given,
    /// before any work is done.
    pub fn correlate(
        &self,
        volume: &VolumeAccessor,
        pattern: Option<&ReferencePattern>,
        k: usize,
        filters: &FilterChain,
    ) -> Result<CorrelationVolume, CorrelationError> {
        let pattern = pattern.ok_or(CorrelationError::NoReferencePattern)?;

        log::info!(
            "Correlating volume {:?} with pattern {:?} (k = {}, {} filters)",
            volume.dim(),
            pattern.dim(),
            k,
            filters.filters().len()
        );

        let difference = volume.difference_volume(k, filters)?;
        let diff_std = per_frame_std(difference.view());

        let mut data = correlate_same(difference.view(), pattern.view(), self.method);
        data.mapv_inplace(|v| v * CORRELATION_GAIN);

        let correlation = CorrelationVolume::with_diff_std(data, diff_std, k);
        log::debug!(
            "Correlation value range {:?}",
            correlation.value_range()
        );
        Ok(correlation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shared::{BindingEvent, SyntheticVolume};

    fn scenario_volume() -> VolumeAccessor {
        let data = SyntheticVolume::new(20, 20, 40)
            .with_event(BindingEvent::new((8, 8), (3, 3), 10, 5, 3.0))
            .build()
            .unwrap();
        VolumeAccessor::with_uniform_times(data, 0.1).unwrap()
    }

    #[test]
    fn test_missing_pattern_fails_fast() {
        let volume = scenario_volume();
        let err = CorrelationEngine::default()
            .correlate(&volume, None, 2, &FilterChain::empty())
            .unwrap_err();
        assert_eq!(err, CorrelationError::NoReferencePattern);
    }

    #[test]
    fn test_peak_matches_autocorrelation() {
        let volume = scenario_volume();
        let pattern = ReferencePattern::from_region(&volume, 7..12, 7..12, 12, 2).unwrap();
        let correlation = CorrelationEngine::default()
            .correlate(&volume, Some(&pattern), 2, &FilterChain::empty())
            .unwrap();

        assert_eq!(correlation.dim(), (20, 20, 40));
        // pattern slot 0 is frame 9 and its centre slot is 4, so the match
        // lands on frame 13 at the patch centre
        assert_relative_eq!(
            correlation.view()[[9, 9, 13]],
            pattern.autocorrelation_peak(),
            max_relative = 1e-9
        );
        let (low, high) = correlation.value_range();
        assert_relative_eq!(high, pattern.autocorrelation_peak(), max_relative = 1e-9);
        assert_relative_eq!(low, -high);
    }

    #[test]
    fn test_direct_and_fft_engines_agree() {
        let volume = scenario_volume();
        let pattern = ReferencePattern::from_region(&volume, 7..12, 7..12, 12, 2).unwrap();
        let direct = CorrelationEngine::new(CorrelationMethod::Direct)
            .correlate(&volume, Some(&pattern), 2, &FilterChain::empty())
            .unwrap();
        let fft = CorrelationEngine::new(CorrelationMethod::Fft)
            .correlate(&volume, Some(&pattern), 2, &FilterChain::empty())
            .unwrap();
        let scale = pattern.autocorrelation_peak();
        for (a, b) in direct.view().iter().zip(fft.view().iter()) {
            assert!((a - b).abs() <= 1e-9 * scale);
        }
    }

    #[test]
    fn test_per_frame_statistics() {
        let volume = scenario_volume();
        let pattern = ReferencePattern::from_region(&volume, 7..12, 7..12, 12, 2).unwrap();
        let correlation = CorrelationEngine::default()
            .correlate(&volume, Some(&pattern), 2, &FilterChain::empty())
            .unwrap();

        assert_eq!(correlation.std_per_frame().len(), 40);
        assert_eq!(correlation.diff_std_per_frame().len(), 40);
        // warmup frames and frames far from the event are flat
        assert_eq!(correlation.diff_std_per_frame()[2], 0.0);
        assert_eq!(correlation.std_per_frame()[35], 0.0);
        assert!(correlation.std_per_frame()[13] > 0.0);

        let frame = correlation.frame(13).unwrap();
        assert_relative_eq!(frame.std(0.0), correlation.std_per_frame()[13]);
        assert!(correlation.frame(40).is_none());
    }

    #[test]
    fn test_value_range_falls_back_to_whole_volume() {
        let mut data = Array3::<f64>::zeros((2, 2, 4));
        data[[0, 0, 1]] = 7.0;
        let short = CorrelationVolume::from_data(data.clone(), 2);
        assert_eq!(short.value_range(), (-7.0, 7.0));

        data[[1, 1, 3]] = 2.0;
        let settled = CorrelationVolume::from_data(data, 1);
        assert_eq!(settled.value_range(), (-2.0, 2.0));

        let empty = CorrelationVolume::from_data(Array3::zeros((2, 2, 0)), 1);
        assert_eq!(empty.value_range(), (0.0, 0.0));
    }

    #[test]
    fn test_negated_keeps_statistics() {
        let data = Array3::from_shape_fn((3, 3, 5), |(r, c, f)| (r * c + f) as f64);
        let correlation = CorrelationVolume::from_data(data, 1);
        let negated = correlation.negated();
        assert_eq!(negated.view()[[2, 2, 4]], -8.0);
        assert_eq!(negated.std_per_frame(), correlation.std_per_frame());
    }
}
