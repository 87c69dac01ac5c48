//! Raw SPR intensity volume and temporal differencing.
//!
//! The [`VolumeAccessor`] owns the (row, column, frame) intensity volume and
//! its [`TimeIndex`]. Differencing two adjacent `k`-frame averages is the
//! noise-suppression primitive every later stage builds on.

pub mod time_index;

use std::ops::Range;

use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use thiserror::Error;

use crate::image_proc::FilterChain;

pub use time_index::{FrameTime, TimeIndex};

/// Errors raised by volume access.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VolumeError {
    #[error("Volume must contain at least one frame and one pixel, got shape {0:?}")]
    EmptyVolume((usize, usize, usize)),
    #[error("Time index has {times} entries but the volume has {frames} frames")]
    TimeIndexMismatch { frames: usize, times: usize },
    #[error("Integration window must be at least 1, got {0}")]
    InvalidWindow(usize),
    #[error("Frame {frame} precedes the differencing warmup (first valid frame is {warmup})")]
    FrameBeforeWarmup { frame: usize, warmup: usize },
    #[error("Frame {frame} is out of range for a volume of {frames} frames")]
    FrameOutOfRange { frame: usize, frames: usize },
    #[error("Crop {rows:?} x {cols:?} is empty or exceeds the frame shape {shape:?}")]
    InvalidCrop {
        rows: Range<usize>,
        cols: Range<usize>,
        shape: (usize, usize),
    },
    #[error("Downsampling factor {factor} is invalid for {frames} frames")]
    InvalidDownsample { factor: usize, frames: usize },
}

/// Owner of the raw intensity volume.
#[derive(Debug, Clone)]
pub struct VolumeAccessor {
    data: Array3<f64>,
    times: TimeIndex,
}

impl VolumeAccessor {
    /// Wrap a volume with its timing information.
    pub fn new(data: Array3<f64>, times: TimeIndex) -> Result<Self, VolumeError> {
        let (rows, cols, frames) = data.dim();
        if rows == 0 || cols == 0 || frames == 0 {
            return Err(VolumeError::EmptyVolume(data.dim()));
        }
        if times.len() != frames {
            return Err(VolumeError::TimeIndexMismatch {
                frames,
                times: times.len(),
            });
        }
        Ok(Self { data, times })
    }

    /// Wrap a volume whose frames are `period_s` apart.
    pub fn with_uniform_times(data: Array3<f64>, period_s: f64) -> Result<Self, VolumeError> {
        let frames = data.dim().2;
        Self::new(data, TimeIndex::uniform(frames, period_s))
    }

    pub fn view(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    /// Shape as (rows, cols, frames).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn frame_shape(&self) -> (usize, usize) {
        let (rows, cols, _) = self.data.dim();
        (rows, cols)
    }

    pub fn frames(&self) -> usize {
        self.data.dim().2
    }

    pub fn time_index(&self) -> &TimeIndex {
        &self.times
    }

    /// Raw intensity image of frame `f`.
    pub fn raw_frame(&self, f: usize) -> Result<ArrayView2<f64>, VolumeError> {
        self.check_frame(f)?;
        Ok(self.data.slice(s![.., .., f]))
    }

    /// Mean of `frames[f - k + 1 ..= f]` minus mean of `frames[f - 2k + 1 ..= f - k]`.
    ///
    /// # Errors
    ///
    /// * [`VolumeError::InvalidWindow`] when `k == 0`
    /// * [`VolumeError::FrameOutOfRange`] when `f` is past the last frame
    /// * [`VolumeError::FrameBeforeWarmup`] when `f < 2k`
    pub fn frame_difference(&self, f: usize, k: usize) -> Result<Array2<f64>, VolumeError> {
        check_window(k)?;
        self.check_frame(f)?;
        if f < 2 * k {
            return Err(VolumeError::FrameBeforeWarmup {
                frame: f,
                warmup: 2 * k,
            });
        }
        Ok(self.difference_unchecked(f, k))
    }

    /// Differenced volume with the filter chain applied to every frame.
    ///
    /// Frames before `2k` have no valid difference and are zero.
    pub fn difference_volume(
        &self,
        k: usize,
        filters: &FilterChain,
    ) -> Result<Array3<f64>, VolumeError> {
        check_window(k)?;
        let mut out = Array3::<f64>::zeros(self.data.dim());
        out.axis_iter_mut(Axis(2))
            .into_par_iter()
            .enumerate()
            .filter(|(f, _)| *f >= 2 * k)
            .for_each(|(f, mut frame)| {
                let difference = self.difference_unchecked(f, k);
                if filters.is_empty() {
                    frame.assign(&difference);
                } else {
                    frame.assign(&filters.apply(difference.view()));
                }
            });
        Ok(out)
    }

    /// Integral image: mean of the `k`-frame block preceding `f` minus the
    /// mean of `k` frames starting at `reference_frame`.
    ///
    /// The block is `[f / k * k - k, f / k * k)`, so frames inside the same
    /// block share one integral image.
    pub fn integral_frame(
        &self,
        f: usize,
        k: usize,
        reference_frame: usize,
    ) -> Result<Array2<f64>, VolumeError> {
        check_window(k)?;
        self.check_frame(f)?;
        let block_end = f / k * k;
        if block_end < k {
            return Err(VolumeError::FrameBeforeWarmup { frame: f, warmup: k });
        }
        let reference = self.reference_image(reference_frame, k)?;
        Ok(self.window_mean(block_end - k..block_end) - reference)
    }

    /// Mean of the `k` frames starting at `reference_frame`.
    pub fn reference_image(
        &self,
        reference_frame: usize,
        k: usize,
    ) -> Result<Array2<f64>, VolumeError> {
        check_window(k)?;
        let end = reference_frame + k;
        if end > self.frames() {
            return Err(VolumeError::FrameOutOfRange {
                frame: end - 1,
                frames: self.frames(),
            });
        }
        Ok(self.window_mean(reference_frame..end))
    }

    /// Mean raw intensity of every frame.
    pub fn intensity_per_frame(&self) -> Array1<f64> {
        self.data
            .axis_iter(Axis(2))
            .map(|frame| frame.mean().unwrap_or(0.0))
            .collect()
    }

    /// Keep only `rows x cols` of every frame.
    ///
    /// Setup-time only: the accessor must not be shared yet.
    pub fn crop(&mut self, rows: Range<usize>, cols: Range<usize>) -> Result<(), VolumeError> {
        let shape = self.frame_shape();
        if rows.is_empty() || cols.is_empty() || rows.end > shape.0 || cols.end > shape.1 {
            return Err(VolumeError::InvalidCrop { rows, cols, shape });
        }
        log::debug!("Cropping volume {:?} to {:?} x {:?}", self.dim(), rows, cols);
        self.data = self.data.slice(s![rows, cols, ..]).to_owned();
        Ok(())
    }

    /// Average every `factor` consecutive frames into one.
    ///
    /// Trailing frames that do not fill a whole bin are dropped. Setup-time
    /// only, like [`VolumeAccessor::crop`].
    pub fn downsample(&mut self, factor: usize) -> Result<(), VolumeError> {
        let frames = self.frames();
        if factor == 0 || factor > frames {
            return Err(VolumeError::InvalidDownsample { factor, frames });
        }
        if factor == 1 {
            return Ok(());
        }
        let (rows, cols, _) = self.dim();
        let bins = frames / factor;
        let mut binned = Array3::<f64>::zeros((rows, cols, bins));
        binned
            .axis_iter_mut(Axis(2))
            .into_par_iter()
            .enumerate()
            .for_each(|(bin, mut frame)| {
                frame.assign(&self.window_mean(bin * factor..(bin + 1) * factor));
            });

        log::info!("Downsampled {} frames by {} into {} frames", frames, factor, bins);
        self.data = binned;
        self.times = self.times.downsample(factor);
        Ok(())
    }

    fn check_frame(&self, f: usize) -> Result<(), VolumeError> {
        if f >= self.frames() {
            return Err(VolumeError::FrameOutOfRange {
                frame: f,
                frames: self.frames(),
            });
        }
        Ok(())
    }

    /// Caller guarantees `2k <= f < frames`.
    fn difference_unchecked(&self, f: usize, k: usize) -> Array2<f64> {
        self.window_mean(f + 1 - k..f + 1) - self.window_mean(f + 1 - 2 * k..f + 1 - k)
    }

    /// Caller guarantees a non-empty range inside the volume.
    fn window_mean(&self, frames: Range<usize>) -> Array2<f64> {
        let len = frames.len() as f64;
        self.data.slice(s![.., .., frames]).sum_axis(Axis(2)) / len
    }
}

fn check_window(k: usize) -> Result<(), VolumeError> {
    if k == 0 {
        return Err(VolumeError::InvalidWindow(k));
    }
    Ok(())
}
