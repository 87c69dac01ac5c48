//! Normalization of particle counts by the usable sensor area.

use std::ops::Range;

use ndarray::{s, Array1, Array2};
use thiserror::Error;

use crate::registry::RegistrySnapshot;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("No active sensor area: {excluded} of {total} pixels are excluded")]
    NoActiveArea { total: usize, excluded: usize },
    #[error("Frame {frame} is out of range for {frames} counted frames")]
    FrameOutOfRange { frame: usize, frames: usize },
}

/// Pixels the user removed from the analysis (`true` = excluded).
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionMask {
    mask: Array2<bool>,
}

impl ExclusionMask {
    /// Mask of the given (rows, cols) shape with nothing excluded.
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            mask: Array2::from_elem(shape, false),
        }
    }

    pub fn from_array(mask: Array2<bool>) -> Self {
        Self { mask }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Exclude a rectangle, clamped to the frame.
    pub fn exclude_rect(&mut self, rows: Range<usize>, cols: Range<usize>) {
        let (height, width) = self.mask.dim();
        let rows = rows.start.min(height)..rows.end.min(height);
        let cols = cols.start.min(width)..cols.end.min(width);
        if rows.is_empty() || cols.is_empty() {
            return;
        }
        self.mask.slice_mut(s![rows, cols]).fill(true);
    }

    /// Whether the pixel nearest to a (row, col) position is excluded.
    pub fn contains(&self, position: (f64, f64)) -> bool {
        let (row, col) = (position.0.round(), position.1.round());
        if row < 0.0 || col < 0.0 {
            return false;
        }
        self.mask
            .get((row as usize, col as usize))
            .copied()
            .unwrap_or(false)
    }

    pub fn total_area(&self) -> usize {
        self.mask.len()
    }

    pub fn excluded_area(&self) -> usize {
        self.mask.iter().filter(|&&excluded| excluded).count()
    }

    pub fn active_area(&self) -> usize {
        self.total_area() - self.excluded_area()
    }
}

/// Density of accepted events per active pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregator {
    active_area: usize,
}

impl Aggregator {
    /// # Errors
    ///
    /// [`AggregateError::NoActiveArea`] when every pixel is excluded.
    pub fn new(mask: &ExclusionMask) -> Result<Self, AggregateError> {
        let active_area = mask.active_area();
        if active_area == 0 {
            return Err(AggregateError::NoActiveArea {
                total: mask.total_area(),
                excluded: mask.excluded_area(),
            });
        }
        Ok(Self { active_area })
    }

    pub fn active_area(&self) -> usize {
        self.active_area
    }

    /// Cumulative accepted count at frame `f` over the active area.
    pub fn density(&self, snapshot: &RegistrySnapshot, f: usize) -> Result<f64, AggregateError> {
        let cumulative = snapshot.cumulative_count();
        cumulative
            .get(f)
            .map(|&count| count as f64 / self.active_area as f64)
            .ok_or(AggregateError::FrameOutOfRange {
                frame: f,
                frames: cumulative.len(),
            })
    }

    /// Density for every frame of the snapshot.
    pub fn density_series(&self, snapshot: &RegistrySnapshot) -> Array1<f64> {
        snapshot
            .cumulative_count()
            .iter()
            .map(|&count| count as f64 / self.active_area as f64)
            .collect()
    }
}

/// Density at frame `f` for a mask, failing on a fully excluded frame.
pub fn density(
    snapshot: &RegistrySnapshot,
    mask: &ExclusionMask,
    f: usize,
) -> Result<f64, AggregateError> {
    Aggregator::new(mask)?.density(snapshot, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::AABB;
    use crate::registry::{EventStatus, ParticleEvent, Polarity};
    use approx::assert_relative_eq;

    fn accepted(id: usize, first_frame: usize) -> ParticleEvent {
        ParticleEvent {
            id,
            first_frame,
            duration: 3,
            position: (1.0, 1.0),
            polarity: Polarity::Adsorption,
            status: EventStatus::Accepted,
            peak_value: 1.0,
            peak_frame: first_frame + 1,
            bounds: AABB::from_coords((0, 2), (0, 2), (first_frame, first_frame + 2)),
        }
    }

    #[test]
    fn test_exclude_rect_is_clamped() {
        let mut mask = ExclusionMask::new((10, 10));
        mask.exclude_rect(8..20, 0..2);
        assert_eq!(mask.excluded_area(), 4);
        assert_eq!(mask.active_area(), 96);
        mask.exclude_rect(12..15, 0..2);
        assert_eq!(mask.excluded_area(), 4);
        assert!(mask.contains((8.6, 1.2)));
        assert!(!mask.contains((7.4, 1.0)));
        assert!(!mask.contains((-1.0, 1.0)));
        assert!(!mask.contains((40.0, 1.0)));
    }

    #[test]
    fn test_density_series() {
        let snapshot = RegistrySnapshot::build(vec![accepted(0, 1), accepted(1, 3)], 5);
        let mut mask = ExclusionMask::new((4, 5));
        mask.exclude_rect(0..2, 0..5);
        let aggregator = Aggregator::new(&mask).unwrap();
        assert_eq!(aggregator.active_area(), 10);

        let series = aggregator.density_series(&snapshot);
        assert_eq!(series.len(), 5);
        assert_relative_eq!(series[0], 0.0);
        assert_relative_eq!(series[2], 0.1);
        assert_relative_eq!(series[4], 0.2);
        assert_relative_eq!(aggregator.density(&snapshot, 3).unwrap(), 0.2);
        assert_eq!(
            aggregator.density(&snapshot, 5),
            Err(AggregateError::FrameOutOfRange {
                frame: 5,
                frames: 5
            })
        );
    }

    #[test]
    fn test_fully_excluded_frame_is_fatal() {
        let snapshot = RegistrySnapshot::build(vec![accepted(0, 1)], 5);
        let mut mask = ExclusionMask::new((6, 6));
        mask.exclude_rect(0..6, 0..6);
        assert_eq!(mask.active_area(), 0);
        assert_eq!(
            density(&snapshot, &mask, 2),
            Err(AggregateError::NoActiveArea {
                total: 36,
                excluded: 36
            })
        );
    }
}
