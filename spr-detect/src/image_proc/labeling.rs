//! Occupancy thresholding and 3D connected-component labeling.
//!
//! The detection engine binarizes the intensity volume into an occupancy
//! volume and splits it into connected blobs. Connectivity is the full 3x3x3
//! neighbourhood (26 neighbours), so voxels touching only at a corner across
//! consecutive frames still belong to the same blob.

use std::collections::BTreeSet;
use std::ops::Range;

use ndarray::{s, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Zip};

use super::aabb::AABB;

/// Labeled occupancy volume.
#[derive(Debug, Clone)]
pub struct Labeling {
    /// Label per voxel; 0 is background, components are numbered from 1
    pub labels: Array3<u32>,
    /// Bounding box of label `i + 1` at index `i`
    pub regions: Vec<AABB>,
}

impl Labeling {
    /// Number of connected components.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Bounding box of a label, if it exists.
    pub fn region(&self, label: u32) -> Option<&AABB> {
        (label as usize)
            .checked_sub(1)
            .and_then(|index| self.regions.get(index))
    }

    /// Distinct non-background labels found inside `bbox`.
    ///
    /// The box is clamped to the volume.
    pub fn labels_in_box(&self, bbox: &AABB) -> BTreeSet<u32> {
        let (rows, cols, frames) = self.labels.dim();
        if rows == 0 || cols == 0 || frames == 0 || !bbox.is_valid() {
            return BTreeSet::new();
        }
        let view = self.labels.slice(s![
            bbox.min_row.min(rows - 1)..=bbox.max_row.min(rows - 1),
            bbox.min_col.min(cols - 1)..=bbox.max_col.min(cols - 1),
            bbox.min_frame.min(frames - 1)..=bbox.max_frame.min(frames - 1)
        ]);
        view.iter().copied().filter(|&label| label != 0).collect()
    }
}

/// Threshold a single frame into an occupancy slice.
///
/// A pixel is occupied when its absolute value is strictly above `level`.
pub fn binarize_frame(frame: ArrayView2<f64>, level: f64, mut out: ArrayViewMut2<bool>) {
    Zip::from(&mut out)
        .and(&frame)
        .for_each(|occupied, &value| *occupied = value.abs() > level);
}

/// Threshold every frame of `frames` into an occupancy volume.
///
/// Frames outside the range are left unoccupied.
pub fn binarize(volume: ArrayView3<f64>, frames: Range<usize>, level: f64) -> Array3<bool> {
    let mut mask = Array3::from_elem(volume.dim(), false);
    let end = frames.end.min(volume.dim().2);
    for f in frames.start..end {
        binarize_frame(
            volume.slice(s![.., .., f]),
            level,
            mask.slice_mut(s![.., .., f]),
        );
    }
    mask
}

/// Label 26-connected components of a boolean volume.
///
/// Uses an explicit-stack flood fill. The scan runs frame by frame, then row
/// by row, so label numbers increase with the first frame in which a blob
/// appears and the result is fully deterministic.
pub fn connected_components(mask: ArrayView3<bool>) -> Labeling {
    let (rows, cols, frames) = mask.dim();
    let mut labels = Array3::<u32>::zeros((rows, cols, frames));
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for f in 0..frames {
        for r in 0..rows {
            for c in 0..cols {
                if !mask[[r, c, f]] || labels[[r, c, f]] != 0 {
                    continue;
                }

                let label = regions.len() as u32 + 1;
                let mut bbox = AABB::new();
                labels[[r, c, f]] = label;
                stack.push((r, c, f));

                while let Some((y, x, t)) = stack.pop() {
                    bbox.expand_to_include(y, x, t);

                    for dt in -1isize..=1 {
                        for dy in -1isize..=1 {
                            for dx in -1isize..=1 {
                                if dt == 0 && dy == 0 && dx == 0 {
                                    continue;
                                }
                                let ny = y as isize + dy;
                                let nx = x as isize + dx;
                                let nt = t as isize + dt;
                                if ny < 0
                                    || nx < 0
                                    || nt < 0
                                    || ny >= rows as isize
                                    || nx >= cols as isize
                                    || nt >= frames as isize
                                {
                                    continue;
                                }
                                let (ny, nx, nt) = (ny as usize, nx as usize, nt as usize);
                                if mask[[ny, nx, nt]] && labels[[ny, nx, nt]] == 0 {
                                    labels[[ny, nx, nt]] = label;
                                    stack.push((ny, nx, nt));
                                }
                            }
                        }
                    }
                }

                regions.push(bbox);
            }
        }
    }

    Labeling { labels, regions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_binarize_uses_absolute_value() {
        let mut volume = Array3::<f64>::zeros((2, 2, 3));
        volume[[0, 0, 1]] = 0.8;
        volume[[1, 1, 1]] = -0.9;
        volume[[0, 1, 1]] = 0.2;
        volume[[0, 0, 2]] = 5.0;

        let mask = binarize(volume.view(), 0..2, 0.5);
        assert!(mask[[0, 0, 1]]);
        assert!(mask[[1, 1, 1]]);
        assert!(!mask[[0, 1, 1]]);
        // outside the frame range
        assert!(!mask[[0, 0, 2]]);
    }

    #[test]
    fn test_diagonal_neighbours_across_frames_connect() {
        let mut mask = Array3::from_elem((5, 5, 4), false);
        mask[[1, 1, 0]] = true;
        mask[[2, 2, 1]] = true;
        mask[[3, 3, 2]] = true;
        mask[[0, 4, 3]] = true;

        let labeling = connected_components(mask.view());
        assert_eq!(labeling.len(), 2);
        assert_eq!(labeling.labels[[1, 1, 0]], 1);
        assert_eq!(labeling.labels[[3, 3, 2]], 1);
        assert_eq!(labeling.labels[[0, 4, 3]], 2);
        assert_eq!(
            labeling.regions[0],
            AABB::from_coords((1, 3), (1, 3), (0, 2))
        );
    }

    #[test]
    fn test_labels_follow_first_frame() {
        let mut mask = Array3::from_elem((6, 6, 6), false);
        // appears later but at the top-left corner
        mask[[0, 0, 4]] = true;
        // appears earlier at the bottom-right corner
        mask[[5, 5, 1]] = true;

        let labeling = connected_components(mask.view());
        assert_eq!(labeling.labels[[5, 5, 1]], 1);
        assert_eq!(labeling.labels[[0, 0, 4]], 2);
        assert_eq!(labeling.region(2).unwrap().min_frame, 4);
        assert!(labeling.region(0).is_none());
        assert!(labeling.region(3).is_none());
    }

    #[test]
    fn test_labels_in_box() {
        let mut mask = Array3::from_elem((10, 10, 3), false);
        mask[[1, 1, 1]] = true;
        mask[[1, 4, 1]] = true;
        mask[[8, 8, 1]] = true;

        let labeling = connected_components(mask.view());
        assert_eq!(labeling.len(), 3);

        let around_first = labeling
            .region(1)
            .unwrap()
            .with_spatial_padding(3, (10, 10));
        let found: Vec<u32> = labeling.labels_in_box(&around_first).into_iter().collect();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array3::from_elem((3, 3, 3), false);
        let labeling = connected_components(mask.view());
        assert!(labeling.is_empty());
    }
}
