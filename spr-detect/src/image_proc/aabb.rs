//! Axis-aligned bounding boxes in (row, column, frame) space.
//!
//! Connected-component labeling of an occupancy volume yields one box per
//! label. The detection engine uses these boxes to measure event duration
//! and position, to restrict peak searches in the correlation volume, and to
//! find neighbouring candidates once a box is padded spatially.
//!
//! # Key Features
//!
//! - **Incremental construction**: grow a box voxel by voxel during labeling
//! - **Spatial padding**: pad rows and columns (never frames), clamped to the
//!   volume bounds so boxes near the image edge stay valid
//! - **Geometric queries**: spans, overlap and centroid
//!
//! # Examples
//!
//! ```rust
//! use spr_detect::image_proc::aabb::AABB;
//!
//! let event = AABB::from_coords((8, 10), (8, 10), (10, 14));
//! assert_eq!(event.frame_span(), 5);
//! assert_eq!(event.center(), (9.0, 9.0));
//!
//! // Padding near the image edge is clamped to the volume
//! let padded = event.with_spatial_padding(12, (20, 20));
//! assert_eq!(padded.min_row, 0);
//! assert_eq!(padded.max_col, 19);
//! assert_eq!(padded.min_frame, 10);
//! ```

/// Axis-Aligned Bounding Box for a 3D (row, column, frame) region.
///
/// All bounds are inclusive.
///
/// # Examples
///
/// ```rust
/// use spr_detect::image_proc::aabb::AABB;
///
/// let mut bbox = AABB::new();
/// assert!(!bbox.is_valid());
///
/// bbox.expand_to_include(5, 6, 20);
/// bbox.expand_to_include(7, 6, 23);
/// assert!(bbox.is_valid());
/// assert_eq!(bbox.height(), 3);
/// assert_eq!(bbox.width(), 1);
/// assert_eq!(bbox.frame_span(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AABB {
    /// Minimum row coordinate (inclusive)
    pub min_row: usize,
    /// Minimum column coordinate (inclusive)
    pub min_col: usize,
    /// First frame (inclusive)
    pub min_frame: usize,
    /// Maximum row coordinate (inclusive)
    pub max_row: usize,
    /// Maximum column coordinate (inclusive)
    pub max_col: usize,
    /// Last frame (inclusive)
    pub max_frame: usize,
}

impl AABB {
    /// Create a new empty AABB with invalid bounds.
    ///
    /// Minimum coordinates start at `usize::MAX` and maximum coordinates at
    /// 0, so the box is invalid until a voxel is added with
    /// [`AABB::expand_to_include`].
    pub fn new() -> Self {
        Self {
            min_row: usize::MAX,
            min_col: usize::MAX,
            min_frame: usize::MAX,
            max_row: 0,
            max_col: 0,
            max_frame: 0,
        }
    }

    /// Create an AABB from inclusive `(min, max)` bounds per axis.
    ///
    /// # Arguments
    /// * `rows` - `(min_row, max_row)`
    /// * `cols` - `(min_col, max_col)`
    /// * `frames` - `(min_frame, max_frame)`
    pub fn from_coords(rows: (usize, usize), cols: (usize, usize), frames: (usize, usize)) -> Self {
        Self {
            min_row: rows.0,
            min_col: cols.0,
            min_frame: frames.0,
            max_row: rows.1,
            max_col: cols.1,
            max_frame: frames.1,
        }
    }

    /// Grow the box so it contains the voxel at (row, col, frame).
    pub fn expand_to_include(&mut self, row: usize, col: usize, frame: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.min_frame = self.min_frame.min(frame);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
        self.max_frame = self.max_frame.max(frame);
    }

    /// Check if the two boxes share at least one voxel.
    ///
    /// # Examples
    /// ```rust
    /// use spr_detect::image_proc::aabb::AABB;
    ///
    /// let a = AABB::from_coords((0, 4), (0, 4), (10, 12));
    /// let b = AABB::from_coords((4, 8), (4, 8), (12, 20));
    /// let c = AABB::from_coords((4, 8), (4, 8), (13, 20));
    /// assert!(a.overlaps(&b));
    /// assert!(!a.overlaps(&c));
    /// ```
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_row <= other.max_row
            && self.max_row >= other.min_row
            && self.min_col <= other.max_col
            && self.max_col >= other.min_col
            && self.min_frame <= other.max_frame
            && self.max_frame >= other.min_frame
    }

    /// Number of rows covered by the box.
    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    /// Number of columns covered by the box.
    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    /// Number of frames covered by the box.
    ///
    /// This is the duration of a candidate event.
    pub fn frame_span(&self) -> usize {
        self.max_frame - self.min_frame + 1
    }

    /// Spatial footprint in pixels.
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Check if the box has valid bounds on all three axes.
    pub fn is_valid(&self) -> bool {
        self.min_row <= self.max_row
            && self.min_col <= self.max_col
            && self.min_frame <= self.max_frame
    }

    /// Pad rows and columns by `padding`, clamped to a `(rows, cols)` frame.
    ///
    /// The frame span is left unchanged. A box that cannot be padded by the
    /// full amount because it touches the image edge is clamped rather than
    /// rejected.
    pub fn with_spatial_padding(&self, padding: usize, frame_shape: (usize, usize)) -> Self {
        let (rows, cols) = frame_shape;
        Self {
            min_row: self.min_row.saturating_sub(padding),
            min_col: self.min_col.saturating_sub(padding),
            min_frame: self.min_frame,
            max_row: (self.max_row + padding).min(rows.saturating_sub(1)),
            max_col: (self.max_col + padding).min(cols.saturating_sub(1)),
            max_frame: self.max_frame,
        }
    }

    /// Spatial centroid of the box as (row, col).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_row as f64 + self.max_row as f64) / 2.0,
            (self.min_col as f64 + self.max_col as f64) / 2.0,
        )
    }

    /// Inclusive row, column and frame ranges, ready for slicing.
    pub fn ranges(
        &self,
    ) -> (
        std::ops::Range<usize>,
        std::ops::Range<usize>,
        std::ops::Range<usize>,
    ) {
        (
            self.min_row..self.max_row + 1,
            self.min_col..self.max_col + 1,
            self.min_frame..self.max_frame + 1,
        )
    }
}

impl Default for AABB {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_creation() {
        let aabb = AABB::new();
        assert_eq!(aabb.min_row, usize::MAX);
        assert_eq!(aabb.min_frame, usize::MAX);
        assert_eq!(aabb.max_col, 0);
        assert!(!aabb.is_valid());

        let aabb = AABB::from_coords((10, 30), (20, 40), (5, 9));
        assert_eq!(aabb.min_row, 10);
        assert_eq!(aabb.min_col, 20);
        assert_eq!(aabb.min_frame, 5);
        assert_eq!(aabb.max_row, 30);
        assert_eq!(aabb.max_col, 40);
        assert_eq!(aabb.max_frame, 9);

        let default_aabb: AABB = Default::default();
        assert_eq!(default_aabb, AABB::new());
    }

    #[test]
    fn test_aabb_expand() {
        let mut aabb = AABB::new();
        aabb.expand_to_include(10, 20, 3);
        assert_eq!(aabb, AABB::from_coords((10, 10), (20, 20), (3, 3)));

        aabb.expand_to_include(5, 30, 1);
        assert_eq!(aabb, AABB::from_coords((5, 10), (20, 30), (1, 3)));
    }

    #[test]
    fn test_aabb_dimensions() {
        let aabb = AABB::from_coords((10, 29), (20, 49), (100, 104));
        assert_eq!(aabb.width(), 30);
        assert_eq!(aabb.height(), 20);
        assert_eq!(aabb.area(), 600);
        assert_eq!(aabb.frame_span(), 5);
    }

    #[test]
    fn test_aabb_overlap_needs_all_axes() {
        let a = AABB::from_coords((10, 20), (10, 20), (0, 5));
        let same_space_later = AABB::from_coords((10, 20), (10, 20), (6, 9));
        let touching = AABB::from_coords((20, 25), (20, 25), (5, 9));
        assert!(!a.overlaps(&same_space_later));
        assert!(a.overlaps(&touching));
        assert!(touching.overlaps(&a));
    }

    #[test]
    fn test_spatial_padding_is_clamped() {
        let aabb = AABB::from_coords((1, 3), (15, 18), (4, 6));
        let padded = aabb.with_spatial_padding(2, (20, 20));
        assert_eq!(padded, AABB::from_coords((0, 5), (13, 19), (4, 6)));
    }

    #[test]
    fn test_center_and_ranges() {
        let aabb = AABB::from_coords((10, 30), (20, 41), (7, 8));
        assert_eq!(aabb.center(), (20.0, 30.5));
        let (rows, cols, frames) = aabb.ranges();
        assert_eq!(rows, 10..31);
        assert_eq!(cols, 20..42);
        assert_eq!(frames, 7..9);
    }
}
