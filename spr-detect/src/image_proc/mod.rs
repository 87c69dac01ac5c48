//! Image processing module for SPR volume analysis
//!
//! This module provides the volume-level building blocks used by the
//! detection pipeline: bounding boxes, occupancy labeling, FFT helpers,
//! same-size cross-correlation and per-frame post-processing filters.

pub mod aabb;
pub mod correlate;
pub mod fft;
pub mod filters;
pub mod labeling;

// Re-export key functionality for easier access
pub use aabb::AABB;
pub use correlate::{correlate_same, CorrelationMethod};
pub use filters::{FilterChain, FilterDescriptor};
pub use labeling::{binarize, connected_components, Labeling};
