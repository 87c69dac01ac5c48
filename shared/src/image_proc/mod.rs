//! Image processing helpers shared across crates.

pub mod noise;
