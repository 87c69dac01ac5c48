//! Shared utilities for the SPR detection workspace.
//!
//! Holds the pieces that are useful to more than one crate but carry no
//! detection semantics of their own: seeded noise generation and synthetic
//! SPR volumes containing known binding events. Both the detection tests and
//! the command-line tool build their inputs from here.

pub mod image_proc;
pub mod synthetic;

pub use image_proc::noise::{simple_normal_array, simple_normal_volume, NoiseError};
pub use synthetic::{BindingEvent, SyntheticVolume};
