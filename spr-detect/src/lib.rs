//! SPR nanoparticle detection
//!
//! Detects, localizes and counts single nanoparticle binding events in
//! surface plasmon resonance imaging video. The input is a dense
//! (row, column, frame) intensity volume; the output is a set of
//! [`ParticleEvent`]s with per-frame counts and densities.
//!
//! Data flows leaf-first through the modules:
//!
//! [`VolumeAccessor`] -> [`CorrelationEngine`] (with a [`ReferencePattern`])
//! -> [`DetectionEngine`] -> [`ParticleRegistry`] -> [`Aggregator`]
//!
//! [`pipeline::count_particles`] runs all of them in order.

pub mod aggregate;
pub mod config;
pub mod correlation;
pub mod detection;
pub mod image_proc;
pub mod pattern;
pub mod pipeline;
pub mod registry;
pub mod view;
pub mod volume;

pub use aggregate::{AggregateError, Aggregator, ExclusionMask};
pub use config::{ArbitrationOrder, ConfigError, DetectionConfig};
pub use correlation::{CorrelationEngine, CorrelationError, CorrelationVolume, CORRELATION_GAIN};
pub use detection::{CancellationToken, DetectionEngine, DetectionError, DetectionOutcome};
pub use image_proc::{CorrelationMethod, FilterChain, FilterDescriptor};
pub use pattern::{PatternError, ReferencePattern};
pub use pipeline::{count_particles, CountingRun, PipelineError};
pub use registry::{EventStatus, ParticleEvent, ParticleRegistry, Polarity, RegistrySnapshot};
pub use view::{FrameImage, FrameRenderer, ViewError, ViewKind};
pub use volume::{FrameTime, TimeIndex, VolumeAccessor, VolumeError};
