//! End-to-end counting run: correlate, detect, register, normalize.

use std::sync::Arc;

use ndarray::Array1;
use thiserror::Error;

use crate::aggregate::{AggregateError, Aggregator, ExclusionMask};
use crate::config::{ConfigError, DetectionConfig};
use crate::correlation::{CorrelationEngine, CorrelationError, CorrelationVolume};
use crate::detection::{CancellationToken, DetectionEngine, DetectionError, DetectionOutcome};
use crate::pattern::ReferencePattern;
use crate::registry::{ParticleRegistry, RegistrySnapshot};
use crate::volume::VolumeAccessor;

/// Any failure of [`count_particles`].
///
/// Volume errors reach it wrapped by the correlation or detection step.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Everything a counting run produces.
#[derive(Debug, Clone)]
pub struct CountingRun {
    pub correlation: CorrelationVolume,
    pub outcome: DetectionOutcome,
    /// Snapshot registered by this run
    pub snapshot: Arc<RegistrySnapshot>,
    /// Accepted events per active pixel, per frame
    pub density: Array1<f64>,
}

/// Run the whole pipeline and publish the result into `registry`.
///
/// The exclusion mask is checked for a usable area before any heavy work.
pub fn count_particles(
    volume: &VolumeAccessor,
    pattern: Option<&ReferencePattern>,
    config: &DetectionConfig,
    exclusion: &ExclusionMask,
    registry: &ParticleRegistry,
    cancel: &CancellationToken,
) -> Result<CountingRun, PipelineError> {
    config.validate()?;
    let aggregator = Aggregator::new(exclusion)?;

    let correlation = CorrelationEngine::new(config.correlation_method).correlate(
        volume,
        pattern,
        config.integration_window,
        &config.filters,
    )?;
    let pattern = pattern.ok_or(CorrelationError::NoReferencePattern)?;

    let outcome = DetectionEngine::new(config.clone()).run(
        volume,
        &correlation,
        pattern,
        Some(exclusion),
        cancel,
    )?;

    let snapshot = registry.register(outcome.events.clone(), volume.frames());
    let density = aggregator.density_series(&snapshot);
    log::info!(
        "Final density {:.3e} events/pixel over {} active pixels",
        density.last().copied().unwrap_or(0.0),
        aggregator.active_area()
    );

    Ok(CountingRun {
        correlation,
        outcome,
        snapshot,
        density,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn flat_volume() -> VolumeAccessor {
        VolumeAccessor::with_uniform_times(Array3::zeros((6, 6, 12)), 0.1).unwrap()
    }

    #[test]
    fn test_invalid_config_fails_before_work() {
        let volume = flat_volume();
        let config = DetectionConfig {
            integration_window: 0,
            ..Default::default()
        };
        let err = count_particles(
            &volume,
            None,
            &config,
            &ExclusionMask::new((6, 6)),
            &ParticleRegistry::new(),
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::ZeroWindow)));
    }

    #[test]
    fn test_detection_errors_are_wrapped() {
        let volume = flat_volume();
        let pattern = ReferencePattern::from_array(Array3::ones((3, 3, 4))).unwrap();
        let config = DetectionConfig {
            start_frame: 8,
            stop_frame: Some(5),
            ..Default::default()
        };
        let err = count_particles(
            &volume,
            Some(&pattern),
            &config,
            &ExclusionMask::new((6, 6)),
            &ParticleRegistry::new(),
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Detection(DetectionError::InvalidFrameRange { start: 8, stop: 5 })
        ));
    }
}
