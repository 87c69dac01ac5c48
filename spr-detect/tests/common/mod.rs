//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use shared::{BindingEvent, SyntheticVolume};
use spr_detect::{
    CorrelationEngine, CorrelationVolume, DetectionConfig, FilterChain, ReferencePattern,
    VolumeAccessor,
};

pub const K: usize = 2;

/// Lone 3x3 event ramping over frames 10..=14, as used to learn patterns.
pub fn template_event() -> BindingEvent {
    BindingEvent::new((8, 8), (3, 3), 10, 5, 3.0)
}

pub fn volume_with(
    shape: (usize, usize, usize),
    events: &[BindingEvent],
    noise: Option<(f64, u64)>,
) -> VolumeAccessor {
    let mut builder =
        SyntheticVolume::new(shape.0, shape.1, shape.2).with_events(events.iter().copied());
    if let Some((std_dev, seed)) = noise {
        builder = builder.with_noise(std_dev, seed);
    }
    let data = builder.build().expect("synthetic volume");
    VolumeAccessor::with_uniform_times(data, 0.1).expect("valid volume")
}

/// Pattern learned from a clean volume holding only the template event.
pub fn learned_pattern() -> ReferencePattern {
    let volume = volume_with((20, 20, 40), &[template_event()], None);
    ReferencePattern::from_region(&volume, 7..12, 7..12, 12, K).expect("pattern")
}

pub fn correlate(volume: &VolumeAccessor, pattern: &ReferencePattern) -> CorrelationVolume {
    CorrelationEngine::default()
        .correlate(volume, Some(pattern), K, &FilterChain::empty())
        .expect("correlation")
}

pub fn config(threshold: f64) -> DetectionConfig {
    DetectionConfig {
        integration_window: K,
        threshold,
        min_distance: 2,
        ..Default::default()
    }
}
