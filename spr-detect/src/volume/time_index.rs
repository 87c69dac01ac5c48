//! Per-frame acquisition times.
//!
//! SPR cameras stamp every frame with a tick counter running at 10 MHz. The
//! index stores, for each frame, the seconds elapsed since the first frame and
//! the seconds since the previous frame.

use serde::{Deserialize, Serialize};

/// Acquisition clock rate in ticks per second.
pub const TICKS_PER_SECOND: f64 = 1e7;

/// Timing of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameTime {
    /// Seconds since the first frame
    pub elapsed_s: f64,
    /// Seconds since the previous frame (0 for the first frame)
    pub delta_s: f64,
}

/// Ordered timing information, one entry per frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeIndex {
    times: Vec<FrameTime>,
}

impl TimeIndex {
    pub fn new(times: Vec<FrameTime>) -> Self {
        Self { times }
    }

    /// Build the index from raw tick stamps.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use spr_detect::volume::TimeIndex;
    ///
    /// let index = TimeIndex::from_ticks(&[1_000_000, 6_000_000, 16_000_000]);
    /// assert_eq!(index.get(1).unwrap().elapsed_s, 0.5);
    /// assert_eq!(index.get(2).unwrap().delta_s, 1.0);
    /// ```
    pub fn from_ticks(ticks: &[u64]) -> Self {
        let Some(&first) = ticks.first() else {
            return Self::default();
        };
        let mut previous = first;
        let times = ticks
            .iter()
            .map(|&tick| {
                let time = FrameTime {
                    elapsed_s: (tick as f64 - first as f64) / TICKS_PER_SECOND,
                    delta_s: (tick as f64 - previous as f64) / TICKS_PER_SECOND,
                };
                previous = tick;
                time
            })
            .collect();
        Self { times }
    }

    /// Evenly spaced frames, `period_s` apart.
    pub fn uniform(frames: usize, period_s: f64) -> Self {
        let times = (0..frames)
            .map(|f| FrameTime {
                elapsed_s: f as f64 * period_s,
                delta_s: if f == 0 { 0.0 } else { period_s },
            })
            .collect();
        Self { times }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<&FrameTime> {
        self.times.get(frame)
    }

    pub fn as_slice(&self) -> &[FrameTime] {
        &self.times
    }

    /// Keep the first entry of every `factor`-frame bin and recompute deltas.
    ///
    /// Trailing frames that do not fill a whole bin are dropped.
    pub fn downsample(&self, factor: usize) -> Self {
        if factor <= 1 {
            return self.clone();
        }
        let bins = self.times.len() / factor;
        let mut times = Vec::with_capacity(bins);
        let mut previous: Option<f64> = None;
        for bin in 0..bins {
            let elapsed_s = self.times[bin * factor].elapsed_s;
            times.push(FrameTime {
                elapsed_s,
                delta_s: previous.map_or(0.0, |p| elapsed_s - p),
            });
            previous = Some(elapsed_s);
        }
        Self { times }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_ticks() {
        let index = TimeIndex::from_ticks(&[500, 2_500_500, 5_000_500, 10_000_500]);
        assert_eq!(index.len(), 4);
        assert_eq!(index.get(0), Some(&FrameTime::default()));
        assert_relative_eq!(index.get(1).unwrap().elapsed_s, 0.25);
        assert_relative_eq!(index.get(3).unwrap().elapsed_s, 1.0);
        assert_relative_eq!(index.get(3).unwrap().delta_s, 0.5);
    }

    #[test]
    fn test_empty_ticks() {
        assert!(TimeIndex::from_ticks(&[]).is_empty());
    }

    #[test]
    fn test_downsample_recomputes_deltas() {
        let index = TimeIndex::uniform(7, 0.1);
        let binned = index.downsample(3);
        assert_eq!(binned.len(), 2);
        assert_relative_eq!(binned.get(0).unwrap().delta_s, 0.0);
        assert_relative_eq!(binned.get(1).unwrap().elapsed_s, 0.3, epsilon = 1e-12);
        assert_relative_eq!(binned.get(1).unwrap().delta_s, 0.3, epsilon = 1e-12);
        assert_eq!(index.downsample(1), index);
    }
}
