//! Noise generation utilities for synthetic SPR video.
//!
//! Provides seeded Gaussian noise for single frames and for whole
//! (row, column, frame) volumes. Every generator takes an explicit seed so
//! that tests built on top of it are reproducible.
//!
//! # Performance
//!
//! Volume noise is generated frame by frame in parallel via rayon. Each frame
//! derives its own generator from `seed + frame`, so the result does not
//! depend on the number of worker threads.

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, NormalError};
use thiserror::Error;

/// Errors raised while setting up a noise distribution.
#[derive(Error, Debug)]
pub enum NoiseError {
    #[error("Invalid normal distribution (mean {mean}, std dev {std_dev}): {source}")]
    InvalidDistribution {
        mean: f64,
        std_dev: f64,
        #[source]
        source: NormalError,
    },
}

fn normal(mean: f64, std_dev: f64) -> Result<Normal<f64>, NoiseError> {
    let invalid = |source: NormalError| NoiseError::InvalidDistribution {
        mean,
        std_dev,
        source,
    };
    // rand_distr only rejects a non-finite std dev
    if std_dev < 0.0 {
        return Err(invalid(NormalError::BadVariance));
    }
    Normal::new(mean, std_dev).map_err(invalid)
}

/// Generate a 2D array of normally distributed values for testing purposes.
///
/// # Arguments
/// * `size` - Tuple of (rows, cols) for the output array dimensions
/// * `mean` - Mean value of the normal distribution
/// * `std_dev` - Standard deviation of the normal distribution
/// * `seed` - Random seed for deterministic output
///
/// # Example
/// ```
/// use shared::image_proc::noise::simple_normal_array;
///
/// let noise = simple_normal_array((10, 10), 100.0, 10.0, 42).unwrap();
/// assert_eq!(noise.dim(), (10, 10));
/// ```
pub fn simple_normal_array(
    size: (usize, usize),
    mean: f64,
    std_dev: f64,
    seed: u64,
) -> Result<Array2<f64>, NoiseError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal_dist = normal(mean, std_dev)?;
    Ok(Array2::from_shape_fn(size, |_| normal_dist.sample(&mut rng)))
}

/// Generate a (rows, cols, frames) volume of normally distributed values.
///
/// Frames are filled in parallel; frame `f` uses the generator seeded with
/// `seed.wrapping_add(f)`.
pub fn simple_normal_volume(
    shape: (usize, usize, usize),
    mean: f64,
    std_dev: f64,
    seed: u64,
) -> Result<Array3<f64>, NoiseError> {
    let mut volume = Array3::<f64>::zeros(shape);
    add_normal_noise(&mut volume, mean, std_dev, seed)?;
    Ok(volume)
}

/// Add normally distributed noise to every sample of an existing volume.
pub fn add_normal_noise(
    volume: &mut Array3<f64>,
    mean: f64,
    std_dev: f64,
    seed: u64,
) -> Result<(), NoiseError> {
    let normal_dist = normal(mean, std_dev)?;

    volume
        .axis_iter_mut(Axis(2))
        .into_par_iter()
        .enumerate()
        .for_each(|(frame, mut slice)| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(frame as u64));
            slice
                .iter_mut()
                .for_each(|pixel| *pixel += normal_dist.sample(&mut rng));
        });

    Ok(())
}
