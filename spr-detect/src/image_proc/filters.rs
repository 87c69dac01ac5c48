//! Post-processing filters for differenced SPR frames.
//!
//! Filters are described by plain data ([`FilterDescriptor`]) and applied in
//! order by a [`FilterChain`]. A chain is built per analysis run and applied
//! as a pure transformation: it never mutates its input and holds no state
//! between calls.
//!
//! # Examples
//!
//! ```rust
//! use ndarray::Array2;
//! use spr_detect::image_proc::filters::{FilterChain, FilterDescriptor};
//!
//! let chain = FilterChain::new(vec![
//!     FilterDescriptor::Gaussian { sigma: 1.0 },
//!     FilterDescriptor::Absolute,
//! ]);
//! let frame = Array2::from_elem((8, 8), -2.0);
//! let filtered = chain.apply(frame.view());
//! assert!((filtered[[4, 4]] - 2.0).abs() < 1e-9);
//! ```

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use super::fft::{fft2, ifft2_real};

/// A single filter and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterDescriptor {
    /// Gaussian blur, kernel truncated at 4 sigma, mirrored borders
    Gaussian { sigma: f64 },
    /// Adaptive Wiener denoising over a square window
    Wiener { window: usize },
    /// Edge-preserving bilateral filter
    Bilateral {
        diameter: usize,
        sigma_color: f64,
        sigma_space: f64,
    },
    /// Removes every spatial frequency whose magnitude exceeds `exp(level / 20)`
    FourierMask { level: f64 },
    /// Absolute value of every pixel
    Absolute,
}

impl FilterDescriptor {
    /// Apply this filter to a frame.
    pub fn apply(&self, image: ArrayView2<f64>) -> Array2<f64> {
        match *self {
            FilterDescriptor::Gaussian { sigma } => gaussian(image, sigma),
            FilterDescriptor::Wiener { window } => wiener(image, window),
            FilterDescriptor::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => bilateral(image, diameter, sigma_color, sigma_space),
            FilterDescriptor::FourierMask { level } => fourier_mask(image, level),
            FilterDescriptor::Absolute => image.mapv(f64::abs),
        }
    }
}

/// Ordered list of filters applied one after another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    filters: Vec<FilterDescriptor>,
}

impl FilterChain {
    pub fn new(filters: Vec<FilterDescriptor>) -> Self {
        Self { filters }
    }

    /// Chain that returns its input unchanged.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    /// Run every filter in order.
    pub fn apply(&self, image: ArrayView2<f64>) -> Array2<f64> {
        let mut current = image.to_owned();
        for filter in &self.filters {
            current = filter.apply(current.view());
        }
        current
    }
}

/// Mirror an out-of-range index back into `0..len` (`d c b a | a b c d`).
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

fn gaussian(image: ArrayView2<f64>, sigma: f64) -> Array2<f64> {
    if sigma <= 0.0 || image.is_empty() {
        return image.to_owned();
    }
    let radius = (4.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-(x * x) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= norm);

    let (rows, cols) = image.dim();
    let mut along_cols = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut along_cols).par_for_each(|(r, c), value| {
        *value = kernel
            .iter()
            .enumerate()
            .map(|(i, k)| k * image[[r, reflect(c as isize + i as isize - radius, cols)]])
            .sum();
    });

    let mut out = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut out).par_for_each(|(r, c), value| {
        *value = kernel
            .iter()
            .enumerate()
            .map(|(i, k)| k * along_cols[[reflect(r as isize + i as isize - radius, rows), c]])
            .sum();
    });
    out
}

/// Sum over a `window x window` neighbourhood, zero outside the image.
fn box_sum(image: ArrayView2<f64>, window: usize) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let half = (window / 2) as isize;
    let mut out = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut out).par_for_each(|(r, c), value| {
        let mut sum = 0.0;
        for dr in -half..=half {
            let rr = r as isize + dr;
            if rr < 0 || rr >= rows as isize {
                continue;
            }
            for dc in -half..=half {
                let cc = c as isize + dc;
                if cc < 0 || cc >= cols as isize {
                    continue;
                }
                sum += image[[rr as usize, cc as usize]];
            }
        }
        *value = sum;
    });
    out
}

fn wiener(image: ArrayView2<f64>, window: usize) -> Array2<f64> {
    if image.is_empty() || window == 0 {
        return image.to_owned();
    }
    // even windows behave like the next odd size
    let window = window | 1;
    let count = (window * window) as f64;

    let local_mean = box_sum(image, window) / count;
    let squares = image.mapv(|v| v * v);
    let local_var = box_sum(squares.view(), window) / count - local_mean.mapv(|m| m * m);
    let noise = local_var.mean().unwrap_or(0.0);

    let mut out = Array2::<f64>::zeros(image.dim());
    Zip::from(&mut out)
        .and(&image)
        .and(&local_mean)
        .and(&local_var)
        .for_each(|value, &x, &mean, &var| {
            *value = if var <= noise {
                mean
            } else {
                mean + (x - mean) * (1.0 - noise / var)
            };
        });
    out
}

fn bilateral(
    image: ArrayView2<f64>,
    diameter: usize,
    sigma_color: f64,
    sigma_space: f64,
) -> Array2<f64> {
    if image.is_empty() || diameter <= 1 || sigma_color <= 0.0 || sigma_space <= 0.0 {
        return image.to_owned();
    }
    let (rows, cols) = image.dim();
    let radius = (diameter / 2) as isize;
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let mut out = Array2::<f64>::zeros((rows, cols));
    Zip::indexed(&mut out).par_for_each(|(r, c), value| {
        let center = image[[r, c]];
        let mut weighted = 0.0;
        let mut total = 0.0;
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                let dist2 = (dr * dr + dc * dc) as f64;
                if dist2 > (radius * radius) as f64 {
                    continue;
                }
                let sample = image[[
                    reflect(r as isize + dr, rows),
                    reflect(c as isize + dc, cols),
                ]];
                let diff = sample - center;
                let weight = (dist2 * space_coeff + diff * diff * color_coeff).exp();
                weighted += weight * sample;
                total += weight;
            }
        }
        *value = weighted / total;
    });
    out
}

fn fourier_mask(image: ArrayView2<f64>, level: f64) -> Array2<f64> {
    if image.is_empty() {
        return image.to_owned();
    }
    let cutoff = (level / 20.0).exp();
    let mut spectrum = fft2(image);
    spectrum.mapv_inplace(|v| if v.norm() > cutoff { 0.0.into() } else { v });
    ifft2_real(spectrum)
}
