//! Same-size 3D cross-correlation.
//!
//! The output has the shape of the input volume and places the centre of the
//! template at each output voxel:
//!
//! ```text
//! out[i] = sum_j input[i + j - M / 2] * template[j]
//! ```
//!
//! per axis, with `M` the template length on that axis and samples outside
//! the input treated as zero. Two evaluation strategies produce the same
//! values: a direct sum, cheap for small volumes and templates, and an FFT
//! product for the full-size SPR volumes.

use ndarray::{s, Array3, ArrayView3, Zip};
use num_complex::Complex64;
use rustfft::FftDirection;
use serde::{Deserialize, Serialize};

use super::fft::transform_all;

/// Work (input voxels x template voxels) above which `Auto` switches to FFT.
const DIRECT_WORK_LIMIT: usize = 1 << 24;

/// Strategy used to evaluate the correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorrelationMethod {
    /// Pick direct or FFT from the amount of work
    #[default]
    Auto,
    /// Nested sums over the template
    Direct,
    /// Zero-padded FFT product
    Fft,
}

/// Cross-correlate `input` with `template`, returning an array shaped like `input`.
pub fn correlate_same(
    input: ArrayView3<f64>,
    template: ArrayView3<f64>,
    method: CorrelationMethod,
) -> Array3<f64> {
    if input.is_empty() || template.is_empty() {
        return Array3::zeros(input.dim());
    }

    let method = match method {
        CorrelationMethod::Auto if input.len() * template.len() <= DIRECT_WORK_LIMIT => {
            CorrelationMethod::Direct
        }
        CorrelationMethod::Auto => CorrelationMethod::Fft,
        other => other,
    };

    log::debug!(
        "Correlating {:?} with template {:?} using {:?}",
        input.dim(),
        template.dim(),
        method
    );

    match method {
        CorrelationMethod::Fft => correlate_fft(input, template),
        _ => correlate_direct(input, template),
    }
}

fn correlate_direct(input: ArrayView3<f64>, template: ArrayView3<f64>) -> Array3<f64> {
    let (rows, cols, frames) = input.dim();
    let (t_rows, t_cols, t_frames) = template.dim();
    let (c_row, c_col, c_frame) = (t_rows / 2, t_cols / 2, t_frames / 2);

    let mut out = Array3::<f64>::zeros((rows, cols, frames));
    Zip::indexed(&mut out).par_for_each(|(r, c, f), value| {
        let mut sum = 0.0;
        for tr in 0..t_rows {
            let Some(ir) = shifted(r, tr, c_row, rows) else {
                continue;
            };
            for tc in 0..t_cols {
                let Some(ic) = shifted(c, tc, c_col, cols) else {
                    continue;
                };
                for tf in 0..t_frames {
                    if let Some(i_f) = shifted(f, tf, c_frame, frames) {
                        sum += input[[ir, ic, i_f]] * template[[tr, tc, tf]];
                    }
                }
            }
        }
        *value = sum;
    });
    out
}

/// `i + j - center` when it falls inside `0..len`.
#[inline]
fn shifted(i: usize, j: usize, center: usize, len: usize) -> Option<usize> {
    (i + j).checked_sub(center).filter(|&k| k < len)
}

fn correlate_fft(input: ArrayView3<f64>, template: ArrayView3<f64>) -> Array3<f64> {
    let (rows, cols, frames) = input.dim();
    let (t_rows, t_cols, t_frames) = template.dim();
    let padded = (rows + t_rows - 1, cols + t_cols - 1, frames + t_frames - 1);

    let mut input_spectrum = Array3::<Complex64>::zeros(padded);
    input_spectrum
        .slice_mut(s![..rows, ..cols, ..frames])
        .zip_mut_with(&input, |dst, &src| *dst = Complex64::new(src, 0.0));
    let mut template_spectrum = Array3::<Complex64>::zeros(padded);
    template_spectrum
        .slice_mut(s![..t_rows, ..t_cols, ..t_frames])
        .zip_mut_with(&template, |dst, &src| *dst = Complex64::new(src, 0.0));

    transform_all(&mut input_spectrum, FftDirection::Forward);
    transform_all(&mut template_spectrum, FftDirection::Forward);

    Zip::from(&mut input_spectrum)
        .and(&template_spectrum)
        .par_for_each(|a, p| *a *= p.conj());
    transform_all(&mut input_spectrum, FftDirection::Inverse);

    // Circular lag n holds sum_m input[m + n] * template[m]; lag i - M/2 is
    // the same-size output at i.
    let (c_row, c_col, c_frame) = (t_rows / 2, t_cols / 2, t_frames / 2);
    let wrap = |i: usize, center: usize, len: usize| (i + len - center) % len;
    Array3::from_shape_fn((rows, cols, frames), |(r, c, f)| {
        input_spectrum[[
            wrap(r, c_row, padded.0),
            wrap(c, c_col, padded.1),
            wrap(f, c_frame, padded.2),
        ]]
        .re
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_volume(shape: (usize, usize, usize), seed: u64) -> Array3<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array3::from_shape_fn(shape, |_| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn test_delta_template_is_identity() {
        let input = random_volume((5, 6, 7), 1);
        let mut template = Array3::<f64>::zeros((3, 3, 3));
        template[[1, 1, 1]] = 1.0;

        let out = correlate_same(input.view(), template.view(), CorrelationMethod::Direct);
        for (a, b) in input.iter().zip(out.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shifted_delta_moves_signal() {
        let mut input = Array3::<f64>::zeros((5, 5, 5));
        input[[2, 2, 2]] = 1.0;
        // template sample one frame after its centre
        let mut template = Array3::<f64>::zeros((1, 1, 3));
        template[[0, 0, 2]] = 1.0;

        let out = correlate_same(input.view(), template.view(), CorrelationMethod::Direct);
        assert_relative_eq!(out[[2, 2, 1]], 1.0);
        assert_relative_eq!(out[[2, 2, 2]], 0.0);
    }

    #[test]
    fn test_direct_and_fft_agree_odd_template() {
        let input = random_volume((9, 8, 12), 2);
        let template = random_volume((3, 3, 5), 3);

        let direct = correlate_same(input.view(), template.view(), CorrelationMethod::Direct);
        let fft = correlate_same(input.view(), template.view(), CorrelationMethod::Fft);
        for (a, b) in direct.iter().zip(fft.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_direct_and_fft_agree_even_template() {
        let input = random_volume((7, 10, 16), 4);
        let template = random_volume((2, 4, 8), 5);

        let direct = correlate_same(input.view(), template.view(), CorrelationMethod::Direct);
        let fft = correlate_same(input.view(), template.view(), CorrelationMethod::Fft);
        for (a, b) in direct.iter().zip(fft.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_template_larger_than_input() {
        let input = random_volume((2, 2, 3), 6);
        let template = random_volume((4, 3, 6), 7);

        let direct = correlate_same(input.view(), template.view(), CorrelationMethod::Direct);
        let fft = correlate_same(input.view(), template.view(), CorrelationMethod::Fft);
        assert_eq!(direct.dim(), (2, 2, 3));
        for (a, b) in direct.iter().zip(fft.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_autocorrelation_peak_is_energy() {
        let template = random_volume((3, 4, 6), 8);
        let out = correlate_same(template.view(), template.view(), CorrelationMethod::Auto);
        let energy: f64 = template.iter().map(|v| v * v).sum();
        let max = out.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(max, energy, epsilon = 1e-9);
        assert_relative_eq!(out[[1, 2, 3]], energy, epsilon = 1e-9);
    }
}
