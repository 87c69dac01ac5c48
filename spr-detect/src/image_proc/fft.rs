//! N-dimensional FFT helpers built on rustfft.
//!
//! rustfft only transforms contiguous 1D buffers. These helpers apply it
//! along every lane of an ndarray axis in turn, which gives the separable
//! N-dimensional transform. Lanes are processed in parallel.

use ndarray::{Array, Array2, ArrayView2, Axis, Dimension, Zip};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

/// Transform every lane along `axis` in place.
///
/// The inverse transform is normalized by the lane length so that a forward
/// transform followed by an inverse one is the identity.
pub fn transform_axis<D: Dimension>(
    data: &mut Array<Complex64, D>,
    axis: Axis,
    direction: FftDirection,
) {
    let len = data.len_of(axis);
    if len <= 1 {
        return;
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft(len, direction);
    let scale = match direction {
        FftDirection::Forward => 1.0,
        FftDirection::Inverse => 1.0 / len as f64,
    };

    Zip::from(data.lanes_mut(axis)).par_for_each(|mut lane| {
        let mut buffer: Vec<Complex64> = lane.iter().copied().collect();
        fft.process(&mut buffer);
        for (dst, src) in lane.iter_mut().zip(buffer) {
            *dst = src * scale;
        }
    });
}

/// Forward or inverse transform over all axes, in place.
pub fn transform_all<D: Dimension>(data: &mut Array<Complex64, D>, direction: FftDirection) {
    for axis in 0..data.ndim() {
        transform_axis(data, Axis(axis), direction);
    }
}

/// 2D forward FFT of a real image.
pub fn fft2(image: ArrayView2<f64>) -> Array2<Complex64> {
    let mut spectrum = image.mapv(|v| Complex64::new(v, 0.0));
    transform_all(&mut spectrum, FftDirection::Forward);
    spectrum
}

/// Real part of the 2D inverse FFT.
pub fn ifft2_real(mut spectrum: Array2<Complex64>) -> Array2<f64> {
    transform_all(&mut spectrum, FftDirection::Inverse);
    spectrum.mapv(|v| v.re)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn test_fft2_round_trip() {
        let image = Array2::from_shape_fn((6, 5), |(r, c)| (r * 5 + c) as f64 - 7.0);
        let restored = ifft2_real(fft2(image.view()));
        for (a, b) in image.iter().zip(restored.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_dc_component_is_sum() {
        let image = Array2::from_elem((4, 4), 2.0);
        let spectrum = fft2(image.view());
        assert_relative_eq!(spectrum[[0, 0]].re, 32.0, epsilon = 1e-12);
        assert_relative_eq!(spectrum[[1, 2]].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_axis_leaves_other_axes_alone() {
        let mut data = Array3::from_elem((2, 3, 4), Complex64::new(1.0, 0.0));
        transform_axis(&mut data, Axis(2), FftDirection::Forward);
        assert_relative_eq!(data[[1, 2, 0]].re, 4.0, epsilon = 1e-12);
        assert_relative_eq!(data[[1, 2, 1]].norm(), 0.0, epsilon = 1e-12);
    }
}
