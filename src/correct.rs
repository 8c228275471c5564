//! Phase-flip CTF correction.
//!
//! One image is forward transformed once; every defocus group then gets its
//! own copy of that spectrum, flipped against the group's transfer function
//! and inverse transformed into its output slot.

use ndarray::{Array3, ArrayView2, ArrayView3};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use std::marker::PhantomData;

use crate::error::{CtfError, Result};
use crate::fft::Fft2d;
use crate::float::CtfFloat;

/// Flip the sign of `value` where the real part of `ctf` is negative.
///
/// A zero (or NaN) real part leaves `value` unchanged. The imaginary part of
/// the transfer function is not consulted.
#[inline]
pub fn phase_flip<F: CtfFloat>(value: Complex<F>, ctf: Complex<F>) -> Complex<F> {
    if ctf.re < F::zero() {
        -value
    } else {
        value
    }
}

/// A CTF correction driver for one execution backend.
pub trait Corrector<F: CtfFloat> {
    /// Correct `image` against `num_ctf` transfer functions.
    ///
    /// `ctf` and `rec` hold `num_ctf` contiguous `xsize * ysize` slots; slot
    /// `j` of `rec` receives the image corrected with slot `j` of `ctf`.
    fn correct(
        &self,
        image: &[F],
        ctf: &[Complex<F>],
        rec: &mut [F],
        xsize: usize,
        ysize: usize,
        num_ctf: usize,
    ) -> Result<()>;
}

/// Check sizes before any transform is planned.
pub(crate) fn check_geometry(
    image_len: usize,
    ctf_len: usize,
    rec_len: usize,
    xsize: usize,
    ysize: usize,
    num_ctf: usize,
) -> Result<()> {
    if xsize == 0 || ysize == 0 || num_ctf == 0 {
        return Err(CtfError::InvalidDimensions {
            xsize,
            ysize,
            num_ctf,
        });
    }
    let size = xsize * ysize;
    if image_len != size {
        return Err(CtfError::length("image", size, image_len));
    }
    if ctf_len != size * num_ctf {
        return Err(CtfError::length("ctf", size * num_ctf, ctf_len));
    }
    if rec_len != size * num_ctf {
        return Err(CtfError::length("rec", size * num_ctf, rec_len));
    }
    Ok(())
}

/// Correction on the host using rustfft, with defocus groups run in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCorrector<F> {
    _marker: PhantomData<F>,
}

impl<F: CtfFloat> HostCorrector<F> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F: CtfFloat> Corrector<F> for HostCorrector<F> {
    fn correct(
        &self,
        image: &[F],
        ctf: &[Complex<F>],
        rec: &mut [F],
        xsize: usize,
        ysize: usize,
        num_ctf: usize,
    ) -> Result<()> {
        check_geometry(image.len(), ctf.len(), rec.len(), xsize, ysize, num_ctf)?;

        let fft = Fft2d::<F>::new(xsize, ysize)?;
        let size = fft.len();
        log::debug!(
            "host correction: {}x{} image, {} defocus group(s)",
            xsize,
            ysize,
            num_ctf
        );

        let mut template: Vec<Complex<F>> =
            image.iter().map(|&v| Complex::new(v, F::zero())).collect();
        fft.forward(&mut template);
        let template = template.as_slice();

        rec.par_chunks_mut(size)
            .zip(ctf.par_chunks(size))
            .for_each_init(
                || vec![Complex::new(F::zero(), F::zero()); size],
                |work, (r, c)| {
                    work.copy_from_slice(template);
                    for (w, &h) in work.iter_mut().zip(c) {
                        *w = phase_flip(*w, h);
                    }
                    fft.inverse(work);
                    for (out, w) in r.iter_mut().zip(work.iter()) {
                        *out = w.re;
                    }
                },
            );

        Ok(())
    }
}

/// Correct a 2D image against a `(num_ctf, ysize, xsize)` stack of transfer
/// functions, returning a `(num_ctf, ysize, xsize)` stack of corrected images.
pub fn correct_image<F, C>(
    corrector: &C,
    image: ArrayView2<F>,
    ctf: ArrayView3<Complex<F>>,
) -> Result<Array3<F>>
where
    F: CtfFloat,
    C: Corrector<F> + ?Sized,
{
    let (ysize, xsize) = image.dim();
    let (num_ctf, cy, cx) = ctf.dim();
    if (cy, cx) != (ysize, xsize) {
        return Err(CtfError::ShapeMismatch {
            what: "ctf",
            expected: format!("({num_ctf}, {ysize}, {xsize})"),
            actual: format!("{:?}", ctf.shape()),
        });
    }

    let image = image.as_standard_layout();
    let ctf = ctf.as_standard_layout();
    let mut rec = Array3::<F>::zeros((num_ctf, ysize, xsize));

    // All three are in standard layout, so the slices always exist.
    let (Some(image), Some(ctf), Some(out)) =
        (image.as_slice(), ctf.as_slice(), rec.as_slice_mut())
    else {
        return Err(CtfError::InvalidConfig(
            "arrays are not contiguous".to_string(),
        ));
    };
    corrector.correct(image, ctf, out, xsize, ysize, num_ctf)?;
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Axis};

    fn impulse(xsize: usize, ysize: usize) -> Vec<f32> {
        let mut img = vec![0.0f32; xsize * ysize];
        img[0] = 1.0;
        img
    }

    #[test]
    fn test_phase_flip_sign() {
        let v = Complex::new(2.0f32, -1.0);
        assert_eq!(phase_flip(v, Complex::new(0.5, 0.0)), v);
        assert_eq!(phase_flip(v, Complex::new(-0.5, 0.0)), -v);
    }

    #[test]
    fn test_phase_flip_zero_is_non_negative() {
        let v = Complex::new(3.0f64, 4.0);
        assert_eq!(phase_flip(v, Complex::new(0.0, 0.0)), v);
        assert_eq!(phase_flip(v, Complex::new(-0.0, 0.0)), v);
    }

    #[test]
    fn test_phase_flip_ignores_imaginary_part() {
        let v = Complex::new(1.0f32, 1.0);
        assert_eq!(phase_flip(v, Complex::new(1.0, -5.0)), v);
        assert_eq!(phase_flip(v, Complex::new(-1.0, 5.0)), -v);
    }

    #[test]
    fn test_rejects_zero_groups() {
        let corrector = HostCorrector::<f32>::new();
        let err = corrector.correct(&[1.0; 4], &[], &mut [], 2, 2, 0);
        assert!(matches!(err, Err(CtfError::InvalidDimensions { num_ctf: 0, .. })));
    }

    #[test]
    fn test_rejects_short_output() {
        let corrector = HostCorrector::<f32>::new();
        let ctf = vec![Complex::new(1.0f32, 0.0); 8];
        let mut rec = vec![0.0f32; 7];
        let err = corrector.correct(&[1.0; 4], &ctf, &mut rec, 2, 2, 2);
        assert!(matches!(err, Err(CtfError::ShapeMismatch { what: "rec", .. })));
    }

    #[test]
    fn test_impulse_all_pass_is_identity() {
        let (xsize, ysize) = (8, 6);
        let image = impulse(xsize, ysize);
        let ctf = vec![Complex::new(1.0f32, 0.0); xsize * ysize];
        let mut rec = vec![f32::NAN; xsize * ysize];
        HostCorrector::new()
            .correct(&image, &ctf, &mut rec, xsize, ysize, 1)
            .unwrap();
        for (a, b) in rec.iter().zip(image.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_all_negative_ctf_negates_image() {
        let (xsize, ysize) = (4, 4);
        let image: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let ctf = vec![Complex::new(-2.0f64, 0.0); 16];
        let mut rec = vec![0.0f64; 16];
        HostCorrector::new()
            .correct(&image, &ctf, &mut rec, xsize, ysize, 1)
            .unwrap();
        for (a, b) in rec.iter().zip(image.iter()) {
            assert!((a + b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_groups_written_to_their_own_slot() {
        let (xsize, ysize) = (5, 3);
        let size = xsize * ysize;
        let image: Vec<f32> = (0..size).map(|i| (i as f32).cos()).collect();
        let mut ctf = vec![Complex::new(1.0f32, 0.0); size];
        ctf.extend(vec![Complex::new(-1.0f32, 0.0); size]);
        ctf.extend(vec![Complex::new(0.0f32, 0.0); size]);
        let mut rec = vec![0.0f32; 3 * size];
        HostCorrector::new()
            .correct(&image, &ctf, &mut rec, xsize, ysize, 3)
            .unwrap();
        for k in 0..size {
            assert!((rec[k] - image[k]).abs() < 1e-5);
            assert!((rec[size + k] + image[k]).abs() < 1e-5);
            assert!((rec[2 * size + k] - image[k]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_correct_image_shapes() {
        let image = Array2::<f32>::from_shape_fn((6, 4), |(y, x)| (x + 2 * y) as f32);
        let ctf = Array3::from_elem((2, 6, 4), Complex::new(1.0f32, 0.0));
        let rec = correct_image(&HostCorrector::new(), image.view(), ctf.view()).unwrap();
        assert_eq!(rec.dim(), (2, 6, 4));
        for slot in rec.axis_iter(Axis(0)) {
            for (a, b) in slot.iter().zip(image.iter()) {
                assert!((a - b).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_correct_image_transposed_input() {
        let base = Array2::<f64>::from_shape_fn((4, 6), |(y, x)| (x * 3 + y) as f64);
        let image = base.t();
        let ctf = Array3::from_elem((1, 6, 4), Complex::new(1.0f64, 0.0));
        let rec = correct_image(&HostCorrector::new(), image, ctf.view()).unwrap();
        for (a, b) in rec.index_axis(Axis(0), 0).iter().zip(image.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_correct_image_rejects_mismatched_ctf() {
        let image = Array2::<f32>::zeros((4, 4));
        let ctf = Array3::from_elem((1, 4, 5), Complex::new(1.0f32, 0.0));
        let err = correct_image(&HostCorrector::new(), image.view(), ctf.view());
        assert!(matches!(err, Err(CtfError::ShapeMismatch { what: "ctf", .. })));
    }
}
