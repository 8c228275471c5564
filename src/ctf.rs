//! Contrast transfer function model.
//!
//! Builds complex transfer functions on the unshifted FFT frequency grid from
//! known microscope parameters, so they line up element for element with the
//! spectrum produced by [`crate::fft::Fft2d::forward`].

use ndarray::{Array2, Array3, Axis};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{CtfError, Result};
use crate::float::CtfFloat;

/// Microscope optics. Lengths in Å unless stated otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtfParams {
    /// Beam energy in keV.
    pub energy: f64,
    /// Spherical aberration in mm.
    pub spherical_aberration: f64,
    /// Difference between the major and minor defocus axes.
    pub astigmatism: f64,
    /// Angle of the major defocus axis, radians.
    pub astigmatism_angle: f64,
    /// Additional phase shift (e.g. phase plate), radians.
    pub phase_shift: f64,
}

impl Default for CtfParams {
    fn default() -> Self {
        Self {
            energy: 300.0,
            spherical_aberration: 2.7,
            astigmatism: 0.0,
            astigmatism_angle: 0.0,
            phase_shift: 0.0,
        }
    }
}

impl CtfParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.energy.is_finite() && self.energy > 0.0) {
            return Err(CtfError::InvalidConfig(format!(
                "energy must be positive, got {}",
                self.energy
            )));
        }
        if !self.spherical_aberration.is_finite() {
            return Err(CtfError::InvalidConfig(
                "spherical_aberration must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Relativistic electron wavelength in Å.
    pub fn wavelength(&self) -> f64 {
        let v = self.energy * 1000.0;
        12.2643247 / (v * (1.0 + 0.978466e-6 * v)).sqrt()
    }

    /// Phase aberration χ at spatial frequency `(fx, fy)` in 1/Å.
    pub fn chi(&self, defocus: f64, fx: f64, fy: f64) -> f64 {
        let lambda = self.wavelength();
        let cs = self.spherical_aberration * 1e7;
        let q2 = fx * fx + fy * fy;
        let phi = fy.atan2(fx);
        let df = defocus + 0.5 * self.astigmatism * (2.0 * (phi - self.astigmatism_angle)).cos();
        PI * lambda * df * q2 - 0.5 * PI * cs * lambda.powi(3) * q2 * q2 - self.phase_shift
    }
}

/// Sample frequencies of an `n`-point transform with spacing `d`, in FFT order.
pub fn fftfreq(n: usize, d: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * d);
    (0..n)
        .map(|k| {
            let k = if k < n.div_ceil(2) {
                k as f64
            } else {
                k as f64 - n as f64
            };
            k * scale
        })
        .collect()
}

fn check_grid(xsize: usize, ysize: usize, pixel_size: f64) -> Result<()> {
    if xsize == 0 || ysize == 0 {
        return Err(CtfError::InvalidDimensions {
            xsize,
            ysize,
            num_ctf: 1,
        });
    }
    if !(pixel_size.is_finite() && pixel_size > 0.0) {
        return Err(CtfError::InvalidConfig(format!(
            "pixel_size must be positive, got {pixel_size}"
        )));
    }
    Ok(())
}

fn fill_ctf<F: CtfFloat>(
    mut out: ndarray::ArrayViewMut2<Complex<F>>,
    fx: &[f64],
    fy: &[f64],
    defocus: f64,
    params: &CtfParams,
) {
    for ((y, x), h) in out.indexed_iter_mut() {
        let chi = params.chi(defocus, fx[x], fy[y]);
        // -i * exp(i chi): real part is the phase contrast CTF sin(chi).
        *h = Complex::new(F::from_f64_c(chi.sin()), F::from_f64_c(-chi.cos()));
    }
}

/// Transfer function of shape `(ysize, xsize)` for one defocus value.
pub fn compute_ctf<F: CtfFloat>(
    xsize: usize,
    ysize: usize,
    pixel_size: f64,
    defocus: f64,
    params: &CtfParams,
) -> Result<Array2<Complex<F>>> {
    check_grid(xsize, ysize, pixel_size)?;
    params.validate()?;
    let fx = fftfreq(xsize, pixel_size);
    let fy = fftfreq(ysize, pixel_size);
    let mut ctf = Array2::from_elem((ysize, xsize), Complex::new(F::zero(), F::zero()));
    fill_ctf(ctf.view_mut(), &fx, &fy, defocus, params);
    Ok(ctf)
}

/// Transfer functions of shape `(defoci.len(), ysize, xsize)`.
pub fn ctf_stack<F: CtfFloat>(
    xsize: usize,
    ysize: usize,
    pixel_size: f64,
    defoci: &[f64],
    params: &CtfParams,
) -> Result<Array3<Complex<F>>> {
    check_grid(xsize, ysize, pixel_size)?;
    params.validate()?;
    if defoci.is_empty() {
        return Err(CtfError::InvalidConfig("no defocus values given".into()));
    }
    let fx = fftfreq(xsize, pixel_size);
    let fy = fftfreq(ysize, pixel_size);
    let mut stack = Array3::from_elem(
        (defoci.len(), ysize, xsize),
        Complex::new(F::zero(), F::zero()),
    );
    for (slot, &df) in stack.axis_iter_mut(Axis(0)).zip(defoci) {
        fill_ctf(slot, &fx, &fy, df, params);
    }
    log::debug!(
        "built {} CTF(s) on a {}x{} grid, defocus {:?}",
        defoci.len(),
        xsize,
        ysize,
        defocus_range(defoci)
    );
    Ok(stack)
}

/// `num_defocus` values spaced by `step`, centred on `centre`.
pub fn defocus_steps(centre: f64, num_defocus: usize, step: f64) -> Vec<f64> {
    let mid = (num_defocus as f64 - 1.0) / 2.0;
    (0..num_defocus)
        .map(|i| centre + (i as f64 - mid) * step)
        .collect()
}

/// Smallest and largest defocus, or `None` for an empty list.
pub fn defocus_range(defoci: &[f64]) -> Option<(f64, f64)> {
    defoci.iter().fold(None, |acc, &d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    })
}
