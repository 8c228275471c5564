//! Host 2D Fourier transform engine.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::error::{CtfError, Result};
use crate::float::CtfFloat;

/// Forward/inverse 2D DFT over a fixed `xsize × ysize` row-major buffer.
///
/// Plans are built once at construction and shared, so a single engine can
/// be used from several rayon workers at the same time.
pub struct Fft2d<F: CtfFloat> {
    xsize: usize,
    ysize: usize,
    row_forward: Arc<dyn Fft<F>>,
    row_inverse: Arc<dyn Fft<F>>,
    col_forward: Arc<dyn Fft<F>>,
    col_inverse: Arc<dyn Fft<F>>,
    scratch_len: usize,
}

impl<F: CtfFloat> Fft2d<F> {
    /// Plan transforms for an image of `xsize` columns and `ysize` rows.
    pub fn new(xsize: usize, ysize: usize) -> Result<Self> {
        if xsize == 0 || ysize == 0 {
            return Err(CtfError::InvalidDimensions {
                xsize,
                ysize,
                num_ctf: 1,
            });
        }
        let mut planner = FftPlanner::new();
        let row_forward = planner.plan_fft_forward(xsize);
        let row_inverse = planner.plan_fft_inverse(xsize);
        let col_forward = planner.plan_fft_forward(ysize);
        let col_inverse = planner.plan_fft_inverse(ysize);
        let scratch_len = [&row_forward, &row_inverse, &col_forward, &col_inverse]
            .iter()
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        Ok(Self {
            xsize,
            ysize,
            row_forward,
            row_inverse,
            col_forward,
            col_inverse,
            scratch_len,
        })
    }

    pub fn xsize(&self) -> usize {
        self.xsize
    }

    pub fn ysize(&self) -> usize {
        self.ysize
    }

    /// Number of complex elements a buffer must hold.
    pub fn len(&self) -> usize {
        self.xsize * self.ysize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unnormalized forward transform, in place.
    ///
    /// # Panics
    /// If `buffer.len() != xsize * ysize`.
    pub fn forward(&self, buffer: &mut [Complex<F>]) {
        self.process(buffer, &self.row_forward, &self.col_forward);
    }

    /// Inverse transform, in place, scaled by `1 / (xsize * ysize)`.
    ///
    /// # Panics
    /// If `buffer.len() != xsize * ysize`.
    pub fn inverse(&self, buffer: &mut [Complex<F>]) {
        self.process(buffer, &self.row_inverse, &self.col_inverse);
        let norm = F::one() / F::usize_as(self.len());
        for v in buffer.iter_mut() {
            *v = *v * norm;
        }
    }

    fn process(&self, buffer: &mut [Complex<F>], row_plan: &Arc<dyn Fft<F>>, col_plan: &Arc<dyn Fft<F>>) {
        assert_eq!(buffer.len(), self.len(), "FFT buffer length");

        let zero = Complex::new(F::zero(), F::zero());
        let mut scratch = vec![zero; self.scratch_len];

        // Rows are contiguous.
        for row in buffer.chunks_exact_mut(self.xsize) {
            row_plan.process_with_scratch(row, &mut scratch);
        }

        // Columns: gather, transform, scatter.
        if self.ysize > 1 {
            let mut col = vec![zero; self.ysize];
            for c in 0..self.xsize {
                for (r, v) in col.iter_mut().enumerate() {
                    *v = buffer[r * self.xsize + c];
                }
                col_plan.process_with_scratch(&mut col, &mut scratch);
                for (r, v) in col.iter().enumerate() {
                    buffer[r * self.xsize + c] = *v;
                }
            }
        }
    }
}
