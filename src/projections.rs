//! Projection stack helpers around the correction stage.

use ndarray::{s, Array1, Array4, ArrayView, ArrayView3, Axis, Dimension};
use rustfft::num_complex::Complex;

use crate::correct::{correct_image, Corrector};
use crate::error::{CtfError, Result};
use crate::float::CtfFloat;

/// One rotation centre per sinogram row.
///
/// Without an explicit centre every row rotates about `num_pixels / 2`.
pub fn rotation_centres(num_rows: usize, num_pixels: usize, centre: Option<f32>) -> Array1<f32> {
    let c = centre.unwrap_or(num_pixels as f32 / 2.0);
    Array1::from_elem(num_rows, c)
}

/// Swap between projection order `(THETA, Y, X)` and sinogram order
/// `(Y, THETA, X)` without copying. Also maps `(THETA, DEFOCUS, Y, X)` to
/// `(Y, DEFOCUS, THETA, X)`. Applying it twice restores the original view.
pub fn sinogram_order<A, D: Dimension>(view: ArrayView<'_, A, D>) -> Result<ArrayView<'_, A, D>> {
    let ndim = view.ndim();
    if ndim < 3 {
        return Err(CtfError::ShapeMismatch {
            what: "projection stack",
            expected: "at least 3 dimensions".to_string(),
            actual: format!("{:?}", view.shape()),
        });
    }
    let mut view = view;
    view.swap_axes(0, ndim - 2);
    Ok(view)
}

/// Correct every projection of a `(THETA, Y, X)` stack against each of the
/// `(DEFOCUS, Y, X)` transfer functions, giving `(THETA, DEFOCUS, Y, X)`.
pub fn correct_projections<F, C>(
    corrector: &C,
    projections: ArrayView3<F>,
    ctf: ArrayView3<Complex<F>>,
) -> Result<Array4<F>>
where
    F: CtfFloat,
    C: Corrector<F> + ?Sized,
{
    let (num_angles, ysize, xsize) = projections.dim();
    let num_defocus = ctf.len_of(Axis(0));
    let mut out = Array4::<F>::zeros((num_angles, num_defocus, ysize, xsize));

    log::info!(
        "correcting {} projection(s) of {}x{} for {} defocus group(s)",
        num_angles,
        xsize,
        ysize,
        num_defocus
    );
    for (i, projection) in projections.axis_iter(Axis(0)).enumerate() {
        let corrected = correct_image(corrector, projection, ctf)?;
        out.slice_mut(s![i, .., .., ..]).assign(&corrected);
        log::trace!("projection {}/{} corrected", i + 1, num_angles);
    }
    Ok(out)
}
