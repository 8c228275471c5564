//! CTF phase-flip correction for tomographic reconstruction.
//!
//! Each projection is forward transformed once and then corrected against one
//! transfer function per defocus group, on the host (rustfft + rayon) or on an
//! accelerator (wgpu, `gpu` feature). The backend is picked once from a
//! [`Config`] and handed to the reconstructor as an opaque [`Corrector`].

pub mod backend;
pub mod config;
pub mod correct;
pub mod ctf;
pub mod device;
pub mod error;
pub mod fft;
pub mod float;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod projections;

pub use backend::{make_corrector, Backend};
pub use config::Config;
pub use correct::{correct_image, phase_flip, Corrector, HostCorrector};
pub use ctf::{compute_ctf, ctf_stack, defocus_range, defocus_steps, CtfParams};
pub use device::Device;
pub use error::{CtfError, Result};
pub use fft::Fft2d;
pub use float::CtfFloat;
pub use projections::{correct_projections, rotation_centres, sinogram_order};
pub use rustfft::num_complex::Complex;
