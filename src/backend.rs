//! Backend resolution.

use rustfft::num_complex::Complex;

use crate::config::Config;
use crate::correct::{Corrector, HostCorrector};
use crate::device::Device;
use crate::error::Result;

#[cfg(feature = "gpu")]
use crate::gpu::GpuCorrector;

/// The correction driver a request runs on, chosen once from its [`Config`].
pub enum Backend {
    Host(HostCorrector<f32>),
    #[cfg(feature = "gpu")]
    Gpu(GpuCorrector),
}

impl Backend {
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.device {
            Device::Host => {
                log::info!("using host backend");
                Ok(Backend::Host(HostCorrector::new()))
            }
            #[cfg(feature = "gpu")]
            Device::Gpu => Ok(Backend::Gpu(GpuCorrector::from_config(config)?)),
            #[cfg(not(feature = "gpu"))]
            Device::Gpu => Err(crate::error::CtfError::BackendUnavailable(
                "built without the `gpu` feature".to_string(),
            )),
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Backend::Host(_) => Device::Host,
            #[cfg(feature = "gpu")]
            Backend::Gpu(_) => Device::Gpu,
        }
    }
}

impl Corrector<f32> for Backend {
    fn correct(
        &self,
        image: &[f32],
        ctf: &[Complex<f32>],
        rec: &mut [f32],
        xsize: usize,
        ysize: usize,
        num_ctf: usize,
    ) -> Result<()> {
        match self {
            Backend::Host(c) => c.correct(image, ctf, rec, xsize, ysize, num_ctf),
            #[cfg(feature = "gpu")]
            Backend::Gpu(c) => c.correct(image, ctf, rec, xsize, ysize, num_ctf),
        }
    }
}

/// Resolve the backend named by `config`.
pub fn make_corrector(config: &Config) -> Result<Backend> {
    Backend::from_config(config)
}
