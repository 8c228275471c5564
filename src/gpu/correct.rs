use rustfft::num_complex::Complex;

use super::fft::{complex_buffer, DeviceFft};
use super::{GpuContext, Kernel};
use crate::config::Config;
use crate::correct::{check_geometry, Corrector};
use crate::error::{CtfError, Result};

/// Correction on an accelerator through wgpu.
///
/// The image is uploaded once and forward transformed on the device. Each
/// defocus group uploads its CTF, runs flip and inverse transform against a
/// device-side copy of the template, and downloads its real part.
pub struct GpuCorrector {
    ctx: GpuContext,
}

impl GpuCorrector {
    pub fn new(adapter_index: Option<usize>) -> Result<Self> {
        Ok(Self {
            ctx: GpuContext::new(adapter_index)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.adapter_index())
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    fn real_buffer(&self, label: &str, len: usize, usage: wgpu::BufferUsages) -> Result<wgpu::Buffer> {
        self.ctx.allocate(label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (len * std::mem::size_of::<f32>()) as u64,
                usage,
                mapped_at_creation: false,
            })
        })
    }

    /// Map `staging` and copy it into `out`.
    fn download(&self, staging: &wgpu::Buffer, out: &mut [f32]) -> Result<()> {
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx.device().poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| CtfError::Gpu(format!("download channel error: {e}")))?
            .map_err(|e| CtfError::Gpu(format!("buffer map failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            out.copy_from_slice(bytemuck::cast_slice(&data));
        }
        staging.unmap();
        Ok(())
    }
}

impl Corrector<f32> for GpuCorrector {
    fn correct(
        &self,
        image: &[f32],
        ctf: &[Complex<f32>],
        rec: &mut [f32],
        xsize: usize,
        ysize: usize,
        num_ctf: usize,
    ) -> Result<()> {
        check_geometry(image.len(), ctf.len(), rec.len(), xsize, ysize, num_ctf)?;

        let fft = DeviceFft::new(&self.ctx, xsize, ysize)?;
        let size = fft.len();
        log::debug!(
            "gpu correction: {}x{} image, {} defocus group(s)",
            xsize,
            ysize,
            num_ctf
        );

        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let template = complex_buffer(&self.ctx, "template", size, usage)?;
        let work = complex_buffer(&self.ctx, "work", size, usage)?;
        let ctf_buffer = complex_buffer(&self.ctx, "ctf", size, usage)?;
        let pixels = self.real_buffer("pixels", size, usage)?;
        let staging = self.real_buffer(
            "staging",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )?;
        let template_group = self.ctx.point_bind_group(&ctf_buffer, &template, &pixels);
        let work_group = self.ctx.point_bind_group(&ctf_buffer, &work, &pixels);
        let bytes = (size * 2 * std::mem::size_of::<f32>()) as u64;

        // Forward transform once; the template stays resident until return.
        let queue = self.ctx.queue();
        queue.write_buffer(&pixels, 0, bytemuck::cast_slice(image));
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ctf_forward"),
            });
        self.ctx
            .dispatch(&mut encoder, Kernel::LoadImage, &template_group, size);
        fft.forward(&mut encoder, &template);
        queue.submit(Some(encoder.finish()));

        let mut packed = vec![[0.0f32; 2]; size];
        for (r, c) in rec.chunks_exact_mut(size).zip(ctf.chunks_exact(size)) {
            for (p, h) in packed.iter_mut().zip(c) {
                *p = [h.re, h.im];
            }
            queue.write_buffer(&ctf_buffer, 0, bytemuck::cast_slice(&packed));

            let mut encoder = self
                .ctx
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("ctf_group"),
                });
            encoder.copy_buffer_to_buffer(&template, 0, &work, 0, bytes);
            self.ctx
                .dispatch(&mut encoder, Kernel::PhaseFlip, &work_group, size);
            fft.inverse(&mut encoder, &work);
            self.ctx
                .dispatch(&mut encoder, Kernel::ExtractReal, &work_group, size);
            encoder.copy_buffer_to_buffer(
                &pixels,
                0,
                &staging,
                0,
                (size * std::mem::size_of::<f32>()) as u64,
            );
            queue.submit(Some(encoder.finish()));

            self.download(&staging, r)?;
        }

        Ok(())
    }
}
