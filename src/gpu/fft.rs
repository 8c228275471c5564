//! Device-resident 2D DFT.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{GpuContext, Kernel};
use crate::error::{CtfError, Result};

/// Uniform block for the row and column passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DftParams {
    xsize: u32,
    ysize: u32,
    sign: f32,
    scale: f32,
}

/// Allocate a complex (`vec2<f32>`) buffer of `len` elements.
pub(crate) fn complex_buffer(
    ctx: &GpuContext,
    label: &str,
    len: usize,
    usage: wgpu::BufferUsages,
) -> Result<wgpu::Buffer> {
    ctx.allocate(label, |device| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (len * 2 * std::mem::size_of::<f32>()) as u64,
            usage,
            mapped_at_creation: false,
        })
    })
}

/// Forward/inverse 2D DFT over device buffers of `xsize * ysize` complex
/// elements. Each transform is a row pass into an engine-owned scratch
/// buffer followed by a column pass back into the caller's buffer.
pub struct DeviceFft<'a> {
    ctx: &'a GpuContext,
    xsize: usize,
    ysize: usize,
    scratch: wgpu::Buffer,
    forward_params: wgpu::Buffer,
    inverse_params: wgpu::Buffer,
}

impl<'a> DeviceFft<'a> {
    pub fn new(ctx: &'a GpuContext, xsize: usize, ysize: usize) -> Result<Self> {
        if xsize == 0 || ysize == 0 {
            return Err(CtfError::InvalidDimensions {
                xsize,
                ysize,
                num_ctf: 1,
            });
        }
        let len = xsize * ysize;
        ctx.check_size(len)?;
        let (nx, ny) = match (u32::try_from(xsize), u32::try_from(ysize)) {
            (Ok(nx), Ok(ny)) => (nx, ny),
            _ => {
                return Err(CtfError::Gpu(format!(
                    "{xsize}x{ysize} does not fit 32-bit indexing"
                )))
            }
        };

        let scratch = complex_buffer(ctx, "fft_scratch", len, wgpu::BufferUsages::STORAGE)?;
        let params_buffer = |label: &str, params: DftParams| {
            ctx.allocate(label, |device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
        };
        let forward_params = params_buffer(
            "fft_forward_params",
            DftParams {
                xsize: nx,
                ysize: ny,
                sign: -1.0,
                scale: 1.0,
            },
        )?;
        let inverse_params = params_buffer(
            "fft_inverse_params",
            DftParams {
                xsize: nx,
                ysize: ny,
                sign: 1.0,
                scale: 1.0 / len as f32,
            },
        )?;

        Ok(Self {
            ctx,
            xsize,
            ysize,
            scratch,
            forward_params,
            inverse_params,
        })
    }

    pub fn len(&self) -> usize {
        self.xsize * self.ysize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record the unnormalized forward transform of `buffer`, in place.
    pub fn forward(&self, encoder: &mut wgpu::CommandEncoder, buffer: &wgpu::Buffer) {
        self.record(encoder, buffer, &self.forward_params);
    }

    /// Record the inverse transform of `buffer`, in place, scaled by
    /// `1 / (xsize * ysize)`.
    pub fn inverse(&self, encoder: &mut wgpu::CommandEncoder, buffer: &wgpu::Buffer) {
        self.record(encoder, buffer, &self.inverse_params);
    }

    fn record(&self, encoder: &mut wgpu::CommandEncoder, buffer: &wgpu::Buffer, params: &wgpu::Buffer) {
        let rows = self.ctx.fft_bind_group(params, buffer, &self.scratch);
        let cols = self.ctx.fft_bind_group(params, &self.scratch, buffer);
        self.ctx.dispatch(encoder, Kernel::DftRows, &rows, self.len());
        self.ctx.dispatch(encoder, Kernel::DftCols, &cols, self.len());
    }
}
