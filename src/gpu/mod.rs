//! Accelerator backend built on wgpu compute shaders.
//!
//! [`GpuContext`] owns the adapter, device and compiled pipelines and is
//! created once when the backend is resolved. Transform engines and scratch
//! buffers are created per correction call and dropped with it.

mod correct;
pub mod fft;

pub use correct::GpuCorrector;
pub use fft::DeviceFft;

use std::borrow::Cow;

use crate::error::{CtfError, Result};

/// Threads per workgroup, must match `@workgroup_size` in `kernels.wgsl`.
pub(crate) const WORKGROUP_SIZE: u32 = 64;

fn adapter_options() -> wgpu::RequestAdapterOptions<'static, 'static> {
    wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }
}

/// Device, queue and the five correction pipelines.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    device_type: wgpu::DeviceType,
    fft_layout: wgpu::BindGroupLayout,
    point_layout: wgpu::BindGroupLayout,
    dft_rows: wgpu::ComputePipeline,
    dft_cols: wgpu::ComputePipeline,
    load_image: wgpu::ComputePipeline,
    phase_flip: wgpu::ComputePipeline,
    extract_real: wgpu::ComputePipeline,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuContext {
    /// Open the adapter at `adapter_index`, or the default high-performance
    /// adapter when `None`.
    pub fn new(adapter_index: Option<usize>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = match adapter_index {
            Some(index) => instance
                .enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .nth(index)
                .ok_or_else(|| {
                    CtfError::BackendUnavailable(format!("no GPU adapter at index {index}"))
                })?,
            None => pollster::block_on(instance.request_adapter(&adapter_options()))
                .ok_or_else(|| {
                    CtfError::BackendUnavailable("no suitable GPU adapter found".to_string())
                })?,
        };
        let info = adapter.get_info();
        let adapter_name = format!("{} ({:?}, {:?})", info.name, info.backend, info.device_type);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("recon-ctf"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| CtfError::Gpu(format!("device request failed: {e}")))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ctf_kernels"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("kernels.wgsl"))),
        });

        let fft_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fft_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, false),
            ],
        });
        let point_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("point_layout"),
            entries: &[
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
            ],
        });

        let pipeline = |layout: &wgpu::BindGroupLayout, entry: &str| {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(entry),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let dft_rows = pipeline(&fft_layout, "dft_rows");
        let dft_cols = pipeline(&fft_layout, "dft_cols");
        let load_image = pipeline(&point_layout, "load_image");
        let phase_flip = pipeline(&point_layout, "phase_flip");
        let extract_real = pipeline(&point_layout, "extract_real");

        log::info!("GPU backend on {}", adapter_name);

        Ok(Self {
            device,
            queue,
            adapter_name,
            device_type: info.device_type,
            fft_layout,
            point_layout,
            dft_rows,
            dft_cols,
            load_image,
            phase_flip,
            extract_real,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// True for CPU-emulated adapters such as llvmpipe or WARP.
    pub fn is_software(&self) -> bool {
        self.device_type == wgpu::DeviceType::Cpu
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Run `f` inside an out-of-memory error scope.
    pub(crate) fn allocate<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(CtfError::Gpu(format!("{what} allocation failed: {e}"))),
            None => Ok(value),
        }
    }

    /// Reject sizes the default limits cannot dispatch or bind.
    pub(crate) fn check_size(&self, len: usize) -> Result<()> {
        let limits = self.device.limits();
        let groups = len.div_ceil(WORKGROUP_SIZE as usize);
        if groups > limits.max_compute_workgroups_per_dimension as usize {
            return Err(CtfError::Gpu(format!(
                "{len} elements need {groups} workgroups, limit is {}",
                limits.max_compute_workgroups_per_dimension
            )));
        }
        let bytes = (len * 2 * std::mem::size_of::<f32>()) as u64;
        if bytes > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(CtfError::Gpu(format!(
                "complex buffer of {bytes} bytes exceeds binding limit {}",
                limits.max_storage_buffer_binding_size
            )));
        }
        Ok(())
    }

    pub(crate) fn fft_bind_group(
        &self,
        params: &wgpu::Buffer,
        src: &wgpu::Buffer,
        dst: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fft_bind_group"),
            layout: &self.fft_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dst.as_entire_binding(),
                },
            ],
        })
    }

    pub(crate) fn point_bind_group(
        &self,
        ctf: &wgpu::Buffer,
        spectrum: &wgpu::Buffer,
        pixels: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("point_bind_group"),
            layout: &self.point_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: ctf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: spectrum.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: pixels.as_entire_binding(),
                },
            ],
        })
    }

    /// Record one dispatch of `pipeline` over `len` elements.
    pub(crate) fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: Kernel,
        bind_group: &wgpu::BindGroup,
        len: usize,
    ) {
        let pipeline = match pipeline {
            Kernel::DftRows => &self.dft_rows,
            Kernel::DftCols => &self.dft_cols,
            Kernel::LoadImage => &self.load_image,
            Kernel::PhaseFlip => &self.phase_flip,
            Kernel::ExtractReal => &self.extract_real,
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(len.div_ceil(WORKGROUP_SIZE as usize) as u32, 1, 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
    DftRows,
    DftCols,
    LoadImage,
    PhaseFlip,
    ExtractReal,
}

/// Check if a GPU adapter is available without building a context.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::default();
    pollster::block_on(instance.request_adapter(&adapter_options())).is_some()
}

/// Adapter description for every adapter wgpu can see, in index order.
pub fn list_adapters() -> Vec<String> {
    let instance = wgpu::Instance::default();
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|a| {
            let info = a.get_info();
            format!("{} ({:?}, {:?})", info.name, info.backend, info.device_type)
        })
        .collect()
}
