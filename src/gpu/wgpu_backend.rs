//! [`ComputeBackend`] implementation on top of wgpu.

use std::sync::mpsc;

use log::{debug, info, warn};
use pollster::FutureExt;
use wgpu::util::DeviceExt;

use crate::backend::ComputeBackend;
use crate::errors::{BackendError, BackendResult};
use crate::gpu::config::GpuConfig;
use crate::shape::{BufferLayout, DispatchParams, Shape};

/// Uniform buffer size for [`DispatchParams`], rounded up to 16 bytes.
const PARAMS_BUFFER_SIZE: u64 = 32;

/// Rounds a byte length up to the copy alignment, never returning zero.
fn padded_size(bytes: usize) -> u64 {
    (bytes.max(1) as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
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

fn check_workgroup_limits(config: &GpuConfig, limits: &wgpu::Limits) -> BackendResult<()> {
    let [x, y, z] = config.workgroup_size;
    let fits = x <= limits.max_compute_workgroup_size_x
        && y <= limits.max_compute_workgroup_size_y
        && z <= limits.max_compute_workgroup_size_z
        && config.invocations_per_workgroup()
            <= limits.max_compute_invocations_per_workgroup as u64;
    if !fits {
        return Err(BackendError::InvalidConfig {
            message: format!(
                "workgroup size {:?} exceeds device limits ({}x{}x{}, {} invocations)",
                config.workgroup_size,
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z,
                limits.max_compute_invocations_per_workgroup
            ),
        });
    }
    Ok(())
}

/// A wgpu device and queue that kernels are compiled for and dispatched on.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    config: GpuConfig,
}

/// Compiled compute pipeline.
pub struct WgpuKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Device buffers and bind group for one [`BufferLayout`].
pub struct WgpuBuffers {
    params: wgpu::Buffer,
    // A 4-byte placeholder when the layout has no host input.
    input: wgpu::Buffer,
    has_input: bool,
    output: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    output_size: u64,
    workgroups: [u32; 3],
}

impl WgpuBackend {
    /// Requests an adapter and device, blocking until both are ready.
    pub fn new(config: GpuConfig) -> BackendResult<Self> {
        Self::new_async(config).block_on()
    }

    pub async fn new_async(config: GpuConfig) -> BackendResult<Self> {
        config.validate()?;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference.into(),
                force_fallback_adapter: config.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| BackendError::DeviceNotAvailable {
                message: "no compatible adapter found".to_string(),
            })?;

        let adapter_info = adapter.get_info();
        info!("using GPU {} ({:?})", adapter_info.name, adapter_info.backend);

        // Ask for the adapter's full buffer limits rather than the defaults.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::downlevel_defaults()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(config.label.as_str()),
                    required_limits,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceNotAvailable {
                message: e.to_string(),
            })?;

        check_workgroup_limits(&config, &device.limits())?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            config,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn workgroups_for(&self, shape: Shape) -> BackendResult<[u32; 3]> {
        let max = self.device.limits().max_compute_workgroups_per_dimension;
        let dims = [shape.width, shape.height, shape.depth];
        let mut counts = [0u32; 3];
        for (axis, ((count, dim), size)) in counts
            .iter_mut()
            .zip(dims)
            .zip(self.config.workgroup_size)
            .enumerate()
        {
            let needed = (dim as u64).div_ceil(size as u64);
            if needed > max as u64 {
                return Err(BackendError::DispatchTooLarge {
                    axis: ['x', 'y', 'z'][axis],
                    workgroups: needed,
                    max,
                });
            }
            *count = needed as u32;
        }
        Ok(counts)
    }

    fn check_buffer_size(&self, label: &'static str, bytes: u64) -> BackendResult<()> {
        let limits = self.device.limits();
        let max_size = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes > max_size {
            return Err(BackendError::BufferTooLarge {
                label,
                required: bytes,
                max_size,
            });
        }
        Ok(())
    }

    fn storage_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn write_padded(&self, buffer: &wgpu::Buffer, bytes: &[u8]) {
        let aligned = bytes.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0;
        if aligned {
            self.queue.write_buffer(buffer, 0, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(padded_size(bytes.len()) as usize, 0);
            self.queue.write_buffer(buffer, 0, &padded);
        }
    }

    fn read_staging(&self, buffers: &WgpuBuffers, output: &mut [u8]) -> BackendResult<()> {
        let slice = buffers.staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(BackendError::Execution {
                    message: format!("failed to map output buffer: {}", e),
                });
            }
            Err(_) => {
                return Err(BackendError::Execution {
                    message: "output buffer mapping was never completed".to_string(),
                });
            }
        }

        {
            let data = slice.get_mapped_range();
            output.copy_from_slice(&data[..output.len()]);
        }
        buffers.staging.unmap();
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    type Kernel = WgpuKernel;
    type Buffers = WgpuBuffers;

    fn compile(&mut self, source: &str) -> BackendResult<WgpuKernel> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.config.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("gpumat bind group layout"),
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

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("gpumat pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(self.config.label.as_str()),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(self.config.entry_point.as_str()),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = self.device.pop_error_scope().block_on() {
            warn!("kernel rejected by {}: {}", self.adapter_info.name, error);
            return Err(BackendError::ShaderCompilation {
                message: error.to_string(),
            });
        }

        Ok(WgpuKernel {
            pipeline,
            bind_group_layout,
        })
    }

    fn create_buffers(
        &mut self,
        kernel: &WgpuKernel,
        layout: &BufferLayout,
    ) -> BackendResult<WgpuBuffers> {
        let input_size = padded_size(layout.input_bytes());
        let output_size = padded_size(layout.output_bytes());
        if layout.has_input() {
            self.check_buffer_size("input", input_size)?;
        }
        self.check_buffer_size("output", output_size)?;
        let workgroups = self.workgroups_for(layout.output_shape)?;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Params Buffer"),
                contents: &[0u8; PARAMS_BUFFER_SIZE as usize],
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let has_input = layout.has_input();
        let input = if has_input {
            self.storage_buffer(
                "Input Buffer",
                input_size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            )
        } else {
            self.storage_buffer(
                "Input Placeholder",
                wgpu::COPY_BUFFER_ALIGNMENT,
                wgpu::BufferUsages::STORAGE,
            )
        };

        let output = self.storage_buffer(
            "Output Buffer",
            output_size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );

        let staging = self.storage_buffer(
            "Staging Buffer",
            output_size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gpumat bind group"),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.as_entire_binding(),
                },
            ],
        });

        let validation = self.device.pop_error_scope().block_on();
        let out_of_memory = self.device.pop_error_scope().block_on();
        if let Some(error) = validation.or(out_of_memory) {
            return Err(BackendError::BufferAllocation {
                message: error.to_string(),
            });
        }

        debug!(
            "created buffers ({} input bytes, {} output bytes, {:?} workgroups)",
            if has_input { input_size } else { 0 },
            output_size,
            workgroups
        );

        Ok(WgpuBuffers {
            params,
            input,
            has_input,
            output,
            staging,
            bind_group,
            output_size,
            workgroups,
        })
    }

    fn dispatch(
        &mut self,
        kernel: &WgpuKernel,
        buffers: &mut WgpuBuffers,
        params: &DispatchParams,
        input: &[u8],
        output: &mut [u8],
    ) -> BackendResult<()> {
        if output.len() as u64 > buffers.output_size {
            return Err(BackendError::Execution {
                message: format!(
                    "output of {} bytes does not fit the {} byte device buffer",
                    output.len(),
                    buffers.output_size
                ),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.queue.write_buffer(&buffers.params, 0, params.as_bytes());
        if buffers.has_input {
            self.write_padded(&buffers.input, input);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpumat dispatch"),
            });
        encoder.clear_buffer(&buffers.output, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            let [x, y, z] = buffers.workgroups;
            if x > 0 && y > 0 && z > 0 {
                pass.dispatch_workgroups(x, y, z);
            }
        }
        encoder.copy_buffer_to_buffer(&buffers.output, 0, &buffers.staging, 0, buffers.output_size);
        self.queue.submit(Some(encoder.finish()));

        if let Some(error) = self.device.pop_error_scope().block_on() {
            return Err(BackendError::Execution {
                message: error.to_string(),
            });
        }

        self.read_staging(buffers, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_size() {
        assert_eq!(padded_size(0), 4);
        assert_eq!(padded_size(1), 4);
        assert_eq!(padded_size(4), 4);
        assert_eq!(padded_size(5), 8);
        assert_eq!(padded_size(40), 40);
    }

    #[test]
    fn test_workgroup_limits() {
        let limits = wgpu::Limits::downlevel_defaults();
        assert!(check_workgroup_limits(&GpuConfig::default(), &limits).is_ok());

        let too_many = GpuConfig::default().with_workgroup_size(32, 32, 1);
        assert!(matches!(
            check_workgroup_limits(&too_many, &limits),
            Err(BackendError::InvalidConfig { .. })
        ));

        let too_deep = GpuConfig::default().with_workgroup_size(1, 1, 128);
        assert!(check_workgroup_limits(&too_deep, &limits).is_err());
    }

    #[test]
    fn test_params_fit_uniform_buffer() {
        assert!(DispatchParams::SIZE_BYTES as u64 <= PARAMS_BUFFER_SIZE);
        assert_eq!(PARAMS_BUFFER_SIZE % 16, 0);
    }
}
