//! wgpu compute backend.
//!
//! Kernels are WGSL compute shaders compiled through wgpu. Each kernel sees
//! the dispatch parameters, the input buffer and the output buffer in bind
//! group 0; [`shaders::binding_prelude`] generates the matching declarations.
//!
//! # Usage
//!
//! ```ignore
//! use gpumat::gpu::{GpuConfig, shaders::with_prelude};
//! use gpumat::{ComputeSession, ElementKind, Matrix};
//!
//! let config = GpuConfig::default();
//! let source = with_prelude(ElementKind::F32, ElementKind::F32, config.workgroup_size, KERNEL);
//! let session = ComputeSession::with_gpu(config)?;
//! session.compile(&source)?;
//! session.execute(&input, &mut output)?;
//! ```
//!
//! Workgroups are dispatched over the output shape, so kernels must skip
//! invocations outside it (`output_contains`).

pub mod config;
pub mod shaders;
pub mod wgpu_backend;

pub use config::{GpuConfig, PowerPreference};
pub use wgpu_backend::{WgpuBackend, WgpuBuffers, WgpuKernel};

use crate::errors::BackendResult;
use crate::session::ComputeSession;

impl ComputeSession<WgpuBackend> {
    /// Opens a GPU device with `config` and wraps it in a new session.
    pub fn with_gpu(config: GpuConfig) -> BackendResult<Self> {
        Ok(Self::new(WgpuBackend::new(config)?))
    }
}
