//! Error types reported by compute backends.

use thiserror::Error;

/// Failures surfaced by a [`crate::backend::ComputeBackend`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("GPU device not available: {message}")]
    DeviceNotAvailable { message: String },

    #[error("Shader compilation failed: {message}")]
    ShaderCompilation { message: String },

    #[error("Buffer allocation failed: {message}")]
    BufferAllocation { message: String },

    #[error("Buffer {label} needs {required} bytes, device limit is {max_size}")]
    BufferTooLarge {
        label: &'static str,
        required: u64,
        max_size: u64,
    },

    #[error("Dispatch of {workgroups} workgroups along {axis} exceeds device limit {max}")]
    DispatchTooLarge {
        axis: char,
        workgroups: u64,
        max: u32,
    },

    #[error("Kernel execution failed: {message}")]
    Execution { message: String },

    #[error("Invalid backend configuration: {message}")]
    InvalidConfig { message: String },
}
