//! Error types for the compute session state machine.

use thiserror::Error;

use super::{BackendError, MatrixError};
use crate::shape::BufferLayout;

/// Errors returned by [`crate::ComputeSession`] operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Kernel compilation failed")]
    Compile(#[source] BackendError),

    #[error("Device buffer creation failed")]
    BufferCreation(#[source] BackendError),

    #[error("Session is not ready for {operation}: {reason}")]
    NotReady {
        operation: &'static str,
        reason: &'static str,
    },

    #[error("Kernel execution failed")]
    Execution(#[source] BackendError),

    #[error("Matrices do not match the device buffers: expected {expected}, got {actual}")]
    LayoutMismatch {
        expected: Box<BufferLayout>,
        actual: Box<BufferLayout>,
    },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}
