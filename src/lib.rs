//! Shape-tagged matrices and a compile-once dispatch protocol for GPU
//! compute kernels.
//!
//! A [`Matrix`] is a flat buffer with a width × height × depth shape. A
//! [`ComputeSession`] compiles one kernel, creates device buffers sized from
//! the matrix shapes and element widths, dispatches the kernel over the
//! output shape and moves the result back into the output matrix.

pub mod backend;
pub mod element;
pub mod errors;
pub mod gpu;
pub mod matrix;
pub mod session;
pub mod shape;

pub use backend::ComputeBackend;
pub use element::{Element, ElementKind, element_width};
pub use errors::{BackendError, MatrixError, SessionError};
pub use matrix::Matrix;
pub use session::{ComputeSession, SessionStage};
pub use shape::{BufferLayout, DispatchParams, Shape};
