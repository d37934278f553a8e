//! Error types for the matrix dispatch library.
//!
//! Each concern gets its own error enum instead of a generic wrapper like
//! `anyhow` or `Box<dyn Error>`, so callers can match on the exact failure.

mod backend_error;
mod matrix_error;
mod session_error;

pub use backend_error::BackendError;
pub use matrix_error::MatrixError;
pub use session_error::SessionError;

/// Result type alias for matrix and shape operations.
pub type MatrixResult<T> = std::result::Result<T, MatrixError>;

/// Result type alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result type alias for compute session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
