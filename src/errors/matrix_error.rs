//! Error types for matrix construction and element access.

use thiserror::Error;

use crate::shape::Shape;

/// Errors raised by [`crate::Matrix`], shapes and element-kind resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("Unsupported element kind: {tag}")]
    UnsupportedElementKind { tag: String },

    #[error("Shape mismatch for {shape}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        shape: Shape,
        expected: usize,
        actual: usize,
    },

    #[error("Index ({x}, {y}, {z}) is out of range for {shape}")]
    IndexOutOfRange {
        x: usize,
        y: usize,
        z: usize,
        shape: Shape,
    },

    #[error("Dimension {dimension} of {shape} is too large")]
    DimensionTooLarge { dimension: &'static str, shape: Shape },
}
