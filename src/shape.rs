//! Matrix shapes, the dispatch parameter block and device buffer layouts.

use std::fmt;

use crate::element::{Element, ElementKind};
use crate::errors::{MatrixError, MatrixResult};
use crate::matrix::Matrix;

/// Width, height and depth of a matrix or device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Shape {
    pub const fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Number of elements, `W*H*D`, saturating at `usize::MAX`.
    ///
    /// Constructors that take ownership of data or size device buffers use
    /// [`Shape::checked_size`] instead.
    pub const fn size(&self) -> usize {
        self.width
            .saturating_mul(self.height)
            .saturating_mul(self.depth)
    }

    /// Number of elements, failing when `W*H*D` overflows `usize`.
    pub fn checked_size(&self) -> MatrixResult<usize> {
        self.width
            .checked_mul(self.height)
            .and_then(|plane| plane.checked_mul(self.depth))
            .ok_or(MatrixError::DimensionTooLarge {
                dimension: "size",
                shape: *self,
            })
    }

    pub const fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Flat offset of `(x, y, z)`: each z-plane is a contiguous `H*W` block and
    /// each row is `W` contiguous elements.
    pub const fn index(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.width * self.height + y * self.width + x
    }

    pub const fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.width && y < self.height && z < self.depth
    }

    fn to_i32_triple(self) -> MatrixResult<[i32; 3]> {
        let convert = |value: usize, dimension: &'static str| {
            i32::try_from(value).map_err(|_| MatrixError::DimensionTooLarge {
                dimension,
                shape: self,
            })
        };
        Ok([
            convert(self.width, "width")?,
            convert(self.height, "height")?,
            convert(self.depth, "depth")?,
        ])
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

/// Parameter block handed to every kernel invocation.
///
/// Six consecutive 32-bit integers in the order
/// `(w_in, h_in, d_in, w_out, h_out, d_out)`; the WGSL `Params` struct
/// declared by [`crate::gpu::shaders::binding_prelude`] has the same layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DispatchParams {
    pub w_in: i32,
    pub h_in: i32,
    pub d_in: i32,
    pub w_out: i32,
    pub h_out: i32,
    pub d_out: i32,
}

impl DispatchParams {
    pub const SIZE_BYTES: usize = 24;

    pub fn from_shapes(input: Shape, output: Shape) -> MatrixResult<Self> {
        let [w_in, h_in, d_in] = input.to_i32_triple()?;
        let [w_out, h_out, d_out] = output.to_i32_triple()?;
        Ok(Self {
            w_in,
            h_in,
            d_in,
            w_out,
            h_out,
            d_out,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Sizes and element kinds of the device buffers a kernel runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferLayout {
    pub input_shape: Shape,
    pub input_kind: ElementKind,
    /// Element count of the input buffer; zero means no host input.
    pub input_len: usize,
    pub output_shape: Shape,
    pub output_kind: ElementKind,
    pub output_len: usize,
}

impl BufferLayout {
    /// Builds a layout after checking the lengths against the shapes.
    ///
    /// `input_len` must be either zero or `input_shape.size()`, and
    /// `output_len` must equal `output_shape.size()`.
    pub fn new(
        input_shape: Shape,
        input_kind: ElementKind,
        input_len: usize,
        output_shape: Shape,
        output_kind: ElementKind,
        output_len: usize,
    ) -> MatrixResult<Self> {
        let input_size = input_shape.checked_size()?;
        let output_size = output_shape.checked_size()?;
        if input_len != 0 && input_len != input_size {
            return Err(MatrixError::ShapeMismatch {
                shape: input_shape,
                expected: input_size,
                actual: input_len,
            });
        }
        if output_len != output_size {
            return Err(MatrixError::ShapeMismatch {
                shape: output_shape,
                expected: output_size,
                actual: output_len,
            });
        }
        Ok(Self {
            input_shape,
            input_kind,
            input_len,
            output_shape,
            output_kind,
            output_len,
        })
    }

    /// Derives the layout for a pair of matrices.
    ///
    /// An input whose backing was never allocated carries no host data, which
    /// is how kernels that synthesize their output are driven.
    pub fn for_matrices<TIn: Element, TOut: Element>(
        input: &Matrix<TIn>,
        output: &Matrix<TOut>,
    ) -> MatrixResult<Self> {
        let input_size = input.shape().checked_size()?;
        let input_len = if input.is_allocated() { input_size } else { 0 };
        Ok(Self {
            input_shape: input.shape(),
            input_kind: TIn::KIND,
            input_len,
            output_shape: output.shape(),
            output_kind: TOut::KIND,
            output_len: output.shape().checked_size()?,
        })
    }

    pub fn has_input(&self) -> bool {
        self.input_len > 0
    }

    pub fn input_bytes(&self) -> usize {
        self.input_kind.bytes_for(self.input_len)
    }

    pub fn output_bytes(&self) -> usize {
        self.output_kind.bytes_for(self.output_len)
    }
}

impl fmt::Display for BufferLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in {} {} ({} elems) -> out {} {} ({} elems)",
            self.input_shape,
            self.input_kind,
            self.input_len,
            self.output_shape,
            self.output_kind,
            self.output_len
        )
    }
}
