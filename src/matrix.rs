//! Flat-buffer-backed 3-D matrix.
//!
//! Elements are stored like a display buffer: a whole `y` row is contiguous
//! and indexed with `x`, rows stack into a `z` plane, and planes stack into
//! the volume. The same layout is used on the device side, so a kernel can
//! address the buffers with the formula from [`Shape::index`].

use std::sync::OnceLock;

use crate::element::{Element, ElementKind};
use crate::errors::{MatrixError, MatrixResult};
use crate::shape::Shape;

/// An N-dimensional (width × height × depth) matrix of one element kind.
///
/// Backing storage is either allocated at construction or on first access.
/// Lazy allocation happens exactly once, even when several threads touch the
/// matrix through a shared reference at the same time.
#[derive(Debug, Clone)]
pub struct Matrix<T: Element> {
    shape: Shape,
    data: OnceLock<Vec<T>>,
}

impl<T: Element> Matrix<T> {
    /// Creates a matrix whose backing is allocated on first access.
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            shape: Shape::new(width, height, depth),
            data: OnceLock::new(),
        }
    }

    /// Creates a matrix with zero-filled backing allocated up front.
    pub fn zeroed(width: usize, height: usize, depth: usize) -> Self {
        let shape = Shape::new(width, height, depth);
        Self {
            shape,
            data: OnceLock::from(vec![T::default(); shape.size()]),
        }
    }

    /// Takes ownership of `data`, which must hold exactly `W*H*D` elements.
    pub fn from_vec(width: usize, height: usize, depth: usize, data: Vec<T>) -> MatrixResult<Self> {
        let shape = Shape::new(width, height, depth);
        Self::check_len(shape, data.len())?;
        Ok(Self {
            shape,
            data: OnceLock::from(data),
        })
    }

    /// Creates a matrix by evaluating `f(x, y, z)` for every cell.
    pub fn from_fn<F>(width: usize, height: usize, depth: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> T,
    {
        let shape = Shape::new(width, height, depth);
        let mut data = Vec::with_capacity(shape.size());
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    data.push(f(x, y, z));
                }
            }
        }
        Self {
            shape,
            data: OnceLock::from(data),
        }
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn depth(&self) -> usize {
        self.shape.depth
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of elements, `W*H*D`.
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    pub fn element_kind(&self) -> ElementKind {
        T::KIND
    }

    /// Whether backing storage exists yet.
    pub fn is_allocated(&self) -> bool {
        self.data.get().is_some()
    }

    /// Flat offset of `(x, y, z)` without bounds checking.
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        self.shape.index(x, y, z)
    }

    /// Flat offset of `(x, y, z)`, failing when a coordinate is outside its dimension.
    pub fn checked_index(&self, x: usize, y: usize, z: usize) -> MatrixResult<usize> {
        if !self.shape.contains(x, y, z) {
            return Err(MatrixError::IndexOutOfRange {
                x,
                y,
                z,
                shape: self.shape,
            });
        }
        Ok(self.index(x, y, z))
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> MatrixResult<T> {
        let offset = self.checked_index(x, y, z)?;
        Ok(self.data()[offset])
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: T) -> MatrixResult<()> {
        let offset = self.checked_index(x, y, z)?;
        self.data_mut()[offset] = value;
        Ok(())
    }

    /// The flat element slice, allocating the backing if needed.
    pub fn data(&self) -> &[T] {
        self.data.get_or_init(|| vec![T::default(); self.shape.size()])
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        if self.data.get().is_none() {
            self.data = OnceLock::from(vec![T::default(); self.shape.size()]);
        }
        self.data
            .get_mut()
            .map(Vec::as_mut_slice)
            .unwrap_or_default()
    }

    /// The backing viewed as raw bytes, in native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.data())
    }

    pub fn into_vec(self) -> Vec<T> {
        let size = self.shape.size();
        self.data
            .into_inner()
            .unwrap_or_else(|| vec![T::default(); size])
    }

    /// Moves `data` in as the new backing, dropping the old one.
    pub(crate) fn replace_backing(&mut self, data: Vec<T>) -> MatrixResult<()> {
        Self::check_len(self.shape, data.len())?;
        self.data = OnceLock::from(data);
        Ok(())
    }

    fn check_len(shape: Shape, actual: usize) -> MatrixResult<()> {
        let expected = shape.checked_size()?;
        if actual != expected {
            return Err(MatrixError::ShapeMismatch {
                shape,
                expected,
                actual,
            });
        }
        Ok(())
    }
}
