//! Scalar element kinds a device buffer may hold.

use std::fmt;

use crate::errors::{MatrixError, MatrixResult};

/// The closed set of scalar kinds a [`crate::Matrix`] can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    U8,
    U32,
    I32,
    F32,
}

impl ElementKind {
    /// Size of one element in bytes.
    pub const fn byte_width(self) -> usize {
        match self {
            ElementKind::U8 => 1,
            ElementKind::U32 | ElementKind::I32 | ElementKind::F32 => 4,
        }
    }

    /// Resolves a textual kind tag such as `"f32"` or `"uint8"`.
    pub fn from_tag(tag: &str) -> MatrixResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(ElementKind::U8),
            "u32" | "uint32" => Ok(ElementKind::U32),
            "i32" | "int32" => Ok(ElementKind::I32),
            "f32" | "float32" => Ok(ElementKind::F32),
            _ => Err(MatrixError::UnsupportedElementKind {
                tag: tag.to_string(),
            }),
        }
    }

    /// Number of bytes needed to hold `len` elements of this kind.
    pub const fn bytes_for(self, len: usize) -> usize {
        len * self.byte_width()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ElementKind::U8 => "u8",
            ElementKind::U32 => "u32",
            ElementKind::I32 => "i32",
            ElementKind::F32 => "f32",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a kind tag straight to its byte width.
pub fn element_width(tag: &str) -> MatrixResult<usize> {
    ElementKind::from_tag(tag).map(ElementKind::byte_width)
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
}

/// A Rust scalar type that can back a [`crate::Matrix`].
///
/// Implemented for `u8`, `u32`, `i32` and `f32` only.
pub trait Element:
    sealed::Sealed + bytemuck::Pod + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const KIND: ElementKind;
}

impl Element for u8 {
    const KIND: ElementKind = ElementKind::U8;
}

impl Element for u32 {
    const KIND: ElementKind = ElementKind::U32;
}

impl Element for i32 {
    const KIND: ElementKind = ElementKind::I32;
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_widths() {
        assert_eq!(ElementKind::U8.byte_width(), 1);
        assert_eq!(ElementKind::U32.byte_width(), 4);
        assert_eq!(ElementKind::I32.byte_width(), 4);
        assert_eq!(ElementKind::F32.byte_width(), 4);
    }

    #[test]
    fn test_kind_matches_rust_size() {
        assert_eq!(u8::KIND.byte_width(), std::mem::size_of::<u8>());
        assert_eq!(u32::KIND.byte_width(), std::mem::size_of::<u32>());
        assert_eq!(i32::KIND.byte_width(), std::mem::size_of::<i32>());
        assert_eq!(f32::KIND.byte_width(), std::mem::size_of::<f32>());
    }

    #[test]
    fn test_from_tag_aliases() {
        assert_eq!(ElementKind::from_tag("uint8").unwrap(), ElementKind::U8);
        assert_eq!(ElementKind::from_tag("U32").unwrap(), ElementKind::U32);
        assert_eq!(ElementKind::from_tag(" int32 ").unwrap(), ElementKind::I32);
        assert_eq!(ElementKind::from_tag("float32").unwrap(), ElementKind::F32);
    }

    #[test]
    fn test_unsupported_tag_is_rejected() {
        for tag in ["f64", "u16", "int64", ""] {
            assert!(matches!(
                element_width(tag),
                Err(MatrixError::UnsupportedElementKind { .. })
            ));
        }
    }

    #[test]
    fn test_bytes_for() {
        assert_eq!(ElementKind::U8.bytes_for(10), 10);
        assert_eq!(ElementKind::F32.bytes_for(10), 40);
    }
}
