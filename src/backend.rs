//! The seam between the compute session and a native compute backend.

use crate::errors::BackendResult;
use crate::shape::{BufferLayout, DispatchParams};

/// A native compute subsystem that compiles kernels, allocates device memory
/// and executes kernels.
///
/// The session owns the backend and serializes every call, so implementations
/// can mutate their own state freely.
pub trait ComputeBackend {
    /// Compiled kernel handle.
    type Kernel;
    /// Device-side buffer set created for one [`BufferLayout`].
    type Buffers;

    /// Compiles kernel source text. Validation is entirely the backend's.
    fn compile(&mut self, source: &str) -> BackendResult<Self::Kernel>;

    /// Allocates device buffers of `layout.input_bytes()` and
    /// `layout.output_bytes()` bytes. No input buffer is needed when
    /// `layout.input_len` is zero.
    fn create_buffers(
        &mut self,
        kernel: &Self::Kernel,
        layout: &BufferLayout,
    ) -> BackendResult<Self::Buffers>;

    /// Uploads `input`, runs the kernel over the output shape in `params`,
    /// blocks until it completes and writes the output buffer into `output`.
    ///
    /// `input` is empty when the layout has no input. `output` is exactly
    /// `layout.output_bytes()` long; it is only handed back to the caller on
    /// success, so partial writes on failure are never observed.
    fn dispatch(
        &mut self,
        kernel: &Self::Kernel,
        buffers: &mut Self::Buffers,
        params: &DispatchParams,
        input: &[u8],
        output: &mut [u8],
    ) -> BackendResult<()>;
}
