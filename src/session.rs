//! Compile-once compute session and the dispatch/transfer protocol.

use std::fmt;

use log::{debug, info};
use parking_lot::Mutex;

use crate::backend::ComputeBackend;
use crate::element::Element;
use crate::errors::{SessionError, SessionResult};
use crate::matrix::Matrix;
use crate::shape::{BufferLayout, DispatchParams};

/// Where a session is in its `compile → create_buffers → run` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Uncompiled,
    Compiled,
    BuffersReady,
    Dispatched,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStage::Uncompiled => "uncompiled",
            SessionStage::Compiled => "compiled",
            SessionStage::BuffersReady => "buffers ready",
            SessionStage::Dispatched => "dispatched",
        };
        f.write_str(name)
    }
}

struct DeviceBuffers<H> {
    layout: BufferLayout,
    handle: H,
}

struct SessionInner<B: ComputeBackend> {
    backend: B,
    kernel: Option<B::Kernel>,
    buffers: Option<DeviceBuffers<B::Buffers>>,
    dispatches: u64,
}

/// Holds one compiled kernel and the device buffers it runs against.
///
/// The kernel is compiled at most once per session: later calls to
/// [`ComputeSession::compile`] are no-ops whatever source they pass, so
/// buffers created against the first compilation stay valid. All operations
/// take the session lock, so concurrent first calls compile once and create
/// buffers once.
///
/// ```ignore
/// let session = ComputeSession::with_gpu(GpuConfig::default())?;
/// session.compile(&source)?;
/// let mut output = Matrix::<f32>::new(1, 10, 1);
/// session.execute(&input, &mut output)?;
/// ```
pub struct ComputeSession<B: ComputeBackend> {
    inner: Mutex<SessionInner<B>>,
}

impl<B: ComputeBackend> ComputeSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                backend,
                kernel: None,
                buffers: None,
                dispatches: 0,
            }),
        }
    }

    /// Compiles `source` if no kernel has been compiled yet.
    ///
    /// On failure the session stays uncompiled and can be retried.
    pub fn compile(&self, source: &str) -> SessionResult<()> {
        self.inner.lock().compile(source)
    }

    /// Creates device buffers for `layout`.
    ///
    /// A no-op when buffers for the same layout already exist. A different
    /// layout replaces the buffer set; if that fails the previous set is kept.
    pub fn create_buffers(&self, layout: BufferLayout) -> SessionResult<()> {
        self.inner.lock().create_buffers(layout)
    }

    /// Dispatches the kernel and moves the result into `output`.
    ///
    /// Blocks until the device finishes. On failure `output` keeps its
    /// previous contents.
    pub fn run<TIn: Element, TOut: Element>(
        &self,
        input: &Matrix<TIn>,
        output: &mut Matrix<TOut>,
    ) -> SessionResult<()> {
        self.inner.lock().run(input, output)
    }

    /// Creates buffers for the shapes of `input` and `output`, then runs.
    ///
    /// An input whose backing was never allocated is dispatched without host
    /// data. Buffers are reused when the layout is unchanged.
    pub fn execute<TIn: Element, TOut: Element>(
        &self,
        input: &Matrix<TIn>,
        output: &mut Matrix<TOut>,
    ) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        inner.create_buffers(BufferLayout::for_matrices(input, output)?)?;
        inner.run(input, output)
    }

    /// Drops the device buffers, returning the session to the compiled stage.
    pub fn release_buffers(&self) {
        let mut inner = self.inner.lock();
        if inner.buffers.take().is_some() {
            debug!("released device buffers");
        }
        inner.dispatches = 0;
    }

    pub fn stage(&self) -> SessionStage {
        let inner = self.inner.lock();
        match (&inner.kernel, &inner.buffers) {
            (None, _) => SessionStage::Uncompiled,
            (Some(_), None) => SessionStage::Compiled,
            (Some(_), Some(_)) if inner.dispatches == 0 => SessionStage::BuffersReady,
            (Some(_), Some(_)) => SessionStage::Dispatched,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.inner.lock().kernel.is_some()
    }

    /// Layout of the current device buffers, if any.
    pub fn layout(&self) -> Option<BufferLayout> {
        self.inner.lock().buffers.as_ref().map(|buffers| buffers.layout)
    }

    /// Successful dispatches against the current buffer set.
    pub fn dispatch_count(&self) -> u64 {
        self.inner.lock().dispatches
    }

    pub fn into_backend(self) -> B {
        self.inner.into_inner().backend
    }
}

impl<B: ComputeBackend> SessionInner<B> {
    fn compile(&mut self, source: &str) -> SessionResult<()> {
        if self.kernel.is_some() {
            debug!(
                "kernel already compiled, ignoring {} bytes of source",
                source.len()
            );
            return Ok(());
        }

        info!("compiling kernel ({} bytes of source)", source.len());
        let kernel = self.backend.compile(source).map_err(SessionError::Compile)?;
        self.kernel = Some(kernel);
        Ok(())
    }

    fn create_buffers(&mut self, layout: BufferLayout) -> SessionResult<()> {
        let kernel = self.kernel.as_ref().ok_or(SessionError::NotReady {
            operation: "create_buffers",
            reason: "no kernel has been compiled",
        })?;

        if let Some(existing) = &self.buffers {
            if existing.layout == layout {
                debug!("device buffers already match {}", layout);
                return Ok(());
            }
            debug!("replacing device buffers {} with {}", existing.layout, layout);
        }

        debug!(
            "creating device buffers: {} input bytes, {} output bytes",
            layout.input_bytes(),
            layout.output_bytes()
        );
        let handle = self
            .backend
            .create_buffers(kernel, &layout)
            .map_err(SessionError::BufferCreation)?;
        self.buffers = Some(DeviceBuffers { layout, handle });
        self.dispatches = 0;
        Ok(())
    }

    fn run<TIn: Element, TOut: Element>(
        &mut self,
        input: &Matrix<TIn>,
        output: &mut Matrix<TOut>,
    ) -> SessionResult<()> {
        let (Some(kernel), Some(buffers)) = (self.kernel.as_ref(), self.buffers.as_mut()) else {
            return Err(SessionError::NotReady {
                operation: "run",
                reason: "device buffers have not been created",
            });
        };

        let expected = buffers.layout;
        // Host data handed to a layout without an input buffer is a mismatch.
        let input_len = if expected.has_input() || input.is_allocated() {
            input.shape().checked_size()?
        } else {
            0
        };
        let actual = BufferLayout {
            input_shape: input.shape(),
            input_kind: TIn::KIND,
            input_len,
            output_shape: output.shape(),
            output_kind: TOut::KIND,
            output_len: output.size(),
        };
        if actual != expected {
            return Err(SessionError::LayoutMismatch {
                expected: Box::new(expected),
                actual: Box::new(actual),
            });
        }

        let params = DispatchParams::from_shapes(input.shape(), output.shape())?;
        let input_bytes: &[u8] = if expected.has_input() {
            input.as_bytes()
        } else {
            &[]
        };

        let mut result = vec![TOut::default(); output.size()];
        self.backend
            .dispatch(
                kernel,
                &mut buffers.handle,
                &params,
                input_bytes,
                bytemuck::cast_slice_mut(&mut result),
            )
            .map_err(SessionError::Execution)?;

        output.replace_backing(result)?;
        self.dispatches += 1;
        debug!("dispatch {} complete over {}", self.dispatches, expected.output_shape);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use crate::errors::{BackendError, BackendResult};
    use crate::shape::Shape;

    /// Backend that copies input bytes to output and records calls.
    #[derive(Default)]
    struct EchoBackend {
        compiles: usize,
        buffer_creations: usize,
        last_params: Option<DispatchParams>,
    }

    impl ComputeBackend for EchoBackend {
        type Kernel = String;
        type Buffers = usize;

        fn compile(&mut self, source: &str) -> BackendResult<String> {
            self.compiles += 1;
            if source.is_empty() {
                return Err(BackendError::ShaderCompilation {
                    message: "empty source".to_string(),
                });
            }
            Ok(source.to_string())
        }

        fn create_buffers(&mut self, _kernel: &String, layout: &BufferLayout) -> BackendResult<usize> {
            self.buffer_creations += 1;
            Ok(layout.output_bytes())
        }

        fn dispatch(
            &mut self,
            _kernel: &String,
            buffers: &mut usize,
            params: &DispatchParams,
            input: &[u8],
            output: &mut [u8],
        ) -> BackendResult<()> {
            assert_eq!(*buffers, output.len());
            self.last_params = Some(*params);
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            Ok(())
        }
    }

    #[test]
    fn test_stage_progression() {
        let session = ComputeSession::new(EchoBackend::default());
        assert_eq!(session.stage(), SessionStage::Uncompiled);

        session.compile("echo").unwrap();
        assert_eq!(session.stage(), SessionStage::Compiled);

        let input = Matrix::from_vec(2, 1, 1, vec![3u32, 4]).unwrap();
        let mut output = Matrix::<u32>::new(2, 1, 1);
        session
            .create_buffers(BufferLayout::for_matrices(&input, &output).unwrap())
            .unwrap();
        assert_eq!(session.stage(), SessionStage::BuffersReady);

        session.run(&input, &mut output).unwrap();
        assert_eq!(session.stage(), SessionStage::Dispatched);
        assert_eq!(output.data(), &[3, 4]);

        session.release_buffers();
        assert_eq!(session.stage(), SessionStage::Compiled);
    }

    #[test]
    fn test_second_compile_is_noop() {
        let session = ComputeSession::new(EchoBackend::default());
        session.compile("first").unwrap();
        session.compile("").unwrap();
        session.compile("second").unwrap();
        assert_eq!(session.into_backend().compiles, 1);
    }

    #[test]
    fn test_params_follow_matrix_shapes() {
        let session = ComputeSession::new(EchoBackend::default());
        session.compile("echo").unwrap();
        let input = Matrix::<f32>::zeroed(2, 5, 1);
        let mut output = Matrix::<f32>::new(1, 5, 1);
        session.execute(&input, &mut output).unwrap();

        let backend = session.into_backend();
        assert_eq!(
            backend.last_params,
            Some(DispatchParams {
                w_in: 2,
                h_in: 5,
                d_in: 1,
                w_out: 1,
                h_out: 5,
                d_out: 1,
            })
        );
    }

    #[test]
    fn test_same_layout_creates_buffers_once() {
        let session = ComputeSession::new(EchoBackend::default());
        session.compile("echo").unwrap();
        let layout = BufferLayout::new(
            Shape::new(4, 1, 1),
            ElementKind::U8,
            4,
            Shape::new(4, 1, 1),
            ElementKind::U8,
            4,
        )
        .unwrap();
        session.create_buffers(layout).unwrap();
        session.create_buffers(layout).unwrap();
        assert_eq!(session.layout(), Some(layout));
        assert_eq!(session.into_backend().buffer_creations, 1);
    }
}
