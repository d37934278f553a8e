//! Sums two matrix columns on the GPU.
//!
//! Run with: cargo run --release --bin column_sum -- [rows] [config.json]

use std::env;

use gpumat::gpu::GpuConfig;
use gpumat::gpu::shaders::with_prelude;
use gpumat::{ComputeSession, ElementKind, Matrix, SessionError};
use log::error;

const KERNEL: &str = include_str!("column_sum.wgsl");
const DEFAULT_ROWS: usize = 10;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("invalid row count {0:?}")]
    InvalidRows(String),

    #[error(transparent)]
    Backend(#[from] gpumat::BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Matrix(#[from] gpumat::MatrixError),
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        error!("column sum failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), DemoError> {
    let args: Vec<String> = env::args().collect();
    let rows = match args.get(1) {
        Some(arg) => arg
            .parse::<usize>()
            .map_err(|_| DemoError::InvalidRows(arg.clone()))?,
        None => DEFAULT_ROWS,
    };
    let config = match args.get(2) {
        Some(path) => GpuConfig::from_json_file(path)?,
        None => GpuConfig::default(),
    };

    let source = with_prelude(ElementKind::F32, ElementKind::F32, config.workgroup_size, KERNEL);
    let session = ComputeSession::with_gpu(config)?;
    session.compile(&source)?;

    // Both columns of row y hold y.
    let input = Matrix::from_fn(2, rows, 1, |_, y, _| y as f32);
    let mut output = Matrix::<f32>::new(1, rows, 1);
    session.execute(&input, &mut output)?;

    for y in 0..output.height() {
        println!("Summed: {}", output.get(0, y, 0)?);
    }
    Ok(())
}
