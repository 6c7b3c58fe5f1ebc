//! Unified error type for the benchmark.
//!
//! Every fatal condition in this crate funnels through `BenchError`. There is
//! no retry/recovery path: if setup or a host syscall fails, the measurement
//! run is meaningless and the process exits 1 (see `main`).

use thiserror::Error;

/// All fatal error kinds the benchmark can produce.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("allocation failed: {0}")]
    AllocFailure(String),

    #[error("syscall failed: {0}")]
    SyscallFailure(String),

    #[error("failed to read host CPU statistics: {0}")]
    AutoscaleParseFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
