//! Error types for session setup
//!
//! Only the setup path returns errors. Problems detected inside the
//! steady-state loops are logged and handled locally, since neither thread
//! can propagate a synchronous error across the shared memory mid-cycle.

use thiserror::Error;

/// Errors that can occur while establishing a shared-buffer session
#[derive(Error, Debug)]
pub enum Error {
    #[error("Shared memory is not supported in this environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
