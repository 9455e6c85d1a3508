//! Setup handshake messages
//!
//! These are exchanged once at session start. Afterwards the render thread
//! and the worker talk only through the shared memory.
//!
//! ```text
//! controller --Initialize(options)--> worker
//! controller <--Ready(buffers) / Error-- worker
//! controller --Initialize(buffers)--> processor
//! controller <--Ready-- processor
//! ```

use std::time::Duration;

use crate::error::{Error, Result};
use crate::shared::SharedBuffers;

pub const DEFAULT_RING_BUFFER_LENGTH: usize = 4096;
pub const DEFAULT_KERNEL_LENGTH: usize = 1024;
pub const DEFAULT_CHANNEL_COUNT: usize = 1;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(25_000);

/// Configuration sent from the controller to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Capacity of each ring buffer, in frames
    pub ring_buffer_length: usize,
    pub channel_count: usize,
    /// Frames consumed and produced per kernel pass
    pub kernel_length: usize,
    /// How long the worker sleeps before re-checking liveness
    pub wait_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            ring_buffer_length: DEFAULT_RING_BUFFER_LENGTH,
            channel_count: DEFAULT_CHANNEL_COUNT,
            kernel_length: DEFAULT_KERNEL_LENGTH,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl WorkerOptions {
    /// Check the options against the state block invariants
    pub fn validate(&self) -> Result<()> {
        if self.ring_buffer_length == 0 {
            return Err(Error::InvalidConfig(
                "ring buffer length must be greater than zero".into(),
            ));
        }
        if self.ring_buffer_length > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "ring buffer length {} does not fit a state slot",
                self.ring_buffer_length
            )));
        }
        if self.channel_count == 0 {
            return Err(Error::InvalidConfig(
                "channel count must be at least one".into(),
            ));
        }
        if self.kernel_length == 0 || self.kernel_length > self.ring_buffer_length {
            return Err(Error::InvalidConfig(format!(
                "kernel length {} must be in 1..={}",
                self.kernel_length, self.ring_buffer_length
            )));
        }
        Ok(())
    }
}

/// What the worker knows about its execution environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Whether lock-free 32-bit atomics are available for shared memory
    pub shared_memory: bool,
}

impl Environment {
    pub fn detect() -> Self {
        Self {
            shared_memory: cfg!(target_has_atomic = "32"),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::detect()
    }
}

/// Controller -> worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    Initialize(WorkerOptions),
    /// Abandon the session before it was initialized
    Shutdown,
}

/// Kinds of fatal setup failure the worker can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    UnsupportedEnvironment,
    InvalidConfig,
}

/// Worker -> controller
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Ready(SharedBuffers),
    Error {
        kind: WorkerErrorKind,
        detail: String,
    },
}

impl WorkerEvent {
    pub(crate) fn from_error(err: &Error) -> Self {
        let kind = match err {
            Error::UnsupportedEnvironment(_) => WorkerErrorKind::UnsupportedEnvironment,
            _ => WorkerErrorKind::InvalidConfig,
        };
        let detail = match err {
            Error::UnsupportedEnvironment(detail) | Error::InvalidConfig(detail) => detail.clone(),
            other => other.to_string(),
        };
        Self::Error { kind, detail }
    }
}

impl From<(WorkerErrorKind, String)> for Error {
    fn from((kind, detail): (WorkerErrorKind, String)) -> Self {
        match kind {
            WorkerErrorKind::UnsupportedEnvironment => Error::UnsupportedEnvironment(detail),
            WorkerErrorKind::InvalidConfig => Error::InvalidConfig(detail),
        }
    }
}

/// Controller -> processor
#[derive(Debug, Clone)]
pub enum ProcessorMessage {
    Initialize(SharedBuffers),
}

/// Processor -> controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorEvent {
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options = WorkerOptions::default();
        assert_eq!(options.ring_buffer_length, 4096);
        assert_eq!(options.kernel_length, 1024);
        assert_eq!(options.channel_count, 1);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let base = WorkerOptions::default();

        let zero_ring = WorkerOptions {
            ring_buffer_length: 0,
            ..base
        };
        assert!(matches!(zero_ring.validate(), Err(Error::InvalidConfig(_))));

        let no_channels = WorkerOptions {
            channel_count: 0,
            ..base
        };
        assert!(matches!(no_channels.validate(), Err(Error::InvalidConfig(_))));

        let big_kernel = WorkerOptions {
            ring_buffer_length: 512,
            kernel_length: 1024,
            ..base
        };
        assert!(matches!(big_kernel.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_worker_error_roundtrip() {
        let event = WorkerEvent::from_error(&Error::UnsupportedEnvironment("no atomics".into()));
        let WorkerEvent::Error { kind, detail } = event else {
            panic!("expected error event");
        };
        assert_eq!(kind, WorkerErrorKind::UnsupportedEnvironment);

        let err: Error = (kind, detail).into();
        assert!(matches!(err, Error::UnsupportedEnvironment(d) if d == "no atomics"));
    }
}
