//! offload-rs - run heavy audio processing off the real-time thread
//!
//! The audio callback hands its input to a worker thread through a pair of
//! shared ring buffers and picks up the worker's output from the other one.
//! The two sides coordinate through an atomic state block only; the
//! callback never blocks.
//!
//! ```no_run
//! use offload_rs::{NodeOptions, Overdrive, SharedBufferNode};
//!
//! let (mut node, mut processor) = SharedBufferNode::new(NodeOptions::default(), Overdrive)?;
//!
//! // Inside the audio callback, once per quantum:
//! let input = [0.0_f32; 128];
//! let mut output = [0.0_f32; 128];
//! processor.process(&[&input[..]], &mut [&mut output[..]]);
//!
//! node.poll_processor_ready();
//! # Ok::<(), offload_rs::Error>(())
//! ```

pub mod error;
pub mod node;
pub mod processor;
pub mod protocol;
pub mod settings;
pub mod shared;
pub mod worker;

pub use error::{Error, Result};
pub use node::{NodeOptions, SharedBufferNode};
pub use processor::{ProcessorPort, SharedBufferProcessor};
pub use protocol::{Environment, WorkerOptions};
pub use settings::{KernelChoice, Settings, SourceMode};
pub use shared::{SharedBuffers, StateBlock, StateSlot, StateSnapshot};
pub use worker::{Kernel, Overdrive, Passthrough};
