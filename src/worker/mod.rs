//! Worker module - the background half of a session
//!
//! This module provides:
//! - The kernel trait and the built-in kernels
//! - The wait/process engine
//! - The worker thread entry point used by the controller

mod engine;
mod kernel;

use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

pub use engine::WorkerEngine;
pub use kernel::{Kernel, Overdrive, Passthrough};

use crate::protocol::{Environment, WorkerCommand, WorkerEvent};

/// Spawn the worker thread.
///
/// The thread waits for `WorkerCommand::Initialize`, answers with
/// `WorkerEvent::Ready` or `WorkerEvent::Error`, and on success runs the
/// engine until the state block's shutdown slot is set.
pub(crate) fn spawn(
    environment: Environment,
    kernel: Box<dyn Kernel>,
    commands: Receiver<WorkerCommand>,
    events: Sender<WorkerEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("offload-worker".into())
        .spawn(move || {
            let options = match commands.recv() {
                Ok(WorkerCommand::Initialize(options)) => options,
                Ok(WorkerCommand::Shutdown) | Err(_) => {
                    log::debug!("Worker exiting before initialization");
                    return;
                }
            };

            match WorkerEngine::initialize(options, environment, kernel) {
                Ok((mut engine, buffers)) => {
                    if events.send(WorkerEvent::Ready(buffers)).is_err() {
                        log::warn!("Controller went away before the worker was ready");
                        return;
                    }
                    engine.run();
                }
                Err(e) => {
                    log::error!("Worker initialization failed: {}", e);
                    let _ = events.send(WorkerEvent::from_error(&e));
                }
            }
        })
}
