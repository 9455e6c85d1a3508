//! Session controller
//!
//! `SharedBufferNode` drives the setup handshake: it spawns the worker,
//! sends it the configuration, waits for the shared buffers and forwards
//! them to the render-side processor. After that it only watches, and on
//! drop it stops and joins the worker.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::processor::{ProcessorPort, SharedBufferProcessor};
use crate::protocol::{
    Environment, ProcessorEvent, ProcessorMessage, WorkerCommand, WorkerEvent, WorkerOptions,
};
use crate::shared::{SharedBuffers, StateSnapshot};
use crate::worker::{self, Kernel};

/// Ring length used by the controller when the caller does not pick one
pub const NODE_RING_BUFFER_LENGTH: usize = 3072;

/// Options for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOptions {
    pub worker: WorkerOptions,
    /// How long to wait for the worker's answer
    pub handshake_timeout: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            worker: WorkerOptions {
                ring_buffer_length: NODE_RING_BUFFER_LENGTH,
                ..WorkerOptions::default()
            },
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// The controller of a shared-buffer session
pub struct SharedBufferNode {
    commands: Sender<WorkerCommand>,
    worker: Option<JoinHandle<()>>,
    buffers: SharedBuffers,
    port: ProcessorPort,
    processor_ready: bool,
}

impl SharedBufferNode {
    /// Set up a session and return the controller plus the processor to
    /// hand to the audio callback
    pub fn new<K>(options: NodeOptions, kernel: K) -> Result<(Self, SharedBufferProcessor)>
    where
        K: Kernel + 'static,
    {
        Self::with_environment(options, kernel, Environment::detect())
    }

    /// Like [`SharedBufferNode::new`], with an explicit environment probe
    pub fn with_environment<K>(
        options: NodeOptions,
        kernel: K,
        environment: Environment,
    ) -> Result<(Self, SharedBufferProcessor)>
    where
        K: Kernel + 'static,
    {
        let (processor, port) = SharedBufferProcessor::new();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let worker = worker::spawn(environment, Box::new(kernel), cmd_rx, event_tx)?;

        if cmd_tx
            .send(WorkerCommand::Initialize(options.worker))
            .is_err()
        {
            let _ = worker.join();
            return Err(Error::Handshake(
                "worker exited before initialization".into(),
            ));
        }

        let buffers = match event_rx.recv_timeout(options.handshake_timeout) {
            Ok(WorkerEvent::Ready(buffers)) => buffers,
            Ok(WorkerEvent::Error { kind, detail }) => {
                log::error!("Worker error: {}", detail);
                let _ = worker.join();
                return Err((kind, detail).into());
            }
            Err(RecvTimeoutError::Timeout) => {
                // The worker may be wedged; leave it detached
                log::error!(
                    "Worker did not answer within {:?}",
                    options.handshake_timeout
                );
                return Err(Error::Handshake(format!(
                    "no answer from worker within {:?}",
                    options.handshake_timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                return Err(Error::Handshake("worker exited during setup".into()));
            }
        };

        let (states_len, input_len, output_len) = buffers.byte_lens();
        log::info!(
            "Worker ready: states {} bytes, input ring {} bytes, output ring {} bytes",
            states_len,
            input_len,
            output_len
        );

        let mut node = Self {
            commands: cmd_tx,
            worker: Some(worker),
            buffers,
            port,
            processor_ready: false,
        };

        if !node
            .port
            .post(ProcessorMessage::Initialize(node.buffers.clone()))
        {
            node.shutdown();
            return Err(Error::ProtocolViolation(
                "processor port closed before the shared buffers were forwarded".into(),
            ));
        }

        Ok((node, processor))
    }

    /// The shared buffers of this session
    pub fn buffers(&self) -> &SharedBuffers {
        &self.buffers
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.buffers.states.snapshot()
    }

    /// Non-blocking check for the processor's ready notification.
    ///
    /// The processor answers from inside its first `process` call.
    pub fn poll_processor_ready(&mut self) -> bool {
        if !self.processor_ready && self.port.try_ready() {
            log::info!("Processor ready");
            self.processor_ready = true;
        }
        self.processor_ready
    }

    /// Block until the processor reports ready
    pub fn wait_processor_ready(&mut self, timeout: Duration) -> Result<()> {
        if self.processor_ready {
            return Ok(());
        }

        match self.port.rx.recv_timeout(timeout) {
            Ok(ProcessorEvent::Ready) => {
                log::info!("Processor ready");
                self.processor_ready = true;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::Handshake(format!(
                "processor not ready within {:?}",
                timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ProtocolViolation(
                "processor dropped before acknowledging the shared buffers".into(),
            )),
        }
    }

    pub fn is_worker_alive(&self) -> bool {
        self.worker
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the worker loop and join the thread
    pub fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.buffers.states.request_shutdown();
        // Covers a worker that is still waiting for its first command
        let _ = self.commands.send(WorkerCommand::Shutdown);

        if handle.join().is_err() {
            log::error!("Worker thread panicked");
        }
        log::info!("Session shut down");
    }
}

impl Drop for SharedBufferNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::StateSlot;
    use crate::worker::{Overdrive, Passthrough};
    use std::thread;
    use std::time::Instant;

    fn options(ring: usize, kernel: usize) -> NodeOptions {
        NodeOptions {
            worker: WorkerOptions {
                ring_buffer_length: ring,
                kernel_length: kernel,
                wait_timeout: Duration::from_millis(5),
                ..WorkerOptions::default()
            },
            ..NodeOptions::default()
        }
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) {
        let end = Instant::now() + deadline;
        while !done() {
            assert!(Instant::now() < end, "condition not reached in time");
            thread::sleep(Duration::from_micros(200));
        }
    }

    #[test]
    fn test_default_options() {
        let options = NodeOptions::default();
        assert_eq!(options.worker.ring_buffer_length, 3072);
        assert_eq!(options.worker.kernel_length, 1024);
        assert!(options.worker.validate().is_ok());
    }

    #[test]
    fn test_handshake_publishes_configuration() {
        let (mut node, mut processor) =
            SharedBufferNode::new(options(256, 64), Passthrough).unwrap();

        assert_eq!(node.buffers().states.ring_buffer_length(), 256);
        assert_eq!(node.buffers().states.kernel_length(), 64);
        assert!(!node.poll_processor_ready());

        let mut output = [0.0_f32; 32];
        processor.process(&[&[0.0_f32; 32][..]], &mut [&mut output[..]]);

        node.wait_processor_ready(Duration::from_secs(1)).unwrap();
        assert!(node.poll_processor_ready());
        assert!(processor.is_initialized());
    }

    #[test]
    fn test_unsupported_environment_is_reported() {
        let result = SharedBufferNode::with_environment(
            options(256, 64),
            Passthrough,
            Environment {
                shared_memory: false,
            },
        );
        assert!(matches!(result, Err(Error::UnsupportedEnvironment(_))));
    }

    #[test]
    fn test_invalid_options_are_reported() {
        let result = SharedBufferNode::new(options(64, 128), Passthrough);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_shutdown_joins_worker() {
        let (mut node, _processor) = SharedBufferNode::new(options(256, 64), Passthrough).unwrap();
        assert!(node.is_worker_alive());

        node.shutdown();
        assert!(!node.is_worker_alive());
        assert!(node.buffers().states.is_shutdown());
        // Second call is a no-op
        node.shutdown();
    }

    #[test]
    fn test_drop_stops_worker_even_with_long_timeout() {
        let mut opts = options(256, 64);
        opts.worker.wait_timeout = Duration::from_secs(60);
        let (node, _processor) = SharedBufferNode::new(opts, Passthrough).unwrap();

        let start = Instant::now();
        drop(node);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_wake_and_kernel_pass_within_one_cycle() {
        let (node, mut processor) = SharedBufferNode::new(options(512, 128), Overdrive).unwrap();
        let states = &node.buffers().states;
        let mut output = [0.0_f32; 128];

        processor.process(&[&[0.2_f32; 128][..]], &mut [&mut output[..]]);

        // Notification was raised during the quantum; the worker drains it
        wait_until(Duration::from_secs(5), || {
            states.load(StateSlot::KernelPasses) == 1
        });
        let snap = node.snapshot();
        assert_eq!(snap.input_frames_available, 0);
        assert_eq!(snap.output_frames_available, 128);
        assert_eq!(snap.request_render, 0);

        processor.process(&[&[0.0_f32; 128][..]], &mut [&mut output[..]]);
        for y in output {
            assert!((y - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn test_concurrent_stress_no_drift() {
        const QUANTUM: usize = 128;
        const KERNEL: usize = 1024;
        const QUANTA: usize = 256;

        let (node, mut processor) = SharedBufferNode::new(options(4096, KERNEL), Passthrough).unwrap();
        let states = &node.buffers().states;

        let input: Vec<f32> = (0..QUANTUM * QUANTA)
            .map(|i| (i % 1000) as f32 / 1000.0 + 0.0005)
            .collect();
        let mut collected = Vec::with_capacity(input.len());
        let mut output = vec![0.0_f32; QUANTUM];

        let mut written = 0;
        for quantum in input.chunks(QUANTUM) {
            processor.process(&[quantum], &mut [&mut output[..]]);
            collected.extend_from_slice(&output);
            written += quantum.len();

            // Keep the render side from outrunning the worker. The pass
            // counter moves only after the output has been published.
            let expected_passes = written / KERNEL;
            wait_until(Duration::from_secs(5), || {
                states.load(StateSlot::KernelPasses) as usize == expected_passes
            });
        }

        let snap = node.snapshot();
        assert_eq!(snap.input_frames_available, 0);
        assert_eq!(snap.input_overruns, 0);
        assert_eq!(
            snap.kernel_passes as usize * KERNEL,
            input.len(),
            "frames written and frames consumed differ"
        );
        assert!(snap.invariant_violation().is_none());

        // Output trails input by exactly the first kernel's worth of silence
        let latency = snap.output_underruns as usize;
        assert_eq!(latency, KERNEL);
        assert_eq!(&collected[latency..], &input[..input.len() - latency]);
    }
}
