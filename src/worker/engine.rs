//! Worker thread engine
//!
//! Sleeps on the state block until the render thread asks for more audio,
//! then drains one kernel-length block from the input ring, runs the kernel
//! and deposits the result in the output ring.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Environment, WorkerOptions};
use crate::shared::{RingBuffer, SharedBuffers, StateBlock, StateSlot, WaitOutcome};

use super::kernel::Kernel;

/// The worker side of a session
pub struct WorkerEngine {
    states: Arc<StateBlock>,
    input: RingBuffer,
    output: RingBuffer,
    kernel: Box<dyn Kernel>,
    ring_buffer_length: usize,
    kernel_length: usize,
    channel_count: usize,
    wait_timeout: Duration,
    /// Pre-allocated so a kernel pass never allocates
    scratch_in: Vec<f32>,
    scratch_out: Vec<f32>,
}

impl WorkerEngine {
    /// Validate the environment and options, then allocate the shared
    /// memory and publish the configuration into the state block.
    ///
    /// Nothing is allocated when validation fails.
    pub fn initialize(
        options: WorkerOptions,
        environment: Environment,
        kernel: Box<dyn Kernel>,
    ) -> Result<(Self, SharedBuffers)> {
        if !environment.shared_memory {
            return Err(Error::UnsupportedEnvironment(
                "lock-free 32-bit atomics are not available on this target".into(),
            ));
        }
        options.validate()?;

        let buffers = SharedBuffers::allocate(options.ring_buffer_length, options.channel_count);
        // Lengths were checked against u32::MAX by validate()
        buffers
            .states
            .store(StateSlot::RingBufferLength, options.ring_buffer_length as u32);
        buffers
            .states
            .store(StateSlot::KernelLength, options.kernel_length as u32);

        let engine = Self {
            states: Arc::clone(&buffers.states),
            input: buffers.input_ring(),
            output: buffers.output_ring(),
            kernel,
            ring_buffer_length: options.ring_buffer_length,
            kernel_length: options.kernel_length,
            channel_count: options.channel_count,
            wait_timeout: options.wait_timeout,
            scratch_in: vec![0.0; options.kernel_length],
            scratch_out: vec![0.0; options.kernel_length],
        };

        Ok((engine, buffers))
    }

    /// Wait/process loop. Returns once shutdown is requested.
    pub fn run(&mut self) {
        log::info!(
            "Worker waiting for render requests (ring {} frames, kernel {} frames)",
            self.ring_buffer_length,
            self.kernel_length
        );

        loop {
            match self.states.wait_for_render_request(self.wait_timeout) {
                WaitOutcome::Woken | WaitOutcome::NotEqual => {
                    self.kernel_pass();
                }
                WaitOutcome::TimedOut => {
                    log::trace!("Worker wait timed out, still alive");
                }
                WaitOutcome::Shutdown => break,
            }
        }

        log::info!(
            "Worker stopped after {} kernel passes",
            self.states.load(StateSlot::KernelPasses)
        );
    }

    /// Run one kernel pass if there is enough input and room for the output.
    ///
    /// Always lowers the wake flag. Returns whether a pass ran.
    pub fn kernel_pass(&mut self) -> bool {
        let states = &self.states;
        let kernel_length = self.kernel_length;

        if states.index(StateSlot::InputFramesAvailable) < kernel_length {
            // Spurious wake; the render side re-signals once enough is queued
            states.clear_render_request();
            return false;
        }

        let output_frames = states.index(StateSlot::OutputFramesAvailable);
        if output_frames + kernel_length > self.ring_buffer_length {
            log::warn!(
                "Output ring full ({} of {} frames), skipping kernel pass",
                output_frames,
                self.ring_buffer_length
            );
            states.clear_render_request();
            return false;
        }

        let read_index = states.index(StateSlot::InputReadIndex);
        let write_index = states.index(StateSlot::OutputWriteIndex);
        let mut next_read = read_index;
        let mut next_write = write_index;

        for channel in 0..self.channel_count {
            next_read = self.input.read(channel, read_index, &mut self.scratch_in);
            self.kernel.process(&self.scratch_in, &mut self.scratch_out);
            next_write = self.output.write(channel, write_index, &self.scratch_out);
        }

        states.store(StateSlot::InputReadIndex, next_read as u32);
        states.store(StateSlot::OutputWriteIndex, next_write as u32);
        states.fetch_sub(StateSlot::InputFramesAvailable, kernel_length as u32);
        states.fetch_add(StateSlot::OutputFramesAvailable, kernel_length as u32);
        states.fetch_add(StateSlot::KernelPasses, 1);
        states.clear_render_request();

        if let Some(violation) = states.snapshot().invariant_violation() {
            log::error!("State invariant violated after kernel pass: {}", violation);
        }

        true
    }

    pub fn states(&self) -> &Arc<StateBlock> {
        &self.states
    }
}
