//! Render-thread adapter
//!
//! `SharedBufferProcessor` runs inside the real-time audio callback. Each
//! quantum it pushes the captured input into the input ring, pulls
//! previously rendered audio out of the output ring, and wakes the worker
//! once a full kernel of input is queued.
//!
//! Nothing here blocks or allocates after the handshake. Before the shared
//! buffers arrive every call is a no-op that still asks the host to keep
//! processing.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use crate::protocol::{ProcessorEvent, ProcessorMessage};
use crate::shared::{RingBuffer, SharedBuffers, StateBlock, StateSlot, StateSnapshot};

/// Controller-side end of the processor's message port
pub struct ProcessorPort {
    pub(crate) tx: Sender<ProcessorMessage>,
    pub(crate) rx: Receiver<ProcessorEvent>,
}

impl ProcessorPort {
    /// Forward the shared buffers to the processor
    pub fn post(&self, message: ProcessorMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Non-blocking check for the processor's ready notification
    pub fn try_ready(&self) -> bool {
        matches!(self.rx.try_recv(), Ok(ProcessorEvent::Ready))
    }
}

/// Local views over the shared memory, built once the handles arrive
struct Views {
    states: Arc<StateBlock>,
    input: RingBuffer,
    output: RingBuffer,
    ring_buffer_length: usize,
    kernel_length: usize,
    channel_count: usize,
}

/// The real-time half of a session
pub struct SharedBufferProcessor {
    port: Receiver<ProcessorMessage>,
    events: Sender<ProcessorEvent>,
    views: Option<Views>,
}

impl SharedBufferProcessor {
    /// Create a processor and the port the controller talks to it through
    pub fn new() -> (Self, ProcessorPort) {
        let (msg_tx, msg_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let processor = Self {
            port: msg_rx,
            events: event_tx,
            views: None,
        };
        let port = ProcessorPort {
            tx: msg_tx,
            rx: event_rx,
        };

        (processor, port)
    }

    pub fn is_initialized(&self) -> bool {
        self.views.is_some()
    }

    /// Current shared state, once initialized
    pub fn snapshot(&self) -> Option<StateSnapshot> {
        self.views.as_ref().map(|v| v.states.snapshot())
    }

    /// Process one quantum.
    ///
    /// `inputs` and `outputs` hold one slice per channel. Every output slice
    /// is fully written. Always returns `true` ("keep processing").
    pub fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) -> bool {
        self.poll_port();

        let Some(views) = &self.views else {
            silence(outputs);
            return true;
        };
        if inputs.first().is_none() {
            silence(outputs);
            return true;
        }

        views.push_input(inputs);
        views.pull_output(outputs);

        if views.states.index(StateSlot::InputFramesAvailable) >= views.kernel_length {
            views.states.request_render();
        }

        true
    }

    /// Drain pending port messages without blocking
    fn poll_port(&mut self) {
        loop {
            match self.port.try_recv() {
                Ok(ProcessorMessage::Initialize(buffers)) => self.initialize(buffers),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn initialize(&mut self, buffers: SharedBuffers) {
        if self.views.is_some() {
            // Out-of-order handshake; keep the session we already have
            log::warn!("Processor already initialized, ignoring shared buffers");
            return;
        }

        let states = Arc::clone(&buffers.states);
        let views = Views {
            ring_buffer_length: states.ring_buffer_length(),
            kernel_length: states.kernel_length(),
            channel_count: buffers.input_ring_buffer.channel_count(),
            input: buffers.input_ring(),
            output: buffers.output_ring(),
            states,
        };

        self.views = Some(views);
        let _ = self.events.send(ProcessorEvent::Ready);
    }
}

impl Views {
    fn push_input(&self, inputs: &[&[f32]]) {
        let states = &self.states;
        let frames = inputs.iter().map(|c| c.len()).min().unwrap_or(0);

        let queued = states.index(StateSlot::InputFramesAvailable);
        let writable = frames.min(self.ring_buffer_length.saturating_sub(queued));
        if writable < frames {
            states.fetch_add(StateSlot::InputOverruns, (frames - writable) as u32);
        }
        if writable == 0 {
            return;
        }

        let index = states.index(StateSlot::InputWriteIndex);
        let mut next = index;
        for channel in 0..self.channel_count {
            // A mono input feeds every configured channel
            let source = inputs.get(channel).unwrap_or(&inputs[0]);
            next = self.input.write(channel, index, &source[..writable]);
        }

        states.store(StateSlot::InputWriteIndex, next as u32);
        states.fetch_add(StateSlot::InputFramesAvailable, writable as u32);
    }

    fn pull_output(&self, outputs: &mut [&mut [f32]]) {
        let states = &self.states;
        let frames = outputs.iter().map(|c| c.len()).min().unwrap_or(0);

        let readable = frames.min(states.index(StateSlot::OutputFramesAvailable));
        let index = states.index(StateSlot::OutputReadIndex);
        let mut next = index;

        for (channel, out) in outputs.iter_mut().enumerate() {
            let source = channel.min(self.channel_count.saturating_sub(1));
            let (filled, rest) = out.split_at_mut(readable);
            let advanced = self.output.read(source, index, filled);
            if channel < self.channel_count {
                next = advanced;
            }
            rest.fill(0.0);
        }

        if readable < frames {
            states.fetch_add(StateSlot::OutputUnderruns, (frames - readable) as u32);
        }
        if readable > 0 {
            states.store(StateSlot::OutputReadIndex, next as u32);
            states.fetch_sub(StateSlot::OutputFramesAvailable, readable as u32);
        }
    }
}

fn silence(outputs: &mut [&mut [f32]]) {
    for out in outputs.iter_mut() {
        out.fill(0.0);
    }
}
