//! Shared memory module - the state block and the two sample rings
//!
//! This module provides:
//! - Atomic state block (indices, counters, wake signal)
//! - Circular sample storage with wrap-aware bulk copies
//! - `SharedBuffers`, the bundle of handles passed through the handshake

mod ring;
mod state;

use std::sync::Arc;

pub use ring::{RingBuffer, RingStorage, BYTES_PER_SAMPLE};
pub use state::{
    StateBlock, StateSlot, StateSnapshot, WaitOutcome, BYTES_PER_STATE, STATE_SLOT_COUNT,
};

/// Handles to the shared allocations of one session.
///
/// Cloning only clones the `Arc`s; both threads end up looking at the same
/// memory.
#[derive(Debug, Clone)]
pub struct SharedBuffers {
    pub states: Arc<StateBlock>,
    pub input_ring_buffer: Arc<RingStorage>,
    pub output_ring_buffer: Arc<RingStorage>,
}

impl SharedBuffers {
    /// Allocate a zeroed state block and both rings
    pub fn allocate(ring_buffer_length: usize, channel_count: usize) -> Self {
        Self {
            states: Arc::new(StateBlock::new()),
            input_ring_buffer: Arc::new(RingStorage::new(ring_buffer_length, channel_count)),
            output_ring_buffer: Arc::new(RingStorage::new(ring_buffer_length, channel_count)),
        }
    }

    /// Byte sizes of (states, input ring, output ring)
    pub fn byte_lens(&self) -> (usize, usize, usize) {
        (
            self.states.byte_len(),
            self.input_ring_buffer.byte_len(),
            self.output_ring_buffer.byte_len(),
        )
    }

    pub fn input_ring(&self) -> RingBuffer {
        RingBuffer::new(Arc::clone(&self.input_ring_buffer))
    }

    pub fn output_ring(&self) -> RingBuffer {
        RingBuffer::new(Arc::clone(&self.output_ring_buffer))
    }
}
