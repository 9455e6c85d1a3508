//! Fixed-capacity circular sample storage shared between two threads
//!
//! Samples are kept as the bit pattern of an `f32` inside an `AtomicU32`, so
//! both threads can touch the same memory without `unsafe` and without locks.
//! Individual samples use relaxed ordering; the frame counters in the state
//! block carry the release/acquire edges that publish them.
//!
//! The indices themselves do not live here. Callers pass the current index
//! in and store the returned one back into the state block. There is no
//! overwrite protection: the render adapter and the worker respect the
//! frames-available counters so a producer never overtakes its consumer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Width of a single sample in bytes
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

/// The shared allocation behind a ring buffer.
///
/// Laid out as `channel_count` consecutive arrays of `capacity` samples.
#[derive(Debug)]
pub struct RingStorage {
    samples: Box<[AtomicU32]>,
    capacity: usize,
    channel_count: usize,
}

impl RingStorage {
    /// Allocate zeroed storage
    pub fn new(capacity: usize, channel_count: usize) -> Self {
        let samples = (0..capacity * channel_count)
            .map(|_| AtomicU32::new(0.0_f32.to_bits()))
            .collect();

        Self {
            samples,
            capacity,
            channel_count,
        }
    }

    /// Frames per channel
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Size of the allocation in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    fn channel(&self, channel: usize) -> Option<&[AtomicU32]> {
        let start = channel.checked_mul(self.capacity)?;
        self.samples.get(start..start + self.capacity)
    }
}

/// A typed view over shared ring storage
#[derive(Debug, Clone)]
pub struct RingBuffer {
    storage: Arc<RingStorage>,
}

impl RingBuffer {
    pub fn new(storage: Arc<RingStorage>) -> Self {
        Self { storage }
    }

    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    pub fn channel_count(&self) -> usize {
        self.storage.channel_count()
    }

    /// Copy `source` into `channel` starting at `index`.
    ///
    /// A span that reaches the end of the array is split into
    /// `[index, capacity)` and `[0, remainder)`. Returns the next write index.
    pub fn write(&self, channel: usize, index: usize, source: &[f32]) -> usize {
        let Some(data) = self.checked_channel(channel, index, source.len(), "write") else {
            return index;
        };

        let end = index + source.len();
        if end < data.len() {
            store_samples(&data[index..end], source);
            end
        } else {
            let (first, second) = source.split_at(data.len() - index);
            store_samples(&data[index..], first);
            store_samples(&data[..second.len()], second);
            second.len()
        }
    }

    /// Copy samples out of `channel` starting at `index` into `destination`.
    ///
    /// Mirror image of [`RingBuffer::write`]. Returns the next read index.
    pub fn read(&self, channel: usize, index: usize, destination: &mut [f32]) -> usize {
        let Some(data) = self.checked_channel(channel, index, destination.len(), "read") else {
            return index;
        };

        let end = index + destination.len();
        if end < data.len() {
            load_samples(&data[index..end], destination);
            end
        } else {
            let (first, second) = destination.split_at_mut(data.len() - index);
            load_samples(&data[index..], first);
            load_samples(&data[..second.len()], second);
            second.len()
        }
    }

    /// Resolve a channel and validate a span against it
    fn checked_channel(
        &self,
        channel: usize,
        index: usize,
        len: usize,
        op: &str,
    ) -> Option<&[AtomicU32]> {
        let capacity = self.capacity();
        if index >= capacity || len > capacity {
            log::error!(
                "Ring {} out of bounds: index {} len {} capacity {}",
                op,
                index,
                len,
                capacity
            );
            return None;
        }

        let data = self.storage.channel(channel);
        if data.is_none() {
            log::error!(
                "Ring {} on channel {} but only {} channel(s) allocated",
                op,
                channel,
                self.channel_count()
            );
        }
        data
    }
}

#[inline]
fn store_samples(dst: &[AtomicU32], src: &[f32]) {
    for (slot, &sample) in dst.iter().zip(src) {
        slot.store(sample.to_bits(), Ordering::Relaxed);
    }
}

#[inline]
fn load_samples(src: &[AtomicU32], dst: &mut [f32]) {
    for (sample, slot) in dst.iter_mut().zip(src) {
        *sample = f32::from_bits(slot.load(Ordering::Relaxed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize, channels: usize) -> RingBuffer {
        RingBuffer::new(Arc::new(RingStorage::new(capacity, channels)))
    }

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_storage_sizes() {
        let storage = RingStorage::new(4096, 2);
        assert_eq!(storage.capacity(), 4096);
        assert_eq!(storage.channel_count(), 2);
        assert_eq!(storage.byte_len(), 4096 * 2 * 4);
    }

    #[test]
    fn test_write_then_read_in_place() {
        let rb = ring(8, 1);
        let input = ramp(1, 3);

        assert_eq!(rb.write(0, 2, &input), 5);

        let mut out = vec![0.0; 3];
        assert_eq!(rb.read(0, 2, &mut out), 5);
        assert_eq!(out, input);
    }

    #[test]
    fn test_roundtrip_across_wraparound() {
        // capacity 8: write 5, then 5 more, reading 10 total in between
        let rb = ring(8, 1);
        let samples = ramp(0, 10);
        let mut collected = Vec::new();
        let (mut w, mut r) = (0, 0);

        w = rb.write(0, w, &samples[..5]);
        let mut out = vec![0.0; 5];
        r = rb.read(0, r, &mut out);
        collected.extend_from_slice(&out);

        w = rb.write(0, w, &samples[5..]);
        r = rb.read(0, r, &mut out);
        collected.extend_from_slice(&out);

        assert_eq!(collected, samples);
        assert_eq!(w, 2);
        assert_eq!(r, 2);
    }

    #[test]
    fn test_many_wraparounds_keep_order_and_bounds() {
        let rb = ring(7, 1);
        let (mut w, mut r) = (0, 0);
        let mut next = 0;

        for chunk in [3, 5, 7, 1, 6, 4, 2, 7] {
            let input = ramp(next, chunk);
            next += chunk;

            w = rb.write(0, w, &input);
            assert!(w < rb.capacity());

            let mut out = vec![0.0; chunk];
            r = rb.read(0, r, &mut out);
            assert!(r < rb.capacity());

            assert_eq!(out, input);
            assert_eq!(r, w);
        }
    }

    #[test]
    fn test_span_ending_at_capacity_wraps_to_zero() {
        let rb = ring(8, 1);
        assert_eq!(rb.write(0, 5, &[1.0, 2.0, 3.0]), 0);

        let mut out = [0.0; 3];
        assert_eq!(rb.read(0, 5, &mut out), 0);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        // Full-capacity span from zero also lands back on zero
        assert_eq!(rb.write(0, 0, &ramp(0, 8)), 0);
    }

    #[test]
    fn test_channels_are_independent() {
        let rb = ring(4, 2);
        rb.write(0, 0, &[1.0, 1.0, 1.0, 1.0]);
        rb.write(1, 0, &[2.0, 2.0, 2.0, 2.0]);

        let mut left = [0.0; 4];
        let mut right = [0.0; 4];
        rb.read(0, 0, &mut left);
        rb.read(1, 0, &mut right);
        assert_eq!(left, [1.0; 4]);
        assert_eq!(right, [2.0; 4]);
    }

    #[test]
    fn test_invalid_requests_leave_index_unchanged() {
        let rb = ring(4, 1);

        // Longer than capacity
        assert_eq!(rb.write(0, 1, &[0.5; 5]), 1);
        // Index out of range
        let mut out = [0.0; 2];
        assert_eq!(rb.read(0, 4, &mut out), 4);
        // Unknown channel
        assert_eq!(rb.write(3, 0, &[0.5; 2]), 0);

        let mut all = [9.0; 4];
        rb.read(0, 0, &mut all);
        assert_eq!(all, [0.0; 4]);
    }

    #[test]
    fn test_views_share_memory() {
        let storage = Arc::new(RingStorage::new(8, 1));
        let writer = RingBuffer::new(Arc::clone(&storage));
        let reader = RingBuffer::new(storage);

        writer.write(0, 6, &[0.25, 0.5, 0.75]);

        let mut out = [0.0; 3];
        reader.read(0, 6, &mut out);
        assert_eq!(out, [0.25, 0.5, 0.75]);
    }
}
