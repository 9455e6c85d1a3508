//! Shared state block
//!
//! A fixed array of atomic integers shared by the render thread and the
//! worker thread. It stores the ring buffer indices, the frame counters and
//! the negotiated configuration, and its `RequestRender` slot doubles as the
//! wake signal that puts the worker to sleep and brings it back.
//!
//! ## Ownership of the slots
//!
//! Every index slot has exactly one writer:
//! - render thread: `InputWriteIndex`, `OutputReadIndex`
//! - worker thread: `InputReadIndex`, `OutputWriteIndex`
//!
//! The frame counters are touched by both sides, but only through atomic
//! add/sub. `RequestRender` is set by the render thread and cleared by the
//! worker; that is the one intended race.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Number of slots in the state block
pub const STATE_SLOT_COUNT: usize = 16;

/// Width of a single state slot in bytes
pub const BYTES_PER_STATE: usize = std::mem::size_of::<u32>();

/// Named slots of the state block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum StateSlot {
    /// Wake flag: non-zero while the render thread wants a kernel pass
    RequestRender = 0,
    InputFramesAvailable = 1,
    InputReadIndex = 2,
    InputWriteIndex = 3,
    OutputFramesAvailable = 4,
    OutputReadIndex = 5,
    OutputWriteIndex = 6,
    /// Capacity of each ring buffer in frames
    RingBufferLength = 7,
    /// Frames consumed and produced per kernel pass
    KernelLength = 8,
    /// Cancellation flag for the worker loop
    Shutdown = 9,
    KernelPasses = 10,
    /// Input frames dropped because the input ring was full
    InputOverruns = 11,
    /// Output frames zero-filled because the output ring ran dry
    OutputUnderruns = 12,
}

/// Result of a blocking wait on the `RequestRender` slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The slot changed while we were asleep
    Woken,
    /// Nothing happened before the timeout (or the wakeup was spurious)
    TimedOut,
    /// The slot was already set when the wait started
    NotEqual,
    /// The session is shutting down
    Shutdown,
}

/// Point-in-time copy of the state block, for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub request_render: u32,
    pub input_frames_available: u32,
    pub input_read_index: u32,
    pub input_write_index: u32,
    pub output_frames_available: u32,
    pub output_read_index: u32,
    pub output_write_index: u32,
    pub ring_buffer_length: u32,
    pub kernel_length: u32,
    pub kernel_passes: u32,
    pub input_overruns: u32,
    pub output_underruns: u32,
}

impl StateSnapshot {
    /// Describe the first broken index/counter invariant, if any
    pub fn invariant_violation(&self) -> Option<String> {
        let len = self.ring_buffer_length;
        if len == 0 {
            return None;
        }

        let indices = [
            ("input read index", self.input_read_index),
            ("input write index", self.input_write_index),
            ("output read index", self.output_read_index),
            ("output write index", self.output_write_index),
        ];
        for (name, value) in indices {
            if value >= len {
                return Some(format!("{} {} out of range 0..{}", name, value, len));
            }
        }

        let counters = [
            ("input frames available", self.input_frames_available),
            ("output frames available", self.output_frames_available),
        ];
        for (name, value) in counters {
            if value > len {
                return Some(format!("{} {} exceeds ring length {}", name, value, len));
            }
        }

        if self.kernel_length > len {
            return Some(format!(
                "kernel length {} exceeds ring length {}",
                self.kernel_length, len
            ));
        }

        None
    }
}

/// The shared state block
#[derive(Debug)]
pub struct StateBlock {
    slots: [AtomicU32; STATE_SLOT_COUNT],
    /// Guards nothing but the worker's check-then-sleep window
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl Default for StateBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBlock {
    /// Create a zeroed state block
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU32::new(0)),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Size of the block in bytes
    pub const fn byte_len(&self) -> usize {
        STATE_SLOT_COUNT * BYTES_PER_STATE
    }

    #[inline]
    fn slot(&self, slot: StateSlot) -> &AtomicU32 {
        &self.slots[slot as usize]
    }

    /// Load a slot with acquire ordering
    #[inline]
    pub fn load(&self, slot: StateSlot) -> u32 {
        self.slot(slot).load(Ordering::Acquire)
    }

    /// Store a slot with release ordering
    #[inline]
    pub fn store(&self, slot: StateSlot, value: u32) {
        self.slot(slot).store(value, Ordering::Release);
    }

    /// Atomically add to a slot, returning the previous value
    #[inline]
    pub fn fetch_add(&self, slot: StateSlot, value: u32) -> u32 {
        self.slot(slot).fetch_add(value, Ordering::AcqRel)
    }

    /// Atomically subtract from a slot, returning the previous value
    #[inline]
    pub fn fetch_sub(&self, slot: StateSlot, value: u32) -> u32 {
        self.slot(slot).fetch_sub(value, Ordering::AcqRel)
    }

    /// Load a slot as an index or frame count
    #[inline]
    pub fn index(&self, slot: StateSlot) -> usize {
        self.load(slot) as usize
    }

    pub fn ring_buffer_length(&self) -> usize {
        self.index(StateSlot::RingBufferLength)
    }

    pub fn kernel_length(&self) -> usize {
        self.index(StateSlot::KernelLength)
    }

    /// Whether the render thread is currently asking for a kernel pass
    #[inline]
    pub fn render_requested(&self) -> bool {
        self.load(StateSlot::RequestRender) != 0
    }

    /// Raise the wake flag and wake one waiting worker (render thread).
    ///
    /// Never blocks: the wake lock is only tried. If the worker holds it we
    /// notify anyway; a wakeup lost in that window is picked up on the next
    /// quantum because the flag stays set.
    pub fn request_render(&self) {
        self.store(StateSlot::RequestRender, 1);
        let _guard = self.wake_lock.try_lock().ok();
        self.wake.notify_one();
    }

    /// Lower the wake flag (worker thread)
    #[inline]
    pub fn clear_render_request(&self) {
        self.store(StateSlot::RequestRender, 0);
    }

    /// Block until the wake flag is raised, shutdown is requested or the
    /// timeout elapses (worker thread)
    pub fn wait_for_render_request(&self, timeout: Duration) -> WaitOutcome {
        let guard = self.wake_lock.lock().unwrap_or_else(|e| {
            log::warn!("Wake lock poisoned; continuing");
            e.into_inner()
        });

        if self.is_shutdown() {
            return WaitOutcome::Shutdown;
        }
        if self.render_requested() {
            return WaitOutcome::NotEqual;
        }

        let _ = self.wake.wait_timeout(guard, timeout).unwrap_or_else(|e| {
            log::warn!("Wake lock poisoned while waiting; continuing");
            e.into_inner()
        });

        if self.is_shutdown() {
            WaitOutcome::Shutdown
        } else if self.render_requested() {
            WaitOutcome::Woken
        } else {
            WaitOutcome::TimedOut
        }
    }

    /// Ask the worker loop to exit and wake every waiter (controller)
    pub fn request_shutdown(&self) {
        self.store(StateSlot::Shutdown, 1);
        let _guard = self.wake_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.wake.notify_all();
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.load(StateSlot::Shutdown) != 0
    }

    /// Copy every slot out
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            request_render: self.load(StateSlot::RequestRender),
            input_frames_available: self.load(StateSlot::InputFramesAvailable),
            input_read_index: self.load(StateSlot::InputReadIndex),
            input_write_index: self.load(StateSlot::InputWriteIndex),
            output_frames_available: self.load(StateSlot::OutputFramesAvailable),
            output_read_index: self.load(StateSlot::OutputReadIndex),
            output_write_index: self.load(StateSlot::OutputWriteIndex),
            ring_buffer_length: self.load(StateSlot::RingBufferLength),
            kernel_length: self.load(StateSlot::KernelLength),
            kernel_passes: self.load(StateSlot::KernelPasses),
            input_overruns: self.load(StateSlot::InputOverruns),
            output_underruns: self.load(StateSlot::OutputUnderruns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_new_block_is_zeroed() {
        let states = StateBlock::new();
        assert_eq!(states.snapshot(), StateSnapshot::default());
        assert_eq!(states.byte_len(), 64);
    }

    #[test]
    fn test_counters_add_and_sub() {
        let states = StateBlock::new();
        assert_eq!(states.fetch_add(StateSlot::InputFramesAvailable, 128), 0);
        assert_eq!(states.fetch_add(StateSlot::InputFramesAvailable, 128), 128);
        assert_eq!(states.fetch_sub(StateSlot::InputFramesAvailable, 200), 256);
        assert_eq!(states.index(StateSlot::InputFramesAvailable), 56);
    }

    #[test]
    fn test_wait_not_equal_when_already_requested() {
        let states = StateBlock::new();
        states.request_render();
        assert_eq!(
            states.wait_for_render_request(Duration::from_millis(10)),
            WaitOutcome::NotEqual
        );
    }

    #[test]
    fn test_wait_times_out() {
        let states = StateBlock::new();
        assert_eq!(
            states.wait_for_render_request(Duration::from_millis(20)),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn test_wait_woken_by_request() {
        let states = Arc::new(StateBlock::new());
        let waiter = {
            let states = Arc::clone(&states);
            thread::spawn(move || loop {
                match states.wait_for_render_request(Duration::from_millis(50)) {
                    WaitOutcome::TimedOut => continue,
                    outcome => return outcome,
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        states.request_render();

        let outcome = waiter.join().unwrap();
        assert!(matches!(outcome, WaitOutcome::Woken | WaitOutcome::NotEqual));
    }

    #[test]
    fn test_shutdown_wakes_waiter() {
        let states = Arc::new(StateBlock::new());
        let waiter = {
            let states = Arc::clone(&states);
            thread::spawn(move || states.wait_for_render_request(Duration::from_secs(30)))
        };

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        states.request_shutdown();

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Shutdown);
        assert!(start.elapsed() < Duration::from_secs(5));
        // Shutdown is separate from the wake flag
        assert!(!states.render_requested());
    }

    #[test]
    fn test_invariant_violation_reporting() {
        let mut snap = StateSnapshot {
            ring_buffer_length: 8,
            kernel_length: 4,
            ..Default::default()
        };
        assert!(snap.invariant_violation().is_none());

        snap.input_write_index = 8;
        assert!(snap.invariant_violation().unwrap().contains("input write index"));

        snap.input_write_index = 0;
        snap.output_frames_available = 9;
        assert!(snap
            .invariant_violation()
            .unwrap()
            .contains("output frames available"));
    }
}
