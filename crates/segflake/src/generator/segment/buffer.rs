use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::IdSegment;

const SLOTS: usize = 2;

#[derive(Debug, Default)]
struct Slots {
    segments: [Option<Arc<IdSegment>>; SLOTS],
    current_pos: usize,
}

/// A snapshot of one business key's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferStats {
    /// Index (0 or 1) of the slot ids are currently served from.
    pub current_pos: usize,
    /// How many times the buffer switched slots since creation.
    pub switches: u64,
    /// Whether a background refill is queued or running.
    pub refill_in_flight: bool,
}

/// The two-slot double buffer of one business key.
///
/// One slot is *current* and serves ids; the other is the *standby*, which is
/// either empty, stale (an exhausted segment that was switched away from) or
/// a fresh segment waiting to take over.
///
/// Slot contents and the current index live behind a single read-write lock,
/// so a reader never observes a half-written slot and filling is mutually
/// exclusive with switching. Readers clone an `Arc` out and release the lock
/// before touching the segment, so allocation never holds the buffer lock.
///
/// Separately, the *fetch lock* serialises everything that talks to the
/// segment provider for this key (emergency fills, background refills and the
/// switch that follows them). It is always taken before the slot lock, never
/// after.
#[derive(Debug, Default)]
pub struct RingBuffer {
    slots: RwLock<Slots>,
    fetch: Mutex<()>,
    refill_in_flight: AtomicBool,
    switches: AtomicU64,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the slot currently serving ids.
    pub fn current_pos(&self) -> usize {
        self.slots.read().current_pos
    }

    /// Index of the standby slot.
    pub fn next_pos(&self) -> usize {
        (self.current_pos() + 1) % SLOTS
    }

    pub fn current_segment(&self) -> Option<Arc<IdSegment>> {
        let slots = self.slots.read();
        slots.segments[slots.current_pos].clone()
    }

    /// The standby segment, if any.
    pub fn next_segment(&self) -> Option<Arc<IdSegment>> {
        let slots = self.slots.read();
        slots.segments[(slots.current_pos + 1) % SLOTS].clone()
    }

    /// Overwrites slot `pos` (taken modulo 2).
    pub fn fill_segment(&self, pos: usize, segment: IdSegment) {
        let pos = pos % SLOTS;
        #[cfg(feature = "tracing")]
        tracing::info!(
            pos,
            min = segment.min(),
            max = segment.max(),
            "filled segment buffer slot"
        );
        self.slots.write().segments[pos] = Some(Arc::new(segment));
    }

    /// Overwrites the current slot.
    pub fn fill_current(&self, segment: IdSegment) {
        let mut slots = self.slots.write();
        let pos = slots.current_pos;
        #[cfg(feature = "tracing")]
        tracing::info!(
            pos,
            min = segment.min(),
            max = segment.max(),
            "filled current segment slot"
        );
        slots.segments[pos] = Some(Arc::new(segment));
    }

    /// Overwrites the standby slot.
    pub fn fill_standby(&self, segment: IdSegment) {
        let mut slots = self.slots.write();
        let pos = (slots.current_pos + 1) % SLOTS;
        #[cfg(feature = "tracing")]
        tracing::info!(
            pos,
            min = segment.min(),
            max = segment.max(),
            "filled standby segment slot"
        );
        slots.segments[pos] = Some(Arc::new(segment));
    }

    /// Makes the standby slot current.
    pub fn switch_segment(&self) {
        let mut slots = self.slots.write();
        slots.current_pos = (slots.current_pos + 1) % SLOTS;
        self.switches.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::info!(pos = slots.current_pos, "switched segment buffer");
    }

    /// Whether slot `pos` (taken modulo 2) has never been filled.
    pub fn is_segment_empty(&self, pos: usize) -> bool {
        self.slots.read().segments[pos % SLOTS].is_none()
    }

    /// Whether `segment` is still the one serving ids.
    pub fn is_current(&self, segment: &Arc<IdSegment>) -> bool {
        self.current_segment()
            .is_some_and(|current| Arc::ptr_eq(&current, segment))
    }

    /// Whether the standby slot is empty or holds an exhausted segment.
    pub fn standby_needs_refill(&self) -> bool {
        self.next_segment()
            .is_none_or(|standby| standby.is_exhausted())
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            current_pos: self.current_pos(),
            switches: self.switches.load(Ordering::Relaxed),
            refill_in_flight: self.refill_in_flight.load(Ordering::Acquire),
        }
    }

    /// Takes the per-key fetch lock.
    pub(crate) fn lock_fetch(&self) -> MutexGuard<'_, ()> {
        self.fetch.lock()
    }
}

/// Marks a background refill as pending for one buffer until dropped.
///
/// At most one exists per buffer at any time, which is what keeps a flood of
/// threads crossing the refill threshold from queueing duplicate work.
#[derive(Debug)]
pub(crate) struct RefillTicket {
    buffer: Arc<RingBuffer>,
}

impl RefillTicket {
    /// Claims the buffer's refill slot, or `None` if a refill is already
    /// pending.
    pub(crate) fn claim(buffer: &Arc<RingBuffer>) -> Option<Self> {
        buffer
            .refill_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                buffer: Arc::clone(buffer),
            })
    }

    pub(crate) fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }
}

impl Drop for RefillTicket {
    fn drop(&mut self) {
        self.buffer.refill_in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(min: i64, max: i64) -> IdSegment {
        IdSegment::new(min, max).unwrap()
    }

    #[test]
    fn starts_empty_on_slot_zero() {
        let buffer = RingBuffer::new();
        assert_eq!(buffer.current_pos(), 0);
        assert_eq!(buffer.next_pos(), 1);
        assert!(buffer.is_segment_empty(0));
        assert!(buffer.is_segment_empty(1));
        assert!(buffer.current_segment().is_none());
        assert!(buffer.standby_needs_refill());
    }

    #[test]
    fn fill_and_switch() {
        let buffer = RingBuffer::new();
        buffer.fill_segment(0, segment(1, 11));
        buffer.fill_segment(1, segment(11, 21));
        assert!(!buffer.standby_needs_refill());

        let first = buffer.current_segment().unwrap();
        assert_eq!(first.min(), 1);
        assert!(buffer.is_current(&first));

        buffer.switch_segment();
        assert_eq!(buffer.current_pos(), 1);
        assert_eq!(buffer.current_segment().unwrap().min(), 11);
        assert!(!buffer.is_current(&first));
        assert_eq!(buffer.next_segment().unwrap().min(), 1);

        buffer.switch_segment();
        assert_eq!(buffer.stats().switches, 2);
        assert_eq!(buffer.current_pos(), 0);
    }

    #[test]
    fn exhausted_standby_needs_refill() {
        let buffer = RingBuffer::new();
        buffer.fill_current(segment(1, 2));
        buffer.fill_standby(segment(2, 3));
        buffer.current_segment().unwrap().get_and_increment().unwrap();
        buffer.switch_segment();
        assert!(buffer.standby_needs_refill());

        buffer.fill_standby(segment(3, 4));
        assert!(!buffer.standby_needs_refill());
        assert_eq!(buffer.next_segment().unwrap().min(), 3);
    }

    #[test]
    fn refill_ticket_is_exclusive() {
        let buffer = Arc::new(RingBuffer::new());
        let ticket = RefillTicket::claim(&buffer).unwrap();
        assert!(buffer.stats().refill_in_flight);
        assert!(RefillTicket::claim(&buffer).is_none());

        drop(ticket);
        assert!(!buffer.stats().refill_in_flight);
        assert!(RefillTicket::claim(&buffer).is_some());
    }
}
