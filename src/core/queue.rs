//! Bounded multi-producer/single-consumer queue of reusable record slots
//!
//! Producers [`acquire`](RecordQueue::try_acquire_slot) a slot, fill it in
//! place and [`commit`](SlotHandle::commit) it. The consumer takes committed
//! slots in commit order and hands them back to the free pool when it drops
//! them. Slots are boxed records that move between the free pool, exactly one
//! producer, the ready queue and the consumer, so at no point do two owners
//! see the same slot.
//!
//! Capacity is a soft bound: the check and the reservation are two separate
//! atomic steps, so a burst of producers can overshoot it by a few slots.

use super::record::Record;
use crossbeam_queue::{ArrayQueue, SegQueue};
use crossbeam_utils::{Backoff, CachePadded};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Default number of in-flight records
pub const DEFAULT_QUEUE_CAPACITY: usize = 10 * 1024;

/// Largest accepted capacity
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Recycled slots kept for reuse; slots past this are allocated on demand
const FREE_POOL_LIMIT: usize = 64 * 1024;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Lifecycle of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Filled,
    Committed,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    record: Record,
}

impl Slot {
    fn new() -> Box<Self> {
        Box::new(Self {
            state: SlotState::Free,
            record: Record::empty(),
        })
    }
}

/// Result of [`RecordQueue::try_acquire_slot`]
pub enum Acquire<'q> {
    Slot(SlotHandle<'q>),
    /// The queue is completing; log synchronously instead
    Unavailable,
}

/// Result of [`RecordQueue::try_take_or_wait`]
pub enum Take<'q> {
    Record(TakenSlot<'q>),
    /// Completing and nothing left in flight
    ShutdownExhausted,
}

pub struct RecordQueue {
    ready: SegQueue<Box<Slot>>,
    free: ArrayQueue<Box<Slot>>,
    /// Slots acquired or committed and not yet recycled
    in_flight: CachePadded<AtomicUsize>,
    capacity: usize,
    completing: AtomicBool,
    pressure_events: AtomicU64,
}

impl RecordQueue {
    /// # Panics
    ///
    /// Panics if `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be greater than zero");
        Self {
            ready: SegQueue::new(),
            free: ArrayQueue::new(capacity.min(FREE_POOL_LIMIT)),
            in_flight: CachePadded::new(AtomicUsize::new(0)),
            capacity,
            completing: AtomicBool::new(false),
            pressure_events: AtomicU64::new(0),
        }
    }

    /// Reserve a writable slot.
    ///
    /// Spins with a capped backoff while the queue is full and gives up only
    /// once the queue is completing.
    pub fn try_acquire_slot(&self) -> Acquire<'_> {
        let backoff = Backoff::new();
        let mut reported_pressure = false;
        loop {
            if self.completing.load(Ordering::SeqCst) {
                return Acquire::Unavailable;
            }

            if self.in_flight.load(Ordering::Relaxed) < self.capacity {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                // Consumer may have seen zero in flight and exited meanwhile
                if self.completing.load(Ordering::SeqCst) {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Acquire::Unavailable;
                }

                let mut slot = self.free.pop().unwrap_or_else(Slot::new);
                debug_assert_eq!(slot.state, SlotState::Free);
                slot.state = SlotState::Filled;
                return Acquire::Slot(SlotHandle {
                    queue: self,
                    slot: Some(slot),
                });
            }

            if !reported_pressure {
                self.pressure_events.fetch_add(1, Ordering::Relaxed);
                reported_pressure = true;
            }
            backoff.snooze();
        }
    }

    /// Take the next committed slot without waiting.
    pub fn try_take(&self) -> Option<TakenSlot<'_>> {
        self.ready.pop().map(|slot| {
            debug_assert_eq!(slot.state, SlotState::Committed);
            TakenSlot {
                queue: self,
                slot: Some(slot),
            }
        })
    }

    /// Consumer side: wait for the next committed slot.
    ///
    /// Spins first, then sleeps in short intervals. Returns
    /// [`Take::ShutdownExhausted`] once the queue is completing and no slot is
    /// acquired or committed anymore.
    pub fn try_take_or_wait(&self) -> Take<'_> {
        let backoff = Backoff::new();
        loop {
            if let Some(taken) = self.try_take() {
                return Take::Record(taken);
            }

            if self.completing.load(Ordering::SeqCst) && self.in_flight.load(Ordering::SeqCst) == 0 {
                return Take::ShutdownExhausted;
            }

            if backoff.is_completed() {
                thread::sleep(IDLE_SLEEP);
            } else {
                backoff.snooze();
            }
        }
    }

    /// Mark the queue as completing. Returns `true` only for the first call.
    pub fn begin_shutdown(&self) -> bool {
        !self.completing.swap(true, Ordering::SeqCst)
    }

    pub fn is_completing(&self) -> bool {
        self.completing.load(Ordering::SeqCst)
    }

    /// Number of slots currently acquired or committed
    pub fn len(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many acquisitions had to wait for free capacity
    pub fn pressure_events(&self) -> u64 {
        self.pressure_events.load(Ordering::Relaxed)
    }

    /// Drop every committed slot without processing it. Any flush waiter
    /// attached to a discarded slot is woken with a failure.
    pub(crate) fn discard_ready(&self) -> usize {
        let mut discarded = 0;
        while let Some(taken) = self.try_take() {
            drop(taken);
            discarded += 1;
        }
        discarded
    }

    fn recycle(&self, mut slot: Box<Slot>) {
        slot.record.reset();
        slot.state = SlotState::Free;
        // Pool can be full after an overshoot; surplus slots are freed
        let _ = self.free.push(slot);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for RecordQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordQueue")
            .field("in_flight", &self.len())
            .field("capacity", &self.capacity)
            .field("completing", &self.is_completing())
            .finish()
    }
}

/// A slot held by a producer.
///
/// Dropping the handle without committing releases the slot.
pub struct SlotHandle<'q> {
    queue: &'q RecordQueue,
    slot: Option<Box<Slot>>,
}

impl SlotHandle<'_> {
    /// Publish the slot to the consumer.
    pub fn commit(mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.state = SlotState::Committed;
            self.queue.ready.push(slot);
        }
    }

    pub fn state(&self) -> SlotState {
        self.slot.as_ref().map_or(SlotState::Free, |s| s.state)
    }
}

impl Deref for SlotHandle<'_> {
    type Target = Record;

    fn deref(&self) -> &Record {
        // Only `commit` and `drop` take the slot, both consume the handle
        &self.slot.as_ref().expect("slot present until commit").record
    }
}

impl DerefMut for SlotHandle<'_> {
    fn deref_mut(&mut self) -> &mut Record {
        &mut self.slot.as_mut().expect("slot present until commit").record
    }
}

impl Drop for SlotHandle<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.queue.recycle(slot);
        }
    }
}

/// A committed slot owned by the consumer; recycled on drop.
pub struct TakenSlot<'q> {
    queue: &'q RecordQueue,
    slot: Option<Box<Slot>>,
}

impl TakenSlot<'_> {
    pub fn state(&self) -> SlotState {
        self.slot.as_ref().map_or(SlotState::Free, |s| s.state)
    }
}

impl Deref for TakenSlot<'_> {
    type Target = Record;

    fn deref(&self) -> &Record {
        &self.slot.as_ref().expect("slot present until drop").record
    }
}

impl DerefMut for TakenSlot<'_> {
    fn deref_mut(&mut self) -> &mut Record {
        &mut self.slot.as_mut().expect("slot present until drop").record
    }
}

impl Drop for TakenSlot<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.queue.recycle(slot);
        }
    }
}
