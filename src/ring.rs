//! Channel - Lock-free bounded SPSC ring buffer.
//!
//! Every inter-stage link in the pipeline is one of these. A channel is split
//! into a [`Producer`] and a [`Consumer`] handle; each handle is owned by
//! exactly one thread, so the single-producer / single-consumer discipline is
//! enforced by ownership rather than by runtime checks.
//!
//! ```text
//!            tail (producer-owned)          head (consumer-owned)
//!                 |                              |
//!   [ free | free | w | w | w | w | ... | w | r | free ]   (indices wrap)
//! ```
//!
//! Writing is two-phase: [`Producer::claim_write`] hands out the next free
//! slot, the producer fills it in place, and [`Producer::commit_write`]
//! publishes it with a release store. Reading mirrors this with
//! [`Consumer::peek_read`] / [`Consumer::commit_read`]. Full and empty are not
//! errors: they are `None` returns the caller polls on.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pads its contents to a full cache line so the producer and consumer
/// indices never share one.
#[repr(align(64))]
struct CachePadded<T>(T);

struct Shared<T> {
    /// Read index, advanced only by the consumer.
    head: CachePadded<AtomicUsize>,
    /// Write index, advanced only by the producer.
    tail: CachePadded<AtomicUsize>,
    slots: Box<[UnsafeCell<T>]>,
    mask: usize,
}

// SAFETY: a slot is only ever accessed by one side at a time. The producer
// touches slots in [tail, head + capacity) and the consumer touches slots in
// [head, tail); the acquire/release pairs on `head` and `tail` order the
// hand-over between the two.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut T {
        self.slots[index & self.mask].get()
    }
}

/// Create a channel with room for `capacity` records.
///
/// All storage is allocated here; no operation allocates afterwards.
///
/// # Panics
/// Panics if `capacity` is not a power of two.
pub fn channel<T: Copy + Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(
        capacity.is_power_of_two(),
        "channel capacity must be a power of two, got {capacity}"
    );

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(T::default()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        head: CachePadded(AtomicUsize::new(0)),
        tail: CachePadded(AtomicUsize::new(0)),
        slots,
        mask: capacity - 1,
    });

    let producer = Producer {
        shared: Arc::clone(&shared),
        tail: 0,
        cached_head: 0,
        claimed: false,
    };
    let consumer = Consumer {
        shared,
        head: 0,
        cached_tail: 0,
    };
    (producer, consumer)
}

/// Writing end of a channel.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of the write index (only this handle advances it).
    tail: usize,
    /// Last observed read index; refreshed only when the buffer looks full.
    cached_head: usize,
    claimed: bool,
}

impl<T: Copy> Producer<T> {
    /// Claim the next free slot for in-place construction.
    ///
    /// Returns `None` if the buffer is full. The slot holds whatever record
    /// last occupied it; the caller is expected to overwrite every field
    /// before calling [`commit_write`](Self::commit_write). Claiming without
    /// committing leaves the channel unchanged.
    #[inline]
    pub fn claim_write(&mut self) -> Option<&mut T> {
        if self.tail.wrapping_sub(self.cached_head) == self.shared.capacity() {
            self.cached_head = self.shared.head.0.load(Ordering::Acquire);
            if self.tail.wrapping_sub(self.cached_head) == self.shared.capacity() {
                return None;
            }
        }

        self.claimed = true;
        // SAFETY: the buffer is not full, so the slot at `tail` has been
        // released by the consumer (acquire above) and is not visible to it
        // until `commit_write` publishes the new tail.
        Some(unsafe { &mut *self.shared.slot(self.tail) })
    }

    /// Publish the slot handed out by the last [`claim_write`](Self::claim_write).
    ///
    /// A commit without a preceding successful claim is ignored.
    #[inline]
    pub fn commit_write(&mut self) {
        debug_assert!(self.claimed, "commit_write without a claimed slot");
        if !self.claimed {
            return;
        }
        self.claimed = false;
        self.tail = self.tail.wrapping_add(1);
        self.shared.tail.0.store(self.tail, Ordering::Release);
    }

    /// Copy `value` into the channel, handing it back if the buffer is full.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), T> {
        match self.claim_write() {
            Some(slot) => {
                *slot = value;
                self.commit_write();
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Returns true if a write would currently fail.
    #[inline]
    pub fn is_full(&mut self) -> bool {
        if self.tail.wrapping_sub(self.cached_head) < self.shared.capacity() {
            return false;
        }
        self.cached_head = self.shared.head.0.load(Ordering::Acquire);
        self.tail.wrapping_sub(self.cached_head) == self.shared.capacity()
    }

    /// Number of committed records not yet consumed (a snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.tail
            .wrapping_sub(self.shared.head.0.load(Ordering::Acquire))
    }

    /// Returns true if every committed record has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.shared.capacity())
            .field("tail", &self.tail)
            .field("cached_head", &self.cached_head)
            .finish()
    }
}

/// Reading end of a channel.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    /// Local copy of the read index (only this handle advances it).
    head: usize,
    /// Last observed write index; refreshed only when the buffer looks empty.
    cached_tail: usize,
}

impl<T: Copy> Consumer<T> {
    /// Borrow the oldest unread record without consuming it.
    ///
    /// Returns `None` if the buffer is empty.
    #[inline]
    pub fn peek_read(&mut self) -> Option<&T> {
        if self.head == self.cached_tail {
            self.cached_tail = self.shared.tail.0.load(Ordering::Acquire);
            if self.head == self.cached_tail {
                return None;
            }
        }

        // SAFETY: `head < tail` (acquire above), so the producer has published
        // this slot and will not touch it again until `commit_read` releases it.
        Some(unsafe { &*self.shared.slot(self.head) })
    }

    /// Release the record returned by the last [`peek_read`](Self::peek_read).
    ///
    /// A commit on an empty buffer is ignored.
    #[inline]
    pub fn commit_read(&mut self) {
        debug_assert!(self.head != self.cached_tail, "commit_read on an empty channel");
        if self.head == self.cached_tail {
            return;
        }
        self.head = self.head.wrapping_add(1);
        self.shared.head.0.store(self.head, Ordering::Release);
    }

    /// Copy out and consume the oldest record.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let value = *self.peek_read()?;
        self.commit_read();
        Some(value)
    }

    /// Number of records waiting (a snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.shared
            .tail
            .0
            .load(Ordering::Acquire)
            .wrapping_sub(self.head)
    }

    /// Returns true if there is nothing to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.shared.capacity())
            .field("head", &self.head)
            .field("cached_tail", &self.cached_tail)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_channel() {
        let (producer, mut consumer) = channel::<u64>(8);
        assert!(producer.is_empty());
        assert!(consumer.is_empty());
        assert_eq!(consumer.capacity(), 8);
        assert!(consumer.peek_read().is_none());
        assert!(consumer.pop().is_none());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_capacity_must_be_power_of_two() {
        let _ = channel::<u64>(6);
    }

    #[test]
    fn test_fifo_and_capacity_bound() {
        let (mut producer, mut consumer) = channel::<u64>(4);

        for i in 0..4 {
            assert!(producer.push(i * 10).is_ok());
        }
        assert!(producer.is_full());
        assert!(producer.claim_write().is_none(), "Should refuse a fifth write");
        assert_eq!(producer.push(99), Err(99));

        for i in 0..4 {
            assert_eq!(consumer.pop(), Some(i * 10));
        }
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn test_claim_and_commit_in_place() {
        let (mut producer, mut consumer) = channel::<(u32, u32)>(2);

        let slot = producer.claim_write().expect("Should have room");
        slot.0 = 7;
        slot.1 = 11;
        // Not visible until committed
        assert!(consumer.peek_read().is_none());
        producer.commit_write();

        assert_eq!(consumer.peek_read(), Some(&(7, 11)));
        // Peek does not consume
        assert_eq!(consumer.peek_read(), Some(&(7, 11)));
        consumer.commit_read();
        assert!(consumer.peek_read().is_none());
    }

    #[test]
    fn test_claim_without_commit_is_harmless() {
        let (mut producer, mut consumer) = channel::<u32>(2);

        let _ = producer.claim_write();
        let _ = producer.claim_write();
        assert!(consumer.peek_read().is_none());

        producer.push(5).unwrap();
        assert_eq!(consumer.pop(), Some(5));
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn test_wraparound_reuses_slots() {
        let (mut producer, mut consumer) = channel::<u32>(4);

        for round in 0..1000u32 {
            producer.push(round).unwrap();
            producer.push(round + 1).unwrap();
            assert_eq!(consumer.len(), 2);
            assert_eq!(consumer.pop(), Some(round));
            assert_eq!(consumer.pop(), Some(round + 1));
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_cross_thread_transfer_preserves_order() {
        const COUNT: u64 = 200_000;
        let (mut producer, mut consumer) = channel::<u64>(1024);

        let writer = thread::spawn(move || {
            let mut next = 0;
            while next < COUNT {
                if let Some(slot) = producer.claim_write() {
                    *slot = next;
                    producer.commit_write();
                    next += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            match consumer.pop() {
                Some(value) => {
                    assert_eq!(value, expected, "Out-of-order or duplicated record");
                    expected += 1;
                }
                None => std::hint::spin_loop(),
            }
        }

        writer.join().unwrap();
        assert!(consumer.pop().is_none());
    }
}
