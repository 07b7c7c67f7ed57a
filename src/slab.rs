//! Slab Allocator - O(1) fixed-capacity pool handing out index handles.
//!
//! Storage is reserved once at startup. Allocation pops the most recently
//! freed slot (still warm in cache) and only falls back to fresh memory past
//! the high-water mark when the free list is empty, so startup cost does not
//! scale with capacity.
//!
//! ```text
//!   [ used | used | free | used | used | fresh | fresh | ... ]
//!                    ^                    ^
//!             free list top        high-water mark
//! ```
//!
//! Handles are plain indices ([`SlabIndex`]); there is no pointer arithmetic.

use std::fmt;

use tracing::error;

use crate::error::SlabError;

/// Opaque handle to a slot in a [`Slab`].
///
/// Using u32 instead of a 64-bit pointer halves the size of every stored
/// reference, which matters for wide tree nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SlabIndex(u32);

impl SlabIndex {
    /// Raw slot number.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Pre-allocated pool of `T` with O(1) allocate and deallocate.
///
/// Not thread-safe: each instance belongs to exactly one pipeline stage.
pub struct Slab<T> {
    /// Slots below the high-water mark; capacity is reserved up front so
    /// pushing never reallocates.
    slots: Vec<T>,
    /// Occupancy per slot (catches double frees).
    occupied: Vec<bool>,
    /// Recycled slot numbers, LIFO.
    free: Vec<u32>,
    capacity: u32,
}

impl<T> Slab<T> {
    /// Create a slab that can hold up to `capacity` live objects.
    ///
    /// # Panics
    /// Panics if capacity is zero.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Slab capacity must be non-zero");

        Self {
            slots: Vec::with_capacity(capacity as usize),
            occupied: Vec::with_capacity(capacity as usize),
            free: Vec::with_capacity(capacity as usize),
            capacity,
        }
    }

    /// Store `value` and return its handle, or report exhaustion.
    ///
    /// # Complexity
    /// O(1) - pops the free list or bumps the high-water mark
    #[inline]
    pub fn try_allocate(&mut self, value: T) -> Result<SlabIndex, SlabError> {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = value;
            self.occupied[index as usize] = true;
            return Ok(SlabIndex(index));
        }

        let index = self.slots.len() as u32;
        if index >= self.capacity {
            return Err(SlabError::Exhausted {
                capacity: self.capacity,
            });
        }
        self.slots.push(value);
        self.occupied.push(true);
        Ok(SlabIndex(index))
    }

    /// Store `value` and return its handle.
    ///
    /// Running out of slots is fatal: the process aborts rather than
    /// continuing with a pool that silently grows or drops state.
    #[inline]
    pub fn allocate(&mut self, value: T) -> SlabIndex {
        match self.try_allocate(value) {
            Ok(index) => index,
            Err(err) => {
                error!(capacity = self.capacity, "{err}; aborting");
                std::process::abort();
            }
        }
    }

    /// Return a slot to the free list.
    ///
    /// The stored value is left in place and overwritten on reuse. Freeing a
    /// slot that is not currently allocated is ignored.
    ///
    /// # Complexity
    /// O(1) - pushes onto the free list
    #[inline]
    pub fn deallocate(&mut self, index: SlabIndex) {
        let slot = index.0 as usize;
        debug_assert!(slot < self.slots.len(), "Index out of bounds");
        debug_assert!(self.occupied[slot], "Double free detected");

        match self.occupied.get_mut(slot) {
            Some(occupied) if *occupied => {
                *occupied = false;
                self.free.push(index.0);
            }
            _ => {}
        }
    }

    /// Get an immutable reference to a live object.
    ///
    /// # Complexity
    /// O(1) - direct array access
    #[inline]
    pub fn get(&self, index: SlabIndex) -> &T {
        debug_assert!(self.occupied[index.0 as usize], "Access to a freed slot");
        &self.slots[index.0 as usize]
    }

    /// Get a mutable reference to a live object.
    #[inline]
    pub fn get_mut(&mut self, index: SlabIndex) -> &mut T {
        debug_assert!(self.occupied[index.0 as usize], "Access to a freed slot");
        &mut self.slots[index.0 as usize]
    }

    /// Number of live objects.
    #[inline]
    pub fn len(&self) -> u32 {
        (self.slots.len() - self.free.len()) as u32
    }

    /// Returns true if no objects are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots ever handed out from fresh memory.
    #[inline]
    pub fn high_water_mark(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Returns true if the next allocation would fail.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty() && self.slots.len() as u32 == self.capacity
    }

    /// Pre-fault the reserved storage (warm-up routine).
    ///
    /// Touches one byte per page of the reserved-but-unused region so the OS
    /// maps it before the hot path needs it. Contents are not observable.
    pub fn warm_up(&mut self) {
        const PAGE: usize = 4096;
        let size = std::mem::size_of::<T>();
        if size == 0 {
            return;
        }

        let spare = self.slots.spare_capacity_mut();
        let bytes = spare.len() * size;
        let base = spare.as_mut_ptr().cast::<u8>();
        for offset in (0..bytes).step_by(PAGE) {
            // SAFETY: `offset < bytes` stays inside the reserved allocation,
            // which is uninitialized storage owned by `slots`.
            // Volatile write to prevent optimization
            unsafe {
                std::ptr::write_volatile(base.add(offset), 0);
            }
        }
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("capacity", &self.capacity)
            .field("live", &self.len())
            .field("high_water_mark", &self.slots.len())
            .field("free", &self.free.len())
            .finish()
    }
}
