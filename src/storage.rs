//! Storage traits and the default bounded backend.
//!
//! Storage hands out a stable key per inserted value; the list layers its
//! chain on top of those keys instead of pointers, so a stale link can at
//! worst miss, never dangle. Keys stay valid until their slot is removed.
//!
//! Insertion is split by capacity model:
//!
//! ```text
//! Storage<T>           - base trait: get, remove, unchecked access
//!     ├── BoundedStorage<T>   - fixed capacity, try_insert -> Result
//!     └── UnboundedStorage<T> - growable, insert -> Key (infallible)
//! ```
//!
//! [`BoxedStorage`] is the in-crate bounded backend. Enable the `slab`
//! feature to use `slab::Slab` as a growable backend.

use core::mem;

use crate::Key;

/// Slab-like storage with stable keys.
///
/// # Requirements
///
/// An implementation promises that:
/// - a key stays valid until its slot is explicitly removed
/// - insert, remove, and get are O(1)
/// - removed slots become available to later inserts
pub trait Storage<T> {
    /// Key type for this storage.
    type Key: Key;

    /// Removes and returns the value at `key`, if present.
    fn remove(&mut self, key: Self::Key) -> Option<T>;

    /// Returns a reference to the value at `key`, if present.
    fn get(&self, key: Self::Key) -> Option<&T>;

    /// Returns a mutable reference to the value at `key`, if present.
    fn get_mut(&mut self, key: Self::Key) -> Option<&mut T>;

    /// Returns a reference without checking occupancy.
    ///
    /// # Safety
    ///
    /// `key` must be valid and occupied.
    unsafe fn get_unchecked(&self, key: Self::Key) -> &T;

    /// Returns a mutable reference without checking occupancy.
    ///
    /// # Safety
    ///
    /// `key` must be valid and occupied.
    unsafe fn get_unchecked_mut(&mut self, key: Self::Key) -> &mut T;
}

/// Fixed-capacity storage with fallible insertion.
pub trait BoundedStorage<T>: Storage<T> {
    /// Inserts a value, returning its stable key.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if every slot is occupied.
    fn try_insert(&mut self, value: T) -> Result<Self::Key, Full<T>>;
}

/// Growable storage with infallible insertion.
pub trait UnboundedStorage<T>: Storage<T> {
    /// Inserts a value, returning its stable key.
    fn insert(&mut self, value: T) -> Self::Key;
}

/// Error returned when insertion finds no vacant slot.
///
/// Carries the value that did not fit so the caller can recover it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be inserted.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> core::fmt::Display for Full<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "storage is full")
    }
}

impl<T: core::fmt::Debug> std::error::Error for Full<T> {}

// =============================================================================
// BoxedStorage - boxed slot array with a free list threaded through vacancies
// =============================================================================

enum Slot<T, K> {
    Occupied(T),
    Vacant { next_free: K },
}

/// Fixed-capacity storage backed by a single boxed slot array.
///
/// Vacant slots form a LIFO free list threaded through the array, so insert
/// and remove are O(1) and freed slots are reused immediately. Occupancy is
/// encoded in the slot itself; a removed key simply stops resolving.
///
/// # Example
///
/// ```
/// use seqlist::{BoundedStorage, BoxedStorage, Storage};
///
/// let mut slots: BoxedStorage<u64> = BoxedStorage::with_capacity(100);
/// assert_eq!(slots.capacity(), 100);
///
/// let key = slots.try_insert(9)?;
/// assert_eq!(slots.get(key), Some(&9));
/// assert_eq!(slots.remove(key), Some(9));
/// # Ok::<(), seqlist::Full<u64>>(())
/// ```
pub struct BoxedStorage<T, K: Key = u32> {
    slots: Box<[Slot<T, K>]>,
    free_head: K,
    len: usize,
}

impl<T, K: Key> BoxedStorage<T, K> {
    /// Creates storage with exactly `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or is not representable in the key type
    /// (the key's sentinel is reserved).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(
            capacity < K::NONE.as_usize(),
            "capacity exceeds key type maximum"
        );

        Self {
            slots: Self::vacant_slots(capacity),
            free_head: K::from_usize(0),
            len: 0,
        }
    }

    /// Returns the capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slots are occupied.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if all slots are occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Removes all values, making every slot available for reuse.
    ///
    /// # Warning
    ///
    /// Any list still holding keys into this storage is left with stale
    /// links. Clear the list first, or use [`OwnedList`](crate::OwnedList),
    /// which keeps the two in step.
    pub fn clear(&mut self) {
        self.slots = Self::vacant_slots(self.slots.len());
        self.free_head = K::from_usize(0);
        self.len = 0;
    }

    /// Builds a fully vacant slot array, each slot chaining to the next.
    fn vacant_slots(capacity: usize) -> Box<[Slot<T, K>]> {
        (0..capacity)
            .map(|i| Slot::Vacant {
                next_free: if i + 1 == capacity {
                    K::NONE
                } else {
                    K::from_usize(i + 1)
                },
            })
            .collect()
    }
}

impl<T, K: Key> Storage<T> for BoxedStorage<T, K> {
    type Key = K;

    #[inline]
    fn remove(&mut self, key: K) -> Option<T> {
        let i = key.as_usize();
        if !matches!(self.slots.get(i), Some(Slot::Occupied(_))) {
            return None;
        }

        let slot = mem::replace(
            &mut self.slots[i],
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = key;
        self.len -= 1;

        match slot {
            Slot::Occupied(value) => Some(value),
            // Occupancy checked above
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn get(&self, key: K) -> Option<&T> {
        match self.slots.get(key.as_usize()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    fn get_mut(&mut self, key: K) -> Option<&mut T> {
        match self.slots.get_mut(key.as_usize()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    #[inline]
    unsafe fn get_unchecked(&self, key: K) -> &T {
        debug_assert!(matches!(
            self.slots.get(key.as_usize()),
            Some(Slot::Occupied(_))
        ));
        // Safety: caller guarantees the slot is occupied
        match unsafe { self.slots.get_unchecked(key.as_usize()) } {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => unsafe { core::hint::unreachable_unchecked() },
        }
    }

    #[inline]
    unsafe fn get_unchecked_mut(&mut self, key: K) -> &mut T {
        debug_assert!(matches!(
            self.slots.get(key.as_usize()),
            Some(Slot::Occupied(_))
        ));
        // Safety: caller guarantees the slot is occupied
        match unsafe { self.slots.get_unchecked_mut(key.as_usize()) } {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => unsafe { core::hint::unreachable_unchecked() },
        }
    }
}

impl<T, K: Key> BoundedStorage<T> for BoxedStorage<T, K> {
    #[inline]
    fn try_insert(&mut self, value: T) -> Result<K, Full<T>> {
        let key = self.free_head;
        if key.is_none() {
            return Err(Full(value));
        }

        let i = key.as_usize();
        let next_free = match &self.slots[i] {
            Slot::Vacant { next_free } => *next_free,
            Slot::Occupied(_) => unreachable!("free head points at an occupied slot"),
        };

        self.slots[i] = Slot::Occupied(value);
        self.free_head = next_free;
        self.len += 1;

        Ok(key)
    }
}

// =============================================================================
// slab::Slab implementation
// =============================================================================

#[cfg(feature = "slab")]
impl<T> Storage<T> for slab::Slab<T> {
    type Key = usize;

    #[inline]
    fn remove(&mut self, key: usize) -> Option<T> {
        self.try_remove(key)
    }

    #[inline]
    fn get(&self, key: usize) -> Option<&T> {
        self.get(key)
    }

    #[inline]
    fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        self.get_mut(key)
    }

    #[inline]
    unsafe fn get_unchecked(&self, key: usize) -> &T {
        // Safety: caller guarantees the slot is occupied
        unsafe { self.get(key).unwrap_unchecked() }
    }

    #[inline]
    unsafe fn get_unchecked_mut(&mut self, key: usize) -> &mut T {
        // Safety: caller guarantees the slot is occupied
        unsafe { self.get_mut(key).unwrap_unchecked() }
    }
}

#[cfg(feature = "slab")]
impl<T> UnboundedStorage<T> for slab::Slab<T> {
    #[inline]
    fn insert(&mut self, value: T) -> usize {
        self.insert(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_storage() {
        let slots: BoxedStorage<u64> = BoxedStorage::with_capacity(5);
        assert_eq!(slots.capacity(), 5);
        assert_eq!(slots.len(), 0);
        assert!(slots.is_empty());
        assert!(!slots.is_full());
    }

    #[test]
    fn insert_read_update_remove() {
        let mut slots: BoxedStorage<u64> = BoxedStorage::with_capacity(8);

        let key = slots.try_insert(5).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.get(key), Some(&5));

        *slots.get_mut(key).unwrap() += 1;
        assert_eq!(slots.get(key), Some(&6));

        assert_eq!(slots.remove(key), Some(6));
        assert_eq!(slots.get(key), None);
        assert!(slots.is_empty());
    }

    #[test]
    fn exhaustion_hands_value_back() {
        let mut slots: BoxedStorage<u64> = BoxedStorage::with_capacity(3);

        let keys: Vec<_> = (0..3).map(|v| slots.try_insert(v).unwrap()).collect();
        assert!(slots.is_full());

        let err = slots.try_insert(99).unwrap_err();
        assert_eq!(err.into_inner(), 99);

        // The rejected insert disturbed nothing
        for (v, key) in keys.iter().enumerate() {
            assert_eq!(slots.get(*key), Some(&(v as u64)));
        }
    }

    #[test]
    fn freed_slot_is_reused_lifo() {
        let mut slots: BoxedStorage<u64> = BoxedStorage::with_capacity(4);

        let first = slots.try_insert(1).unwrap();
        slots.try_insert(2).unwrap();
        slots.remove(first);

        assert_eq!(slots.try_insert(3).unwrap(), first);
    }

    #[test]
    fn stale_and_bogus_keys_miss() {
        let mut slots: BoxedStorage<u64> = BoxedStorage::with_capacity(4);

        let key = slots.try_insert(8).unwrap();
        slots.remove(key);

        assert_eq!(slots.remove(key), None); // stale: slot already freed
        assert_eq!(slots.get(key), None);
        assert_eq!(slots.get(1000), None); // out of range entirely
        assert_eq!(slots.get(u32::MAX), None); // the sentinel itself
    }

    #[test]
    fn clear_vacates_every_slot() {
        let mut slots: BoxedStorage<u64> = BoxedStorage::with_capacity(4);

        let old = slots.try_insert(1).unwrap();
        slots.try_insert(2).unwrap();
        slots.clear();

        assert!(slots.is_empty());
        assert_eq!(slots.get(old), None);

        for i in 0..4 {
            slots.try_insert(i).unwrap();
        }
        assert!(slots.is_full());
    }

    #[test]
    fn values_drop_with_storage() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROPPED: AtomicUsize = AtomicUsize::new(0);

        #[derive(Debug)]
        struct Token;
        impl Drop for Token {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROPPED.store(0, Ordering::SeqCst);

        {
            let mut slots: BoxedStorage<Token> = BoxedStorage::with_capacity(8);
            let first = slots.try_insert(Token).unwrap();
            slots.try_insert(Token).unwrap();
            slots.try_insert(Token).unwrap();
            slots.try_insert(Token).unwrap();

            slots.remove(first);
            assert_eq!(DROPPED.load(Ordering::SeqCst), 1);
        }

        // The three still stored dropped with the storage
        assert_eq!(DROPPED.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn u16_keys() {
        let mut slots: BoxedStorage<u64, u16> = BoxedStorage::with_capacity(100);

        let key = slots.try_insert(42).unwrap();
        assert_eq!(key, 0u16);
        assert_eq!(slots.get(key), Some(&42));
    }

    #[test]
    fn full_display() {
        let err = Full(7u64);
        assert_eq!(err.to_string(), "storage is full");
    }

    #[cfg(feature = "slab")]
    mod slab_backend {
        use super::*;

        #[test]
        fn trait_surface_matches_inherent_behavior() {
            let mut slots = slab::Slab::new();

            let key = UnboundedStorage::insert(&mut slots, 42);
            assert_eq!(Storage::get(&slots, key), Some(&42));

            assert_eq!(Storage::remove(&mut slots, key), Some(42));
            assert_eq!(Storage::get(&slots, key), None);

            // Slab also reuses freed slots
            let again = UnboundedStorage::insert(&mut slots, 7);
            assert_eq!(again, key);
        }
    }
}
