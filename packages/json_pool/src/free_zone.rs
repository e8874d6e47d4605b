use std::any::type_name;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::slice;

use crate::{Allocator, MemoryPool, StringRef, SystemAllocator};

/// Exclusive access to the free space of a [`MemoryPool`], for producing a string in place.
///
/// Obtained from [`MemoryPool::free_zone()`]. Bytes are appended at the start of the free zone
/// and become a string only when [`commit()`][Self::commit] is called. Dropping the guard
/// without committing abandons the bytes: the pool is left as if nothing had been written.
///
/// The guard keeps the pool mutably borrowed, so no other allocation can land in the zone while
/// the string is being produced.
///
/// # Examples
///
/// ```
/// use json_pool::MemoryPool;
///
/// let mut pool = MemoryPool::new(8);
///
/// let mut zone = pool.free_zone();
/// assert_eq!(zone.capacity(), 8);
///
/// // The terminator needs a byte too, so 8 bytes of content do not fit.
/// assert!(zone.write(b"12345678"));
/// assert!(zone.commit().is_none());
/// assert!(pool.overflowed());
/// ```
pub struct FreeZone<'p, 'a, A: Allocator + ?Sized = SystemAllocator> {
    pool: &'p mut MemoryPool<'a, A>,

    /// Number of bytes written at the start of the free zone so far.
    written: usize,

    /// A write did not fit, so the bytes written are not the whole string.
    truncated: bool,
}

impl<'p, 'a, A: Allocator + ?Sized> FreeZone<'p, 'a, A> {
    #[must_use]
    pub(crate) fn new(pool: &'p mut MemoryPool<'a, A>) -> Self {
        Self {
            pool,
            written: 0,
            truncated: false,
        }
    }

    /// Offset from the start of the pool buffer where the free zone begins.
    ///
    /// A committed string gets this offset unless an identical string already existed.
    #[must_use]
    pub fn start(&self) -> usize {
        self.pool.free_zone_start()
    }

    /// Total size of the free zone in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.free()
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Number of bytes that can still be written.
    #[must_use]
    pub fn remaining(&self) -> usize {
        // Cannot underflow: written never exceeds the capacity.
        self.capacity().wrapping_sub(self.written)
    }

    /// Appends `bytes` to the string being produced.
    ///
    /// If `bytes` does not fit in the rest of the zone, nothing is written, the pool is marked
    /// as overflowed and `false` is returned. The string is then incomplete and
    /// [`commit()`][Self::commit] refuses to store it.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            self.truncated = true;
            self.pool.overflow(bytes.len());
            return false;
        }

        if bytes.is_empty() {
            return true;
        }

        let destination = self.pool.free_zone_ptr(self.written);

        // SAFETY: The destination is inside the free zone with at least bytes.len() bytes
        // after it, as checked above. The free zone is not referenced by anything else while
        // we hold the exclusive borrow of the pool.
        unsafe {
            destination.copy_from_nonoverlapping(NonNull::from(bytes).cast::<u8>(), bytes.len());
        }

        // Cannot overflow: bounded by the capacity.
        self.written = self.written.wrapping_add(bytes.len());

        true
    }

    /// Appends a single byte to the string being produced.
    ///
    /// Behaves like [`write()`][Self::write] with a one-byte slice.
    pub fn push(&mut self, byte: u8) -> bool {
        self.write(&[byte])
    }

    /// Returns the unwritten rest of the zone for a producer that writes directly into it.
    ///
    /// After writing, call [`set_written()`][Self::set_written] to account for the bytes.
    #[must_use]
    pub fn spare_capacity_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        let remaining = self.remaining();

        if remaining == 0 {
            return &mut [];
        }

        let spare = self.pool.free_zone_ptr(self.written);

        // SAFETY: The range lies inside the free zone of the owned buffer. MaybeUninit makes no
        // claim about the content, and the exclusive borrow of the guard is held for the
        // lifetime of the returned slice.
        unsafe { slice::from_raw_parts_mut(spare.as_ptr().cast::<MaybeUninit<u8>>(), remaining) }
    }

    /// Sets the number of bytes written at the start of the zone.
    ///
    /// # Safety
    ///
    /// `written` must not exceed [`capacity()`][Self::capacity] and the first `written` bytes of
    /// the zone must have been initialized, either by [`write()`][Self::write] or through
    /// [`spare_capacity_mut()`][Self::spare_capacity_mut].
    pub unsafe fn set_written(&mut self, written: usize) {
        debug_assert!(written <= self.capacity());

        self.written = written;
    }

    /// Terminates the written bytes and commits them to the string region.
    ///
    /// Returns `None` and marks the pool as overflowed if the terminator does not fit. Returns
    /// `None` without storing anything if an earlier write did not fit. With string
    /// deduplication enabled, an identical committed string is returned instead and the written
    /// bytes are abandoned.
    pub fn commit(self) -> Option<StringRef> {
        if self.truncated {
            return None;
        }

        // SAFETY: Every path that advances `written` either wrote those bytes itself or was an
        // unsafe call whose caller vouched for them.
        unsafe { self.pool.commit_free_zone(self.written) }
    }
}

impl<A: Allocator + ?Sized> fmt::Debug for FreeZone<'_, '_, A> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("start", &self.start())
            .field("capacity", &self.capacity())
            .field("written", &self.written)
            .field("truncated", &self.truncated)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use super::*;

    #[test]
    fn commit_terminates_and_advances() {
        let mut pool = MemoryPool::new(64);
        _ = pool.save_string(&b"ab"[..]).unwrap();

        let mut zone = pool.free_zone();
        assert_eq!(zone.start(), 3);
        assert_eq!(zone.capacity(), 61);

        assert!(zone.push(b'x'));
        assert!(zone.write(b"yz"));
        assert_eq!(zone.written(), 3);
        assert_eq!(zone.remaining(), 58);

        let xyz = zone.commit().unwrap();

        assert_eq!(xyz.offset(), 3);
        assert_eq!(pool.string(xyz), b"xyz");
        assert_eq!(pool.size(), 7);
    }

    #[test]
    fn dropping_the_guard_abandons_the_bytes() {
        let mut pool = MemoryPool::new(64);

        {
            let mut zone = pool.free_zone();
            assert!(zone.write(b"abandoned"));
        }

        assert_eq!(pool.size(), 0);

        let kept = pool.save_string(&b"kept"[..]).unwrap();
        assert_eq!(kept.offset(), 0);
    }

    #[test]
    fn write_beyond_zone_overflows() {
        let mut pool = MemoryPool::new(8);

        let mut zone = pool.free_zone();
        assert!(zone.write(b"12345"));
        assert!(!zone.write(b"6789"));
        assert_eq!(zone.written(), 5);

        assert!(zone.commit().is_none());

        assert!(pool.overflowed());
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.free(), 8);
    }

    #[test]
    fn writes_after_a_failed_write_do_not_make_it_committable() {
        let mut pool = MemoryPool::new(16);

        let mut zone = pool.free_zone();
        assert!(!zone.write(&[b'x'; 17]));
        assert!(zone.write(b"short"));
        assert!(zone.commit().is_none());

        assert_eq!(pool.size(), 0);

        // The zone is usable again once the guard is gone.
        let mut zone = pool.free_zone();
        assert!(zone.write(b"fresh"));
        let fresh = zone.commit().unwrap();

        assert_eq!(fresh.offset(), 0);
        assert_eq!(pool.string(fresh), b"fresh");
    }

    #[test]
    fn duplicate_commit_returns_existing_string() {
        let mut pool = MemoryPool::new(64);
        let existing = pool.save_string(&b"dup"[..]).unwrap();
        let usage = pool.size();

        let mut zone = pool.free_zone();
        assert!(zone.write(b"dup"));
        let committed = zone.commit().unwrap();

        assert_eq!(committed, existing);
        assert_eq!(pool.size(), usage);
    }

    #[test]
    fn spare_capacity_can_be_filled_directly() {
        let mut pool = MemoryPool::new(16);

        let mut zone = pool.free_zone();
        assert!(zone.write(b"a"));

        let spare = zone.spare_capacity_mut();
        assert_eq!(spare.len(), 15);
        spare[0].write(b'b');
        spare[1].write(b'c');

        unsafe {
            zone.set_written(3);
        }

        let abc = zone.commit().unwrap();
        assert_eq!(pool.string(abc), b"abc");
    }

    #[test]
    fn zero_capacity_zone_is_empty() {
        let mut pool = MemoryPool::new(0);

        let mut zone = pool.free_zone();
        assert_eq!(zone.capacity(), 0);
        assert!(zone.spare_capacity_mut().is_empty());
        assert!(zone.write(b""));
        assert!(!zone.push(b'x'));
        assert!(zone.commit().is_none());

        assert!(pool.overflowed());
    }
}
