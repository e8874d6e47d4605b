use std::any::type_name;
use std::fmt;

use crate::{Allocator, MemoryPool, SystemAllocator};

/// Builder for creating an instance of [`MemoryPool`].
///
/// All settings are optional. By default the pool has a capacity of zero, draws its buffer from
/// the [`SystemAllocator`] and deduplicates strings.
///
/// # Examples
///
/// Using a custom allocator:
///
/// ```
/// use json_pool::{MemoryPool, SystemAllocator};
///
/// let allocator = SystemAllocator;
///
/// let pool = MemoryPool::builder()
///     .capacity(512)
///     .allocator(&allocator)
///     .build();
///
/// assert_eq!(pool.capacity(), 512);
/// ```
#[must_use]
pub struct MemoryPoolBuilder<'a, A: Allocator + ?Sized = SystemAllocator> {
    capacity: usize,
    allocator: &'a A,
    deduplicate_strings: bool,
}

impl MemoryPoolBuilder<'static> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            allocator: SystemAllocator::INSTANCE,
            deduplicate_strings: true,
        }
    }
}

impl<'a, A: Allocator + ?Sized> MemoryPoolBuilder<'a, A> {
    /// Sets the minimum capacity of the pool in bytes.
    ///
    /// The capacity is rounded up to a multiple of [`ALIGNMENT`][crate::ALIGNMENT]. Use the
    /// [sizing functions][crate::size_of_string] to compute what a document needs.
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::{MemoryPool, size_of_object, size_of_string};
    ///
    /// let pool = MemoryPool::builder()
    ///     .capacity(size_of_object(2) + size_of_string(5))
    ///     .build();
    ///
    /// assert!(pool.capacity() >= size_of_object(2) + size_of_string(5));
    /// ```
    #[inline]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the allocator the pool draws its buffer from.
    ///
    /// The pool borrows the allocator for its whole lifetime.
    #[inline]
    pub fn allocator<'b, B: Allocator + ?Sized>(self, allocator: &'b B) -> MemoryPoolBuilder<'b, B> {
        MemoryPoolBuilder {
            capacity: self.capacity,
            allocator,
            deduplicate_strings: self.deduplicate_strings,
        }
    }

    /// Sets whether storing a string that is identical to an already stored string returns the
    /// existing one instead of storing a copy.
    ///
    /// Deduplication scans every committed string on each store. Disabling it makes storing
    /// strings constant-time at the cost of pool space.
    #[inline]
    pub fn deduplicate_strings(mut self, deduplicate: bool) -> Self {
        self.deduplicate_strings = deduplicate;
        self
    }

    /// Creates a new [`MemoryPool`] with the configured settings.
    ///
    /// If the allocator cannot supply the buffer, the pool is created with a capacity of zero.
    #[must_use]
    #[inline]
    pub fn build(self) -> MemoryPool<'a, A> {
        MemoryPool::new_inner(self.capacity, self.allocator, self.deduplicate_strings)
    }
}

impl<A: Allocator + ?Sized> fmt::Debug for MemoryPoolBuilder<'_, A> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .field("allocator", &type_name::<A>())
            .field("deduplicate_strings", &self.deduplicate_strings)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::ALIGNMENT;

    assert_impl_all!(MemoryPoolBuilder<'static>: Send, Sync, fmt::Debug);

    #[test]
    fn defaults() {
        let pool = MemoryPool::builder().build();

        assert_eq!(pool.capacity(), 0);
        assert!(pool.deduplicates_strings());
    }

    #[test]
    fn settings_reach_the_pool() {
        let pool = MemoryPool::builder()
            .capacity(ALIGNMENT * 3)
            .deduplicate_strings(false)
            .build();

        assert_eq!(pool.capacity(), ALIGNMENT * 3);
        assert!(!pool.deduplicates_strings());
    }

    #[test]
    fn allocator_keeps_other_settings() {
        let allocator = SystemAllocator;

        let pool = MemoryPool::builder()
            .capacity(100)
            .deduplicate_strings(false)
            .allocator(&allocator)
            .build();

        assert!(pool.capacity() >= 100);
        assert!(!pool.deduplicates_strings());
        assert!(std::ptr::eq(pool.allocator(), &allocator));
    }
}
