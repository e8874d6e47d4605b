//! The allocation capability a [`MemoryPool`][crate::MemoryPool] draws its buffer from.

use std::alloc::{Layout, alloc, dealloc, realloc};
use std::num::NonZero;
use std::ptr::NonNull;

use crate::ALIGNMENT;

/// Supplies and releases the single buffer owned by a [`MemoryPool`][crate::MemoryPool].
///
/// The pool never bypasses this capability: every byte it uses comes from [`allocate()`] or
/// [`reallocate()`] and goes back through [`deallocate()`].
///
/// Every block returned by an implementation must be aligned to [`ALIGNMENT`]. Sizes requested
/// by the pool are always multiples of [`ALIGNMENT`].
///
/// Failure is reported by returning `None`, never by panicking, so that running out of memory
/// degrades the pool instead of aborting the program.
///
/// [`allocate()`]: Self::allocate
/// [`reallocate()`]: Self::reallocate
/// [`deallocate()`]: Self::deallocate
pub trait Allocator {
    /// Allocates a block of `size` bytes, returning `None` if no memory is available.
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by this allocator.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate()`][Self::allocate] or
    /// [`reallocate()`][Self::reallocate] of this allocator with a current size of `size`,
    /// and must not have been released already.
    unsafe fn deallocate(&self, block: NonNull<u8>, size: NonZero<usize>);

    /// Resizes a block, preserving the first `min(old_size, new_size)` bytes of its content.
    ///
    /// The returned block may live at a different address. On `None`, the original block is
    /// left valid and unchanged.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`allocate()`][Self::allocate] or
    /// [`reallocate()`][Self::reallocate] of this allocator with a current size of `old_size`,
    /// and must not have been released already. If `Some` is returned, `block` must no longer
    /// be used.
    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>>;
}

/// An [`Allocator`] backed by the Rust global allocator.
///
/// This is the allocator used by [`MemoryPool::new()`][crate::MemoryPool::new].
#[derive(Clone, Copy, Debug, Default)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct SystemAllocator;

impl SystemAllocator {
    /// The instance used by pools that are not given a custom allocator.
    pub const INSTANCE: &'static Self = &Self;
}

fn block_layout(size: NonZero<usize>) -> Option<Layout> {
    Layout::from_size_align(size.get(), ALIGNMENT).ok()
}

impl Allocator for SystemAllocator {
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        let layout = block_layout(size)?;

        // SAFETY: The layout has a non-zero size, as guaranteed by NonZero.
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn deallocate(&self, block: NonNull<u8>, size: NonZero<usize>) {
        let layout = block_layout(size)
            .expect("a block of this size was allocated, so its layout must be valid");

        // SAFETY: The caller guarantees the block came from us with this size, and we always
        // allocate with exactly this layout.
        unsafe {
            dealloc(block.as_ptr(), layout);
        }
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        let old_layout = block_layout(old_size)
            .expect("a block of this size was allocated, so its layout must be valid");

        // Rejects sizes that would overflow isize when rounded to the alignment.
        block_layout(new_size)?;

        // SAFETY: The caller guarantees the block came from us with the old layout, the new
        // size is non-zero and was validated to form a valid layout with the same alignment.
        NonNull::new(unsafe { realloc(block.as_ptr(), old_layout, new_size.get()) })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::is_aligned;

    assert_impl_all!(SystemAllocator: Send, Sync, std::fmt::Debug);

    #[test]
    fn allocate_returns_aligned_block() {
        let size = NonZero::new(3 * ALIGNMENT).unwrap();
        let block = SystemAllocator.allocate(size).unwrap();

        assert!(is_aligned(block.as_ptr().addr()));

        unsafe {
            SystemAllocator.deallocate(block, size);
        }
    }

    #[test]
    fn reallocate_preserves_prefix() {
        let old_size = NonZero::new(4 * ALIGNMENT).unwrap();
        let new_size = NonZero::new(ALIGNMENT).unwrap();

        let block = SystemAllocator.allocate(old_size).unwrap();

        unsafe {
            for i in 0..old_size.get() {
                block.add(i).write(u8::try_from(i % 251).unwrap());
            }

            let shrunk = SystemAllocator
                .reallocate(block, old_size, new_size)
                .unwrap();

            assert!(is_aligned(shrunk.as_ptr().addr()));

            for i in 0..new_size.get() {
                assert_eq!(shrunk.add(i).read(), u8::try_from(i % 251).unwrap());
            }

            SystemAllocator.deallocate(shrunk, new_size);
        }
    }

    #[test]
    fn impossible_allocation_fails_without_panic() {
        let size = NonZero::new(usize::MAX).unwrap();
        assert!(SystemAllocator.allocate(size).is_none());
    }
}
