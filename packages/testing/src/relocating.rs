use std::alloc::{GlobalAlloc, System};
use std::cell::Cell;
use std::num::NonZero;
use std::ptr::NonNull;

use json_pool::Allocator;

use crate::block_layout;

/// The byte written over every block this allocator gives up.
pub const POISON: u8 = b'#';

/// An allocator that never resizes in place.
///
/// Every reallocation moves the content to a brand new block and fills the old block with
/// [`POISON`] before releasing it, so any stale address into the old block reads garbage
/// instead of silently still working.
///
/// The allocator also counts what it hands out, for leak checks.
#[derive(Debug, Default)]
pub struct RelocatingAllocator {
    live_blocks: Cell<usize>,
    allocations: Cell<usize>,
    reallocations: Cell<usize>,
}

impl RelocatingAllocator {
    /// Creates an allocator with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks handed out and not yet released.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.get()
    }

    /// Number of successful calls to [`Allocator::allocate()`].
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Number of successful calls to [`Allocator::reallocate()`].
    #[must_use]
    pub fn reallocations(&self) -> usize {
        self.reallocations.get()
    }

    fn acquire(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        let layout = block_layout(size)?;

        // SAFETY: The layout has a non-zero size.
        let block = NonNull::new(unsafe { System.alloc(layout) })?;

        self.live_blocks.set(self.live_blocks.get().wrapping_add(1));

        Some(block)
    }

    /// # Safety
    ///
    /// Same as [`Allocator::deallocate()`].
    unsafe fn release(&self, block: NonNull<u8>, size: NonZero<usize>) {
        let layout = block_layout(size).expect("the block was allocated with this layout");

        // SAFETY: Forwarding the guarantees of our caller.
        unsafe {
            System.dealloc(block.as_ptr(), layout);
        }

        self.live_blocks.set(self.live_blocks.get().wrapping_sub(1));
    }
}

impl Allocator for RelocatingAllocator {
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        let block = self.acquire(size)?;
        self.allocations.set(self.allocations.get().wrapping_add(1));
        Some(block)
    }

    unsafe fn deallocate(&self, block: NonNull<u8>, size: NonZero<usize>) {
        // SAFETY: Forwarding the guarantees of our caller.
        unsafe {
            self.release(block, size);
        }
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        let new_block = self.acquire(new_size)?;

        // SAFETY: Both blocks are live and distinct, and each is at least this large.
        unsafe {
            new_block.copy_from_nonoverlapping(block, old_size.min(new_size).get());
        }

        // SAFETY: The caller guarantees the old block is live with old_size bytes.
        unsafe {
            block.write_bytes(POISON, old_size.get());
        }

        // SAFETY: Forwarding the guarantees of our caller. The old block is not used again.
        unsafe {
            self.release(block, old_size);
        }

        self.reallocations
            .set(self.reallocations.get().wrapping_add(1));

        Some(new_block)
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(RelocatingAllocator: Send);
    assert_not_impl_any!(RelocatingAllocator: Sync);

    #[test]
    fn reallocation_always_moves() {
        let allocator = RelocatingAllocator::new();
        let old_size = NonZero::new(64).unwrap();
        let new_size = NonZero::new(16).unwrap();

        let block = allocator.allocate(old_size).unwrap();

        unsafe {
            block.write_bytes(7, old_size.get());

            let moved = allocator.reallocate(block, old_size, new_size).unwrap();
            assert_ne!(moved, block);
            assert_eq!(moved.read(), 7);
            assert_eq!(moved.add(15).read(), 7);

            allocator.deallocate(moved, new_size);
        }

        assert_eq!(allocator.allocations(), 1);
        assert_eq!(allocator.reallocations(), 1);
        assert_eq!(allocator.live_blocks(), 0);
    }
}
