use std::alloc::{GlobalAlloc, System};
use std::cell::Cell;
use std::num::NonZero;
use std::ptr::NonNull;

use json_pool::Allocator;

use crate::block_layout;

/// An allocator that fails on request.
///
/// Until told otherwise it behaves like the system allocator. Failures are switched on and off
/// separately for allocation and reallocation.
#[derive(Debug, Default)]
pub struct FlakyAllocator {
    fail_allocate: Cell<bool>,
    fail_reallocate: Cell<bool>,
}

impl FlakyAllocator {
    /// Creates an allocator that does not fail yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether [`Allocator::allocate()`] fails.
    pub fn fail_allocate(&self, fail: bool) {
        self.fail_allocate.set(fail);
    }

    /// Sets whether [`Allocator::reallocate()`] fails.
    pub fn fail_reallocate(&self, fail: bool) {
        self.fail_reallocate.set(fail);
    }
}

impl Allocator for FlakyAllocator {
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        if self.fail_allocate.get() {
            return None;
        }

        let layout = block_layout(size)?;

        // SAFETY: The layout has a non-zero size.
        NonNull::new(unsafe { System.alloc(layout) })
    }

    unsafe fn deallocate(&self, block: NonNull<u8>, size: NonZero<usize>) {
        let layout = block_layout(size).expect("the block was allocated with this layout");

        // SAFETY: Forwarding the guarantees of our caller.
        unsafe {
            System.dealloc(block.as_ptr(), layout);
        }
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        if self.fail_reallocate.get() {
            return None;
        }

        let layout = block_layout(old_size).expect("the block was allocated with this layout");
        block_layout(new_size)?;

        // SAFETY: Forwarding the guarantees of our caller. The new size forms a valid layout
        // with the same alignment, as checked above.
        NonNull::new(unsafe { System.realloc(block.as_ptr(), layout, new_size.get()) })
    }
}
