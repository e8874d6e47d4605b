#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the `json_pool` package.
//!
//! The allocators here draw memory straight from [`std::alloc::System`], bypassing the global
//! allocator, so that tests which install a tracking global allocator only see allocations the
//! pool makes on its own.

mod flaky;
mod relocating;

pub use flaky::*;
pub use relocating::*;

use std::alloc::Layout;
use std::num::NonZero;

use json_pool::ALIGNMENT;

/// The layout every pool block is allocated with.
fn block_layout(size: NonZero<usize>) -> Option<Layout> {
    Layout::from_size_align(size.get(), ALIGNMENT).ok()
}
