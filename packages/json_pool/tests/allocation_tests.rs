//! Verifies that the pool draws memory only from the allocator it was given.
//!
//! The test allocators bypass the global allocator, so with a tracking global allocator
//! installed, any byte it observes was allocated behind the back of the pool allocator.

#![cfg(not(miri))] // Miri replaces the global allocator, so cannot be used here.

use alloc_tracker::{Allocator, Session};
use json_pool::{JsonDocument, JsonString, MemoryPool, Node, Value};
use testing::RelocatingAllocator;

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

#[test]
fn building_and_shrinking_uses_only_the_pool_allocator() {
    let session = Session::new();
    let pool_allocator = RelocatingAllocator::new();

    let allocs_op = session.operation("build_and_shrink");

    {
        let _span = allocs_op.measure_thread();

        let mut document = JsonDocument::with_allocator(2048, &pool_allocator);

        let list = document
            .insert(Node::Root, JsonString::linked("list"), Value::Array)
            .unwrap();

        for value in 0..16 {
            _ = document.add(list, Value::Integer(value)).unwrap();
        }

        _ = document
            .insert(
                Node::Root,
                JsonString::copied("name"),
                JsonString::copied("pool").into(),
            )
            .unwrap();

        document.shrink_to_fit().unwrap();
        document.clear();
    }

    assert_eq!(allocs_op.total_bytes_allocated(), 0);
    assert_eq!(pool_allocator.live_blocks(), 0);
    assert_eq!(pool_allocator.reallocations(), 1);
}

#[test]
fn default_pool_uses_the_global_allocator() {
    let session = Session::new();

    let allocs_op = session.operation("default_pool");

    {
        let _span = allocs_op.measure_thread();

        let mut pool = MemoryPool::new(1024);
        _ = pool.save_string(&b"text"[..]).unwrap();
    }

    assert_eq!(allocs_op.total_bytes_allocated(), 1024);
}
