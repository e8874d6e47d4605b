#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-buffer memory pool for JSON documents.
//!
//! This crate provides [`MemoryPool`], an arena that holds every string and every collection
//! entry of one JSON document in a single contiguous buffer, and [`JsonDocument`], a small value
//! layer built on top of it.
//!
//! # Key Features
//!
//! - **One buffer per document**: Strings grow from the bottom, fixed-size slots from the top
//! - **Graceful exhaustion**: Allocations fail with `None` and a sticky overflow flag, never a panic
//! - **String deduplication**: Identical strings are stored once (can be disabled)
//! - **Copy or link**: Strings with `'static` lifetime can be referenced instead of copied
//! - **In-place string production**: A [`FreeZone`] guard writes straight into free pool space
//! - **Shrink to fit**: A finished document can give its unused space back to the allocator
//! - **Pluggable allocator**: The buffer comes from any [`Allocator`] implementation
//! - **Serde output**: [`JsonDocument`] implements `serde::Serialize` and `Display`
//!
//! # Memory layout
//!
//! ```text
//! begin                                       end
//! v                                             v
//! +--------------+---------------+--------------+
//! |  strings...  |    (free)     |   ...slots   |
//! +--------------+---------------+--------------+
//!                ^               ^
//!              left            right
//! ```
//!
//! Strings are stored with a terminating zero byte. Slots are [`SLOT_SIZE`] bytes each and the
//! slot region is always aligned to [`ALIGNMENT`]. The [sizing functions](size_of_array) tell
//! how much capacity a document needs.
//!
//! # Shrinking
//!
//! [`MemoryPool::shrink_to_fit()`] first moves the slot region down to close the free gap, then
//! asks the allocator to shrink the buffer, which may move it. Everything that holds handles into
//! the pool implements [`Relocate`] and is walked with a [`Relocation`] describing the move.
//! [`JsonDocument::shrink_to_fit()`] does this for the whole document.
//!
//! # Example
//!
//! ```
//! use json_pool::{JsonDocument, JsonString, Node, Value, size_of_object, size_of_string};
//!
//! let mut document = JsonDocument::new(size_of_object(2) + size_of_string(5));
//!
//! document.insert(Node::Root, JsonString::linked("sensor"), "gps".into())?;
//! document.insert(Node::Root, JsonString::linked("time"), 1351824120.into())?;
//!
//! assert!(!document.overflowed());
//! assert_eq!(document.to_string(), r#"{"sensor":"gps","time":1351824120}"#);
//! # Ok::<(), json_pool::Error>(())
//! ```
//!
//! # Thread safety
//!
//! Pools and documents are thread-mobile ([`Send`]) when their allocator is [`Sync`] but not
//! thread-safe ([`Sync`]). Share them across threads only behind external synchronization.

mod alignment;
mod allocator;
mod builder;
mod document;
mod error;
mod free_zone;
mod handles;
mod pool;
mod relocation;
mod serialize;
mod sizing;
mod storage;
mod variant;

pub use alignment::*;
pub use allocator::*;
pub use builder::*;
pub use document::*;
pub use error::Error;
pub use free_zone::*;
pub use handles::*;
pub use pool::MemoryPool;
pub use relocation::*;
pub use serialize::serialize_json;
pub use sizing::*;
pub use storage::*;
pub use variant::*;
