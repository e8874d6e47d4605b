/// Identifies a string committed to the string region of a [`MemoryPool`][crate::MemoryPool].
///
/// The handle stores the offset of the first byte relative to the start of the pool buffer,
/// so it survives the buffer moving to a different address. It is invalidated by
/// [`clear()`][crate::MemoryPool::clear] and [`realloc_pool()`][crate::MemoryPool::realloc_pool].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StringRef {
    offset: usize,
    len: usize,
}

impl StringRef {
    #[must_use]
    pub(crate) const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Offset of the first byte of the string from the start of the pool buffer.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the string in bytes, not counting the terminator.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the string is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Identifies a slot in the slot region of a [`MemoryPool`][crate::MemoryPool].
///
/// Like [`StringRef`], this is an offset from the start of the pool buffer. Because
/// [`shrink_to_fit()`][crate::MemoryPool::shrink_to_fit] moves the slot region, every stored
/// `SlotRef` must be passed through [`Relocation::relocate_slot()`][crate::Relocation::relocate_slot]
/// when the pool is shrunk.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SlotRef {
    offset: usize,
}

impl SlotRef {
    #[must_use]
    pub(crate) const fn new(offset: usize) -> Self {
        Self { offset }
    }

    /// Offset of the slot from the start of the pool buffer.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset
    }
}
