use std::any::type_name;
use std::num::NonZero;
use std::ptr::NonNull;
use std::{fmt, mem, slice};

use tracing::{debug, trace};

use crate::error::Result;
use crate::{
    Allocator, Error, FreeZone, MemoryPoolBuilder, Relocate, Relocation, SLOT_SIZE, Slot, SlotRef,
    StringRef, SystemAllocator, align_up, is_aligned,
};

/// A fixed-capacity memory pool holding the strings and slots of one JSON document.
///
/// The pool owns a single contiguous buffer obtained from an [`Allocator`]. Strings are
/// allocated from the bottom of the buffer upward, slots from the top downward, and the two
/// regions grow toward each other:
///
/// ```text
/// begin                                       end
/// v                                             v
/// +--------------+---------------+--------------+
/// |  strings...  |    (free)     |   ...slots   |
/// +--------------+---------------+--------------+
///                ^               ^
///              left            right
/// ```
///
/// # Exhaustion
///
/// Allocations never panic when the pool is full. They return `None` and set the sticky
/// [`overflowed()`][Self::overflowed] flag, which stays set until [`clear()`][Self::clear].
///
/// # Handles
///
/// Allocations are identified by [`StringRef`] and [`SlotRef`] handles, which are offsets into
/// the buffer rather than addresses. [`shrink_to_fit()`][Self::shrink_to_fit] moves the slot
/// region and possibly the whole buffer; the value layer that owns the handles is told how to
/// rebase them through the [`Relocate`] trait.
///
/// # Examples
///
/// ```
/// use json_pool::{MemoryPool, SLOT_SIZE};
///
/// let mut pool = MemoryPool::new(1024);
///
/// let hello = pool.save_string(&b"hello"[..]).unwrap();
/// let again = pool.save_string(&b"hello"[..]).unwrap();
///
/// // Identical strings are stored once.
/// assert_eq!(hello, again);
/// assert_eq!(pool.string(hello), b"hello");
///
/// let _slot = pool.alloc_variant().unwrap();
/// assert_eq!(pool.size(), 6 + SLOT_SIZE);
///
/// // Compact the buffer down to what is in use. Nothing references the slot, so there is
/// // nothing to rebase.
/// let reclaimed = pool.shrink_to_fit(&mut ()).unwrap();
/// assert!(reclaimed > 0);
/// assert_eq!(pool.string(hello), b"hello");
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) if its allocator is [`Sync`], but it is not
/// thread-safe ([`Sync`]).
pub struct MemoryPool<'a, A: Allocator + ?Sized = SystemAllocator> {
    allocator: &'a A,

    /// The owned block, or `None` in the zero-capacity state. `begin` is offset 0 of this block.
    buffer: Option<NonNull<u8>>,

    /// End of the committed string region.
    left: usize,

    /// Start of the committed slot region. Always a multiple of `ALIGNMENT`.
    right: usize,

    /// Size of the owned block. Always a multiple of `ALIGNMENT`.
    end: usize,

    overflowed: bool,

    deduplicate_strings: bool,
}

impl MemoryPool<'static> {
    /// Creates a pool of at least `capacity` bytes using the [`SystemAllocator`].
    ///
    /// The capacity is rounded up to a multiple of [`ALIGNMENT`][crate::ALIGNMENT]. If the
    /// capacity is zero or the memory cannot be allocated, the pool is created empty (with a
    /// capacity of zero) instead of failing.
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::{ALIGNMENT, MemoryPool};
    ///
    /// let pool = MemoryPool::new(1);
    /// assert_eq!(pool.capacity(), ALIGNMENT);
    ///
    /// let pool = MemoryPool::new(0);
    /// assert_eq!(pool.capacity(), 0);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Creates a builder for configuring and constructing a [`MemoryPool`].
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::MemoryPool;
    ///
    /// let pool = MemoryPool::builder()
    ///     .capacity(4096)
    ///     .deduplicate_strings(false)
    ///     .build();
    ///
    /// assert_eq!(pool.capacity(), 4096);
    /// assert!(!pool.deduplicates_strings());
    /// ```
    #[inline]
    pub fn builder() -> MemoryPoolBuilder<'static> {
        MemoryPoolBuilder::new()
    }
}

impl<'a, A: Allocator + ?Sized> MemoryPool<'a, A> {
    #[must_use]
    pub(crate) fn new_inner(capacity: usize, allocator: &'a A, deduplicate_strings: bool) -> Self {
        let mut pool = Self::empty(allocator, deduplicate_strings);
        pool.alloc_pool(capacity);
        pool
    }

    #[must_use]
    fn empty(allocator: &'a A, deduplicate_strings: bool) -> Self {
        Self {
            allocator,
            buffer: None,
            left: 0,
            right: 0,
            end: 0,
            overflowed: false,
            deduplicate_strings,
        }
    }

    /// Allocates a fresh buffer. Any previous buffer must already have been released.
    fn alloc_pool(&mut self, requested: usize) {
        debug_assert!(self.buffer.is_none());

        self.left = 0;
        self.right = 0;
        self.end = 0;

        let Some(capacity) = align_up(requested) else {
            debug!(
                requested,
                "memory pool capacity is too large to align, the pool is empty"
            );
            return;
        };

        let Some(capacity) = NonZero::new(capacity) else {
            return;
        };

        match self.allocator.allocate(capacity) {
            Some(block) => {
                debug_assert!(
                    is_aligned(block.as_ptr().addr()),
                    "allocator returned a misaligned block"
                );

                self.buffer = Some(block);
                self.right = capacity.get();
                self.end = capacity.get();

                trace!(capacity = capacity.get(), "memory pool buffer allocated");
            }
            None => {
                debug!(
                    capacity = capacity.get(),
                    "allocator could not supply the memory pool buffer, the pool is empty"
                );
            }
        }

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// Returns the owned buffer to the allocator and enters the zero-capacity state.
    fn release_buffer(&mut self) {
        if let Some(block) = self.buffer.take() {
            let size = NonZero::new(self.end).expect("an owned buffer always has a non-zero size");

            // SAFETY: The block was obtained from this allocator with a current size of
            // `self.end` and we have just given up our only reference to it.
            unsafe {
                self.allocator.deallocate(block, size);
            }
        }

        self.left = 0;
        self.right = 0;
        self.end = 0;
    }

    /// Moves the buffer and the state of this pool into a new pool, leaving this pool empty.
    ///
    /// The returned pool uses the same allocator. This pool keeps its allocator and
    /// configuration, behaves as a zero-capacity pool and can be dropped or reused.
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::MemoryPool;
    ///
    /// let mut source = MemoryPool::new(256);
    /// let hello = source.save_string(&b"hello"[..]).unwrap();
    ///
    /// let target = source.take();
    ///
    /// assert_eq!(source.capacity(), 0);
    /// assert_eq!(target.capacity(), 256);
    /// assert_eq!(target.string(hello), b"hello");
    /// ```
    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = Self::empty(self.allocator, self.deduplicate_strings);
        mem::replace(self, empty)
    }

    /// Discards all content and replaces the buffer with one of at least `required` bytes.
    ///
    /// When the rounded-up size equals the current capacity, the existing buffer is kept. All
    /// handles issued so far become invalid and the overflow flag is reset. Use this to grow a
    /// pool that overflowed before rebuilding its content from scratch.
    pub fn realloc_pool(&mut self, required: usize) {
        if align_up(required) == Some(self.capacity()) {
            self.clear();
            return;
        }

        self.release_buffer();
        self.alloc_pool(required);
        self.overflowed = false;
    }

    /// The allocator this pool draws its buffer from.
    #[must_use]
    pub fn allocator(&self) -> &'a A {
        self.allocator
    }

    /// Whether [`save_string()`][Self::save_string] and [`FreeZone::commit()`] return an
    /// existing identical string instead of storing a duplicate.
    #[must_use]
    pub fn deduplicates_strings(&self) -> bool {
        self.deduplicate_strings
    }

    /// The size of the buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.end
    }

    /// The number of bytes in use by committed strings and slots.
    #[must_use]
    pub fn size(&self) -> usize {
        // Cannot overflow: both terms are parts of the buffer, which fits in memory.
        self.left.wrapping_add(self.end.wrapping_sub(self.right))
    }

    /// The number of bytes between the string region and the slot region.
    #[must_use]
    pub fn free(&self) -> usize {
        // Cannot underflow: left <= right is an invariant.
        self.right.wrapping_sub(self.left)
    }

    /// Whether an allocation has failed since the pool was created or last cleared.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Sets the overflow flag.
    ///
    /// This is for layers built on the pool that detect truncation of their own, for example a
    /// producer whose input did not fit in the [free zone][Self::free_zone].
    pub fn mark_overflowed(&mut self) {
        self.overflow(0);
    }

    pub(crate) fn overflow(&mut self, requested: usize) {
        if !self.overflowed {
            debug!(
                requested,
                free = self.free(),
                capacity = self.capacity(),
                "memory pool overflowed"
            );
        }

        self.overflowed = true;
    }

    /// Whether `bytes` more bytes fit between the string region and the slot region.
    #[must_use]
    pub fn can_alloc(&self, bytes: usize) -> bool {
        self.left
            .checked_add(bytes)
            .is_some_and(|required_end| required_end <= self.right)
    }

    /// Whether `ptr` points into the buffer of this pool.
    ///
    /// The value layer uses this to tell pool-managed strings apart from linked strings
    /// that live in memory owned by the caller.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.buffer.is_some_and(|block| {
            let begin = block.as_ptr().addr();
            let address = ptr.addr();

            // The subtraction is guarded by the comparison before it.
            address >= begin && address.wrapping_sub(begin) < self.end
        })
    }

    /// Forgets all strings and slots and resets the overflow flag, keeping the buffer.
    ///
    /// All handles issued so far become invalid.
    pub fn clear(&mut self) {
        self.left = 0;
        self.right = self.end;
        self.overflowed = false;

        trace!(capacity = self.capacity(), "memory pool cleared");
    }

    /// Reserves one slot at the top of the free zone and initializes it to a null slot.
    ///
    /// Returns `None` and sets the overflow flag if there is no room left.
    pub fn alloc_variant(&mut self) -> Option<SlotRef> {
        if !self.can_alloc(SLOT_SIZE) {
            self.overflow(SLOT_SIZE);
            return None;
        }

        // Cannot underflow: can_alloc() guarantees left + SLOT_SIZE <= right.
        self.right = self.right.wrapping_sub(SLOT_SIZE);

        let slot = SlotRef::new(self.right);
        let slot_ptr = self.slot_ptr(slot);

        // SAFETY: slot_ptr() checked that the slot lies within the slot region of the owned
        // block and is aligned for Slot. The memory is not referenced by anything else.
        unsafe {
            slot_ptr.write(Slot::default());
        }

        #[cfg(debug_assertions)]
        self.integrity_check();

        Some(slot)
    }

    /// Returns a reference to a slot previously reserved by [`alloc_variant()`][Self::alloc_variant].
    ///
    /// # Panics
    ///
    /// Panics if the handle does not identify a slot in the slot region of this pool.
    #[must_use]
    pub fn slot(&self, slot: SlotRef) -> &Slot {
        let slot_ptr = self.slot_ptr(slot);

        // SAFETY: slot_ptr() checked the handle lies within the slot region, where every slot
        // was initialized by alloc_variant(). Shared access is tied to &self.
        unsafe { slot_ptr.as_ref() }
    }

    /// Returns an exclusive reference to a slot previously reserved by
    /// [`alloc_variant()`][Self::alloc_variant].
    ///
    /// # Panics
    ///
    /// Panics if the handle does not identify a slot in the slot region of this pool.
    #[must_use]
    pub fn slot_mut(&mut self, slot: SlotRef) -> &mut Slot {
        let mut slot_ptr = self.slot_ptr(slot);

        // SAFETY: slot_ptr() checked the handle lies within the slot region, where every slot
        // was initialized by alloc_variant(). Exclusive access is tied to &mut self.
        unsafe { slot_ptr.as_mut() }
    }

    fn slot_ptr(&self, slot: SlotRef) -> NonNull<Slot> {
        let offset = slot.offset();

        assert!(
            offset >= self.right
                && offset
                    .checked_add(SLOT_SIZE)
                    .is_some_and(|slot_end| slot_end <= self.end)
                && is_aligned(offset),
            "slot handle {offset} is outside the slot region [{}, {}) of the pool",
            self.right,
            self.end
        );

        self.byte_ptr(offset).cast::<Slot>()
    }

    /// Returns a pointer `offset` bytes into the owned block.
    fn byte_ptr(&self, offset: usize) -> NonNull<u8> {
        let block = self
            .buffer
            .expect("pool memory is only addressed while the pool owns a buffer");

        assert!(
            offset <= self.end,
            "offset {offset} is beyond the end of a pool of capacity {}",
            self.end
        );

        // SAFETY: The offset is within the owned block or one past its end.
        unsafe { block.add(offset) }
    }

    /// Copies `bytes` into the string region, followed by a terminator.
    ///
    /// Returns `None` without touching the pool if `bytes` is `None`. If deduplication is
    /// enabled and an identical string was already committed, that string is returned instead
    /// and nothing is written. Returns `None` and sets the overflow flag if there is no room.
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::MemoryPool;
    ///
    /// let mut pool = MemoryPool::new(16);
    ///
    /// assert!(pool.save_string(None).is_none());
    /// assert!(!pool.overflowed());
    ///
    /// let abc = pool.save_string(&b"abc"[..]).unwrap();
    /// assert_eq!(pool.size(), 4);
    /// assert_eq!(pool.string(abc), b"abc");
    /// ```
    pub fn save_string<'b>(&mut self, bytes: impl Into<Option<&'b [u8]>>) -> Option<StringRef> {
        let bytes = bytes.into()?;

        if self.deduplicate_strings {
            if let Some(existing) = self.find_string(bytes) {
                return Some(existing);
            }
        }

        let len = bytes.len();

        let Some(required) = len.checked_add(1) else {
            self.overflow(len);
            return None;
        };

        if !self.can_alloc(required) {
            self.overflow(required);
            return None;
        }

        let offset = self.left;
        let destination = self.byte_ptr(offset);

        // SAFETY: can_alloc() guarantees [left, left + len + 1) is free space inside the owned
        // block. The source cannot overlap it: it is a shared borrow that cannot point into
        // memory we are mutably borrowed for.
        unsafe {
            destination.copy_from_nonoverlapping(NonNull::from(bytes).cast::<u8>(), len);
        }

        self.terminate_string(offset, len);

        Some(StringRef::new(offset, len))
    }

    /// Writes the terminator after a string of `len` bytes at `offset` and commits it.
    fn terminate_string(&mut self, offset: usize, len: usize) {
        debug_assert_eq!(offset, self.left);

        // Cannot overflow: the caller checked can_alloc(len + 1).
        let terminator_offset = offset.wrapping_add(len);
        let terminator = self.byte_ptr(terminator_offset);

        // SAFETY: The terminator position is inside the free space reserved by can_alloc().
        unsafe {
            terminator.write(0);
        }

        self.left = terminator_offset.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// Finds a committed string identical to `bytes`.
    ///
    /// This is a linear scan of the string region: every committed entry is compared in turn.
    fn find_string(&self, bytes: &[u8]) -> Option<StringRef> {
        let region = self.committed_strings();
        let len = bytes.len();

        let mut start = 0_usize;

        loop {
            let candidate_end = start.checked_add(len)?;

            // The terminator must be committed too, otherwise no entry of this length remains.
            let terminator = region.get(candidate_end)?;

            if *terminator == 0 && region.get(start..candidate_end) == Some(bytes) {
                return Some(StringRef::new(start, len));
            }

            // Jump past the terminator of the entry that begins at `start`.
            let entry_len = region.get(start..)?.iter().position(|byte| *byte == 0)?;
            start = start.checked_add(entry_len)?.checked_add(1)?;
        }
    }

    /// The committed string region `[begin, left)`.
    fn committed_strings(&self) -> &[u8] {
        if self.left == 0 {
            return &[];
        }

        let begin = self.byte_ptr(0);

        // SAFETY: Every byte in [0, left) was written by save_string() or a free zone commit,
        // and stays untouched until clear() or realloc_pool(), which need &mut self.
        unsafe { slice::from_raw_parts(begin.as_ptr(), self.left) }
    }

    /// Returns the bytes of a committed string, without its terminator.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not identify a committed string of this pool.
    #[must_use]
    pub fn string(&self, string: StringRef) -> &[u8] {
        let region = self.committed_strings();

        string
            .offset()
            .checked_add(string.len())
            .and_then(|end| region.get(string.offset()..end))
            .unwrap_or_else(|| {
                panic!(
                    "string handle {string:?} is outside the string region [0, {}) of the pool",
                    self.left
                )
            })
    }

    /// Starts writing a string directly into the free space of the pool.
    ///
    /// This avoids first building the string in a temporary buffer. The returned guard
    /// borrows the pool exclusively until the string is [committed][FreeZone::commit] or
    /// abandoned, so nothing else can touch the pool while the bytes are being written.
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::MemoryPool;
    ///
    /// let mut pool = MemoryPool::new(64);
    ///
    /// let mut zone = pool.free_zone();
    /// assert_eq!(zone.start(), 0);
    /// assert!(zone.write(b"hello "));
    /// assert!(zone.write(b"world"));
    /// let greeting = zone.commit().unwrap();
    ///
    /// assert_eq!(pool.string(greeting), b"hello world");
    /// ```
    pub fn free_zone(&mut self) -> FreeZone<'_, 'a, A> {
        FreeZone::new(self)
    }

    /// The offset where the free zone begins.
    pub(crate) fn free_zone_start(&self) -> usize {
        self.left
    }

    /// Returns a pointer into the free zone, `offset` bytes past its start.
    pub(crate) fn free_zone_ptr(&self, offset: usize) -> NonNull<u8> {
        assert!(
            offset <= self.free(),
            "offset {offset} is beyond the free zone of {} bytes",
            self.free()
        );

        // Cannot overflow: bounded by right, checked above.
        self.byte_ptr(self.left.wrapping_add(offset))
    }

    /// Commits `len` bytes written at the start of the free zone as a string.
    ///
    /// # Safety
    ///
    /// `len` bytes at the start of the free zone must have been initialized, with no other
    /// mutation of the pool since they were written.
    pub(crate) unsafe fn commit_free_zone(&mut self, len: usize) -> Option<StringRef> {
        if self.deduplicate_strings {
            let written: &[u8] = if len == 0 {
                &[]
            } else {
                let start = self.free_zone_ptr(0);

                // SAFETY: The caller guarantees `len` initialized bytes at the start of the free
                // zone, and free_zone_ptr() checked the zone lies inside the owned block.
                unsafe { slice::from_raw_parts(start.as_ptr(), len) }
            };

            if let Some(existing) = self.find_string(written) {
                trace!(
                    len,
                    "duplicate string abandoned in the free zone of the memory pool"
                );
                return Some(existing);
            }
        }

        let Some(required) = len.checked_add(1) else {
            self.overflow(len);
            return None;
        };

        if !self.can_alloc(required) {
            self.overflow(required);
            return None;
        }

        let offset = self.left;
        self.terminate_string(offset, len);

        Some(StringRef::new(offset, len))
    }

    /// Compacts the buffer and shrinks it to the minimum size holding the current content.
    ///
    /// The gap between the string region and the slot region is squashed by moving the slot
    /// region down, then the allocator is asked to shrink the buffer (which may move it). Once
    /// the pool is in its final state, `root` is asked to rebase the handles it holds, with a
    /// [`Relocation`] describing both moves.
    ///
    /// Returns the number of bytes reclaimed. If there is no gap to squash this is a no-op
    /// returning zero, so calling this twice in a row has the same effect as calling it once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReallocationFailed`] if the allocator refuses to reallocate the buffer.
    /// The pool is then left exactly as it was before the call and `root` is not touched.
    pub fn shrink_to_fit<R: Relocate + ?Sized>(&mut self, root: &mut R) -> Result<usize> {
        let old_capacity = self.capacity();

        let reclaimed = self.squash();

        if reclaimed == 0 {
            return Ok(0);
        }

        let old_block = self
            .buffer
            .expect("reclaiming bytes implies the pool owns a buffer");
        let old_size =
            NonZero::new(old_capacity).expect("reclaiming bytes implies a non-zero capacity");

        let base_delta = if let Some(new_size) = NonZero::new(self.end) {
            // SAFETY: The block came from this allocator with a current size of old_capacity.
            let reallocated = unsafe { self.allocator.reallocate(old_block, old_size, new_size) };

            let Some(new_block) = reallocated else {
                self.unsquash(reclaimed);

                debug!(
                    capacity = old_capacity,
                    requested = new_size.get(),
                    "allocator refused to shrink the memory pool buffer"
                );

                return Err(Error::ReallocationFailed {
                    requested: new_size.get(),
                });
            };

            debug_assert!(
                is_aligned(new_block.as_ptr().addr()),
                "allocator returned a misaligned block"
            );

            self.buffer = Some(new_block);

            address_delta(old_block, new_block)
        } else {
            // Nothing is left in the pool, so there is nothing to keep a buffer for. The cursors
            // are already all zero after the squash.
            self.buffer = None;

            // SAFETY: The block came from this allocator with a current size of old_capacity and
            // we have just given up our only reference to it.
            unsafe {
                self.allocator.deallocate(old_block, old_size);
            }

            0
        };

        #[cfg(debug_assertions)]
        self.integrity_check();

        trace!(
            reclaimed,
            capacity = self.capacity(),
            base_delta,
            "memory pool shrunk to fit"
        );

        root.relocate(self, &Relocation::new(base_delta, reclaimed));

        Ok(reclaimed)
    }

    /// Moves the slot region down to the first aligned offset after the string region.
    ///
    /// Returns the number of bytes the slot region moved, zero if it was already there.
    fn squash(&mut self) -> usize {
        let new_right = align_up(self.left)
            .expect("left is bounded by an aligned capacity, so rounding it up cannot overflow");

        if new_right >= self.right {
            return 0;
        }

        // Cannot underflow: right <= end is an invariant.
        let slot_bytes = self.end.wrapping_sub(self.right);

        let source = self.byte_ptr(self.right);
        let destination = self.byte_ptr(new_right);

        // SAFETY: Both ranges lie inside the owned block: the source is the slot region and the
        // destination starts below it. The ranges may overlap, which copy_to() permits.
        unsafe {
            source.copy_to(destination, slot_bytes);
        }

        // Cannot underflow: new_right < right, checked above.
        let reclaimed = self.right.wrapping_sub(new_right);

        self.right = new_right;
        // Cannot overflow: the result is below the old end.
        self.end = new_right.wrapping_add(slot_bytes);

        reclaimed
    }

    /// Reverts a [`squash()`][Self::squash] of `reclaimed` bytes whose reallocation failed.
    fn unsquash(&mut self, reclaimed: usize) {
        let slot_bytes = self.end.wrapping_sub(self.right);

        // Cannot overflow: these are the values before the squash.
        let old_right = self.right.wrapping_add(reclaimed);
        self.end = self.end.wrapping_add(reclaimed);

        let source = self.byte_ptr(self.right);
        let destination = self.byte_ptr(old_right);

        // SAFETY: The block still has its old size because the reallocation failed. The slot
        // region moves back up to where it was, which copy_to() permits despite the overlap.
        unsafe {
            source.copy_to(destination, slot_bytes);
        }

        self.right = old_right;

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        assert!(
            self.left <= self.right,
            "left {} is above right {}",
            self.left,
            self.right
        );
        assert!(
            self.right <= self.end,
            "right {} is above end {}",
            self.right,
            self.end
        );
        assert!(is_aligned(self.right), "right {} is misaligned", self.right);
        assert!(is_aligned(self.end), "end {} is misaligned", self.end);

        match self.buffer {
            Some(block) => {
                assert!(self.end > 0, "an owned buffer must have a non-zero size");
                assert!(
                    is_aligned(block.as_ptr().addr()),
                    "buffer {block:?} is misaligned"
                );
            }
            None => {
                assert!(
                    self.left == 0 && self.right == 0 && self.end == 0,
                    "a pool without a buffer must have all cursors at zero"
                );
            }
        }
    }
}

/// The distance from `old` to `new` in bytes.
fn address_delta(old: NonNull<u8>, new: NonNull<u8>) -> isize {
    #[expect(
        clippy::cast_possible_wrap,
        reason = "two's complement wrap-around of the difference is the signed distance"
    )]
    let delta = new.as_ptr().addr().wrapping_sub(old.as_ptr().addr()) as isize;

    delta
}

impl<A: Allocator + ?Sized> Drop for MemoryPool<'_, A> {
    fn drop(&mut self) {
        self.release_buffer();
    }
}

impl<A: Allocator + ?Sized> fmt::Debug for MemoryPool<'_, A> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("buffer", &self.buffer)
            .field("left", &self.left)
            .field("right", &self.right)
            .field("end", &self.end)
            .field("overflowed", &self.overflowed)
            .field("deduplicate_strings", &self.deduplicate_strings)
            .finish_non_exhaustive()
    }
}

// SAFETY: The pool exclusively owns its buffer and the buffer only ever holds bytes, offsets
// and references to 'static data, none of which is tied to the current thread. The allocator
// is shared by reference, which is only safe to send if the allocator is Sync.
unsafe impl<A: Allocator + Sync + ?Sized> Send for MemoryPool<'_, A> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::cell::Cell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{ALIGNMENT, VariantData};

    assert_impl_all!(MemoryPool<'static>: Send, fmt::Debug);
    assert_not_impl_any!(MemoryPool<'static>: Sync, Clone);

    /// Supplies blocks from the system allocator until told to refuse.
    #[derive(Debug, Default)]
    struct RefusingAllocator {
        refuse_allocate: Cell<bool>,
        refuse_reallocate: Cell<bool>,
    }

    impl Allocator for RefusingAllocator {
        fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
            if self.refuse_allocate.get() {
                return None;
            }

            SystemAllocator.allocate(size)
        }

        unsafe fn deallocate(&self, block: NonNull<u8>, size: NonZero<usize>) {
            unsafe { SystemAllocator.deallocate(block, size) }
        }

        unsafe fn reallocate(
            &self,
            block: NonNull<u8>,
            old_size: NonZero<usize>,
            new_size: NonZero<usize>,
        ) -> Option<NonNull<u8>> {
            if self.refuse_reallocate.get() {
                return None;
            }

            unsafe { SystemAllocator.reallocate(block, old_size, new_size) }
        }
    }

    fn assert_invariants<A: Allocator + ?Sized>(pool: &MemoryPool<'_, A>) {
        pool.integrity_check();
        assert_eq!(pool.size() + pool.free(), pool.capacity());
    }

    #[test]
    fn new_rounds_capacity_up() {
        let pool = MemoryPool::new(ALIGNMENT + 1);

        assert_eq!(pool.capacity(), 2 * ALIGNMENT);
        assert_eq!(pool.size(), 0);
        assert!(!pool.overflowed());
        assert_invariants(&pool);
    }

    #[test]
    fn zero_capacity_pool_cannot_allocate() {
        let mut pool = MemoryPool::new(0);

        assert_eq!(pool.capacity(), 0);
        assert!(!pool.can_alloc(1));
        assert!(pool.alloc_variant().is_none());
        assert!(pool.overflowed());
        assert_invariants(&pool);
    }

    #[test]
    fn failed_allocation_yields_zero_capacity() {
        let allocator = RefusingAllocator::default();
        allocator.refuse_allocate.set(true);

        let mut pool = MemoryPool::builder()
            .capacity(128)
            .allocator(&allocator)
            .build();

        assert_eq!(pool.capacity(), 0);
        assert!(pool.save_string(&b"x"[..]).is_none());
        assert!(pool.overflowed());
        assert_invariants(&pool);
    }

    #[test]
    fn huge_capacity_yields_zero_capacity() {
        let pool = MemoryPool::new(usize::MAX);

        assert_eq!(pool.capacity(), 0);
        assert_invariants(&pool);
    }

    #[test]
    fn alloc_variant_grows_downward() {
        let mut pool = MemoryPool::new(4 * SLOT_SIZE);

        let first = pool.alloc_variant().unwrap();
        let second = pool.alloc_variant().unwrap();

        assert_eq!(first.offset(), 3 * SLOT_SIZE);
        assert_eq!(second.offset(), 2 * SLOT_SIZE);
        assert_eq!(pool.size(), 2 * SLOT_SIZE);
        assert_eq!(*pool.slot(first).data(), VariantData::Null);
        assert_invariants(&pool);
    }

    #[test]
    fn alloc_variant_overflows_when_full() {
        let mut pool = MemoryPool::new(SLOT_SIZE);

        assert!(pool.alloc_variant().is_some());
        assert!(!pool.overflowed());

        assert!(pool.alloc_variant().is_none());
        assert!(pool.overflowed());
        assert_eq!(pool.size(), SLOT_SIZE);
        assert_invariants(&pool);
    }

    #[test]
    fn overflow_is_sticky_until_clear() {
        let mut pool = MemoryPool::new(SLOT_SIZE);

        _ = pool.alloc_variant().unwrap();
        assert!(pool.alloc_variant().is_none());
        assert!(pool.overflowed());

        // Succeeding allocations do not reset the flag.
        assert!(pool.save_string(None).is_none());
        assert!(pool.overflowed());

        pool.clear();
        assert!(!pool.overflowed());
        assert_eq!(pool.size(), 0);
        assert!(pool.alloc_variant().is_some());
        assert_invariants(&pool);
    }

    #[test]
    fn mark_overflowed_sets_flag() {
        let mut pool = MemoryPool::new(64);

        pool.mark_overflowed();

        assert!(pool.overflowed());
    }

    #[test]
    fn strings_are_terminated() {
        let mut pool = MemoryPool::new(64);

        let abc = pool.save_string(&b"abc"[..]).unwrap();
        let de = pool.save_string(&b"de"[..]).unwrap();

        assert_eq!(abc.offset(), 0);
        assert_eq!(de.offset(), 4);
        assert_eq!(pool.committed_strings(), b"abc\0de\0");
        assert_eq!(pool.size(), 7);
        assert_invariants(&pool);
    }

    #[test]
    fn null_string_touches_nothing() {
        let mut pool = MemoryPool::new(0);

        assert!(pool.save_string(None).is_none());
        assert!(!pool.overflowed());
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn duplicate_strings_are_stored_once() {
        let mut pool = MemoryPool::new(64);

        let first = pool.save_string(&b"hello"[..]).unwrap();
        let usage = pool.size();
        let second = pool.save_string(&b"hello"[..]).unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.size(), usage);
    }

    #[test]
    fn prefix_and_suffix_are_not_duplicates() {
        let mut pool = MemoryPool::new(64);

        let hello = pool.save_string(&b"hello"[..]).unwrap();
        let hell = pool.save_string(&b"hell"[..]).unwrap();
        let ello = pool.save_string(&b"ello"[..]).unwrap();

        assert_ne!(hello, hell);
        assert_ne!(hello.offset(), ello.offset());
        assert_eq!(pool.string(hell), b"hell");
        assert_eq!(pool.string(ello), b"ello");
        assert_eq!(pool.size(), 6 + 5 + 5);
    }

    #[test]
    fn empty_string_is_deduplicated() {
        let mut pool = MemoryPool::new(64);

        _ = pool.save_string(&b"abc"[..]).unwrap();
        let empty = pool.save_string(&b""[..]).unwrap();
        let again = pool.save_string(&b""[..]).unwrap();

        assert_eq!(empty, again);
        assert!(empty.is_empty());
        assert_eq!(pool.size(), 5);
    }

    #[test]
    fn deduplication_can_be_disabled() {
        let mut pool = MemoryPool::builder()
            .capacity(64)
            .deduplicate_strings(false)
            .build();

        let first = pool.save_string(&b"hello"[..]).unwrap();
        let second = pool.save_string(&b"hello"[..]).unwrap();

        assert_ne!(first, second);
        assert_eq!(pool.size(), 12);
    }

    #[test]
    fn save_string_overflows_without_writing() {
        let mut pool = MemoryPool::new(ALIGNMENT);

        let too_long = vec![b'x'; ALIGNMENT];
        assert!(pool.save_string(too_long.as_slice()).is_none());
        assert!(pool.overflowed());
        assert_eq!(pool.size(), 0);

        // A string that does fit still fits afterwards.
        let fits = vec![b'y'; ALIGNMENT - 1];
        assert!(pool.save_string(fits.as_slice()).is_some());
        assert_eq!(pool.size(), ALIGNMENT);
        assert_invariants(&pool);
    }

    #[test]
    fn can_alloc_is_pure() {
        let pool = MemoryPool::new(ALIGNMENT);

        assert!(pool.can_alloc(ALIGNMENT));
        assert!(!pool.can_alloc(ALIGNMENT + 1));
        assert!(!pool.can_alloc(usize::MAX));
        assert!(!pool.overflowed());
    }

    #[test]
    fn owns_matches_buffer_bounds() {
        let mut pool = MemoryPool::new(64);
        let hello = pool.save_string(&b"hello"[..]).unwrap();

        let inside = pool.string(hello).as_ptr();
        assert!(pool.owns(inside));

        let begin = pool.buffer.unwrap().as_ptr();
        assert!(pool.owns(begin));
        assert!(pool.owns(begin.wrapping_add(63)));
        assert!(!pool.owns(begin.wrapping_add(64)));
        assert!(!pool.owns(begin.wrapping_sub(1)));

        let outside = b"hello";
        assert!(!pool.owns(outside.as_ptr()));
    }

    #[test]
    fn zero_capacity_pool_owns_nothing() {
        let pool = MemoryPool::new(0);

        assert!(!pool.owns(std::ptr::null()));
        assert!(!pool.owns(b"x".as_ptr()));
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut source = MemoryPool::new(64);
        let hello = source.save_string(&b"hello"[..]).unwrap();
        source.mark_overflowed();

        let target = source.take();

        assert_eq!(source.capacity(), 0);
        assert!(!source.overflowed());
        assert_invariants(&source);

        assert_eq!(target.capacity(), 64);
        assert!(target.overflowed());
        assert_eq!(target.string(hello), b"hello");

        // The emptied source behaves as a zero-capacity pool.
        assert!(source.save_string(&b"x"[..]).is_none());
        assert!(source.overflowed());
    }

    #[test]
    fn assignment_releases_previous_buffer() {
        let mut pool = MemoryPool::new(64);
        _ = pool.save_string(&b"first"[..]).unwrap();

        pool = MemoryPool::new(128);

        assert_eq!(pool.capacity(), 128);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn realloc_pool_discards_content() {
        let mut pool = MemoryPool::new(SLOT_SIZE);
        _ = pool.alloc_variant().unwrap();
        assert!(pool.alloc_variant().is_none());

        pool.realloc_pool(4 * SLOT_SIZE);

        assert_eq!(pool.capacity(), 4 * SLOT_SIZE);
        assert_eq!(pool.size(), 0);
        assert!(!pool.overflowed());
        assert_invariants(&pool);
    }

    #[test]
    fn realloc_pool_to_same_size_clears() {
        let mut pool = MemoryPool::new(64);
        _ = pool.save_string(&b"abc"[..]).unwrap();

        pool.realloc_pool(64);

        assert_eq!(pool.capacity(), 64);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn shrink_to_fit_squashes_gap() {
        let mut pool = MemoryPool::new(1024);

        let abc = pool.save_string(&b"abc"[..]).unwrap();
        let slot = pool.alloc_variant().unwrap();
        pool.slot_mut(slot).set_data(VariantData::Integer(42));

        let reclaimed = pool.shrink_to_fit(&mut ()).unwrap();

        assert_eq!(reclaimed, 1024 - SLOT_SIZE - ALIGNMENT);
        assert_eq!(pool.capacity(), ALIGNMENT + SLOT_SIZE);
        assert_eq!(pool.size(), 4 + SLOT_SIZE);
        assert_eq!(pool.string(abc), b"abc");

        let moved = SlotRef::new(ALIGNMENT);
        assert_eq!(*pool.slot(moved).data(), VariantData::Integer(42));
        assert_invariants(&pool);
    }

    #[test]
    fn shrink_to_fit_is_idempotent() {
        let mut pool = MemoryPool::new(1024);
        _ = pool.save_string(&b"abc"[..]).unwrap();
        _ = pool.alloc_variant().unwrap();

        assert!(pool.shrink_to_fit(&mut ()).unwrap() > 0);
        let capacity = pool.capacity();
        let size = pool.size();

        assert_eq!(pool.shrink_to_fit(&mut ()).unwrap(), 0);
        assert_eq!(pool.capacity(), capacity);
        assert_eq!(pool.size(), size);
    }

    #[test]
    fn shrink_to_fit_of_empty_pool_releases_buffer() {
        let mut pool = MemoryPool::new(1024);

        assert_eq!(pool.shrink_to_fit(&mut ()).unwrap(), 1024);
        assert_eq!(pool.capacity(), 0);
        assert!(pool.buffer.is_none());
        assert_invariants(&pool);

        assert_eq!(pool.shrink_to_fit(&mut ()).unwrap(), 0);
    }

    #[test]
    fn failed_shrink_leaves_pool_unchanged() {
        let allocator = RefusingAllocator::default();
        let mut pool = MemoryPool::builder()
            .capacity(1024)
            .allocator(&allocator)
            .build();

        let abc = pool.save_string(&b"abc"[..]).unwrap();
        let slot = pool.alloc_variant().unwrap();
        pool.slot_mut(slot).set_data(VariantData::Bool(true));

        allocator.refuse_reallocate.set(true);

        let result = pool.shrink_to_fit(&mut ());
        assert!(matches!(
            result,
            Err(Error::ReallocationFailed { requested }) if requested == ALIGNMENT + SLOT_SIZE
        ));

        assert_eq!(pool.capacity(), 1024);
        assert_eq!(pool.size(), 4 + SLOT_SIZE);
        assert_eq!(pool.string(abc), b"abc");
        assert_eq!(*pool.slot(slot).data(), VariantData::Bool(true));
        assert_invariants(&pool);

        allocator.refuse_reallocate.set(false);
        assert!(pool.shrink_to_fit(&mut ()).unwrap() > 0);
        assert_eq!(pool.capacity(), ALIGNMENT + SLOT_SIZE);
    }

    #[test]
    #[should_panic]
    fn slot_outside_region_panics() {
        let pool = MemoryPool::new(4 * SLOT_SIZE);
        _ = pool.slot(SlotRef::new(0));
    }

    #[test]
    #[should_panic]
    fn string_outside_region_panics() {
        let pool = MemoryPool::new(64);
        _ = pool.string(StringRef::new(0, 3));
    }

    #[test]
    fn debug_output_names_cursors() {
        let pool = MemoryPool::new(64);
        let output = format!("{pool:?}");

        assert!(output.contains("left"));
        assert!(output.contains("overflowed"));
    }
}
