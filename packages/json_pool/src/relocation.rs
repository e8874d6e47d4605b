use crate::{Allocator, MemoryPool, SlotRef, StringRef};

/// Describes how the content of a [`MemoryPool`] moved during
/// [`shrink_to_fit()`][MemoryPool::shrink_to_fit].
///
/// Two things happen to the buffer when it is shrunk:
///
/// 1. The slot region is moved down to close the gap after the string region ("squash"),
///    by [`reclaimed()`][Self::reclaimed] bytes.
/// 2. The whole buffer may be moved to a new base address by the allocator, by
///    [`base_delta()`][Self::base_delta] bytes.
///
/// Handles are offsets from the buffer base, so only the squash affects them: slot handles move
/// down by the reclaimed byte count, string handles stay as they are. The address deltas are
/// reported for value layers that keep raw addresses of their own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Relocation {
    base_delta: isize,
    reclaimed: usize,
}

impl Relocation {
    #[must_use]
    pub(crate) const fn new(base_delta: isize, reclaimed: usize) -> Self {
        Self {
            base_delta,
            reclaimed,
        }
    }

    /// How far the buffer base address moved, in bytes (new address minus old address).
    ///
    /// This is the correction for addresses into the string region.
    #[must_use]
    pub const fn base_delta(&self) -> isize {
        self.base_delta
    }

    /// How far addresses into the slot region moved, in bytes: the base address delta
    /// combined with the squash shift.
    #[must_use]
    pub fn squash_delta(&self) -> isize {
        let reclaimed = isize::try_from(self.reclaimed)
            .expect("a buffer cannot be larger than isize::MAX bytes");

        self.base_delta.wrapping_sub(reclaimed)
    }

    /// Number of bytes the slot region moved down during the squash.
    #[must_use]
    pub const fn reclaimed(&self) -> usize {
        self.reclaimed
    }

    /// Returns the handle a slot has after the relocation.
    ///
    /// # Panics
    ///
    /// Panics if the handle could not have been in the slot region before the relocation.
    #[must_use]
    pub fn relocate_slot(&self, slot: SlotRef) -> SlotRef {
        let offset = slot
            .offset()
            .checked_sub(self.reclaimed)
            .expect("slot handle lies below the squashed slot region");

        SlotRef::new(offset)
    }

    /// Returns the handle a committed string has after the relocation.
    ///
    /// The string region never moves relative to the buffer base, so this is the identity.
    #[must_use]
    pub const fn relocate_string(&self, string: StringRef) -> StringRef {
        string
    }
}

/// Implemented by anything that stores handles into a [`MemoryPool`] and must fix them up when
/// the pool is shrunk.
///
/// The pool stays ignorant of the shape of the value layer: it only computes the
/// [`Relocation`] and hands it over, and the implementation walks its own structure (including
/// records stored inside the pool itself) and rebases every handle it owns.
pub trait Relocate {
    /// Rebases every handle owned by `self` according to `relocation`.
    ///
    /// When this is called, the pool is already in its shrunk state.
    fn relocate<A: Allocator + ?Sized>(
        &mut self,
        pool: &mut MemoryPool<'_, A>,
        relocation: &Relocation,
    );
}

/// For pools whose content is not referenced by anything that needs fixing up.
impl Relocate for () {
    fn relocate<A: Allocator + ?Sized>(&mut self, _: &mut MemoryPool<'_, A>, _: &Relocation) {}
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn slot_handles_move_down_by_reclaimed_bytes() {
        let relocation = Relocation::new(0, 64);

        assert_eq!(relocation.relocate_slot(SlotRef::new(128)), SlotRef::new(64));
        assert_eq!(relocation.relocate_slot(SlotRef::new(64)), SlotRef::new(0));
    }

    #[test]
    fn string_handles_are_unchanged() {
        let relocation = Relocation::new(-4096, 64);
        let string = StringRef::new(16, 3);

        assert_eq!(relocation.relocate_string(string), string);
    }

    #[test]
    fn squash_delta_combines_both_moves() {
        let relocation = Relocation::new(1000, 24);

        assert_eq!(relocation.base_delta(), 1000);
        assert_eq!(relocation.squash_delta(), 976);
        assert_eq!(relocation.reclaimed(), 24);
    }

    #[test]
    #[should_panic]
    fn slot_handle_below_region_panics() {
        let relocation = Relocation::new(0, 64);
        _ = relocation.relocate_slot(SlotRef::new(8));
    }
}
