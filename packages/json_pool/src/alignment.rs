use crate::Slot;

/// The alignment of the pool buffer, of the slot region boundary and of every shrunk capacity.
///
/// Slots embed handles and numbers that must be naturally aligned, so this is the alignment of
/// a slot record, which is never smaller than the alignment of a pointer.
pub const ALIGNMENT: usize = align_of::<Slot>();

const _: () = assert!(ALIGNMENT >= align_of::<*const u8>());
const _: () = assert!(ALIGNMENT.is_power_of_two());
const _: () = assert!(size_of::<Slot>() % ALIGNMENT == 0);

/// Rounds `bytes` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` if the rounded value does not fit in `usize`.
#[must_use]
#[inline]
pub const fn align_up(bytes: usize) -> Option<usize> {
    // ALIGNMENT is a non-zero power of two, so the mask arithmetic cannot overflow.
    const MASK: usize = ALIGNMENT.wrapping_sub(1);

    match bytes.checked_add(MASK) {
        Some(padded) => Some(padded & !MASK),
        None => None,
    }
}

/// Returns `true` if `bytes` is a multiple of [`ALIGNMENT`].
#[must_use]
#[inline]
pub const fn is_aligned(bytes: usize) -> bool {
    bytes & ALIGNMENT.wrapping_sub(1) == 0
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn alignment_covers_pointers() {
        assert!(ALIGNMENT >= align_of::<usize>());
        assert!(ALIGNMENT >= align_of::<*const u8>());
    }

    #[test]
    fn align_up_rounds_to_next_boundary() {
        assert_eq!(align_up(0), Some(0));
        assert_eq!(align_up(1), Some(ALIGNMENT));
        assert_eq!(align_up(ALIGNMENT), Some(ALIGNMENT));
        assert_eq!(align_up(ALIGNMENT + 1), Some(2 * ALIGNMENT));
    }

    #[test]
    fn align_up_reports_overflow() {
        assert_eq!(align_up(usize::MAX), None);
    }

    #[test]
    fn is_aligned_matches_align_up() {
        for bytes in 0..(4 * ALIGNMENT) {
            assert_eq!(is_aligned(bytes), align_up(bytes) == Some(bytes));
        }
    }
}
