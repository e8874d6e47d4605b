//! Formulas for pre-sizing a pool before populating it.

use crate::SLOT_SIZE;

/// Returns the size (in bytes) of an array with `n` elements.
#[must_use]
pub const fn size_of_array(n: usize) -> usize {
    n.saturating_mul(SLOT_SIZE)
}

/// Returns the size (in bytes) of an object with `n` members.
#[must_use]
pub const fn size_of_object(n: usize) -> usize {
    n.saturating_mul(SLOT_SIZE)
}

/// Returns the size (in bytes) of a string with `n` bytes, including its terminator.
#[must_use]
pub const fn size_of_string(n: usize) -> usize {
    n.saturating_add(1)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn collections_cost_one_slot_per_entry() {
        assert_eq!(size_of_array(0), 0);
        assert_eq!(size_of_array(3), 3 * SLOT_SIZE);
        assert_eq!(size_of_object(0), 0);
        assert_eq!(size_of_object(2), 2 * SLOT_SIZE);
    }

    #[test]
    fn strings_cost_one_extra_byte() {
        assert_eq!(size_of_string(0), 1);
        assert_eq!(size_of_string(7), 8);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(size_of_array(usize::MAX), usize::MAX);
        assert_eq!(size_of_string(usize::MAX), usize::MAX);
    }
}
