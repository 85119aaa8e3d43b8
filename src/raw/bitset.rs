//! Control bytes and the SWAR matching that classifies a whole group of them
//! at once.
//!
//! Each slot in the table has a control byte which can have one of three
//! states: empty, deleted, and full. They have the following bit patterns:
//!
//! ```text
//!   empty: 1 0 0 0 0 0 0 0
//! deleted: 1 1 1 1 1 1 1 0
//!    full: 0 h h h h h h h  // h represents the H2 hash bits
//! ```
//!
//! The eight control bytes of a group are packed into one `u64` word, byte `i`
//! of the group living in bits `8 * i .. 8 * i + 8`.

/// Number of slots in a group.
pub(crate) const GROUP_SLOTS: usize = 8;

/// Control byte value for an empty slot.
pub(crate) const EMPTY: u8 = 0b1000_0000;

/// Control byte value for a deleted slot (tombstone).
pub(crate) const DELETED: u8 = 0b1111_1110;

const BITSET_LSB: u64 = 0x0101_0101_0101_0101;
const BITSET_MSB: u64 = 0x8080_8080_8080_8080;
const BITSET_EMPTY: u64 = BITSET_LSB * EMPTY as u64;

/// Checks whether a control byte represents a full slot (top bit is clear).
#[inline]
pub(crate) fn is_full(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

/// Checks whether a control byte represents a special value (top bit is set).
#[inline]
pub(crate) fn is_special(ctrl: u8) -> bool {
    ctrl & 0x80 != 0
}

/// Checks whether a special control value is EMPTY (just check 1 bit).
#[inline]
pub(crate) fn special_is_empty(ctrl: u8) -> bool {
    debug_assert!(is_special(ctrl));
    ctrl & 0x02 == 0
}

/// A set of slots within a group.
///
/// One byte per slot, each byte either `0x80` if the slot is part of the set
/// or `0x00` otherwise. This makes it convenient to calculate for an entire
/// group at once (see [`CtrlGroup::match_empty`]).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Bitset(pub(crate) u64);

impl Bitset {
    /// Returns the relative index of the first slot in the set.
    ///
    /// Assumes that only the MSB of each byte can be set. Returns
    /// [`GROUP_SLOTS`] (8) if the set is empty.
    #[inline]
    pub fn first(self) -> usize {
        (self.0.trailing_zeros() >> 3) as usize
    }

    /// Removes the first slot from the set, that is, resets the least
    /// significant set bit to 0.
    #[inline]
    #[must_use]
    pub fn remove_first(self) -> Bitset {
        Bitset(self.0 & self.0.wrapping_sub(1))
    }

    /// Returns whether the set has at least one member.
    #[inline]
    pub fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    /// Returns the first slot in the set, if any.
    #[inline]
    pub fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.first())
        }
    }
}

impl IntoIterator for Bitset {
    type Item = usize;
    type IntoIter = BitsetIter;

    #[inline]
    fn into_iter(self) -> BitsetIter {
        BitsetIter(self)
    }
}

/// Iterator over the slot indexes contained in a [`Bitset`], in ascending
/// order.
pub struct BitsetIter(Bitset);

impl Iterator for BitsetIter {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let bit = self.0.lowest_set_bit()?;
        self.0 = self.0.remove_first();
        Some(bit)
    }
}

/// The eight control bytes of a group, stored in a single word.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CtrlGroup(pub(crate) u64);

impl CtrlGroup {
    /// A control word where every slot is empty.
    pub const EMPTY: CtrlGroup = CtrlGroup(BITSET_EMPTY);

    /// Returns the `i`-th control byte.
    #[inline]
    pub fn get(self, i: usize) -> u8 {
        debug_assert!(i < GROUP_SLOTS);
        (self.0 >> (i * 8)) as u8
    }

    /// Sets the `i`-th control byte.
    #[inline]
    pub fn set(&mut self, i: usize, ctrl: u8) {
        debug_assert!(i < GROUP_SLOTS);
        let shift = i * 8;
        self.0 = (self.0 & !(0xff << shift)) | (u64::from(ctrl) << shift);
    }

    /// Returns the set of slots which are full and for which the 7-bit hash
    /// matches the given value. May return false positives.
    #[inline]
    pub fn match_h2(self, h2: u8) -> Bitset {
        // NB: This routine produces false positive matches when h2 is 2^N
        // and the control bytes hold 2^N followed by 2^N+1. For example, with
        // ctrls == 0x0302 and h2 == 0x02 we compute v as 0x0100; subtracting
        // 0x0101 turns both low bytes into 0xff and both are reported. They
        // only occur next to a real match and never on EMPTY or DELETED, so
        // the key comparison that follows keeps lookups correct.
        let v = self.0 ^ (BITSET_LSB * u64::from(h2));
        Bitset((v.wrapping_sub(BITSET_LSB) & !v) & BITSET_MSB)
    }

    /// Returns the set of slots in the group that are empty.
    #[inline]
    pub fn match_empty(self) -> Bitset {
        // A slot is empty iff bit 7 is set and bit 1 is not. We could select
        // any of the other bits here (e.g. v << 1 would also work).
        let v = self.0;
        Bitset((v & !(v << 6)) & BITSET_MSB)
    }

    /// Returns the set of slots in the group that are empty or deleted.
    #[inline]
    pub fn match_empty_or_deleted(self) -> Bitset {
        // A slot is empty or deleted iff bit 7 is set and bit 0 is not.
        let v = self.0;
        Bitset((v & !(v << 7)) & BITSET_MSB)
    }

    /// Returns the set of slots in the group that are full.
    #[inline]
    pub fn match_full(self) -> Bitset {
        Bitset(!self.0 & BITSET_MSB)
    }

    /// Performs the following transformation on all control bytes in the
    /// group:
    /// - `EMPTY => EMPTY`
    /// - `DELETED => EMPTY`
    /// - `FULL => DELETED`
    #[inline]
    #[must_use]
    pub fn convert_non_full_to_empty_and_full_to_deleted(self) -> CtrlGroup {
        // `full` has 0x80 in every full byte. Subtracting `full >> 6` (0x02 in
        // the same bytes) leaves 0x7e there without borrowing across bytes,
        // and setting every MSB then yields 0xfe for full and 0x80 otherwise.
        let full = !self.0 & BITSET_MSB;
        CtrlGroup(BITSET_MSB | (full - (full >> 6)))
    }
}
