/// Probe sequence over the *groups* of a table, based on triangular numbers:
///
/// ```text
/// p(i) := (i^2 + i)/2 + h1 (mod mask+1)
/// ```
///
/// A triangular probe has us jump by 1 more group every time. So first we
/// jump by 1 group (meaning we just continue our linear scan), then 2 groups
/// (skipping over 1 group), then 3 groups (skipping over 2 groups), and so on.
///
/// Since the number of groups is a power of two, `(i^2 + i)/2` is a bijection
/// in `Z/(2^m)` and the sequence visits every group exactly once before
/// repeating. Proof:
/// <https://fgiesen.wordpress.com/2015/02/22/triangular-numbers-mod-2n/>
#[derive(Clone, Debug)]
pub struct ProbeSeq {
    mask: usize,
    offset: usize,
    index: usize,
}

impl ProbeSeq {
    /// Starts a probe sequence at `h1 & mask`. `mask + 1` must be a power of
    /// two.
    #[inline]
    pub fn new(h1: usize, mask: usize) -> Self {
        debug_assert!(mask.wrapping_add(1).is_power_of_two());
        Self {
            mask,
            offset: h1 & mask,
            index: 0,
        }
    }

    /// The group index the sequence currently points at.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn move_next(&mut self) {
        // We should have found an empty slot by now and ended the probe.
        debug_assert!(self.index <= self.mask, "Went past end of probe sequence");

        self.index += 1;
        self.offset = (self.offset + self.index) & self.mask;
    }
}
