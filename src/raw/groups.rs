use super::bitset::CtrlGroup;
use super::group::{Group, SlotLayout};
use super::Fallibility;
use crate::alloc::alloc::{alloc, dealloc, Layout};
use crate::TryReserveError;
use core::ptr::NonNull;

/// A contiguous, power-of-two-length array of groups stored in one byte
/// buffer of `length * layout.group_size` bytes.
///
/// `Groups` owns the memory but not the keys and elems living in it: dropping
/// it only releases the buffer. Dropping entries is up to the typed table.
pub(crate) struct Groups {
    data: NonNull<u8>,
    // Number of groups in data. Always a power of two.
    length: usize,
    layout: SlotLayout,
}

impl Groups {
    /// Allocates a new array of `length` groups with every control byte set to
    /// `EMPTY`.
    pub(crate) fn new(
        layout: SlotLayout,
        length: usize,
        fallibility: Fallibility,
    ) -> Result<Self, TryReserveError> {
        debug_assert!(length.is_power_of_two());

        let alloc_layout = match layout.groups_layout(length) {
            Some(alloc_layout) => alloc_layout,
            None => return Err(fallibility.capacity_overflow()),
        };

        // SAFETY: the layout has a non-zero size, every group carries at least
        // its control word.
        let data = match NonNull::new(unsafe { alloc(alloc_layout) }) {
            Some(data) => data,
            None => return Err(fallibility.alloc_err(alloc_layout)),
        };

        let groups = Self {
            data,
            length,
            layout,
        };
        groups.set_all_empty();
        Ok(groups)
    }

    /// Number of groups. Always a power of two.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.length
    }

    /// Mask turning a hash into a group index.
    #[inline]
    pub(crate) fn length_mask(&self) -> usize {
        self.length - 1
    }

    #[inline]
    pub(crate) fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Returns the group at index `i`.
    #[inline]
    pub(crate) fn group(&self, i: usize) -> Group<'_> {
        assert!(i < self.length, "group index {} out of bounds", i);
        // SAFETY: `i < length`, so the group lies entirely inside the
        // allocation.
        unsafe {
            let data = NonNull::new_unchecked(self.data.as_ptr().add(i * self.layout.group_size));
            Group::from_raw(data, &self.layout)
        }
    }

    /// Resets every control word to all-`EMPTY`.
    pub(crate) fn set_all_empty(&self) {
        for i in 0..self.length {
            self.group(i).set_ctrls(CtrlGroup::EMPTY);
        }
    }

    fn alloc_layout(&self) -> Layout {
        match self.layout.groups_layout(self.length) {
            Some(layout) => layout,
            // Checked when the buffer was allocated.
            None => unreachable!(),
        }
    }
}

impl Drop for Groups {
    fn drop(&mut self) {
        let layout = self.alloc_layout();
        // SAFETY: allocated in `new` with exactly this layout.
        unsafe { dealloc(self.data.as_ptr(), layout) }
    }
}
