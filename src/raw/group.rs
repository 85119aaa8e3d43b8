use super::bitset::{CtrlGroup, GROUP_SLOTS};
use core::alloc::Layout;
use core::mem;
use core::ptr::NonNull;

/// Size of the control word at the start of every group.
const CTRL_GROUP_SIZE: usize = mem::size_of::<CtrlGroup>();

/// Rounds `n` up to a multiple of `a`. `a` must be a power of two.
#[inline]
pub(crate) const fn align_up(n: usize, a: usize) -> usize {
    (n + a - 1) & !(a - 1)
}

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Byte layout of a group for one `(K, V)` pair of types.
///
/// A group looks like this in memory:
///
/// ```text
/// [ctrl word: u64] [padding] [key0, elem0] [key1, elem1] ... [key7, elem7] [padding]
/// \______________  ______________/
///                \/
///          slots_offset
/// ```
///
/// Keys and elems are interleaved. The key size is rounded up to the elem
/// alignment and the elem size to the key alignment, so every key and every
/// elem of every slot is correctly aligned as long as the group itself is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    /// Distance between two consecutive slots.
    pub(crate) slot_size: usize,
    /// Offset of the elem inside a slot.
    pub(crate) elem_offset: usize,
    /// Offset of slot 0 from the start of the group.
    pub(crate) slots_offset: usize,
    /// Distance between two consecutive groups.
    pub(crate) group_size: usize,
    /// Alignment of the whole groups allocation.
    pub(crate) align: usize,
}

impl SlotLayout {
    pub(crate) const fn new<K, V>() -> Self {
        let key = Layout::new::<K>();
        let elem = Layout::new::<V>();

        // Align key size up to elem alignment to account for padding before
        // next field.
        let key_size = align_up(key.size(), elem.align());
        // Align elem size up to key alignment to account for padding before
        // next slot.
        let elem_size = align_up(elem.size(), key.align());
        let slot_size = key_size + elem_size;

        let slot_align = max(key.align(), elem.align());
        let align = max(slot_align, mem::align_of::<CtrlGroup>());
        let slots_offset = align_up(CTRL_GROUP_SIZE, slot_align);
        let group_size = align_up(slots_offset + GROUP_SLOTS * slot_size, align);

        Self {
            slot_size,
            elem_offset: key_size,
            slots_offset,
            group_size,
            align,
        }
    }

    /// Returns the layout of a contiguous array of `length` groups.
    ///
    /// Returns `None` if an overflow occurs.
    pub(crate) fn groups_layout(&self, length: usize) -> Option<Layout> {
        let size = self.group_size.checked_mul(length)?;
        // We need an additional check to ensure that the allocation doesn't
        // exceed `isize::MAX` (https://github.com/rust-lang/rust/pull/95295).
        if size > isize::MAX as usize - (self.align - 1) {
            return None;
        }
        Layout::from_size_align(size, self.align).ok()
    }
}

/// A view of a single group of slots inside a [`Groups`](super::groups::Groups)
/// buffer.
///
/// Only hands out raw pointers; what lives behind a key or elem pointer is the
/// business of the typed table above.
#[derive(Copy, Clone)]
pub(crate) struct Group<'a> {
    data: NonNull<u8>,
    layout: &'a SlotLayout,
}

impl<'a> Group<'a> {
    /// # Safety
    ///
    /// `data` must point to the start of a group laid out according to
    /// `layout` inside a live allocation.
    #[inline]
    pub(crate) unsafe fn from_raw(data: NonNull<u8>, layout: &'a SlotLayout) -> Self {
        Self { data, layout }
    }

    /// Returns the group control word.
    #[inline]
    pub(crate) fn ctrls(&self) -> CtrlGroup {
        // SAFETY: every group starts with an initialized, 8-byte aligned
        // control word.
        unsafe { self.data.cast::<CtrlGroup>().as_ptr().read() }
    }

    /// Overwrites the group control word.
    #[inline]
    pub(crate) fn set_ctrls(&self, ctrls: CtrlGroup) {
        // SAFETY: see `ctrls`. Writes go through the raw allocation pointer,
        // never through a shared reference.
        unsafe { self.data.cast::<CtrlGroup>().as_ptr().write(ctrls) }
    }

    /// Returns the control byte of slot `i`.
    #[inline]
    pub(crate) fn ctrl(&self, i: usize) -> u8 {
        self.ctrls().get(i)
    }

    /// Sets the control byte of slot `i`.
    #[inline]
    pub(crate) fn set_ctrl(&self, i: usize, ctrl: u8) {
        let mut ctrls = self.ctrls();
        ctrls.set(i, ctrl);
        self.set_ctrls(ctrls);
    }

    /// Returns a pointer to the start of slot `i` (its key).
    #[inline]
    pub(crate) fn slot(&self, i: usize) -> *mut u8 {
        assert!(i < GROUP_SLOTS, "slot index {} out of group bounds", i);
        let offset = self.layout.slots_offset + i * self.layout.slot_size;
        // SAFETY: `offset` stays inside this group, which lies inside the
        // allocation by construction.
        unsafe { self.data.as_ptr().add(offset) }
    }

    /// Returns a pointer to the key at index `i`.
    #[inline]
    pub(crate) fn key(&self, i: usize) -> *mut u8 {
        self.slot(i)
    }

    /// Returns a pointer to the elem at index `i`.
    #[inline]
    pub(crate) fn elem(&self, i: usize) -> *mut u8 {
        // SAFETY: `elem_offset` is within the slot.
        unsafe { self.slot(i).add(self.layout.elem_offset) }
    }
}
