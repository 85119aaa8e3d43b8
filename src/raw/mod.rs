// This code partially use code from the [`Hashbrown`] crate
// [`Hashbrown`]: https://github.com/rust-lang/hashbrown


mod bitset;
mod debug;
mod group;
mod groups;
mod probe;

pub use self::bitset::{Bitset, BitsetIter, CtrlGroup};
pub use self::debug::Dump;
pub use self::probe::ProbeSeq;

pub(crate) use self::bitset::{is_full, DELETED, EMPTY, GROUP_SLOTS};

use self::bitset::special_is_empty;
use self::group::SlotLayout;
use self::groups::Groups;
use crate::alloc::alloc::{handle_alloc_error, Layout};
use crate::alloc::vec::Vec;
use crate::scopeguard::guard;
use crate::TryReserveError;
use core::marker::PhantomData;
use core::mem::{self, MaybeUninit};
use core::{hint, ptr};
use log::{debug, trace};

// On stable we can use #[cold] to get a equivalent effect: this attributes
// suggests that the function is unlikely to be called
#[inline]
#[cold]
fn cold() {}

#[inline]
fn likely(b: bool) -> bool {
    if !b {
        cold();
    }
    b
}

#[inline]
fn unlikely(b: bool) -> bool {
    if b {
        cold();
    }
    b
}

/// Number of slots out of every group that may be used before the table has to
/// grow, i.e. the maximum load factor is `MAX_AVG_GROUP_LOAD / GROUP_SLOTS`.
pub(crate) const MAX_AVG_GROUP_LOAD: usize = 7;

/// Whether memory allocation errors should return an error or abort.
#[derive(Copy, Clone)]
pub(crate) enum Fallibility {
    Fallible,
    Infallible,
}

impl Fallibility {
    /// Error to return on capacity overflow.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn capacity_overflow(self) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::CapacityOverflow,
            Fallibility::Infallible => panic!("Hash table capacity overflow"),
        }
    }

    /// Error to return on allocation error.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn alloc_err(self, layout: Layout) -> TryReserveError {
        match self {
            Fallibility::Fallible => TryReserveError::AllocError { layout },
            Fallibility::Infallible => handle_alloc_error(layout),
        }
    }
}

/// Primary hash function, used to select the first group to probe.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn h1(hash: u64) -> usize {
    // On 32-bit platforms we simply ignore the higher hash bits.
    (hash >> 7) as usize
}

/// Secondary hash function, saved in the low 7 bits of the control byte.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn h2(hash: u64) -> u8 {
    (hash & 0x7f) as u8
}

/// Returns the number of slots for a requested capacity: at least one group,
/// rounded up to a power of two so that the group count is one as well.
///
/// Returns `None` if an overflow occurs.
#[inline]
fn capacity_to_slots(capacity: usize) -> Option<usize> {
    usize::max(capacity, GROUP_SLOTS).checked_next_power_of_two()
}

/// Returns how many slots of a table with `capacity` slots may be filled,
/// counting live entries and tombstones alike.
///
/// Every group keeps `GROUP_SLOTS - MAX_AVG_GROUP_LOAD` slots of budget in
/// reserve, so even a single-group table (growth 7 of 8) always has an empty
/// slot to terminate find operations.
#[inline]
pub(crate) fn capacity_to_growth(capacity: usize) -> usize {
    (capacity / GROUP_SLOTS) * MAX_AVG_GROUP_LOAD
}

/// Type-erased part of the table: control bytes, counters, probing and the
/// byte moves needed by resize and rehash-in-place.
pub(crate) struct RawTableInner {
    // Array of slot groups. Each group holds GROUP_SLOTS key/elem slots and
    // their control bytes.
    groups: Groups,

    // The total number of slots (always 2^N). Equal to
    // `groups.len() * GROUP_SLOTS`.
    capacity: usize,

    // The number of filled slots (i.e. the number of elements in the table).
    used: usize,

    // The number of slots we can still fill without needing to rehash.
    //
    // This is stored separately due to tombstones: we do not include
    // tombstones in the growth capacity because we'd like to rehash when the
    // table is filled with tombstones as otherwise probe sequences might get
    // unacceptably long without triggering a rehash.
    growth_left: usize,
}

impl RawTableInner {
    /// Allocates a table with room for at least `capacity` slots, every
    /// control byte set to `EMPTY`.
    fn fallible_with_capacity(
        layout: SlotLayout,
        capacity: usize,
        fallibility: Fallibility,
    ) -> Result<Self, TryReserveError> {
        // N.B. group count must be a power of two for the probe sequence to
        // visit every group.
        let capacity = match capacity_to_slots(capacity) {
            Some(capacity) => capacity,
            None => return Err(fallibility.capacity_overflow()),
        };

        let groups = Groups::new(layout, capacity / GROUP_SLOTS, fallibility)?;
        Ok(Self {
            groups,
            capacity,
            used: 0,
            growth_left: capacity_to_growth(capacity),
        })
    }

    /// Returns the probe sequence for `hash` over the groups of the table.
    ///
    /// The sequence never terminates, but is guaranteed to visit each group
    /// exactly once. The loop using it must stop upon reaching a group
    /// containing an empty slot.
    #[inline]
    fn probe_seq(&self, hash: u64) -> ProbeSeq {
        ProbeSeq::new(h1(hash), self.groups.length_mask())
    }

    #[inline]
    fn ctrl(&self, index: usize) -> u8 {
        self.groups
            .group(index / GROUP_SLOTS)
            .ctrl(index % GROUP_SLOTS)
    }

    #[inline]
    fn set_ctrl(&self, index: usize, ctrl: u8) {
        self.groups
            .group(index / GROUP_SLOTS)
            .set_ctrl(index % GROUP_SLOTS, ctrl);
    }

    /// Marks the slot under `index` as full with the H2 of `hash`.
    #[inline]
    fn set_ctrl_h2(&self, index: usize, hash: u64) {
        self.set_ctrl(index, h2(hash));
    }

    #[inline]
    fn slot_ptr(&self, index: usize) -> *mut u8 {
        self.groups
            .group(index / GROUP_SLOTS)
            .slot(index % GROUP_SLOTS)
    }

    #[inline]
    fn key_ptr(&self, index: usize) -> *mut u8 {
        self.groups
            .group(index / GROUP_SLOTS)
            .key(index % GROUP_SLOTS)
    }

    #[inline]
    fn elem_ptr(&self, index: usize) -> *mut u8 {
        self.groups
            .group(index / GROUP_SLOTS)
            .elem(index % GROUP_SLOTS)
    }

    /// Searches for the slot holding a key for which `eq` returns true.
    ///
    /// From `h1(hash)` we construct a probe sequence over the groups. In each
    /// group we extract the candidates, full slots whose control byte equals
    /// `h2(hash)`, and compare their keys. Finding an empty slot in a group
    /// means we've reached the end of the probe sequence. Tombstones behave
    /// like full slots that never match.
    ///
    /// This uses dynamic dispatch to reduce the amount of
    /// code generated, but it is eliminated by LLVM optimizations.
    #[inline]
    fn find_inner(&self, hash: u64, eq: &mut dyn FnMut(usize) -> bool) -> Option<usize> {
        let h2_hash = h2(hash);
        let mut probe_seq = self.probe_seq(hash);

        loop {
            let offset = probe_seq.offset();
            let ctrls = self.groups.group(offset).ctrls();

            for bit in ctrls.match_h2(h2_hash) {
                let index = offset * GROUP_SLOTS + bit;

                if likely(eq(index)) {
                    return Some(index);
                }
            }

            if likely(ctrls.match_empty().any_bit_set()) {
                return None;
            }

            probe_seq.move_next();
        }
    }

    /// Same search as [`find_inner`](Self::find_inner), but a miss also
    /// reports where the key should go.
    ///
    /// Returns:
    /// - `Ok(index)` of the slot holding the key;
    /// - `Err(Some(index))` of the first empty slot in the group that ended
    ///   the probe, if there is growth budget left;
    /// - `Err(None)` if the probe ended but the table must be rehashed first.
    #[inline]
    fn find_or_find_insert_slot_inner(
        &self,
        hash: u64,
        eq: &mut dyn FnMut(usize) -> bool,
    ) -> Result<usize, Option<usize>> {
        let h2_hash = h2(hash);
        let mut probe_seq = self.probe_seq(hash);

        loop {
            let offset = probe_seq.offset();
            let ctrls = self.groups.group(offset).ctrls();

            for bit in ctrls.match_h2(h2_hash) {
                let index = offset * GROUP_SLOTS + bit;

                if likely(eq(index)) {
                    return Ok(index);
                }
            }

            let empty = ctrls.match_empty();
            if likely(empty.any_bit_set()) {
                // While searching we may have passed deleted slots that could
                // hold this entry. They are left for rehash_in_place to free.
                if likely(self.growth_left > 0) {
                    return Err(Some(offset * GROUP_SLOTS + empty.first()));
                }
                return Err(None);
            }

            probe_seq.move_next();
        }
    }

    /// Searches for the first empty or deleted slot along the probe sequence
    /// of `hash`. Used when the key is known to be absent.
    ///
    /// There must be at least 1 empty slot in the table.
    #[inline]
    fn find_insert_slot(&self, hash: u64) -> usize {
        let mut probe_seq = self.probe_seq(hash);
        loop {
            let offset = probe_seq.offset();
            let ctrls = self.groups.group(offset).ctrls();
            if let Some(bit) = ctrls.match_empty_or_deleted().lowest_set_bit() {
                return offset * GROUP_SLOTS + bit;
            }
            probe_seq.move_next();
        }
    }

    /// Sets the control byte under `index` to the H2 of `hash` and accounts
    /// for the new entry.
    ///
    /// Reusing a `DELETED` slot does not consume growth budget: tombstones
    /// are already excluded from it.
    #[inline]
    fn record_item_insert_at(&mut self, index: usize, old_ctrl: u8, hash: u64) {
        if special_is_empty(old_ctrl) {
            self.growth_left = match self.growth_left.checked_sub(1) {
                Some(growth_left) => growth_left,
                None => panic!("invariant failed: growth_left is unexpectedly 0"),
            };
        }
        self.set_ctrl_h2(index, hash);
        self.used += 1;
    }

    /// Marks the full slot under `index` as free, without touching its
    /// contents.
    #[inline]
    fn erase(&mut self, index: usize) {
        debug_assert!(is_full(self.ctrl(index)));

        let group = self.groups.group(index / GROUP_SLOTS);
        self.used -= 1;

        // Only a full group can appear in the middle of a probe sequence (a
        // group with at least one empty slot terminates probing). Once a
        // group becomes full, it stays full until rehashing/resizing. So if
        // the group isn't full now, we can simply remove the element.
        // Otherwise, we create a tombstone to mark the slot as deleted.
        if group.ctrls().match_empty().any_bit_set() {
            group.set_ctrl(index % GROUP_SLOTS, EMPTY);
            self.growth_left += 1;
        } else {
            group.set_ctrl(index % GROUP_SLOTS, DELETED);
        }
    }

    /// Returns the number of tombstones in the table. A tombstone is a slot
    /// that has been deleted but is still considered occupied so as not to
    /// violate the probing invariant.
    #[inline]
    fn tombstones(&self) -> usize {
        capacity_to_growth(self.capacity) - self.used - self.growth_left
    }

    #[inline]
    fn reset_growth_left(&mut self) {
        self.growth_left = capacity_to_growth(self.capacity);
    }

    /// Marks all slots as empty without dropping their contents.
    #[inline]
    fn clear_no_drop(&mut self) {
        self.groups.set_all_empty();
        self.used = 0;
        self.reset_growth_left();
    }

    /// Chooses between reclaiming tombstones and growing once the growth
    /// budget is exhausted.
    unsafe fn rehash(
        &mut self,
        hasher: &dyn Fn(&Self, usize) -> u64,
        drop: Option<unsafe fn(&Self, usize)>,
    ) {
        let tombstones = self.tombstones();
        if self.capacity > GROUP_SLOTS && tombstones >= self.capacity / 3 {
            debug!(
                "rehashing in place: capacity {}, used {}, tombstones {}",
                self.capacity, self.used, tombstones
            );
            self.rehash_in_place(hasher, drop);
        } else {
            let new_capacity = match self.capacity.checked_mul(2) {
                Some(new_capacity) => new_capacity,
                None => panic!("Hash table capacity overflow"),
            };
            debug!(
                "growing table from {} to {} slots: used {}, tombstones {}",
                self.capacity, new_capacity, self.used, tombstones
            );
            match self.resize_inner(new_capacity, hasher, Fallibility::Infallible) {
                Ok(()) => {}
                Err(_) => hint::unreachable_unchecked(),
            }
        }
    }

    /// Allocates a new groups array of `capacity` slots and moves every live
    /// entry into it. The old buffer is freed without dropping the entries.
    ///
    /// If `hasher` panics the table is left untouched.
    unsafe fn resize_inner(
        &mut self,
        capacity: usize,
        hasher: &dyn Fn(&Self, usize) -> u64,
        fallibility: Fallibility,
    ) -> Result<(), TryReserveError> {
        let layout = *self.groups.layout();
        let mut new_table = RawTableInner::fallible_with_capacity(layout, capacity, fallibility)?;
        assert!(
            capacity_to_growth(new_table.capacity) >= self.used,
            "new capacity {} cannot hold {} entries",
            new_table.capacity,
            self.used
        );

        // Copy all elements to the new table.
        for i in 0..self.capacity {
            if !is_full(self.ctrl(i)) {
                continue;
            }

            // This may panic, in which case `new_table` frees its buffer
            // without dropping anything and `self` still owns every entry.
            let hash = hasher(&*self, i);

            // We can use a simpler version of insert() here since:
            // - there are no DELETED entries.
            // - we know there is enough space in the table.
            // - all elements are unique.
            let new_i = new_table.find_insert_slot(hash);
            let old_ctrl = new_table.ctrl(new_i);
            ptr::copy_nonoverlapping(
                self.slot_ptr(i),
                new_table.slot_ptr(new_i),
                layout.slot_size,
            );
            new_table.record_item_insert_at(new_i, old_ctrl, hash);
        }

        // We successfully copied all elements without panicking. Now replace
        // self with the new table. The old table will have its memory freed but
        // the items will not be dropped (since they have been moved into the
        // new table).
        mem::swap(self, &mut new_table);

        Ok(())
    }

    /// Pass 1 of rehash-in-place: every `DELETED` byte becomes `EMPTY` and
    /// every full byte becomes `DELETED`, marking the entries that still have
    /// to be re-homed.
    fn prepare_rehash_in_place(&mut self) {
        for i in 0..self.groups.len() {
            let group = self.groups.group(i);
            group.set_ctrls(group.ctrls().convert_non_full_to_empty_and_full_to_deleted());
        }
    }

    /// Rehashes the contents of the table in place (i.e. without changing the
    /// allocation), eliminating every tombstone.
    ///
    /// If `hasher` panics then all the table's contents will be lost.
    unsafe fn rehash_in_place(
        &mut self,
        hasher: &dyn Fn(&Self, usize) -> u64,
        drop: Option<unsafe fn(&Self, usize)>,
    ) {
        self.prepare_rehash_in_place();

        // If the hash function panics then properly clean up any elements
        // that we haven't rehashed yet. We unfortunately can't preserve the
        // element since we lost their hash and have no way of recovering it
        // without risking another panic.
        let mut guard = guard(self, move |self_| {
            if let Some(drop) = drop {
                for index in 0..self_.capacity {
                    if self_.ctrl(index) != EMPTY {
                        drop(&**self_, index);
                    }
                }
            }
            self_.clear_no_drop();
        });

        let slot_size = guard.groups.layout().slot_size;
        let mut scratch: Vec<MaybeUninit<u8>> = Vec::with_capacity(slot_size);
        let scratch = scratch.as_mut_ptr().cast::<u8>();

        // At this point, DELETED elements are elements that we haven't
        // rehashed yet. Find them and re-insert them at their ideal
        // position.
        'outer: for i in 0..guard.capacity {
            if guard.ctrl(i) != DELETED {
                continue;
            }

            let i_p = guard.slot_ptr(i);

            'inner: loop {
                // Hash the current item
                let hash = hasher(&**guard, i);

                // Search for a suitable place to put it
                let new_i = guard.find_insert_slot(hash);

                // Every group probed before the target one is full of settled
                // entries. If the target group is the current one, the entry
                // is already as close to its ideal position as it can get.
                if likely(new_i / GROUP_SLOTS == i / GROUP_SLOTS) {
                    guard.set_ctrl_h2(i, hash);
                    continue 'outer;
                }

                let new_i_p = guard.slot_ptr(new_i);

                // We are moving the current item to a new position. Write
                // our H2 to the control byte of the new position.
                let prev_ctrl = guard.ctrl(new_i);
                guard.set_ctrl_h2(new_i, hash);

                if prev_ctrl == EMPTY {
                    // If the target slot is empty, simply move the current
                    // element into the new slot and clear the old control
                    // byte.
                    guard.set_ctrl(i, EMPTY);
                    ptr::copy_nonoverlapping(i_p, new_i_p, slot_size);
                    continue 'outer;
                } else {
                    // If the target slot is occupied, swap the two elements
                    // and then continue processing the element that we just
                    // swapped into the old slot.
                    debug_assert_eq!(prev_ctrl, DELETED);
                    ptr::copy_nonoverlapping(new_i_p, scratch, slot_size);
                    ptr::copy_nonoverlapping(i_p, new_i_p, slot_size);
                    ptr::copy_nonoverlapping(scratch, i_p, slot_size);
                    continue 'inner;
                }
            }
        }

        let used = guard.used;
        guard.reset_growth_left();
        guard.growth_left -= used;

        mem::forget(guard);
    }
}

/// Drops the key and the elem stored in the slot under `index`.
unsafe fn drop_slot<K, V>(table: &RawTableInner, index: usize) {
    ptr::drop_in_place(table.key_ptr(index).cast::<K>());
    ptr::drop_in_place(table.elem_ptr(index).cast::<V>());
}

/// A raw Swiss table of `K` keys and `V` elems with an unsafe API.
///
/// `RawTable` doesn't hash anything by itself: callers pass the hash of the
/// key they are looking for and a `hasher` closure used to re-home entries
/// when the table grows or rehashes.
///
/// Slots are addressed by a flat index, `group * GROUP_SLOTS + slot`.
pub struct RawTable<K, V> {
    table: RawTableInner,
    // Tell dropck that we own instances of K and V.
    marker: PhantomData<(K, V)>,
}

// SAFETY: the table owns its keys and elems, exactly like a `Vec<(K, V)>`.
unsafe impl<K: Send, V: Send> Send for RawTable<K, V> {}
// SAFETY: shared access only hands out shared references to keys and elems.
unsafe impl<K: Sync, V: Sync> Sync for RawTable<K, V> {}

impl<K, V> RawTable<K, V> {
    const LAYOUT: SlotLayout = SlotLayout::new::<K, V>();
    const NEEDS_DROP: bool = mem::needs_drop::<K>() || mem::needs_drop::<V>();

    /// Allocates a new hash table with room for at least `capacity` slots.
    ///
    /// The capacity is raised to one group and rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::fallible_with_capacity(capacity, Fallibility::Infallible) {
            Ok(table) => table,
            // SAFETY: infallible allocation panics or aborts instead.
            Err(_) => unsafe { hint::unreachable_unchecked() },
        }
    }

    /// Attempts to allocate a new hash table with room for at least
    /// `capacity` slots.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        Self::fallible_with_capacity(capacity, Fallibility::Fallible)
    }

    fn fallible_with_capacity(
        capacity: usize,
        fallibility: Fallibility,
    ) -> Result<Self, TryReserveError> {
        Ok(Self {
            table: RawTableInner::fallible_with_capacity(Self::LAYOUT, capacity, fallibility)?,
            marker: PhantomData,
        })
    }

    /// Returns the number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.used
    }

    /// Returns `true` if the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.used == 0
    }

    /// Returns the total number of slots. Always a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity
    }

    /// Returns how many more entries fit before a Put forces a rehash.
    #[inline]
    pub fn growth_left(&self) -> usize {
        self.table.growth_left
    }

    /// Returns the number of tombstones.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.table.tombstones()
    }

    /// Returns the number of groups, `capacity() / 8`.
    #[inline]
    pub fn num_groups(&self) -> usize {
        self.table.groups.len()
    }

    /// Returns the control word of group `group`.
    #[inline]
    pub fn group_ctrls(&self, group: usize) -> CtrlGroup {
        self.table.groups.group(group).ctrls()
    }

    /// Returns the control byte of the slot under `index`.
    #[inline]
    pub fn ctrl(&self, index: usize) -> u8 {
        self.table.ctrl(index)
    }

    /// Checks whether the slot under `index` holds a live entry.
    #[inline]
    pub fn is_bucket_full(&self, index: usize) -> bool {
        is_full(self.table.ctrl(index))
    }

    /// Returns the entry stored under `index`.
    ///
    /// # Safety
    ///
    /// The slot under `index` must be full.
    #[inline]
    pub unsafe fn bucket(&self, index: usize) -> (&K, &V) {
        debug_assert!(self.is_bucket_full(index));
        (self.key(index), &*self.table.elem_ptr(index).cast::<V>())
    }

    /// Returns the entry stored under `index`, with a mutable elem.
    ///
    /// # Safety
    ///
    /// The slot under `index` must be full.
    #[inline]
    pub unsafe fn bucket_mut(&mut self, index: usize) -> (&K, &mut V) {
        debug_assert!(self.is_bucket_full(index));
        (
            &*self.table.key_ptr(index).cast::<K>(),
            &mut *self.table.elem_ptr(index).cast::<V>(),
        )
    }

    #[inline]
    unsafe fn key(&self, index: usize) -> &K {
        &*self.table.key_ptr(index).cast::<K>()
    }

    /// Searches for a key, returning the index of its slot.
    #[inline]
    pub fn find(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<usize> {
        self.table
            .find_inner(hash, &mut |index| unsafe { eq(self.key(index)) })
    }

    /// Gets a reference to an entry in the table.
    #[inline]
    pub fn get(&self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &V)> {
        let index = self.find(hash, eq)?;
        // SAFETY: `find` only returns full slots.
        unsafe { Some(self.bucket(index)) }
    }

    /// Gets a mutable reference to an entry in the table.
    #[inline]
    pub fn get_mut(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(&K, &mut V)> {
        let index = self.find(hash, eq)?;
        // SAFETY: `find` only returns full slots.
        unsafe { Some(self.bucket_mut(index)) }
    }

    /// Searches for a key, or for the slot where it should be inserted.
    ///
    /// When the search ends but the growth budget is exhausted, the table is
    /// rehashed (in place or by growing) and the slot is picked from the
    /// rehashed table: the key is provably absent so no new search is needed.
    ///
    /// Returns `Ok(index)` of the slot holding the key, or `Err(index)` of
    /// the slot to pass to [`insert_in_slot`](Self::insert_in_slot).
    pub fn find_or_find_insert_slot(
        &mut self,
        hash: u64,
        mut eq: impl FnMut(&K) -> bool,
        hasher: impl Fn(&K) -> u64,
    ) -> Result<usize, usize> {
        let result = self
            .table
            .find_or_find_insert_slot_inner(hash, &mut |index| unsafe { eq(self.key(index)) });

        match result {
            Ok(index) => Ok(index),
            Err(Some(index)) => Err(index),
            Err(None) => {
                trace!(
                    "growth budget exhausted: capacity {}, used {}",
                    self.table.capacity,
                    self.table.used
                );
                self.rehash(&hasher);
                Err(self.table.find_insert_slot(hash))
            }
        }
    }

    /// Writes a new entry into the slot under `index` and marks it full.
    ///
    /// # Safety
    ///
    /// `index` must be the `Err` result of
    /// [`find_or_find_insert_slot`](Self::find_or_find_insert_slot) for the
    /// same `hash`, with no mutation of the table in between.
    #[inline]
    pub unsafe fn insert_in_slot(&mut self, hash: u64, index: usize, key: K, value: V) {
        let old_ctrl = self.table.ctrl(index);
        debug_assert!(!is_full(old_ctrl));
        self.table.key_ptr(index).cast::<K>().write(key);
        self.table.elem_ptr(index).cast::<V>().write(value);
        self.table.record_item_insert_at(index, old_ctrl, hash);
    }

    /// Inserts a new entry, or overwrites the elem of an existing one and
    /// returns the old elem. The stored key is kept on overwrite.
    pub fn insert(&mut self, hash: u64, key: K, value: V, hasher: impl Fn(&K) -> u64) -> Option<V>
    where
        K: Eq,
    {
        match self.find_or_find_insert_slot(hash, |x| *x == key, hasher) {
            // SAFETY: `Ok` carries a full slot.
            Ok(index) => Some(mem::replace(unsafe { self.bucket_mut(index).1 }, value)),
            Err(index) => {
                // SAFETY: the slot was just returned for this hash.
                unsafe { self.insert_in_slot(hash, index, key, value) };
                None
            }
        }
    }

    /// Removes an entry from the table, returning it.
    ///
    /// Searching stops at the first group with an empty slot: if the key was
    /// not seen by then, the table is left unchanged.
    pub fn remove(&mut self, hash: u64, eq: impl FnMut(&K) -> bool) -> Option<(K, V)> {
        let index = self.find(hash, eq)?;
        // SAFETY: `find` only returns full slots. The slot is marked free right
        // after its contents are moved out.
        unsafe {
            let key = self.table.key_ptr(index).cast::<K>().read();
            let value = self.table.elem_ptr(index).cast::<V>().read();
            self.table.erase(index);
            Some((key, value))
        }
    }

    /// Removes all entries from the table. Keeps the allocated memory.
    pub fn clear(&mut self) {
        // Ensure that the table is reset even if one of the drops panic
        let mut self_ = guard(self, |self_| self_.table.clear_no_drop());
        unsafe {
            self_.drop_elements();
        }
    }

    unsafe fn drop_elements(&mut self) {
        if Self::NEEDS_DROP && self.table.used != 0 {
            for index in 0..self.table.capacity {
                if is_full(self.table.ctrl(index)) {
                    drop_slot::<K, V>(&self.table, index);
                }
            }
        }
    }

    fn drop_fn() -> Option<unsafe fn(&RawTableInner, usize)> {
        if Self::NEEDS_DROP {
            Some(drop_slot::<K, V> as unsafe fn(&RawTableInner, usize))
        } else {
            None
        }
    }

    /// Moves every entry into a new groups array with room for at least
    /// `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity cannot hold the current entries.
    pub fn resize(&mut self, capacity: usize, hasher: impl Fn(&K) -> u64) {
        unsafe {
            match self
                .table
                .resize_inner(capacity, &erase_hasher(&hasher), Fallibility::Infallible)
            {
                Ok(()) => {}
                Err(_) => hint::unreachable_unchecked(),
            }
        }
    }

    /// Rewrites the groups array in place so that no tombstone is left,
    /// without allocating a second groups array.
    ///
    /// If `hasher` panics, every entry is dropped and the table is left empty.
    pub fn rehash_in_place(&mut self, hasher: impl Fn(&K) -> u64) {
        unsafe {
            self.table
                .rehash_in_place(&erase_hasher(&hasher), Self::drop_fn());
        }
    }

    /// Makes room for one more entry, choosing between
    /// [`rehash_in_place`](Self::rehash_in_place) and doubling the capacity.
    fn rehash(&mut self, hasher: &impl Fn(&K) -> u64) {
        if unlikely(self.table.growth_left != 0) {
            panic!(
                "invariant failed: growth_left is unexpectedly non-zero: {}",
                self.table.growth_left
            );
        }
        unsafe {
            self.table.rehash(&erase_hasher(hasher), Self::drop_fn());
        }
    }
}

/// Turns a typed hasher into one reading the key from a slot.
#[inline]
fn erase_hasher<K>(hasher: &impl Fn(&K) -> u64) -> impl Fn(&RawTableInner, usize) -> u64 + '_ {
    move |table: &RawTableInner, index: usize| hasher(unsafe { &*table.key_ptr(index).cast::<K>() })
}

impl<K, V> Drop for RawTable<K, V> {
    fn drop(&mut self) {
        unsafe {
            self.drop_elements();
        }
    }
}
