//! Invariant checking and a human-readable dump of the table, meant for
//! debugging and tests.

use super::bitset::{DELETED, EMPTY, GROUP_SLOTS};
use super::{capacity_to_growth, h2, is_full, RawTable};
use core::fmt;

impl<K, V> RawTable<K, V> {
    /// Walks every slot and verifies the structural invariants of the table:
    ///
    /// - the capacity is a power of two matching the number of groups;
    /// - every control byte is `EMPTY`, `DELETED` or full;
    /// - every full slot carries the H2 of its key, and looking the key up
    ///   lands on that very slot;
    /// - the counters agree with the control bytes, i.e. `len()` equals the
    ///   number of full slots and `tombstones()` the number of deleted ones;
    /// - at least one slot is empty, so that every probe terminates.
    ///
    /// # Panics
    ///
    /// Panics with a message starting with `invariant failed` on the first
    /// violation found.
    pub fn check_invariants(&self, hasher: impl Fn(&K) -> u64)
    where
        K: Eq,
    {
        let capacity = self.table.capacity;
        if !capacity.is_power_of_two() {
            panic!("invariant failed: capacity {} is not a power of two", capacity);
        }
        if capacity != self.table.groups.len() * GROUP_SLOTS {
            panic!(
                "invariant failed: capacity {} does not match {} groups",
                capacity,
                self.table.groups.len()
            );
        }

        let mut used = 0;
        let mut deleted = 0;
        let mut empty = 0;

        for index in 0..capacity {
            match self.table.ctrl(index) {
                EMPTY => empty += 1,
                DELETED => deleted += 1,
                ctrl if is_full(ctrl) => {
                    used += 1;

                    // SAFETY: the slot is full.
                    let key = unsafe { self.key(index) };
                    let hash = hasher(key);
                    if ctrl != h2(hash) {
                        panic!(
                            "invariant failed: slot {} has ctrl {:#04x}, want h2 {:#04x}",
                            index,
                            ctrl,
                            h2(hash)
                        );
                    }

                    match self.find(hash, |k| k == key) {
                        Some(found) if found == index => {}
                        found => panic!(
                            "invariant failed: key in slot {} is found at {:?}",
                            index, found
                        ),
                    }
                }
                ctrl => panic!("invariant failed: slot {} has invalid ctrl {:#04x}", index, ctrl),
            }
        }

        if used != self.table.used {
            panic!(
                "invariant failed: found {} full slots, used is {}",
                used, self.table.used
            );
        }

        let tombstones = capacity_to_growth(capacity)
            .checked_sub(self.table.used)
            .and_then(|left| left.checked_sub(self.table.growth_left));
        match tombstones {
            Some(tombstones) if tombstones == deleted => {}
            Some(tombstones) => panic!(
                "invariant failed: found {} deleted slots, counters imply {} tombstones",
                deleted, tombstones
            ),
            None => panic!(
                "invariant failed: used {} + growth_left {} exceed the growth of {} slots",
                self.table.used, self.table.growth_left, capacity
            ),
        }

        if empty == 0 {
            panic!("invariant failed: no empty slot left in the table");
        }
    }

    /// Returns a value whose [`Display`](fmt::Display) implementation prints
    /// the counters and every group of the table, slot by slot.
    pub fn dump(&self) -> Dump<'_, K, V> {
        Dump { table: self }
    }
}

/// Slot-by-slot printout of a [`RawTable`], created by [`RawTable::dump`].
pub struct Dump<'a, K, V> {
    table: &'a RawTable<K, V>,
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Display for Dump<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = &self.table.table;
        writeln!(
            f,
            "capacity {} used {} growth_left {}",
            table.capacity, table.used, table.growth_left
        )?;

        for group in 0..table.groups.len() {
            let ctrls = table.groups.group(group).ctrls();
            writeln!(f, "group {}: ctrls {:#018x}", group, ctrls.0)?;

            for slot in 0..GROUP_SLOTS {
                match ctrls.get(slot) {
                    EMPTY => writeln!(f, "  slot {}: empty", slot)?,
                    DELETED => writeln!(f, "  slot {}: deleted", slot)?,
                    ctrl if is_full(ctrl) => {
                        // SAFETY: the slot is full.
                        let (key, value) = unsafe { self.table.bucket(group * GROUP_SLOTS + slot) };
                        writeln!(
                            f,
                            "  slot {}: h2 {:#04x} key {:?} elem {:?}",
                            slot, ctrl, key, value
                        )?;
                    }
                    ctrl => writeln!(f, "  slot {}: invalid ctrl {:#04x}", slot, ctrl)?,
                }
            }
        }
        Ok(())
    }
}
