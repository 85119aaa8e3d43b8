//! Swiss table
//!
//! **`A single-table open-addressing hash table in the SwissTable family.`**
//!
//! Slots are arranged in groups of 8. Every group starts with a 64-bit word
//! holding the 8 control bytes of its slots, followed by the keys and elems
//! stored inline. A lookup hashes the key once, uses the high bits (H1) to
//! pick the first group of a triangular probe sequence over the groups, and
//! compares the low 7 bits (H2) against all 8 control bytes of a group at once
//! with SWAR ("SIMD within a register") arithmetic on that word.
//!
//! Deleted entries leave tombstones behind when their group is full. Once the
//! growth budget (7/8 of the slots) is exhausted the table either reclaims the
//! tombstones in place, or doubles its capacity.
//!
//! The entry point is [`Table`]:
//!
//! ```
//! use swiss_table::Table;
//!
//! let mut table = Table::new();
//! table.insert(1_u32, "one");
//! table.insert(2, "two");
//!
//! assert_eq!(table.get(&1), Some(&"one"));
//! assert_eq!(table.remove(&2), Some("two"));
//! assert_eq!(table.len(), 1);
//! ```
//!
//! The design follows Google's [SwissTable] and the Rust port of it found in
//! [`Hashbrown`]. This [CppCon talk] gives an overview of how the algorithm
//! works.
//!
//! [SwissTable]: https://abseil.io/blog/20180927-swisstables
//! [`Hashbrown`]: https://github.com/rust-lang/hashbrown
//! [CppCon talk]: https://www.youtube.com/watch?v=ncHmEUmJZf4

#![no_std]
#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rustdoc::broken_intra_doc_links)]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

#[cfg(feature = "raw")]
/// Experimental and unsafe `RawTable` API. This module is only available if the
/// `raw` feature is enabled.
pub mod raw {
    // The RawTable API is still experimental and is not properly documented yet.
    #[allow(missing_docs)]
    #[allow(unused_imports)]
    #[allow(dead_code)]
    #[path = "mod.rs"]
    mod inner;
    pub use inner::*;
}
#[allow(unused_imports)]
#[allow(dead_code)]
#[cfg(not(feature = "raw"))]
mod raw;

mod scopeguard;

pub mod table;

pub use crate::table::{DefaultHashBuilder, SeedPolicy, Table, TableConfig};

/// Key equivalence trait.
///
/// This trait defines the function used to compare the input value with the
/// table keys during a lookup operation such as [`Table::get`] or
/// [`Table::contains_key`].
/// It is provided with a blanket implementation based on the
/// [`Borrow`](core::borrow::Borrow) trait.
///
/// # Correctness
///
/// Equivalent values must hash to the same value.
pub trait Equivalent<K: ?Sized> {
    /// Checks if this value is equivalent to the given key.
    ///
    /// Returns `true` if both values are equivalent, and `false` otherwise.
    ///
    /// # Correctness
    ///
    /// When this function returns `true`, both `self` and `key` must hash to
    /// the same value.
    fn equivalent(&self, key: &K) -> bool;
}

impl<Q: ?Sized, K: ?Sized> Equivalent<K> for Q
where
    Q: Eq,
    K: core::borrow::Borrow<Q>,
{
    fn equivalent(&self, key: &K) -> bool {
        self == key.borrow()
    }
}

/// The error type for fallible table allocation.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum TryReserveError {
    /// Error due to the computed capacity exceeding the collection's maximum
    /// (usually `isize::MAX` bytes).
    #[error("hash table capacity overflow")]
    CapacityOverflow,

    /// The memory allocator returned an error
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError {
        /// The layout of the allocation request that failed.
        layout: alloc::alloc::Layout,
    },
}
