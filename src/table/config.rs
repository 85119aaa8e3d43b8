use core::sync::atomic::{AtomicUsize, Ordering};

/// How a [`Table`](crate::Table) picks the seed mixed into every hash.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SeedPolicy {
    /// A fresh unpredictable seed when the table is created, and again each
    /// time it is cleared.
    #[default]
    Random,
    /// The same seed for the whole life of the table, including across
    /// [`clear`](crate::Table::clear). Makes slot placement reproducible.
    Fixed(u64),
}

/// Construction-time settings of a [`Table`](crate::Table).
///
/// # Examples
///
/// ```
/// use swiss_table::{SeedPolicy, Table, TableConfig};
///
/// let config = TableConfig::new()
///     .with_capacity(64)
///     .with_seed_policy(SeedPolicy::Fixed(7))
///     .with_invariant_checks(true);
///
/// let mut table = Table::with_config(config);
/// table.insert("a", 1);
/// assert_eq!(table.capacity(), 64);
/// assert_eq!(table.seed(), 7);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableConfig {
    capacity: usize,
    seed_policy: SeedPolicy,
    invariant_checks: bool,
}

impl TableConfig {
    /// Default settings: one group, random seed, no invariant checks.
    pub const fn new() -> Self {
        Self {
            capacity: 0,
            seed_policy: SeedPolicy::Random,
            invariant_checks: false,
        }
    }

    /// Sets the initial number of slots. It is raised to at least one group
    /// and rounded up to a power of two.
    pub const fn with_capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Sets the seed policy.
    pub const fn with_seed_policy(self, seed_policy: SeedPolicy) -> Self {
        Self {
            seed_policy,
            ..self
        }
    }

    /// When enabled, the table verifies all of its invariants after every
    /// mutating operation. This costs O(capacity) per operation.
    pub const fn with_invariant_checks(self, enabled: bool) -> Self {
        Self {
            invariant_checks: enabled,
            ..self
        }
    }

    /// Returns the requested initial number of slots.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the seed policy.
    pub const fn seed_policy(&self) -> SeedPolicy {
        self.seed_policy
    }

    /// Returns whether invariants are checked after every mutation.
    pub const fn invariant_checks(&self) -> bool {
        self.invariant_checks
    }

    /// Picks the seed for a new or just cleared table.
    pub(crate) fn next_seed(&self) -> u64 {
        match self.seed_policy {
            SeedPolicy::Random => fresh_seed(),
            SeedPolicy::Fixed(seed) => seed,
        }
    }
}

static SEED_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a new seed, different for every call.
#[cfg(feature = "ahash")]
pub(crate) fn fresh_seed() -> u64 {
    let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
    ahash::RandomState::new().hash_one(counter)
}

/// Returns a new seed, different for every call.
///
/// Without a runtime source of randomness this is a SplitMix64 step over a
/// process-wide counter: distinct, but predictable.
#[cfg(not(feature = "ahash"))]
pub(crate) fn fresh_seed() -> u64 {
    let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed) as u64;
    let mut z = counter.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
