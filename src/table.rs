//! A hash table implemented with a single Swiss table of 8-slot groups.

use crate::raw::RawTable;
use crate::{Equivalent, TryReserveError};
use core::fmt::{self, Debug};
use core::hash::{BuildHasher, Hash};
use core::ops::Index;

pub use self::config::{SeedPolicy, TableConfig};
pub use crate::raw::Dump;

mod config;

#[cfg(test)]
mod tests_table;

/// Default hasher for `Table`.
#[cfg(feature = "ahash")]
pub type DefaultHashBuilder = core::hash::BuildHasherDefault<ahash::AHasher>;

/// Dummy default hasher for `Table`.
#[cfg(not(feature = "ahash"))]
pub enum DefaultHashBuilder {}

/// A hash table mapping `K` keys to `V` elems, stored in a single Swiss table.
///
/// Keys and elems live inline in groups of 8 slots. Every group starts with
/// the control bytes of its slots, which lookups match 8 at a time.
///
/// The default hashing algorithm is currently [`AHash`], though this is
/// subject to change at any point in the future. Every hash is additionally
/// seeded with a per-table seed (see [`SeedPolicy`]), so two tables generally
/// place the same keys differently.
///
/// It is required that the keys implement the [`Eq`] and [`Hash`] traits,
/// although this can frequently be achieved by using
/// `#[derive(PartialEq, Eq, Hash)]`. It is a logic error for a key to be
/// modified in such a way that the key's hash, as determined by the [`Hash`]
/// trait, or its equality, as determined by the [`Eq`] trait, changes while it
/// is in the table.
///
/// [`AHash`]: https://crates.io/crates/ahash
///
/// # Examples
///
/// ```
/// use swiss_table::Table;
///
/// let mut reviews = Table::new();
/// reviews.insert("Office Space", "Deals with real issues in the workplace.");
/// reviews.insert("Pulp Fiction", "Masterpiece.");
///
/// if !reviews.contains_key("Les Misérables") {
///     println!("We've got {} reviews, but Les Misérables ain't one.", reviews.len());
/// }
///
/// reviews.remove("Pulp Fiction");
/// assert_eq!(reviews.get("Office Space"), Some(&"Deals with real issues in the workplace."));
/// ```
pub struct Table<K, V, S = DefaultHashBuilder> {
    hash_builder: S,
    seed: u64,
    config: TableConfig,
    table: RawTable<K, V>,
}

/// Hashes `val` with a hasher from `hash_builder`, fed with `seed` first.
pub(crate) fn make_hash<Q, S>(hash_builder: &S, seed: u64, val: &Q) -> u64
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    use core::hash::Hasher;
    let mut state = hash_builder.build_hasher();
    state.write_u64(seed);
    val.hash(&mut state);
    state.finish()
}

/// Ensures that a single closure type across uses of this which, in turn prevents multiple
/// instances of any functions like RawTable::rehash_in_place from being generated
#[cfg_attr(feature = "inline-more", inline)]
pub(crate) fn make_hasher<K, S>(hash_builder: &S, seed: u64) -> impl Fn(&K) -> u64 + '_
where
    K: Hash,
    S: BuildHasher,
{
    move |key| make_hash::<K, S>(hash_builder, seed, key)
}

/// Ensures that a single closure type across uses of this which, in turn prevents multiple
/// instances of any functions like RawTable::find from being generated
#[cfg_attr(feature = "inline-more", inline)]
fn equivalent_key<Q, K>(k: &Q) -> impl Fn(&K) -> bool + '_
where
    Q: ?Sized + Equivalent<K>,
{
    move |x| k.equivalent(x)
}

#[cfg(feature = "ahash")]
impl<K, V> Table<K, V, DefaultHashBuilder> {
    /// Creates an empty `Table` with a single group of slots and the
    /// [`DefaultHashBuilder`].
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    /// let table: Table<&str, i32> = Table::new();
    /// assert_eq!(table.len(), 0);
    /// assert_eq!(table.capacity(), 8);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn new() -> Self {
        Self::with_config_and_hasher(TableConfig::new(), DefaultHashBuilder::default())
    }

    /// Creates an empty `Table` with at least `capacity` slots.
    ///
    /// The capacity is a slot count: it is raised to one group and rounded up
    /// to a power of two. `capacity * 7 / 8` entries fit before the table
    /// grows.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    /// let table: Table<&str, i32> = Table::with_capacity(100);
    /// assert_eq!(table.capacity(), 128);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }

    /// Creates an empty `Table` from `config`.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_config(config: TableConfig) -> Self {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Table<K, V, S> {
    /// Creates an empty `Table` which will use the given hash builder to hash
    /// keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::{DefaultHashBuilder, Table};
    ///
    /// let mut table = Table::with_hasher(DefaultHashBuilder::default());
    /// table.insert(1, 2);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_config_and_hasher(TableConfig::new(), hash_builder)
    }

    /// Creates an empty `Table` with at least `capacity` slots, using
    /// `hash_builder` to hash the keys.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_config_and_hasher(TableConfig::new().with_capacity(capacity), hash_builder)
    }

    /// Creates an empty `Table` from `config`, using `hash_builder` to hash
    /// the keys.
    ///
    /// # Panics
    ///
    /// Panics if the requested capacity overflows, and aborts if the
    /// allocation fails.
    pub fn with_config_and_hasher(config: TableConfig, hash_builder: S) -> Self {
        Self {
            hash_builder,
            seed: config.next_seed(),
            config,
            table: RawTable::with_capacity(config.capacity()),
        }
    }

    /// Fallible version of
    /// [`with_capacity_and_hasher`](Self::with_capacity_and_hasher).
    ///
    /// # Errors
    ///
    /// If the capacity overflows, or the allocator reports a failure, then an
    /// error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::{DefaultHashBuilder, Table, TryReserveError};
    ///
    /// let table: Result<Table<u64, u64>, _> =
    ///     Table::try_with_capacity_and_hasher(usize::MAX, DefaultHashBuilder::default());
    /// assert_eq!(table.err(), Some(TryReserveError::CapacityOverflow));
    /// ```
    pub fn try_with_capacity_and_hasher(
        capacity: usize,
        hash_builder: S,
    ) -> Result<Self, TryReserveError> {
        let config = TableConfig::new().with_capacity(capacity);
        Ok(Self {
            hash_builder,
            seed: config.next_seed(),
            config,
            table: RawTable::try_with_capacity(capacity)?,
        })
    }

    /// Returns a reference to the table's [`BuildHasher`].
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the settings the table was created with.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Returns the seed currently mixed into every hash.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of entries in the table.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the table contains no entries.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the total number of slots. Always a power of two and at least
    /// 8.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns how many entries can be inserted before the table has to
    /// reclaim tombstones or grow.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn growth_left(&self) -> usize {
        self.table.growth_left()
    }

    /// Returns the number of deleted slots still occupying the table.
    ///
    /// `len() + growth_left() + tombstones()` always equals
    /// `capacity() * 7 / 8`.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn tombstones(&self) -> usize {
        self.table.tombstones()
    }

    /// Returns a printable view of every group, with control bytes and the
    /// entries in slot order.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::{SeedPolicy, Table, TableConfig};
    ///
    /// let mut table = Table::with_config(TableConfig::new().with_seed_policy(SeedPolicy::Fixed(0)));
    /// table.insert(1_u8, 'a');
    /// let dump = table.dump().to_string();
    /// assert!(dump.starts_with("capacity 8 used 1 growth_left 6"));
    /// assert!(dump.contains("key 1 elem 'a'"));
    /// ```
    pub fn dump(&self) -> Dump<'_, K, V> {
        self.table.dump()
    }

    /// Entries in slot order.
    fn slots(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        (0..self.table.capacity())
            .filter(move |&index| self.table.is_bucket_full(index))
            // SAFETY: the slot is full.
            .map(move |index| unsafe { self.table.bucket(index) })
    }
}

impl<K, V, S> Table<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Inserts a key-value pair into the table.
    ///
    /// If the table did not have this key present, [`None`] is returned.
    ///
    /// If the table did have this key present, the value is updated, and the
    /// old value is returned. The key is not updated.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    ///
    /// let mut table = Table::new();
    /// assert_eq!(table.insert(37, "a"), None);
    /// assert_eq!(table.is_empty(), false);
    ///
    /// table.insert(37, "b");
    /// assert_eq!(table.insert(37, "c"), Some("b"));
    /// assert_eq!(table[&37], "c");
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = make_hash::<K, S>(&self.hash_builder, self.seed, &key);
        let old = self.table.insert(
            hash,
            key,
            value,
            make_hasher::<K, S>(&self.hash_builder, self.seed),
        );
        self.after_mutation();
        old
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    ///
    /// let mut table = Table::new();
    /// table.insert(1, "a");
    /// assert_eq!(table.get(&1), Some(&"a"));
    /// assert_eq!(table.get(&2), None);
    /// ```
    #[inline]
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.get_key_value(k).map(|(_, v)| v)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    #[inline]
    pub fn get_key_value<Q>(&self, k: &Q) -> Option<(&K, &V)>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = make_hash::<Q, S>(&self.hash_builder, self.seed, k);
        self.table.get(hash, equivalent_key(k))
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    ///
    /// let mut table = Table::new();
    /// table.insert(1, "a");
    /// if let Some(x) = table.get_mut(&1) {
    ///     *x = "b";
    /// }
    /// assert_eq!(table[&1], "b");
    /// ```
    #[inline]
    pub fn get_mut<Q>(&mut self, k: &Q) -> Option<&mut V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = make_hash::<Q, S>(&self.hash_builder, self.seed, k);
        self.table.get_mut(hash, equivalent_key(k)).map(|(_, v)| v)
    }

    /// Returns `true` if the table contains a value for the specified key.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.get_key_value(k).is_some()
    }

    /// Removes a key from the table, returning the value at the key if the key
    /// was previously in the table. Removing a missing key is a no-op.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    ///
    /// let mut table = Table::new();
    /// table.insert(1, "a");
    /// assert_eq!(table.remove(&1), Some("a"));
    /// assert_eq!(table.remove(&1), None);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn remove<Q>(&mut self, k: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.remove_entry(k).map(|(_, v)| v)
    }

    /// Removes a key from the table, returning the stored key and value if the
    /// key was previously in the table.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn remove_entry<Q>(&mut self, k: &Q) -> Option<(K, V)>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let hash = make_hash::<Q, S>(&self.hash_builder, self.seed, k);
        let entry = self.table.remove(hash, equivalent_key(k));
        self.after_mutation();
        entry
    }

    /// Clears the table, dropping every entry. Keeps the allocated memory for
    /// reuse.
    ///
    /// Under [`SeedPolicy::Random`] the table picks a new seed.
    ///
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    ///
    /// let mut table = Table::with_capacity(64);
    /// table.insert(1, "a");
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 64);
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
        self.seed = self.config.next_seed();
        self.after_mutation();
    }

    /// Removes every tombstone without changing the capacity.
    ///
    /// The table does this by itself once deletes have left enough tombstones
    /// behind. Calling it by hand is only useful to shorten probe sequences
    /// right away.
    pub fn rehash_in_place(&mut self) {
        self.table
            .rehash_in_place(make_hasher::<K, S>(&self.hash_builder, self.seed));
        self.after_mutation();
    }

    /// Moves every entry into a new allocation of at least `capacity` slots,
    /// rounded up like [`with_capacity`](Self::with_capacity).
    ///
    /// # Panics
    ///
    /// Panics if the new capacity cannot hold the current entries.
    pub fn resize(&mut self, capacity: usize) {
        self.table
            .resize(capacity, make_hasher::<K, S>(&self.hash_builder, self.seed));
        self.after_mutation();
    }

    /// Verifies every structural invariant of the table, in O(capacity).
    ///
    /// # Panics
    ///
    /// Panics with a message starting with `invariant failed` if the table is
    /// corrupted.
    pub fn check_invariants(&self) {
        self.table
            .check_invariants(make_hasher::<K, S>(&self.hash_builder, self.seed));
    }

    #[inline]
    fn after_mutation(&self) {
        if self.config.invariant_checks() {
            self.check_invariants();
        }
    }
}

impl<K, V, S> Debug for Table<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.slots()).finish()
    }
}

impl<K, V, S> Default for Table<K, V, S>
where
    S: Default,
{
    /// Creates an empty `Table<K, V, S>`, with the `Default` value for the
    /// hasher.
    #[cfg_attr(feature = "inline-more", inline)]
    fn default() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, Q: ?Sized, V, S> Index<&Q> for Table<K, V, S>
where
    K: Eq + Hash,
    Q: Hash + Equivalent<K>,
    S: BuildHasher,
{
    type Output = V;

    /// Returns a reference to the value corresponding to the supplied key.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the `Table`.
    #[cfg_attr(feature = "inline-more", inline)]
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

#[cfg(feature = "ahash")]
impl<K, V, const N: usize> From<[(K, V); N]> for Table<K, V, DefaultHashBuilder>
where
    K: Eq + Hash,
{
    /// # Examples
    ///
    /// ```
    /// use swiss_table::Table;
    ///
    /// let table = Table::from([(1, 2), (3, 4)]);
    /// assert_eq!(table[&3], 4);
    /// ```
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<K, V, S> FromIterator<(K, V)> for Table<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    #[cfg_attr(feature = "inline-more", inline)]
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let mut table = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        iter.for_each(|(k, v)| {
            table.insert(k, v);
        });
        table
    }
}

impl<K, V, S> Extend<(K, V)> for Table<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    #[cfg_attr(feature = "inline-more", inline)]
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        iter.into_iter().for_each(move |(k, v)| {
            self.insert(k, v);
        });
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for Table<K, V, S>
where
    K: Eq + Hash + Copy,
    V: Copy,
    S: BuildHasher,
{
    #[cfg_attr(feature = "inline-more", inline)]
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&k, &v)| (k, v)));
    }
}
