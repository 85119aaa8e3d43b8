use super::*;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::hash::{BuildHasherDefault, Hash, Hasher};
use fnv::{FnvBuildHasher, FnvHasher};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fixed(seed: u64) -> TableConfig {
    TableConfig::new().with_seed_policy(SeedPolicy::Fixed(seed))
}

/// Keys 1..=31, elems 256 + key, inserted into a single-group table.
fn filled_u32_table() -> Table<u32, u64> {
    let mut table = Table::with_config(fixed(0).with_capacity(8).with_invariant_checks(true));
    for key in 1..=31_u32 {
        assert_eq!(table.insert(key, 256 + u64::from(key)), None);
    }
    table
}

#[test]
fn test_put_then_get() {
    init_logger();
    let table = filled_u32_table();
    assert_eq!(table.len(), 31);
    for key in 1..=31_u32 {
        assert_eq!(table.get(&key), Some(&(256 + u64::from(key))), "key {}", key);
    }
    assert_eq!(table.get(&0), None);
    assert_eq!(table.get(&32), None);
    assert_eq!(
        table.len() + table.growth_left() + table.tombstones(),
        table.capacity() * 7 / 8
    );
}

#[test]
fn test_delete_all() {
    let mut table = filled_u32_table();
    for key in 1..=31_u32 {
        assert_eq!(table.remove(&key), Some(256 + u64::from(key)));
    }
    for key in 1..=31_u32 {
        assert_eq!(table.get(&key), None);
        assert!(!table.contains_key(&key));
    }
    assert!(table.is_empty());
    assert_eq!(table.remove(&1), None);
}

#[test]
fn test_growth_on_exhausted_budget() {
    init_logger();
    let mut table: Table<u32, u32> = Table::with_config(fixed(11).with_invariant_checks(true));
    assert_eq!(table.capacity(), 8);

    let mut key = 0;
    while table.growth_left() > 0 {
        table.insert(key, key);
        key += 1;
    }
    let capacity = table.capacity();
    table.insert(key, key);

    let in_place = table.capacity() == capacity && table.tombstones() == 0;
    let doubled = table.capacity() == capacity * 2;
    assert!(in_place || doubled);
    assert!(doubled, "a table without tombstones has to grow");
    for k in 0..=key {
        assert_eq!(table.get(&k), Some(&k));
    }
}

#[test]
fn test_clear() {
    let mut table = filled_u32_table();
    let capacity = table.capacity();
    table.clear();
    assert_eq!(table.len(), 0);
    assert_eq!(table.tombstones(), 0);
    assert_eq!(table.capacity(), capacity);
    assert_eq!(table.growth_left(), capacity * 7 / 8);
    for key in 1..=31_u32 {
        assert_eq!(table.get(&key), None);
    }
    table.insert(5, 5);
    assert_eq!(table[&5], 5);
}

/// Returns true if the table has a group without empty slots that is not made
/// of tombstones only.
fn contains_full_non_tombstone_group<K, V, S>(table: &Table<K, V, S>) -> bool {
    (0..table.table.num_groups()).any(|group| {
        let ctrls = table.table.group_ctrls(group);
        !ctrls.match_empty().any_bit_set() && ctrls.match_full().any_bit_set()
    })
}

fn count_tombstones<K, V, S>(table: &Table<K, V, S>) -> usize {
    (0..table.table.num_groups())
        .map(|group| {
            let ctrls = table.table.group_ctrls(group);
            let free = ctrls.match_empty_or_deleted().into_iter().count();
            free - ctrls.match_empty().into_iter().count()
        })
        .sum()
}

#[test]
fn test_rehash_in_place_on_tombstones() {
    init_logger();
    // Growth triggers at a load factor of 7/8, rehashing in place rather than
    // growing once 1/3 of the slots are tombstones. Live keys never take more
    // than half of the slots, which leaves room for enough tombstones.
    const CAPACITY: usize = 128;
    const USED_LIMIT: usize = CAPACITY / 2;
    const WANT_TOMBSTONES: usize = CAPACITY / 3 + 1;

    let mut table: Table<u32, u32> = Table::with_config(fixed(1).with_capacity(CAPACITY));
    let mut used_keys: Vec<u32> = Vec::with_capacity(USED_LIMIT);
    let mut rng = SmallRng::seed_from_u64(2);

    // Deleting from a completely full group leaves tombstones. Fill the table
    // until some group is full, then delete everything, and repeat.
    let mut tombstones = 0;
    while tombstones < WANT_TOMBSTONES {
        while !contains_full_non_tombstone_group(&table) {
            if used_keys.len() >= USED_LIMIT {
                let key = used_keys.swap_remove(rng.gen_range(0..USED_LIMIT));
                table.remove(&key);
            }
            let key: u32 = rng.gen();
            table.insert(key, key);
            used_keys.push(key);
        }

        for key in used_keys.drain(..) {
            table.remove(&key);
        }

        tombstones = count_tombstones(&table);
        assert_eq!(table.tombstones(), tombstones);
        table.check_invariants();
    }
    assert_eq!(table.capacity(), CAPACITY);

    // Now that more than a third of the slots are tombstones, exhaust the
    // growth budget to trigger the in-place rehash.
    for _ in 0..=table.growth_left() {
        let key: u32 = rng.gen();
        table.insert(key, key);
        used_keys.push(key);
    }

    assert_eq!(table.capacity(), CAPACITY);
    assert_eq!(table.tombstones(), 0);
    for key in &used_keys {
        assert_eq!(table.get(key), Some(key));
    }
    table.check_invariants();
}

#[test]
fn test_manual_rehash_and_resize() {
    let mut table = filled_u32_table();
    for key in (1..=31_u32).filter(|k| k % 3 == 0) {
        table.remove(&key);
    }
    let capacity = table.capacity();
    let len = table.len();

    table.rehash_in_place();
    assert_eq!(table.capacity(), capacity);
    assert_eq!(table.tombstones(), 0);
    assert_eq!(table.len(), len);

    table.resize(capacity * 2);
    assert_eq!(table.capacity(), capacity * 2);
    assert_eq!(table.len(), len);
    for key in 1..=31_u32 {
        let expected = if key % 3 == 0 { None } else { Some(256 + u64::from(key)) };
        assert_eq!(table.get(&key).copied(), expected);
    }
}

#[derive(Debug)]
struct Tagged {
    id: u32,
    tag: &'static str,
}

impl PartialEq for Tagged {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Tagged {}

impl Hash for Tagged {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[test]
fn test_insert_overwrite_keeps_key() {
    let mut table = Table::new();
    assert_eq!(table.insert(Tagged { id: 1, tag: "first" }, 10), None);
    assert_eq!(table.insert(Tagged { id: 1, tag: "second" }, 20), Some(10));
    assert_eq!(table.len(), 1);

    let (key, value) = table.get_key_value(&Tagged { id: 1, tag: "" }).unwrap();
    assert_eq!(key.tag, "first");
    assert_eq!(*value, 20);

    let (key, value) = table.remove_entry(&Tagged { id: 1, tag: "" }).unwrap();
    assert_eq!((key.tag, value), ("first", 20));
}

#[test]
fn test_get_mut() {
    let mut table = Table::new();
    table.insert(1, 12);
    if let Some(x) = table.get_mut(&1) {
        *x += 10;
    }
    assert_eq!(table[&1], 22);
    assert_eq!(table.get_mut(&2), None);
}

#[test]
fn test_equivalent_lookup() {
    let mut table: Table<String, usize> = Table::new();
    for word in ["swiss", "table", "group", "probe"] {
        table.insert(word.to_string(), word.len());
    }
    assert_eq!(table.get("table"), Some(&5));
    assert!(table.contains_key("probe"));
    assert_eq!(table.remove("group"), Some(5));
    assert!(!table.contains_key("group"));
}

#[test]
#[should_panic(expected = "no entry found for key")]
fn test_index_missing_key() {
    let table: Table<u32, u32> = Table::new();
    let _ = table[&1];
}

#[test]
fn test_from_iter_and_extend() {
    let mut table: Table<u32, u32> = (0..100).map(|i| (i, i * i)).collect();
    assert_eq!(table.len(), 100);

    table.extend((100..200).map(|i| (i, i * i)));
    table.extend([(&7_u32, &0_u32)]);
    assert_eq!(table.len(), 200);
    assert_eq!(table[&7], 0);
    assert_eq!(table[&150], 150 * 150);

    let table = Table::from([(1, "one"), (2, "two"), (1, "uno")]);
    assert_eq!(table.len(), 2);
    assert_eq!(table[&1], "uno");
}

#[test]
fn test_custom_hasher() {
    let mut table: Table<u64, u64, FnvBuildHasher> =
        Table::with_capacity_and_hasher(64, FnvBuildHasher::default());
    for i in 0..1000 {
        table.insert(i, i + 1);
    }
    for i in 0..1000 {
        assert_eq!(table.get(&i), Some(&(i + 1)));
    }
    table.check_invariants();

    let table: Table<u64, u64, FnvBuildHasher> = Table::default();
    assert_eq!(table.capacity(), 8);
}

#[test]
fn test_try_with_capacity() {
    let table: Result<Table<u64, u64>, _> =
        Table::try_with_capacity_and_hasher(usize::MAX, DefaultHashBuilder::default());
    let err = table.err().unwrap();
    assert_eq!(err, TryReserveError::CapacityOverflow);
    assert_eq!(err.to_string(), "hash table capacity overflow");

    let table: Table<u64, u64> =
        Table::try_with_capacity_and_hasher(100, DefaultHashBuilder::default()).unwrap();
    assert_eq!(table.capacity(), 128);
}

#[test]
fn test_seed_policy() {
    let mut table: Table<u32, u32> = Table::with_config(fixed(42));
    table.insert(1, 1);
    table.clear();
    assert_eq!(table.seed(), 42);

    let mut table: Table<u32, u32> = Table::new();
    assert_eq!(table.config().seed_policy(), SeedPolicy::Random);
    let mut seeds = Vec::new();
    for _ in 0..4 {
        seeds.push(table.seed());
        table.clear();
    }
    seeds.sort_unstable();
    seeds.dedup();
    assert!(seeds.len() > 1, "random seed never changed across clear()");
}

#[test]
fn test_same_seed_same_layout() {
    let config = fixed(7).with_capacity(64);
    let mut a: Table<u32, u32> = Table::with_config(config);
    let mut b: Table<u32, u32> = Table::with_config(config);
    for i in 0..40 {
        a.insert(i, i);
        b.insert(i, i);
    }
    assert_eq!(a.dump().to_string(), b.dump().to_string());
}

#[test]
fn test_debug_and_dump() {
    let mut table: Table<u32, char> = Table::with_config(fixed(0));
    assert_eq!(format!("{:?}", table), "{}");
    table.insert(1, 'a');
    assert_eq!(format!("{:?}", table), "{1: 'a'}");

    let dump = table.dump().to_string();
    assert!(dump.starts_with("capacity 8 used 1 growth_left 6\n"), "{}", dump);
    assert!(dump.contains("group 0: ctrls 0x"), "{}", dump);
    assert!(dump.contains("key 1 elem 'a'"), "{}", dump);
    assert_eq!(dump.matches(": empty").count(), 7, "{}", dump);
}

#[test]
fn test_over_aligned_values() {
    #[derive(Debug, PartialEq)]
    #[repr(align(32))]
    struct Aligned([u8; 3]);

    let mut table = Table::new();
    for i in 0..50_u8 {
        table.insert(i, Aligned([i, i, i]));
    }
    for i in 0..50_u8 {
        let value = table.get(&i).unwrap();
        assert_eq!(value, &Aligned([i, i, i]));
        assert_eq!(value as *const Aligned as usize % 32, 0);
    }
}

#[test]
fn test_drops_on_clear_and_drop() {
    use std::rc::Rc;

    let value = Rc::new(());
    let mut table = Table::new();
    for i in 0..64 {
        table.insert(i.to_string(), Rc::clone(&value));
    }
    assert_eq!(Rc::strong_count(&value), 65);

    for i in 0..16 {
        table.remove(&i.to_string());
    }
    assert_eq!(Rc::strong_count(&value), 49);

    table.clear();
    assert_eq!(Rc::strong_count(&value), 1);

    for i in 0..8 {
        table.insert(i.to_string(), Rc::clone(&value));
    }
    drop(table);
    assert_eq!(Rc::strong_count(&value), 1);
}

#[test]
fn test_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Table<String, Vec<u8>>>();
}

/// Keeps only 10 bits of the FNV hash: 8 starting groups in big tables and
/// plenty of H2 collisions.
#[derive(Default)]
struct CollidingHasher(FnvHasher);

impl Hasher for CollidingHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }

    fn finish(&self) -> u64 {
        self.0.finish() & 0x3ff
    }
}

#[test]
fn test_model_check_against_std() {
    init_logger();
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let mut table: Table<u16, u32, BuildHasherDefault<CollidingHasher>> =
        Table::with_config_and_hasher(fixed(3).with_invariant_checks(true), Default::default());
    let mut model: HashMap<u16, u32> = HashMap::new();

    for step in 0..4000_u32 {
        let key: u16 = rng.gen_range(0..300);
        match rng.gen_range(0..100) {
            0..=49 => assert_eq!(table.insert(key, step), model.insert(key, step)),
            50..=84 => assert_eq!(table.remove(&key), model.remove(&key)),
            85..=98 => assert_eq!(table.get(&key), model.get(&key)),
            _ => {
                table.clear();
                model.clear();
            }
        }
        assert_eq!(table.len(), model.len());
    }

    for (key, value) in &model {
        assert_eq!(table.get(key), Some(value));
    }
    assert_eq!(
        table.len() + table.growth_left() + table.tombstones(),
        table.capacity() * 7 / 8
    );
}

#[test]
fn test_rehash_in_place_after_random_churn() {
    init_logger();
    for seed in 0..20_u64 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut table: Table<u16, u64, BuildHasherDefault<CollidingHasher>> =
            Table::with_config_and_hasher(fixed(seed), Default::default());
        let mut model: HashMap<u16, u64> = HashMap::new();

        for step in 0..1500_u64 {
            let key: u16 = rng.gen_range(0..500);
            if rng.gen_bool(0.6) {
                assert_eq!(table.insert(key, step), model.insert(key, step));
            } else {
                assert_eq!(table.remove(&key), model.remove(&key));
            }
        }

        let capacity = table.capacity();
        table.rehash_in_place();
        assert_eq!(table.capacity(), capacity, "seed {}", seed);
        assert_eq!(table.tombstones(), 0, "seed {}", seed);
        assert_eq!(table.len(), model.len(), "seed {}", seed);
        for (key, value) in &model {
            assert_eq!(table.get(key), Some(value), "seed {}", seed);
        }
        table.check_invariants();
    }
}
