//! Shared harness: builds the same data into every container and checks
//! each iterator against a sorted reference model.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tablestore::config::PlainTableIndexType;
use tablestore::env::InMemoryFile;
use tablestore::iterator::UserKeyIterator;
use tablestore::memtable::internal_key::{InternalKey, InternalKeyComparator, ValueType};
use tablestore::memtable::{MemTable, MemTableRepFactory};
use tablestore::slice_transform::FixedPrefixTransform;
use tablestore::sstable::{Block, BlockBasedTable, BlockBasedTableBuilder, BlockBuilder};
use tablestore::{
    BlockBasedTableOptions, Comparator, CompressionType, KvIterator, Options, PlainTableBuilder, PlainTableOptions,
    PlainTableReader, ReadOptions,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random key drawn from a small alphabet, so keys share prefixes.
pub fn random_key(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    const ALPHABET: &[u8] = b"\x00\x01abcde\xfd\xfe\xff";
    let len = rng.random_range(0..=max_len);
    (0..len).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())]).collect()
}

pub fn random_value(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.random_range(0..=max_len);
    (0..len).map(|_| rng.random::<u8>()).collect()
}

/// Entries sorted and deduplicated under a comparator.
pub struct Model {
    pub cmp: Arc<dyn Comparator>,
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Model {
    pub fn new(cmp: Arc<dyn Comparator>, mut entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        entries.sort_by(|a, b| cmp.compare(&a.0, &b.0));
        entries.dedup_by(|b, a| cmp.compare(&a.0, &b.0) == Ordering::Equal);
        Self { cmp, entries }
    }

    pub fn random(cmp: Arc<dyn Comparator>, rng: &mut StdRng, n: usize) -> Self {
        let entries = (0..n).map(|_| (random_key(rng, 12), random_value(rng, 40))).collect();
        Self::new(cmp, entries)
    }

    /// Index of the first entry `>= target`.
    pub fn lower_bound(&self, target: &[u8]) -> usize {
        self.entries.partition_point(|(k, _)| self.cmp.compare(k, target) == Ordering::Less)
    }
}

/// Something the harness can fill with a model and iterate.
pub trait Constructor {
    fn name(&self) -> String;

    fn build(&self, model: &Model) -> Box<dyn KvIterator>;

    /// Whether `prev` and `seek_to_last` are supported.
    fn supports_backward(&self) -> bool {
        true
    }

    /// Whether `seek` reaches keys outside the target's prefix group.
    fn total_order_seek(&self) -> bool {
        true
    }
}

pub struct BlockConstructor {
    pub restart_interval: usize,
}

impl Constructor for BlockConstructor {
    fn name(&self) -> String {
        format!("block(restart={})", self.restart_interval)
    }

    fn build(&self, model: &Model) -> Box<dyn KvIterator> {
        let mut builder = BlockBuilder::new(self.restart_interval);
        for (key, value) in &model.entries {
            builder.add(key, value);
        }
        let block = Block::new(builder.finish()).unwrap();
        Box::new(block.iter(Arc::clone(&model.cmp)))
    }
}

pub struct TableConstructor {
    pub restart_interval: usize,
    pub block_size: usize,
    pub compression: CompressionType,
}

impl TableConstructor {
    pub fn options(&self, cmp: &Arc<dyn Comparator>) -> (Options, BlockBasedTableOptions) {
        let options = Options::default().comparator(Arc::clone(cmp)).compression(self.compression);
        let table_options = BlockBasedTableOptions::default()
            .block_size(self.block_size)
            .block_restart_interval(self.restart_interval);
        (options, table_options)
    }
}

impl Constructor for TableConstructor {
    fn name(&self) -> String {
        format!(
            "table(restart={}, block_size={}, {:?})",
            self.restart_interval, self.block_size, self.compression
        )
    }

    fn build(&self, model: &Model) -> Box<dyn KvIterator> {
        let (options, table_options) = self.options(&model.cmp);
        let mut builder = BlockBasedTableBuilder::new(options.clone(), table_options.clone(), Vec::new()).unwrap();
        for (key, value) in &model.entries {
            builder.add(key, value).unwrap();
        }
        builder.finish().unwrap();
        let file = Arc::new(InMemoryFile::new(builder.into_inner()));
        let table = BlockBasedTable::open(options, table_options, file).unwrap();
        table.new_iterator(&ReadOptions::default())
    }
}

/// Plain tables store internal keys; the iterator is viewed through
/// [`UserKeyIterator`]. Keys are cut into 2-byte prefix groups.
pub struct PlainConstructor {
    pub index_type: PlainTableIndexType,
}

impl Constructor for PlainConstructor {
    fn name(&self) -> String {
        format!("plain({:?})", self.index_type)
    }

    fn build(&self, model: &Model) -> Box<dyn KvIterator> {
        let options = Options::default()
            .comparator(Arc::new(InternalKeyComparator::new(Arc::clone(&model.cmp))))
            .prefix_extractor(Arc::new(FixedPrefixTransform::new(2)));
        let table_options = PlainTableOptions::default().index_type(self.index_type);

        let mut builder = PlainTableBuilder::new(options.clone(), table_options, Vec::new()).unwrap();
        for (key, value) in &model.entries {
            builder.add(&InternalKey::new(key.clone(), 1, ValueType::Value).encode(), value).unwrap();
        }
        builder.finish().unwrap();
        let file = Arc::new(InMemoryFile::new(builder.into_inner()));
        let table = PlainTableReader::open(options, table_options, file).unwrap();
        Box::new(UserKeyIterator::new(table.new_iterator()))
    }

    fn supports_backward(&self) -> bool {
        !self.index_type.is_hash()
    }

    fn total_order_seek(&self) -> bool {
        !self.index_type.is_hash()
    }
}

pub struct MemTableConstructor {
    pub factory: Arc<dyn MemTableRepFactory>,
    pub label: &'static str,
}

impl Constructor for MemTableConstructor {
    fn name(&self) -> String {
        format!("memtable({})", self.label)
    }

    fn build(&self, model: &Model) -> Box<dyn KvIterator> {
        let cmp = Arc::new(InternalKeyComparator::new(Arc::clone(&model.cmp)));
        let memtable = MemTable::new(cmp, self.factory.as_ref());
        for (seq, (key, value)) in model.entries.iter().enumerate() {
            memtable.add(seq as u64 + 1, ValueType::Value, key, value);
        }
        Box::new(UserKeyIterator::new(memtable.new_iterator()))
    }
}

fn entry(iter: &dyn KvIterator) -> Option<(Vec<u8>, Vec<u8>)> {
    iter.valid().then(|| (iter.key().to_vec(), iter.value().to_vec()))
}

fn expected(model: &Model, pos: Option<usize>) -> Option<(Vec<u8>, Vec<u8>)> {
    pos.and_then(|p| model.entries.get(p).cloned())
}

/// Runs forward, backward and random-access checks of `constructor` against
/// `model`.
pub fn check(constructor: &dyn Constructor, model: &Model, seed: u64) {
    let name = constructor.name();
    let mut iter = constructor.build(model);

    // Forward scan
    let mut forward = Vec::new();
    iter.seek_to_first();
    while let Some(e) = entry(iter.as_ref()) {
        forward.push(e);
        iter.next();
    }
    iter.status().unwrap();
    assert_eq!(forward, model.entries, "{}: forward scan", name);

    // Backward scan
    if constructor.supports_backward() {
        let mut backward = Vec::new();
        iter.seek_to_last();
        while let Some(e) = entry(iter.as_ref()) {
            backward.push(e);
            iter.prev();
        }
        iter.status().unwrap();
        backward.reverse();
        assert_eq!(backward, model.entries, "{}: backward scan", name);
    }

    random_access(constructor, model, seed);
}

fn random_access(constructor: &dyn Constructor, model: &Model, seed: u64) {
    let name = constructor.name();
    let mut rng = rng(seed);
    let mut iter = constructor.build(model);
    let mut pos: Option<usize> = None;
    let n = model.entries.len();

    for step in 0..200 {
        let op = if constructor.supports_backward() { rng.random_range(0..5) } else { rng.random_range(0..3) };
        match op {
            0 => {
                iter.seek_to_first();
                pos = (n > 0).then_some(0);
            }
            1 => {
                if pos.is_some() {
                    iter.next();
                    pos = pos.map(|p| p + 1).filter(|&p| p < n);
                }
            }
            2 => {
                let target = if constructor.total_order_seek() || n == 0 {
                    random_key(&mut rng, 12)
                } else {
                    model.entries[rng.random_range(0..n)].0.clone()
                };
                iter.seek(&target);
                if constructor.total_order_seek() || n == 0 {
                    pos = Some(model.lower_bound(&target)).filter(|&p| p < n);
                } else {
                    pos = Some(model.lower_bound(&target));
                }
            }
            3 => {
                if pos.is_some() {
                    iter.prev();
                    pos = pos.and_then(|p| p.checked_sub(1));
                }
            }
            _ => {
                iter.seek_to_last();
                pos = n.checked_sub(1);
            }
        }
        assert_eq!(entry(iter.as_ref()), expected(model, pos), "{}: step {} (op {})", name, step, op);
    }
    iter.status().unwrap();
}

/// Every constructor the harness covers for `cmp`.
///
/// Plain tables need contiguous prefix groups, which only the bytewise
/// order guarantees.
pub fn constructors(bytewise_order: bool) -> Vec<Box<dyn Constructor>> {
    use tablestore::memtable::{BTreeFactory, SkipListFactory};

    let mut all: Vec<Box<dyn Constructor>> = Vec::new();
    for restart_interval in [16, 1, 1024] {
        all.push(Box::new(BlockConstructor { restart_interval }));
        for compression in compressions() {
            all.push(Box::new(TableConstructor { restart_interval, block_size: 256, compression }));
        }
    }
    if bytewise_order {
        for index_type in
            [PlainTableIndexType::TotalOrder, PlainTableIndexType::HashFixedPrefix, PlainTableIndexType::HashFullPrefix]
        {
            all.push(Box::new(PlainConstructor { index_type }));
        }
    }
    all.push(Box::new(MemTableConstructor { factory: Arc::new(SkipListFactory), label: "skiplist" }));
    all.push(Box::new(MemTableConstructor { factory: Arc::new(BTreeFactory), label: "btree" }));
    all
}

pub fn compressions() -> Vec<CompressionType> {
    let mut all = vec![CompressionType::None];
    #[cfg(feature = "snappy")]
    all.push(CompressionType::Snappy);
    #[cfg(feature = "lz4-compression")]
    all.push(CompressionType::Lz4);
    all
}
