//! Table properties: metadata computed while building a table and stored in
//! a dedicated block so it can be read back without scanning data.
//!
//! The properties block is an ordinary block (restart interval 1) mapping
//! property names to values. Numeric properties are varint64 encoded;
//! names are stored as raw bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coding::{get_varint64, put_varint64};
use crate::comparator::bytewise;
use crate::error::{Error, Result};
use crate::iterator::KvIterator;
use crate::sstable::block::{Block, BlockBuilder};

/// Metaindex key of the properties block.
pub const PROPERTIES_BLOCK_NAME: &str = "tablestore.properties";

/// Prefix shared by every built-in property name.
pub const RESERVED_PREFIX: &str = "tablestore.";

/// Built-in property names.
pub mod names {
    /// Number of entries.
    pub const NUM_ENTRIES: &str = "tablestore.num.entries";
    /// Total bytes of raw keys.
    pub const RAW_KEY_SIZE: &str = "tablestore.raw.key.size";
    /// Total bytes of raw values.
    pub const RAW_VALUE_SIZE: &str = "tablestore.raw.value.size";
    /// Bytes of data blocks, trailers included.
    pub const DATA_SIZE: &str = "tablestore.data.size";
    /// Bytes of the index.
    pub const INDEX_SIZE: &str = "tablestore.index.size";
    /// Bytes of the filter.
    pub const FILTER_SIZE: &str = "tablestore.filter.size";
    /// Number of data blocks.
    pub const NUM_DATA_BLOCKS: &str = "tablestore.num.data.blocks";
    /// Name of the filter policy.
    pub const FILTER_POLICY: &str = "tablestore.filter.policy";
    /// Name of the comparator.
    pub const COMPARATOR: &str = "tablestore.comparator";
}

const NUMERIC: [&str; 7] = [
    names::NUM_ENTRIES,
    names::RAW_KEY_SIZE,
    names::RAW_VALUE_SIZE,
    names::DATA_SIZE,
    names::INDEX_SIZE,
    names::FILTER_SIZE,
    names::NUM_DATA_BLOCKS,
];

/// Properties gathered by user collectors, by name.
pub type UserCollectedProperties = BTreeMap<String, Vec<u8>>;

/// Metadata describing a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProperties {
    /// Number of entries in the table
    pub num_entries: u64,
    /// Total size of all keys as added
    pub raw_key_size: u64,
    /// Total size of all values as added
    pub raw_value_size: u64,
    /// Size of the data region, block trailers included
    pub data_size: u64,
    /// Size of the index
    pub index_size: u64,
    /// Size of the filter, 0 without a filter policy
    pub filter_size: u64,
    /// Number of data blocks
    pub num_data_blocks: u64,
    /// Name of the filter policy, empty without one
    pub filter_policy_name: String,
    /// Name of the comparator that ordered the keys
    pub comparator_name: String,
    /// Properties specific to the table format, `tablestore.`-prefixed
    pub format_properties: BTreeMap<String, Vec<u8>>,
    /// Properties produced by [`TablePropertiesCollector`]s
    pub user_collected_properties: UserCollectedProperties,
}

impl TableProperties {
    fn numeric(&self) -> [u64; 7] {
        [
            self.num_entries,
            self.raw_key_size,
            self.raw_value_size,
            self.data_size,
            self.index_size,
            self.filter_size,
            self.num_data_blocks,
        ]
    }

    fn numeric_mut(&mut self, name: &str) -> Option<&mut u64> {
        match name {
            names::NUM_ENTRIES => Some(&mut self.num_entries),
            names::RAW_KEY_SIZE => Some(&mut self.raw_key_size),
            names::RAW_VALUE_SIZE => Some(&mut self.raw_value_size),
            names::DATA_SIZE => Some(&mut self.data_size),
            names::INDEX_SIZE => Some(&mut self.index_size),
            names::FILTER_SIZE => Some(&mut self.filter_size),
            names::NUM_DATA_BLOCKS => Some(&mut self.num_data_blocks),
            _ => None,
        }
    }

    /// Encodes the properties as the contents of a properties block.
    pub fn encode(&self) -> Vec<u8> {
        let mut entries: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        for (name, value) in NUMERIC.iter().zip(self.numeric()) {
            let mut buf = Vec::new();
            put_varint64(&mut buf, value);
            entries.insert(*name, buf);
        }
        entries.insert(names::FILTER_POLICY, self.filter_policy_name.as_bytes().to_vec());
        entries.insert(names::COMPARATOR, self.comparator_name.as_bytes().to_vec());
        for (name, value) in &self.format_properties {
            entries.insert(name.as_str(), value.clone());
        }
        for (name, value) in &self.user_collected_properties {
            entries.entry(name.as_str()).or_insert_with(|| value.clone());
        }

        let mut builder = BlockBuilder::new(1);
        for (name, value) in &entries {
            builder.add(name.as_bytes(), value);
        }
        builder.finish().to_vec()
    }

    /// Decodes a properties block.
    pub fn decode(block: &Block) -> Result<Self> {
        let mut props = TableProperties::default();
        let mut iter = block.iter(bytewise());
        iter.seek_to_first();
        while iter.valid() {
            let name = std::str::from_utf8(iter.key())
                .map_err(|_| Error::corruption("property name is not valid UTF-8"))?
                .to_string();
            let value = iter.value();

            if let Some(slot) = props.numeric_mut(&name) {
                let mut input = value;
                *slot = get_varint64(&mut input)
                    .map_err(|_| Error::corruption(format!("bad value for property {}", name)))?;
            } else if name == names::FILTER_POLICY {
                props.filter_policy_name = String::from_utf8_lossy(value).into_owned();
            } else if name == names::COMPARATOR {
                props.comparator_name = String::from_utf8_lossy(value).into_owned();
            } else if name.starts_with(RESERVED_PREFIX) {
                props.format_properties.insert(name, value.to_vec());
            } else {
                props.user_collected_properties.insert(name, value.to_vec());
            }
            iter.next();
        }
        iter.status()?;
        Ok(props)
    }
}

/// Observes every entry added to a table and contributes properties.
///
/// Names produced by a collector must not start with `tablestore.`.
pub trait TablePropertiesCollector: Send {
    /// Name of the collector.
    fn name(&self) -> &str;

    /// Called for every entry, in table order.
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Called once when the table is finished.
    fn finish(&mut self) -> Result<UserCollectedProperties>;
}

/// Creates a collector for every table builder.
pub trait TablePropertiesCollectorFactory: Send + Sync {
    /// Name of the collectors this factory creates.
    fn name(&self) -> &str;

    /// Creates a fresh collector.
    fn create(&self) -> Box<dyn TablePropertiesCollector>;
}

/// The collectors attached to one table builder.
pub(crate) struct CollectorSet {
    collectors: Vec<Box<dyn TablePropertiesCollector>>,
}

impl CollectorSet {
    pub(crate) fn new(factories: &[Arc<dyn TablePropertiesCollectorFactory>]) -> Self {
        Self { collectors: factories.iter().map(|f| f.create()).collect() }
    }

    pub(crate) fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        for collector in &mut self.collectors {
            collector.add(key, value)?;
        }
        Ok(())
    }

    pub(crate) fn finish(&mut self) -> Result<UserCollectedProperties> {
        let mut all = UserCollectedProperties::new();
        for collector in &mut self.collectors {
            for (name, value) in collector.finish()? {
                if name.starts_with(RESERVED_PREFIX) {
                    return Err(Error::invalid_argument(format!(
                        "collector {} produced reserved property {}",
                        collector.name(),
                        name
                    )));
                }
                all.insert(name, value);
            }
        }
        Ok(all)
    }
}
