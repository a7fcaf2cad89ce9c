//! Two-level iteration over an index and the blocks it points to.
//!
//! The outer iterator walks index entries; for each position a fresh inner
//! iterator is obtained from a block-fetching function. Empty or failed
//! blocks are skipped in the direction of travel, so block boundaries need
//! no special casing by callers.

use crate::error::{Error, Result};
use crate::iterator::KvIterator;

/// Iterator over the entries of every block named by an index iterator.
pub struct TwoLevelIterator<I, F> {
    index_iter: I,
    block_fn: F,
    data_iter: Option<Box<dyn KvIterator>>,
    /// Index value that produced `data_iter`
    data_block_handle: Vec<u8>,
    error: Option<Error>,
}

impl<I, F> TwoLevelIterator<I, F>
where
    I: KvIterator,
    F: FnMut(&[u8]) -> Result<Box<dyn KvIterator>> + Send,
{
    /// Creates an iterator; `block_fn` opens the block named by an index value.
    pub fn new(index_iter: I, block_fn: F) -> Self {
        Self { index_iter, block_fn, data_iter: None, data_block_handle: Vec::new(), error: None }
    }

    fn save_error(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn set_data_iter(&mut self, data_iter: Option<Box<dyn KvIterator>>) {
        if let Some(old) = self.data_iter.take() {
            if let Err(err) = old.status() {
                self.save_error(err);
            }
        }
        self.data_iter = data_iter;
    }

    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.set_data_iter(None);
            return;
        }

        let handle = self.index_iter.value();
        if self.data_iter.is_some() && handle == self.data_block_handle.as_slice() {
            // Already positioned on this block
            return;
        }

        let handle = handle.to_vec();
        match (self.block_fn)(&handle) {
            Ok(iter) => {
                self.data_block_handle = handle;
                self.set_data_iter(Some(iter));
            }
            Err(err) => {
                self.save_error(err);
                self.data_block_handle.clear();
                self.set_data_iter(None);
            }
        }
    }

    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|d| d.valid())
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() || self.error.is_some() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(data) = self.data_iter.as_mut() {
                data.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() || self.error.is_some() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(data) = self.data_iter.as_mut() {
                data.seek_to_last();
            }
        }
    }

    fn data(&self) -> &dyn KvIterator {
        match self.data_iter.as_deref() {
            Some(data) if data.valid() => data,
            _ => panic!("two-level iterator is not positioned"),
        }
    }
}

impl<I, F> KvIterator for TwoLevelIterator<I, F>
where
    I: KvIterator,
    F: FnMut(&[u8]) -> Result<Box<dyn KvIterator>> + Send,
{
    fn valid(&self) -> bool {
        self.error.is_none() && self.data_valid()
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(data) = self.data_iter.as_mut() {
            data.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(data) = self.data_iter.as_mut() {
            data.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(data) = self.data_iter.as_mut() {
            data.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        assert!(self.valid(), "next() on invalid two-level iterator");
        if let Some(data) = self.data_iter.as_mut() {
            data.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        assert!(self.valid(), "prev() on invalid two-level iterator");
        if let Some(data) = self.data_iter.as_mut() {
            data.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        self.data().key()
    }

    fn value(&self) -> &[u8] {
        self.data().value()
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        match &self.data_iter {
            Some(data) => data.status(),
            None => Ok(()),
        }
    }
}
