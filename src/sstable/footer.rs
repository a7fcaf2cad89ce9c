//! Block handles and the table footer.
//!
//! The footer is a fixed-size (48 bytes) structure at the end of a table file
//! that points to the index block and the metaindex block and identifies the
//! table format through its magic number.

use std::io::Write;

use crate::coding::{decode_fixed64, get_varint64, put_fixed64, put_varint64};
use crate::error::{Error, Result};
use crate::sstable::FOOTER_SIZE;

/// Largest varint encoding of a handle: two 10-byte varints.
pub const MAX_HANDLE_ENCODED_LENGTH: usize = 20;

/// BlockHandle represents a pointer to a block in the table file.
///
/// `size` covers the block contents only, not the 5-byte trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHandle {
    /// Offset of the block in the file
    pub offset: u64,
    /// Size of the block contents in bytes
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Append the varint encoding of the handle to `dst`
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Encode the handle as a standalone buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_HANDLE_ENCODED_LENGTH);
        self.encode_to(&mut buf);
        buf
    }

    /// Decode a handle from the front of `input`, advancing it
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        let offset = get_varint64(input).map_err(|_| Error::corruption("bad block handle"))?;
        let size = get_varint64(input).map_err(|_| Error::corruption("bad block handle"))?;
        Ok(Self { offset, size })
    }

    /// Decode a handle that occupies the front of `data`
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut input = data;
        Self::decode_from(&mut input)
    }
}

/// Footer is the last 48 bytes of a table file.
///
/// Format:
/// ```text
/// [metaindex_handle: varint64 x2]
/// [index_handle: varint64 x2]
/// [padding to 40 bytes]
/// [magic: fixed64]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the metaindex block
    pub metaindex_handle: BlockHandle,
    /// Handle to the index block
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Create a new Footer
    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self { metaindex_handle, index_handle }
    }

    /// Encode the footer with `magic` (48 bytes)
    pub fn encode(&self, magic: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(FOOTER_SIZE - 8, 0);
        put_fixed64(&mut buf, magic);
        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf
    }

    /// Decode a footer, rejecting any magic number other than `magic`
    pub fn decode(data: &[u8], magic: u64) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        let found = decode_fixed64(data, FOOTER_SIZE - 8);
        if found != magic {
            return Err(Error::corruption(format!(
                "Bad table magic number: expected {:#x}, got {:#x}",
                magic, found
            )));
        }

        let mut input = &data[..FOOTER_SIZE - 8];
        let metaindex_handle = BlockHandle::decode_from(&mut input)?;
        let index_handle = BlockHandle::decode_from(&mut input)?;
        Ok(Self { metaindex_handle, index_handle })
    }

    /// Write the footer to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W, magic: u64) -> Result<()> {
        writer.write_all(&self.encode(magic))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::BLOCK_BASED_TABLE_MAGIC;

    #[test]
    fn test_block_handle_encode_decode() {
        let handle = BlockHandle::new(1234, 5678);
        let encoded = handle.encode();
        assert_eq!(encoded.len(), 4);
        assert_eq!(BlockHandle::decode(&encoded).unwrap(), handle);

        let big = BlockHandle::new(u64::MAX, u64::MAX);
        assert_eq!(big.encode().len(), MAX_HANDLE_ENCODED_LENGTH);
        assert_eq!(BlockHandle::decode(&big.encode()).unwrap(), big);

        assert!(BlockHandle::decode(&[0x80]).is_err());
    }

    #[test]
    fn test_footer_encode_decode() {
        let footer = Footer::new(BlockHandle::new(1000, 100), BlockHandle::new(2000, 200));
        let encoded = footer.encode(BLOCK_BASED_TABLE_MAGIC);
        assert_eq!(encoded.len(), FOOTER_SIZE);
        assert_eq!(Footer::decode(&encoded, BLOCK_BASED_TABLE_MAGIC).unwrap(), footer);

        let magic = u64::from_le_bytes(encoded[40..48].try_into().unwrap());
        assert_eq!(magic, BLOCK_BASED_TABLE_MAGIC);
    }

    #[test]
    fn test_footer_invalid_magic() {
        let footer = Footer::new(BlockHandle::new(0, 0), BlockHandle::new(0, 0));
        let encoded = footer.encode(0x1234567890abcdef);

        let result = Footer::decode(&encoded, BLOCK_BASED_TABLE_MAGIC);
        assert!(matches!(result, Err(Error::Corruption(_))));
        assert!(Footer::decode(&encoded[..47], BLOCK_BASED_TABLE_MAGIC).is_err());
    }

    #[test]
    fn test_footer_write() {
        let footer = Footer::new(BlockHandle::new(1000, 100), BlockHandle::new(2000, 200));
        let mut buffer = Vec::new();
        footer.write_to(&mut buffer, BLOCK_BASED_TABLE_MAGIC).unwrap();
        assert_eq!(Footer::decode(&buffer, BLOCK_BASED_TABLE_MAGIC).unwrap(), footer);
    }
}
