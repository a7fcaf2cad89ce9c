//! Block trailers: writing compressed, checksummed blocks and reading them
//! back.
//!
//! Every block is followed by a 5-byte trailer:
//!
//! ```text
//! [compression_type: u8][crc32: fixed32]
//! ```
//!
//! The checksum covers the stored payload and the compression byte and is
//! verified before the payload is decompressed.

use std::io::Write;

use bytes::Bytes;
use log::warn;

use crate::coding::{decode_fixed32, put_fixed32};
use crate::compression::{compress, decompress, good_compression_ratio};
use crate::config::CompressionType;
use crate::env::RandomAccessFile;
use crate::error::{Error, Result};
use crate::sstable::footer::BlockHandle;
use crate::sstable::BLOCK_TRAILER_SIZE;

fn block_checksum(payload: &[u8], codec_id: u8) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.update(&[codec_id]);
    hasher.finalize()
}

/// Compresses `raw` unless compression saves less than 12.5%.
pub fn compress_block(raw: &[u8], compression: CompressionType, level: i32) -> Result<(CompressionType, Vec<u8>)> {
    if compression == CompressionType::None {
        return Ok((CompressionType::None, raw.to_vec()));
    }

    let compressed = compress(compression, level, raw)?;
    if good_compression_ratio(compressed.len(), raw.len()) {
        Ok((compression, compressed))
    } else {
        Ok((CompressionType::None, raw.to_vec()))
    }
}

/// Writes `payload` at `offset` followed by its trailer.
///
/// Returns the handle of the payload; the caller advances its offset by
/// `handle.size + BLOCK_TRAILER_SIZE`.
pub fn write_raw_block<W: Write>(
    writer: &mut W,
    offset: u64,
    payload: &[u8],
    compression: CompressionType,
) -> Result<BlockHandle> {
    let codec_id = compression as u8;
    let mut trailer = Vec::with_capacity(BLOCK_TRAILER_SIZE);
    trailer.push(codec_id);
    put_fixed32(&mut trailer, block_checksum(payload, codec_id));

    writer.write_all(payload)?;
    writer.write_all(&trailer)?;
    Ok(BlockHandle::new(offset, payload.len() as u64))
}

/// Reads the block at `handle`, verifying and decompressing it.
pub fn read_block(file: &dyn RandomAccessFile, handle: &BlockHandle, verify_checksums: bool) -> Result<Bytes> {
    let len = usize::try_from(handle.size)
        .ok()
        .and_then(|n| n.checked_add(BLOCK_TRAILER_SIZE))
        .ok_or_else(|| Error::corruption("block handle size overflows"))?;
    let data = file.read(handle.offset, len)?;

    let payload_len = len - BLOCK_TRAILER_SIZE;
    let codec_id = data[payload_len];
    if verify_checksums {
        let expected = decode_fixed32(&data, payload_len + 1);
        let actual = block_checksum(&data[..payload_len], codec_id);
        if expected != actual {
            warn!("Block checksum mismatch at offset {}", handle.offset);
            return Err(Error::ChecksumMismatch { expected, actual });
        }
    }

    if codec_id == CompressionType::None as u8 {
        return Ok(data.slice(..payload_len));
    }
    Ok(Bytes::from(decompress(codec_id, &data[..payload_len])?))
}
