//! Block compression codecs.
//!
//! A codec is a byte-for-byte reversible transform identified by the
//! [`CompressionType`] id persisted in each block trailer. Codecs are compiled
//! in through cargo features; a table using a codec that is not compiled in
//! fails to decode with `NotSupported`.

use crate::config::CompressionType;
use crate::{Error, Result};

/// Compresses `raw` with `compression`.
///
/// `level` is only consulted by codecs that have levels; 0 picks the default.
#[allow(unused_variables)]
pub fn compress(compression: CompressionType, level: i32, raw: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(raw.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(raw)
            .map_err(|e| Error::invalid_state(format!("Snappy compression failed: {}", e))),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => {
            let mode = if level > 0 {
                Some(lz4::block::CompressionMode::HIGHCOMPRESSION(level))
            } else {
                None
            };
            lz4::block::compress(raw, mode, true).map_err(Error::from)
        }
    }
}

/// Reverses [`compress`] for the codec id read from a block trailer.
pub fn decompress(codec_id: u8, data: &[u8]) -> Result<Vec<u8>> {
    let compression = CompressionType::from_u8(codec_id)
        .ok_or_else(|| Error::not_supported(format!("unknown compression type {}", codec_id)))?;

    match compression {
        CompressionType::None => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::corruption(format!("Snappy decompression failed: {}", e))),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::decompress(data, None)
            .map_err(|e| Error::corruption(format!("LZ4 decompression failed: {}", e))),
    }
}

/// Whether `compressed` saves at least 12.5% over `raw_len` bytes.
pub fn good_compression_ratio(compressed_len: usize, raw_len: usize) -> bool {
    compressed_len < raw_len - raw_len / 8
}
