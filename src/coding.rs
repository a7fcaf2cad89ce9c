//! Varint and fixed-width encoding helpers shared by the block and table formats.

use bytes::{Buf, BufMut};
use integer_encoding::VarInt;

use crate::error::{Error, Result};

/// Appends `value` as a varint.
pub fn put_varint64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 10];
    let n = value.encode_var(&mut buf);
    dst.extend_from_slice(&buf[..n]);
}

/// Appends `value` as a varint.
pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, value as u64);
}

/// Appends a varint length followed by `data`.
pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, data: &[u8]) {
    put_varint64(dst, data.len() as u64);
    dst.extend_from_slice(data);
}

/// Number of bytes `value` takes as a varint.
pub fn varint_length(value: u64) -> usize {
    value.required_space()
}

/// Decodes a varint from the front of `src`, returning it and its length.
pub fn decode_varint64(src: &[u8]) -> Option<(u64, usize)> {
    u64::decode_var(src)
}

/// Decodes a u32 varint from the front of `src`.
pub fn decode_varint32(src: &[u8]) -> Option<(u32, usize)> {
    u32::decode_var(src)
}

/// Reads a varint and advances `input` past it.
pub fn get_varint64(input: &mut &[u8]) -> Result<u64> {
    let (value, n) =
        decode_varint64(input).ok_or_else(|| Error::corruption("bad varint64"))?;
    input.advance(n);
    Ok(value)
}

/// Reads a length-prefixed slice and advances `input` past it.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = get_varint64(input)? as usize;
    if input.len() < len {
        return Err(Error::corruption("truncated length-prefixed slice"));
    }
    let (data, rest) = input.split_at(len);
    *input = rest;
    Ok(data)
}

/// Appends a little-endian u32.
pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    dst.put_u32_le(value);
}

/// Appends a little-endian u64.
pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    dst.put_u64_le(value);
}

/// Reads a little-endian u32 at `offset`; the caller checks bounds.
pub fn decode_fixed32(src: &[u8], offset: usize) -> u32 {
    (&src[offset..offset + 4]).get_u32_le()
}

/// Reads a little-endian u64 at `offset`; the caller checks bounds.
pub fn decode_fixed64(src: &[u8], offset: usize) -> u64 {
    (&src[offset..offset + 8]).get_u64_le()
}
