//! The black-box byte-stream compressor binding (component K).
//!
//! The specification treats the compressor as an opaque `compress(bytes,
//! level) -> bytes` / `decompress(bytes, expected_len) -> bytes` pair and
//! explicitly leaves the choice open (spec §9, "Open question — compressor
//! choice"); the reference implementation binds LZMA. This crate binds
//! `flate2`'s zlib codec instead — a real dependency already present
//! elsewhere in this pack for exactly this kind of binary-format work — and
//! documents the consequence (no read-compatibility with reference OpenCTM
//! v6 files) in DESIGN.md.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Compresses `bytes` at `level` (0..=9, clamped).
pub fn compress(bytes: &[u8], level: u32) -> Result<Vec<u8>> {
    let level = level.min(9);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(bytes)
        .map_err(|e| Error::CompressorError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::CompressorError(e.to_string()))
}

/// Decompresses `bytes`, which must expand to exactly `expected_len` bytes.
pub fn decompress(bytes: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::CompressorError(e.to_string()))?;
    if out.len() != expected_len {
        return Err(Error::CompressorError(format!(
            "decompressed {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}
