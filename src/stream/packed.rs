//! The packed int/float coder (component C): byte-plane deinterleaving,
//! a fixed bitwise rotation schedule, and the black-box compressor.
//!
//! Wire format: `u32 packed_size` followed by `packed_size` compressed bytes,
//! which decompress to exactly `count * 4` bytes (`count` `i32`s or `f32`s).

use super::primitives::{StreamReader, StreamWriter};
use crate::compressor;
use crate::error::Result;

/// Byte-plane emission order for integer blocks: ascending, LSB-plane first.
const INT_PLANE_ORDER: [usize; 4] = [0, 1, 2, 3];
/// Byte-plane emission order for float blocks: sign/exponent first, so the
/// high-entropy exponent byte is grouped with itself across the block.
const FLOAT_PLANE_ORDER: [usize; 4] = [3, 2, 1, 0];

/// Per-slot (not per-byte-offset) bit rotation amount, applied during
/// deinterleaving and undone during reinterleaving. Fixed and symmetric;
/// the exact values only need to round-trip, not match any external
/// reference, since the specification leaves the permutation
/// implementation-defined.
const ROTATE_SCHEDULE: [u32; 4] = [1, 3, 5, 7];

fn deinterleave_and_rotate(raw: &[u8], count: usize, plane_order: [usize; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 4);
    for (slot, &plane) in plane_order.iter().enumerate() {
        let amount = ROTATE_SCHEDULE[slot];
        for i in 0..count {
            out.push(raw[i * 4 + plane].rotate_left(amount));
        }
    }
    out
}

fn reinterleave_and_unrotate(transformed: &[u8], count: usize, plane_order: [usize; 4]) -> Vec<u8> {
    let mut out = vec![0u8; count * 4];
    for (slot, &plane) in plane_order.iter().enumerate() {
        let amount = ROTATE_SCHEDULE[slot];
        let base = slot * count;
        for i in 0..count {
            out[i * 4 + plane] = transformed[base + i].rotate_right(amount);
        }
    }
    out
}

fn write_packed_block(writer: &mut StreamWriter, raw: &[u8], count: usize, level: u32, plane_order: [usize; 4]) -> Result<()> {
    let transformed = deinterleave_and_rotate(raw, count, plane_order);
    let packed = compressor::compress(&transformed, level)?;
    writer.write_u32(packed.len() as u32)?;
    writer.write_all(&packed)
}

fn read_packed_block(reader: &mut StreamReader, count: usize, plane_order: [usize; 4]) -> Result<Vec<u8>> {
    let packed_size = reader.read_u32()? as usize;
    let packed = reader.read_bytes(packed_size)?;
    let transformed = compressor::decompress(&packed, count * 4)?;
    Ok(reinterleave_and_unrotate(&transformed, count, plane_order))
}

/// Writes `values` as a packed, compressed `i32` block.
///
/// `signed` only selects sign-extension semantics at the call site per spec
/// §4.C ("unused beyond type selection"); both signed and unsigned callers
/// produce identical bytes here since the `i32` values are already in their
/// final bit pattern.
pub fn write_packed_i32(writer: &mut StreamWriter, values: &[i32], level: u32) -> Result<()> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for v in values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    write_packed_block(writer, &raw, values.len(), level, INT_PLANE_ORDER)
}

pub fn read_packed_i32(reader: &mut StreamReader, count: usize) -> Result<Vec<i32>> {
    let raw = read_packed_block(reader, count, INT_PLANE_ORDER)?;
    Ok(raw
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
        .collect())
}

pub fn write_packed_f32(writer: &mut StreamWriter, values: &[f32], level: u32) -> Result<()> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for v in values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    write_packed_block(writer, &raw, values.len(), level, FLOAT_PLANE_ORDER)
}

pub fn read_packed_f32(reader: &mut StreamReader, count: usize) -> Result<Vec<f32>> {
    let raw = read_packed_block(reader, count, FLOAT_PLANE_ORDER)?;
    Ok(raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect())
}
