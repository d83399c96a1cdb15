//! The MG1 pipeline (component E): triangle canonicalization, stable sort,
//! and delta coding of the index buffer; vertex/normal/UV/attribute arrays
//! reuse the same per-frame payload shape as RAW.

use super::raw::{read_frame_payload, write_frame_payload};
use super::{CodecParams, Pipeline};
use crate::error::Result;
use crate::mesh::{FrameData, MeshShape};
use crate::stream::packed::{read_packed_i32, write_packed_i32};
use crate::stream::{StreamReader, StreamWriter};

const TAG_INDX: [u8; 4] = *b"INDX";

/// Rotates `tri` so its smallest index comes first, preserving cyclic order.
fn canonicalize_triangle(tri: [u32; 3]) -> [u32; 3] {
    if tri[1] < tri[0] && tri[1] < tri[2] {
        [tri[1], tri[2], tri[0]]
    } else if tri[2] < tri[0] && tri[2] < tri[1] {
        [tri[2], tri[0], tri[1]]
    } else {
        tri
    }
}

/// Canonicalizes every triangle and stably sorts by `(tri[0], tri[1])`.
pub fn reorder_triangles(indices: &[u32]) -> Vec<[u32; 3]> {
    let mut triangles: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .map(|c| canonicalize_triangle([c[0], c[1], c[2]]))
        .collect();
    triangles.sort_by_key(|t| (t[0], t[1]));
    triangles
}

/// Delta-codes `triangles` in place, high index to low, per spec §4.E step 3.
fn delta_code(triangles: &mut [[u32; 3]]) {
    for i in (0..triangles.len()).rev() {
        let t0 = triangles[i][0];
        if i >= 1 && t0 == triangles[i - 1][0] {
            triangles[i][1] = triangles[i][1].wrapping_sub(triangles[i - 1][1]);
        } else {
            triangles[i][1] = triangles[i][1].wrapping_sub(t0);
        }
        triangles[i][2] = triangles[i][2].wrapping_sub(t0);
        if i >= 1 {
            triangles[i][0] = t0.wrapping_sub(triangles[i - 1][0]);
        }
    }
}

/// Reverses [`delta_code`] with a forward scan, per spec §4.E decode.
fn undelta_code(deltas: &mut [[u32; 3]]) {
    for i in 0..deltas.len() {
        if i >= 1 {
            deltas[i][0] = deltas[i][0].wrapping_add(deltas[i - 1][0]);
        }
        let t0 = deltas[i][0];
        if i >= 1 && t0 == deltas[i - 1][0] {
            deltas[i][1] = deltas[i][1].wrapping_add(deltas[i - 1][1]);
        } else {
            deltas[i][1] = deltas[i][1].wrapping_add(t0);
        }
        deltas[i][2] = deltas[i][2].wrapping_add(t0);
    }
}

pub struct Mg1Pipeline;

impl Pipeline for Mg1Pipeline {
    fn encode_mesh(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<Vec<u32>> {
        let ordered = reorder_triangles(indices);
        let mut deltas = ordered.clone();
        delta_code(&mut deltas);

        let flat: Vec<i32> = deltas.iter().flat_map(|t| t.map(|v| v as i32)).collect();
        writer.write_fourcc(&TAG_INDX)?;
        write_packed_i32(writer, &flat, params.level)?;
        write_frame_payload(writer, shape, frame, params.level)?;

        Ok(ordered.into_iter().flatten().collect())
    }

    fn encode_frame(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        _indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<()> {
        write_frame_payload(writer, shape, frame, params.level)
    }

    fn decode_mesh(
        &self,
        reader: &mut StreamReader,
        shape: &MeshShape,
        _params: &CodecParams,
    ) -> Result<(Vec<u32>, FrameData)> {
        reader.expect_fourcc(&TAG_INDX)?;
        let flat = read_packed_i32(reader, shape.triangle_count as usize * 3)?;
        let mut deltas: Vec<[u32; 3]> = flat
            .chunks_exact(3)
            .map(|c| [c[0] as u32, c[1] as u32, c[2] as u32])
            .collect();
        undelta_code(&mut deltas);

        let frame = read_frame_payload(reader, shape)?;
        Ok((deltas.into_iter().flatten().collect(), frame))
    }

    fn decode_frame(
        &self,
        reader: &mut StreamReader,
        shape: &MeshShape,
        _indices: &[u32],
        _params: &CodecParams,
    ) -> Result<FrameData> {
        read_frame_payload(reader, shape)
    }
}
