//! Legacy v5 reader (component H): upgrades an on-disk v5 mesh into the v6
//! in-memory shape before the normal dispatcher in [`crate::container`]
//! takes over.
//!
//! Per spec, v5's only structural difference from v6 is that vertex (and
//! normal) arrays are stored component-planar — all X, then all Y, then all
//! Z — rather than interleaved per vertex. Everything else (index coding,
//! UV/attribute maps) is unchanged between the two versions. Rather than
//! literally buffering the remaining file into a byte blob and rewriting it
//! before handing it back to the v6 tag parser, this upgrades directly into
//! the same `(Vec<u32>, FrameData)` shape `Pipeline::decode_mesh` produces;
//! the result is semantically identical and lets the rest of the container
//! dispatch on it exactly as it would a v6 mesh.

use crate::error::{Error, Result};
use crate::mesh::{FrameData, MeshShape};
use crate::pipelines::Method;
use crate::stream::packed::{read_packed_f32, read_packed_i32};
use crate::stream::StreamReader;

const TAG_INDX: [u8; 4] = *b"INDX";
const TAG_VERT: [u8; 4] = *b"VERT";
const TAG_NORM: [u8; 4] = *b"NORM";
const TAG_TEXC: [u8; 4] = *b"TEXC";
const TAG_ATTR: [u8; 4] = *b"ATTR";

fn read_planar_vec3(reader: &mut StreamReader, count: usize) -> Result<Vec<[f32; 3]>> {
    let flat = read_packed_f32(reader, count * 3)?;
    Ok((0..count)
        .map(|i| [flat[i], flat[count + i], flat[2 * count + i]])
        .collect())
}

/// Mirrors `mg1::undelta_code` for the legacy reader without widening that
/// module's public surface for a compatibility-only caller.
fn undelta_triangle_indices(deltas: &mut [[u32; 3]]) {
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

fn read_indices(reader: &mut StreamReader, shape: &MeshShape, method: Method) -> Result<Vec<u32>> {
    reader.expect_fourcc(&TAG_INDX)?;
    let flat = read_packed_i32(reader, shape.triangle_count as usize * 3)?;
    match method {
        Method::Raw => Ok(flat.into_iter().map(|i| i as u32).collect()),
        Method::Mg1 => {
            let mut deltas: Vec<[u32; 3]> = flat
                .chunks_exact(3)
                .map(|c| [c[0] as u32, c[1] as u32, c[2] as u32])
                .collect();
            undelta_triangle_indices(&mut deltas);
            Ok(deltas.into_iter().flatten().collect())
        }
        Method::Mg2 => Err(Error::UnsupportedFormatVersion(5)),
    }
}

fn read_frame(reader: &mut StreamReader, shape: &MeshShape) -> Result<FrameData> {
    let v = shape.vertex_count as usize;

    reader.expect_fourcc(&TAG_VERT)?;
    let vertices = read_planar_vec3(reader, v)?;

    let normals = if shape.has_normals {
        reader.expect_fourcc(&TAG_NORM)?;
        Some(read_planar_vec3(reader, v)?)
    } else {
        None
    };

    let mut uv_maps = Vec::with_capacity(shape.uv_components.len());
    for _ in &shape.uv_components {
        reader.expect_fourcc(&TAG_TEXC)?;
        uv_maps.push(read_packed_f32(reader, v * 2)?);
    }

    let mut attrib_maps = Vec::with_capacity(shape.attrib_components.len());
    for &components in &shape.attrib_components {
        reader.expect_fourcc(&TAG_ATTR)?;
        attrib_maps.push(read_packed_f32(reader, v * components as usize)?);
    }

    Ok(FrameData {
        vertices,
        normals,
        uv_maps,
        attrib_maps,
    })
}

/// Upgrades a v5 mesh (frame 0 plus its index buffer) into v6's in-memory
/// shape. Only RAW and MG1 ever shipped as v5 on disk; an MG2 tag here is a
/// malformed (or unsupported) file.
pub fn upgrade_mesh(reader: &mut StreamReader, shape: &MeshShape, method: Method) -> Result<(Vec<u32>, FrameData)> {
    let indices = read_indices(reader, shape, method)?;
    let frame = read_frame(reader, shape)?;
    Ok((indices, frame))
}

/// Upgrades a v5 animation frame `k >= 1`. v5 animations only ever varied
/// vertex positions; the shared index buffer was written once in frame 0.
pub fn upgrade_frame(reader: &mut StreamReader, shape: &MeshShape) -> Result<FrameData> {
    read_frame(reader, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamWriter;

    fn write_planar_vec3(writer: &mut StreamWriter, tag: &[u8; 4], values: &[[f32; 3]]) {
        writer.write_fourcc(tag).unwrap();
        let count = values.len();
        let mut flat = vec![0f32; count * 3];
        for (i, v) in values.iter().enumerate() {
            flat[i] = v[0];
            flat[count + i] = v[1];
            flat[2 * count + i] = v[2];
        }
        crate::stream::packed::write_packed_f32(writer, &flat, 6).unwrap();
    }

    #[test]
    fn upgrades_planar_vertices_to_interleaved() {
        let shape = MeshShape {
            vertex_count: 3,
            triangle_count: 1,
            has_normals: false,
            uv_components: vec![],
            attrib_components: vec![],
        };
        let vertices = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];

        let mut buf: Vec<u8> = Vec::new();
        {
            let mut writer = StreamWriter::new(&mut |b: &[u8]| {
                buf.extend_from_slice(b);
                b.len()
            });
            writer.write_fourcc(&TAG_INDX).unwrap();
            crate::stream::packed::write_packed_i32(&mut writer, &[0, 1, 2], 6).unwrap();
            write_planar_vec3(&mut writer, &TAG_VERT, &vertices);
        }

        let mut cursor = 0usize;
        let data = buf;
        let mut reader = StreamReader::new(&mut |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        });

        let (indices, frame) = upgrade_mesh(&mut reader, &shape, Method::Raw).unwrap();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(frame.vertices, vertices);
    }
}
