//! The RAW pipeline (component D): serializes arrays verbatim through the
//! packed int/float coder, with no reordering or prediction.

use super::{CodecParams, Pipeline};
use crate::error::{Error, Result};
use crate::mesh::{FrameData, MeshShape};
use crate::stream::packed::{read_packed_f32, write_packed_f32};
use crate::stream::{StreamReader, StreamWriter};

const TAG_INDX: [u8; 4] = *b"INDX";
const TAG_VERT: [u8; 4] = *b"VERT";
const TAG_NORM: [u8; 4] = *b"NORM";
const TAG_TEXC: [u8; 4] = *b"TEXC";
const TAG_ATTR: [u8; 4] = *b"ATTR";

/// Shared by RAW and MG1: frame 0 onward, every frame carries the same
/// `VERT [NORM] TEXC* ATTR*` payload shape.
pub fn write_frame_payload(
    writer: &mut StreamWriter,
    shape: &MeshShape,
    frame: &FrameData,
    level: u32,
) -> Result<()> {
    writer.write_fourcc(&TAG_VERT)?;
    let flat: Vec<f32> = frame.vertices.iter().flat_map(|v| *v).collect();
    write_packed_f32(writer, &flat, level)?;

    if shape.has_normals {
        writer.write_fourcc(&TAG_NORM)?;
        let normals = frame.normals.as_ref().ok_or_else(|| {
            Error::InvalidMesh("mesh declares normals but frame has none bound".into())
        })?;
        let flat: Vec<f32> = normals.iter().flat_map(|v| *v).collect();
        write_packed_f32(writer, &flat, level)?;
    }

    for uv in &frame.uv_maps {
        writer.write_fourcc(&TAG_TEXC)?;
        write_packed_f32(writer, uv, level)?;
    }

    for attrib in &frame.attrib_maps {
        writer.write_fourcc(&TAG_ATTR)?;
        write_packed_f32(writer, attrib, level)?;
    }

    Ok(())
}

pub fn read_frame_payload(reader: &mut StreamReader, shape: &MeshShape) -> Result<FrameData> {
    let v = shape.vertex_count as usize;

    reader.expect_fourcc(&TAG_VERT)?;
    let flat = read_packed_f32(reader, v * 3)?;
    let vertices = flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

    let normals = if shape.has_normals {
        reader.expect_fourcc(&TAG_NORM)?;
        let flat = read_packed_f32(reader, v * 3)?;
        Some(flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
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

pub struct RawPipeline;

impl Pipeline for RawPipeline {
    fn encode_mesh(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<Vec<u32>> {
        writer.write_fourcc(&TAG_INDX)?;
        let as_i32: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
        crate::stream::packed::write_packed_i32(writer, &as_i32, params.level)?;
        write_frame_payload(writer, shape, frame, params.level)?;
        Ok(indices.to_vec())
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
        let as_i32 = crate::stream::packed::read_packed_i32(reader, shape.triangle_count as usize * 3)?;
        let indices: Vec<u32> = as_i32.into_iter().map(|i| i as u32).collect();
        let frame = read_frame_payload(reader, shape)?;
        Ok((indices, frame))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn tetra_shape() -> MeshShape {
        MeshShape {
            vertex_count: 4,
            triangle_count: 4,
            has_normals: false,
            uv_components: vec![],
            attrib_components: vec![],
        }
    }

    #[test]
    fn raw_round_trip_is_bit_identical() {
        let shape = tetra_shape();
        let indices: Vec<u32> = vec![0, 1, 2, 0, 1, 3, 0, 2, 3, 1, 2, 3];
        let frame = FrameData {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            normals: None,
            uv_maps: vec![],
            attrib_maps: vec![],
        };
        let params = CodecParams {
            level: 6,
            vertex_precision: 2f32.powi(-10),
            normal_precision: 2f32.powi(-8),
            uv_precisions: vec![],
            attrib_precisions: vec![],
        };

        let mut buf: Vec<u8> = Vec::new();
        {
            let mut writer = StreamWriter::new(&mut |b: &[u8]| {
                buf.extend_from_slice(b);
                b.len()
            });
            RawPipeline.encode_mesh(&mut writer, &shape, &indices, &frame, &params).unwrap();
        }

        let mut cursor = 0usize;
        let data = buf;
        let mut reader = StreamReader::new(&mut |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        });
        let (decoded_indices, decoded_frame) =
            RawPipeline.decode_mesh(&mut reader, &shape, &params).unwrap();
        assert_eq!(decoded_indices, indices);
        assert_eq!(decoded_frame.vertices, frame.vertices);
    }
}
