//! Mesh integrity checks applied before every write and after every read:
//! indices must reference existing vertices, and no float field may be NaN
//! or infinite.

use crate::error::{Error, Result};
use crate::mesh::{FrameData, MeshShape};

fn check_finite(label: &str, values: &[f32]) -> Result<()> {
    if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidMesh(format!(
            "{label} contains a non-finite value at offset {bad}"
        )));
    }
    Ok(())
}

/// Validates an index buffer against `vertex_count`.
pub fn check_indices(indices: &[u32], vertex_count: u32) -> Result<()> {
    if let Some((pos, &bad)) = indices.iter().enumerate().find(|&(_, &i)| i >= vertex_count) {
        return Err(Error::InvalidMesh(format!(
            "triangle index {bad} at offset {pos} is out of range for {vertex_count} vertices"
        )));
    }
    Ok(())
}

/// Validates one frame's vertex/normal/UV/attribute data against `shape`.
pub fn check_frame(shape: &MeshShape, frame: &FrameData) -> Result<()> {
    if frame.vertices.len() != shape.vertex_count as usize {
        return Err(Error::InvalidMesh(format!(
            "frame has {} vertices, mesh declares {}",
            frame.vertices.len(),
            shape.vertex_count
        )));
    }
    let flat: Vec<f32> = frame.vertices.iter().flat_map(|v| *v).collect();
    check_finite("vertex array", &flat)?;

    if shape.has_normals {
        let normals = frame
            .normals
            .as_ref()
            .ok_or_else(|| Error::InvalidMesh("mesh declares normals but frame has none".into()))?;
        if normals.len() != shape.vertex_count as usize {
            return Err(Error::InvalidMesh("normal array length mismatch".into()));
        }
        let flat: Vec<f32> = normals.iter().flat_map(|v| *v).collect();
        check_finite("normal array", &flat)?;
    }

    for (i, uv) in frame.uv_maps.iter().enumerate() {
        check_finite(&format!("UV map {i}"), uv)?;
    }
    for (i, attrib) in frame.attrib_maps.iter().enumerate() {
        check_finite(&format!("attribute map {i}"), attrib)?;
    }

    Ok(())
}

/// Full pre-write/post-read validation: indices plus frame data.
pub fn check_mesh(shape: &MeshShape, indices: &[u32], frame: &FrameData) -> Result<()> {
    check_indices(indices, shape.vertex_count)?;
    check_frame(shape, frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_shape() -> MeshShape {
        MeshShape {
            vertex_count: 3,
            triangle_count: 1,
            has_normals: false,
            uv_components: vec![],
            attrib_components: vec![],
        }
    }

    #[test]
    fn rejects_out_of_range_index() {
        let shape = tiny_shape();
        let indices = vec![0, 1, 3];
        let frame = FrameData {
            vertices: vec![[0.0; 3]; 3],
            normals: None,
            uv_maps: vec![],
            attrib_maps: vec![],
        };
        assert!(matches!(
            check_mesh(&shape, &indices, &frame),
            Err(Error::InvalidMesh(_))
        ));
    }

    #[test]
    fn rejects_non_finite_vertex() {
        let shape = tiny_shape();
        let indices = vec![0, 1, 2];
        let frame = FrameData {
            vertices: vec![[0.0, 0.0, 0.0], [f32::NAN, 0.0, 0.0], [0.0, 0.0, 0.0]],
            normals: None,
            uv_maps: vec![],
            attrib_maps: vec![],
        };
        assert!(matches!(
            check_mesh(&shape, &indices, &frame),
            Err(Error::InvalidMesh(_))
        ));
    }

    #[test]
    fn accepts_valid_mesh() {
        let shape = tiny_shape();
        let indices = vec![0, 1, 2];
        let frame = FrameData {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: None,
            uv_maps: vec![],
            attrib_maps: vec![],
        };
        assert!(check_mesh(&shape, &indices, &frame).is_ok());
    }
}
