//! The MG2 pipeline (component F): vertex grid quantization with a
//! topology-driven traversal, normal spherical coding relative to a smooth
//! per-vertex basis, and predictive UV/attribute quantization.

use std::collections::VecDeque;

use super::{CodecParams, Pipeline};
use crate::error::{Error, Result};
use crate::mesh::{FrameData, MeshShape};
use crate::stream::packed::{read_packed_f32, read_packed_i32, write_packed_f32, write_packed_i32};
use crate::stream::{StreamReader, StreamWriter};

const TAG_INDX: [u8; 4] = *b"INDX";
const TAG_VERT: [u8; 4] = *b"VERT";
const TAG_NORM: [u8; 4] = *b"NORM";
const TAG_TEXC: [u8; 4] = *b"TEXC";
const TAG_ATTR: [u8; 4] = *b"ATTR";

// ---------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------

/// Computes the BFS-over-edge-adjacent-triangles visit order described in
/// the spec, starting from triangle 0 and breaking ties by smallest
/// triangle index, then smallest vertex index. Returns `vertex_order` with
/// `vertex_order[new_id] == old_id`; any vertex never referenced by a
/// triangle is appended afterward in ascending original-id order.
pub fn traversal_order(triangle_count: usize, vertex_count: usize, indices: &[u32]) -> Vec<u32> {
    let mut edge_triangles: std::collections::HashMap<(u32, u32), Vec<u32>> =
        std::collections::HashMap::new();
    for t in 0..triangle_count {
        let tri = [indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]];
        for &(a, b) in &[(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let key = if a < b { (a, b) } else { (b, a) };
            edge_triangles.entry(key).or_default().push(t as u32);
        }
    }

    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); triangle_count];
    for tris in edge_triangles.values() {
        for &t in tris {
            for &other in tris {
                if other != t {
                    adjacency[t as usize].push(other);
                }
            }
        }
    }
    for adj in &mut adjacency {
        adj.sort_unstable();
        adj.dedup();
    }

    let mut visited = vec![false; triangle_count];
    let mut new_id_of_old: Vec<Option<u32>> = vec![None; vertex_count];
    let mut vertex_order: Vec<u32> = Vec::with_capacity(vertex_count);
    let mut next_new_id: u32 = 0;

    for start in 0..triangle_count {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut queue: VecDeque<u32> = VecDeque::new();
        queue.push_back(start as u32);

        while let Some(t) = queue.pop_front() {
            for &v in &[
                indices[t as usize * 3],
                indices[t as usize * 3 + 1],
                indices[t as usize * 3 + 2],
            ] {
                if new_id_of_old[v as usize].is_none() {
                    new_id_of_old[v as usize] = Some(next_new_id);
                    vertex_order.push(v);
                    next_new_id += 1;
                }
            }
            for &neighbor in &adjacency[t as usize] {
                if !visited[neighbor as usize] {
                    visited[neighbor as usize] = true;
                    queue.push_back(neighbor);
                }
            }
        }
    }

    for (old_id, assigned) in new_id_of_old.iter().enumerate() {
        if assigned.is_none() {
            vertex_order.push(old_id as u32);
        }
    }

    vertex_order
}

fn invert_permutation(vertex_order: &[u32]) -> Vec<u32> {
    let mut new_id_of_old = vec![0u32; vertex_order.len()];
    for (new_id, &old_id) in vertex_order.iter().enumerate() {
        new_id_of_old[old_id as usize] = new_id as u32;
    }
    new_id_of_old
}

fn permute_indices(indices: &[u32], new_id_of_old: &[u32]) -> Vec<u32> {
    indices.iter().map(|&old| new_id_of_old[old as usize]).collect()
}

fn permute_vec3(values: &[[f32; 3]], vertex_order: &[u32]) -> Vec<[f32; 3]> {
    vertex_order.iter().map(|&old| values[old as usize]).collect()
}

fn permute_scalars(values: &[f32], components: usize, vertex_order: &[u32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(values.len());
    for &old in vertex_order {
        let base = old as usize * components;
        out.extend_from_slice(&values[base..base + components]);
    }
    out
}

// ---------------------------------------------------------------------
// Vector helpers
// ---------------------------------------------------------------------

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}
fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
fn length(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}
fn normalize_or(a: [f32; 3], fallback: [f32; 3]) -> [f32; 3] {
    let len = length(a);
    if len > 1e-12 {
        [a[0] / len, a[1] / len, a[2] / len]
    } else {
        fallback
    }
}

/// Builds an orthonormal basis whose Z axis is the (already normalized)
/// smooth per-vertex normal estimate.
fn build_basis(z: [f32; 3]) -> ([f32; 3], [f32; 3], [f32; 3]) {
    let up = if z[0].abs() < 0.9 { [1.0, 0.0, 0.0] } else { [0.0, 1.0, 0.0] };
    let x = normalize_or(cross(up, z), [1.0, 0.0, 0.0]);
    let y = cross(z, x);
    (x, y, z)
}

/// Area-weighted sum of adjacent face normals per vertex, in permuted
/// (new-id) order, used as the smooth basis reference.
fn smooth_basis_per_vertex(vertex_count: usize, triangles: &[[u32; 3]], positions: &[[f32; 3]]) -> Vec<([f32; 3], [f32; 3], [f32; 3])> {
    let mut sums = vec![[0f32; 3]; vertex_count];
    for tri in triangles {
        let p0 = positions[tri[0] as usize];
        let p1 = positions[tri[1] as usize];
        let p2 = positions[tri[2] as usize];
        let face_normal = cross(sub(p1, p0), sub(p2, p0));
        for &v in tri {
            let s = &mut sums[v as usize];
            s[0] += face_normal[0];
            s[1] += face_normal[1];
            s[2] += face_normal[2];
        }
    }
    sums.into_iter()
        .map(|s| build_basis(normalize_or(s, [0.0, 0.0, 1.0])))
        .collect()
}

// ---------------------------------------------------------------------
// Vertex grid quantization
// ---------------------------------------------------------------------

struct VertexGrid {
    lo: [f32; 3],
    cell: f32,
    div: [u32; 3],
}

fn bounding_box(vertices: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut lo = vertices[0];
    let mut hi = vertices[0];
    for v in vertices {
        for k in 0..3 {
            lo[k] = lo[k].min(v[k]);
            hi[k] = hi[k].max(v[k]);
        }
    }
    (lo, hi)
}

fn write_vertex_block(
    writer: &mut StreamWriter,
    vertices_new_order: &[[f32; 3]],
    precision: f32,
    level: u32,
) -> Result<()> {
    let (lo, hi) = bounding_box(vertices_new_order);
    let cell = precision;
    let div = [
        ((hi[0] - lo[0]) / cell).ceil() as u32 + 1,
        ((hi[1] - lo[1]) / cell).ceil() as u32 + 1,
        ((hi[2] - lo[2]) / cell).ceil() as u32 + 1,
    ];

    let mut cells: Vec<[i32; 3]> = Vec::with_capacity(vertices_new_order.len());
    let mut residuals: Vec<f32> = Vec::with_capacity(vertices_new_order.len() * 3);
    for v in vertices_new_order {
        let mut cell_coord = [0i32; 3];
        let mut residual = [0f32; 3];
        for k in 0..3 {
            let units = (v[k] - lo[k]) / cell;
            let rounded = units.round();
            cell_coord[k] = rounded as i32;
            residual[k] = units - rounded;
        }
        cells.push(cell_coord);
        residuals.extend_from_slice(&residual);
    }

    // Delta-code the cell indices along the traversal order.
    let mut deltas: Vec<i32> = Vec::with_capacity(cells.len() * 3);
    let mut prev = [0i32; 3];
    for (i, c) in cells.iter().enumerate() {
        if i == 0 {
            deltas.extend_from_slice(c);
        } else {
            for k in 0..3 {
                deltas.push(c[k] - prev[k]);
            }
        }
        prev = *c;
    }

    writer.write_fourcc(&TAG_VERT)?;
    writer.write_u32(precision.to_bits())?;
    for &l in &lo {
        writer.write_f32(l)?;
    }
    for &d in &div {
        writer.write_u32(d)?;
    }
    write_packed_i32(writer, &deltas, level)?;
    write_packed_f32(writer, &residuals, level)
}

fn read_vertex_block(reader: &mut StreamReader, vertex_count: usize, level: u32) -> Result<(Vec<[f32; 3]>, f32)> {
    let _ = level;
    reader.expect_fourcc(&TAG_VERT)?;
    let precision = f32::from_bits(reader.read_u32()?);
    let mut lo = [0f32; 3];
    for l in &mut lo {
        *l = reader.read_f32()?;
    }
    let mut div = [0u32; 3];
    for d in &mut div {
        *d = reader.read_u32()?;
    }
    let _ = div; // carried for wire parity; not needed to reconstruct positions

    let deltas = read_packed_i32(reader, vertex_count * 3)?;
    let residuals = read_packed_f32(reader, vertex_count * 3)?;

    let mut vertices = Vec::with_capacity(vertex_count);
    let mut prev = [0i32; 3];
    for i in 0..vertex_count {
        let mut cell = [0i32; 3];
        for k in 0..3 {
            let d = deltas[i * 3 + k];
            cell[k] = if i == 0 { d } else { prev[k] + d };
        }
        prev = cell;
        let mut pos = [0f32; 3];
        for k in 0..3 {
            pos[k] = lo[k] + (cell[k] as f32 + residuals[i * 3 + k]) * precision;
        }
        vertices.push(pos);
    }
    Ok((vertices, precision))
}

// ---------------------------------------------------------------------
// Normal spherical coding
// ---------------------------------------------------------------------

fn write_normal_block(writer: &mut StreamWriter, normals: &[[f32; 3]], bases: &[([f32; 3], [f32; 3], [f32; 3])], precision: f32, level: u32) -> Result<()> {
    writer.write_fourcc(&TAG_NORM)?;
    let mut quantized = Vec::with_capacity(normals.len() * 3);
    for (n, (bx, by, bz)) in normals.iter().zip(bases) {
        let magnitude = length(*n);
        let (theta, phi) = if magnitude > 1e-12 {
            let unit = [n[0] / magnitude, n[1] / magnitude, n[2] / magnitude];
            let cos_theta = dot(unit, *bz).clamp(-1.0, 1.0);
            let theta = cos_theta.acos();
            let phi = dot(unit, *by).atan2(dot(unit, *bx));
            (theta, phi)
        } else {
            (0.0, 0.0)
        };
        quantized.push((magnitude / precision).round() as i32);
        quantized.push((theta / precision).round() as i32);
        quantized.push((phi / precision).round() as i32);
    }
    write_packed_i32(writer, &quantized, level)
}

fn read_normal_block(reader: &mut StreamReader, bases: &[([f32; 3], [f32; 3], [f32; 3])], precision: f32) -> Result<Vec<[f32; 3]>> {
    reader.expect_fourcc(&TAG_NORM)?;
    let quantized = read_packed_i32(reader, bases.len() * 3)?;
    let mut normals = Vec::with_capacity(bases.len());
    for (i, (bx, by, bz)) in bases.iter().enumerate() {
        let magnitude = quantized[i * 3] as f32 * precision;
        let theta = quantized[i * 3 + 1] as f32 * precision;
        let phi = quantized[i * 3 + 2] as f32 * precision;
        let (sin_t, cos_t) = theta.sin_cos();
        let (sin_p, cos_p) = phi.sin_cos();
        let dir = [
            sin_t * cos_p * bx[0] + sin_t * sin_p * by[0] + cos_t * bz[0],
            sin_t * cos_p * bx[1] + sin_t * sin_p * by[1] + cos_t * bz[1],
            sin_t * cos_p * bx[2] + sin_t * sin_p * by[2] + cos_t * bz[2],
        ];
        normals.push([dir[0] * magnitude, dir[1] * magnitude, dir[2] * magnitude]);
    }
    Ok(normals)
}

// ---------------------------------------------------------------------
// Predictive UV / attribute coding
// ---------------------------------------------------------------------

fn write_predictive_block(writer: &mut StreamWriter, tag: &[u8; 4], values: &[f32], components: usize, vertex_count: usize, precision: f32, level: u32) -> Result<()> {
    let mut mins = vec![f32::INFINITY; components];
    for v in 0..vertex_count {
        for c in 0..components {
            mins[c] = mins[c].min(values[v * components + c]);
        }
    }

    let mut quantized = vec![0i32; vertex_count * components];
    for v in 0..vertex_count {
        for c in 0..components {
            quantized[v * components + c] =
                ((values[v * components + c] - mins[c]) / precision).round() as i32;
        }
    }

    let mut deltas = vec![0i32; vertex_count * components];
    for c in 0..components {
        let mut prev = 0i32;
        for v in 0..vertex_count {
            let q = quantized[v * components + c];
            deltas[v * components + c] = if v == 0 { q } else { q - prev };
            prev = q;
        }
    }

    writer.write_fourcc(tag)?;
    writer.write_u32(precision.to_bits())?;
    for &m in &mins {
        writer.write_f32(m)?;
    }
    write_packed_i32(writer, &deltas, level)
}

fn read_predictive_block(reader: &mut StreamReader, tag: &[u8; 4], components: usize, vertex_count: usize) -> Result<Vec<f32>> {
    reader.expect_fourcc(tag)?;
    let precision = f32::from_bits(reader.read_u32()?);
    let mut mins = vec![0f32; components];
    for m in &mut mins {
        *m = reader.read_f32()?;
    }
    let deltas = read_packed_i32(reader, vertex_count * components)?;

    let mut values = vec![0f32; vertex_count * components];
    for c in 0..components {
        let mut prev = 0i32;
        for v in 0..vertex_count {
            let d = deltas[v * components + c];
            let q = if v == 0 { d } else { prev + d };
            prev = q;
            values[v * components + c] = q as f32 * precision + mins[c];
        }
    }
    Ok(values)
}

// ---------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------

pub struct Mg2Pipeline;

impl Pipeline for Mg2Pipeline {
    fn encode_mesh(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<Vec<u32>> {
        let v = shape.vertex_count as usize;
        let t = shape.triangle_count as usize;

        let vertex_order = traversal_order(t, v, indices);
        let new_id_of_old = invert_permutation(&vertex_order);
        let new_indices = permute_indices(indices, &new_id_of_old);
        let new_triangles: Vec<[u32; 3]> = new_indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        writer.write_fourcc(&TAG_INDX)?;
        let as_i32: Vec<i32> = new_indices.iter().map(|&i| i as i32).collect();
        write_packed_i32(writer, &as_i32, params.level)?;

        let vertices_new_order = permute_vec3(&frame.vertices, &vertex_order);
        write_vertex_block(writer, &vertices_new_order, params.vertex_precision, params.level)?;

        if shape.has_normals {
            let normals = frame.normals.as_ref().ok_or_else(|| {
                Error::InvalidMesh("mesh declares normals but frame has none bound".into())
            })?;
            let normals_new_order = permute_vec3(normals, &vertex_order);
            let bases = smooth_basis_per_vertex(v, &new_triangles, &vertices_new_order);
            write_normal_block(writer, &normals_new_order, &bases, params.normal_precision, params.level)?;
        }

        for (i, (m, components_u32)) in frame.uv_maps.iter().zip(&shape.uv_components).enumerate() {
            let components = *components_u32 as usize;
            let reordered = permute_scalars(m, components, &vertex_order);
            let precision = params.uv_precisions.get(i).copied().unwrap_or(2f32.powi(-12));
            write_predictive_block(writer, &TAG_TEXC, &reordered, components, v, precision, params.level)?;
        }

        for (i, (m, components_u32)) in frame.attrib_maps.iter().zip(&shape.attrib_components).enumerate() {
            let components = *components_u32 as usize;
            let reordered = permute_scalars(m, components, &vertex_order);
            let precision = params.attrib_precisions.get(i).copied().unwrap_or(2f32.powi(-8));
            write_predictive_block(writer, &TAG_ATTR, &reordered, components, v, precision, params.level)?;
        }

        Ok(new_indices)
    }

    fn encode_frame(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<()> {
        // `indices` here are already the permuted buffer established by
        // `encode_mesh`; traversal order for later frames is therefore the
        // identity (new_id == position), so vertex/normal/UV/attribute data
        // is simply re-quantized against each frame's own bounding box.
        let triangles: Vec<[u32; 3]> = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

        write_vertex_block(writer, &frame.vertices, params.vertex_precision, params.level)?;

        if shape.has_normals {
            let normals = frame.normals.as_ref().ok_or_else(|| {
                Error::InvalidMesh("mesh declares normals but frame has none bound".into())
            })?;
            let bases = smooth_basis_per_vertex(frame.vertices.len(), &triangles, &frame.vertices);
            write_normal_block(writer, normals, &bases, params.normal_precision, params.level)?;
        }

        for (i, m) in frame.uv_maps.iter().enumerate() {
            let precision = params.uv_precisions.get(i).copied().unwrap_or(2f32.powi(-12));
            write_predictive_block(writer, &TAG_TEXC, m, 2, frame.vertices.len(), precision, params.level)?;
        }
        for (i, m) in frame.attrib_maps.iter().enumerate() {
            let components = if frame.vertices.is_empty() { 0 } else { m.len() / frame.vertices.len() };
            let precision = params.attrib_precisions.get(i).copied().unwrap_or(2f32.powi(-8));
            write_predictive_block(writer, &TAG_ATTR, m, components, frame.vertices.len(), precision, params.level)?;
        }
        Ok(())
    }

    fn decode_mesh(
        &self,
        reader: &mut StreamReader,
        shape: &MeshShape,
        params: &CodecParams,
    ) -> Result<(Vec<u32>, FrameData)> {
        let v = shape.vertex_count as usize;
        let t = shape.triangle_count as usize;

        reader.expect_fourcc(&TAG_INDX)?;
        let as_i32 = read_packed_i32(reader, t * 3)?;
        let indices: Vec<u32> = as_i32.into_iter().map(|i| i as u32).collect();
        let triangles: Vec<[u32; 3]> = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

        let (vertices, _) = read_vertex_block(reader, v, params.level)?;

        let normals = if shape.has_normals {
            let bases = smooth_basis_per_vertex(v, &triangles, &vertices);
            Some(read_normal_block(reader, &bases, params.normal_precision)?)
        } else {
            None
        };

        let mut uv_maps = Vec::with_capacity(shape.uv_components.len());
        for &components in &shape.uv_components {
            uv_maps.push(read_predictive_block(reader, &TAG_TEXC, components as usize, v)?);
        }

        let mut attrib_maps = Vec::with_capacity(shape.attrib_components.len());
        for &components in &shape.attrib_components {
            attrib_maps.push(read_predictive_block(reader, &TAG_ATTR, components as usize, v)?);
        }

        Ok((
            indices,
            FrameData {
                vertices,
                normals,
                uv_maps,
                attrib_maps,
            },
        ))
    }

    fn decode_frame(
        &self,
        reader: &mut StreamReader,
        shape: &MeshShape,
        indices: &[u32],
        params: &CodecParams,
    ) -> Result<FrameData> {
        let v = shape.vertex_count as usize;
        let (vertices, _) = read_vertex_block(reader, v, params.level)?;

        let normals = if shape.has_normals {
            let triangles: Vec<[u32; 3]> = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
            let bases = smooth_basis_per_vertex(v, &triangles, &vertices);
            Some(read_normal_block(reader, &bases, params.normal_precision)?)
        } else {
            None
        };

        let mut uv_maps = Vec::with_capacity(shape.uv_components.len());
        for &components in &shape.uv_components {
            uv_maps.push(read_predictive_block(reader, &TAG_TEXC, components as usize, v)?);
        }
        let mut attrib_maps = Vec::with_capacity(shape.attrib_components.len());
        for &components in &shape.attrib_components {
            attrib_maps.push(read_predictive_block(reader, &TAG_ATTR, components as usize, v)?);
        }

        Ok(FrameData {
            vertices,
            normals,
            uv_maps,
            attrib_maps,
        })
    }
}
