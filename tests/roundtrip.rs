//! Integration tests for the six literal scenarios the container's public
//! API must satisfy, exercised end-to-end through [`octm::container::Context`]
//! rather than any pipeline directly.

use octm::array_view::ElementKind;
use octm::container::{BindTarget, Context, Mode, Property};
use octm::error::Error;
use octm::pipelines::Method;

fn to_bytes_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn to_bytes_u32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn from_bytes_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

fn from_bytes_u32(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

fn write_all(ctx: &mut Context) -> Vec<u8> {
    let mut out = Vec::new();
    let mut write_cb = |b: &[u8]| {
        out.extend_from_slice(b);
        b.len()
    };
    ctx.save_custom(&mut write_cb).unwrap();
    out
}

/// A simple reader that tracks its own cursor over an in-memory byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }
    fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len() - self.pos);
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

fn cube_vertices() -> Vec<[f32; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ]
}

fn cube_indices() -> Vec<u32> {
    vec![
        0, 1, 2, 0, 2, 3, // bottom
        4, 6, 5, 4, 7, 6, // top
        0, 4, 5, 0, 5, 1, // front
        1, 5, 6, 1, 6, 2, // right
        2, 6, 7, 2, 7, 3, // back
        3, 7, 4, 3, 4, 0, // left
    ]
}

fn triangle_multiset(indices: &[u32]) -> std::collections::HashSet<[u32; 3]> {
    indices
        .chunks_exact(3)
        .map(|c| {
            let mut t = [c[0], c[1], c[2]];
            let min_pos = (0..3).min_by_key(|&i| t[i]).unwrap();
            t.rotate_left(min_pos);
            t
        })
        .collect()
}

#[test]
fn tetra_raw_bit_identical() {
    let vertices: Vec<[f32; 3]> = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let indices: Vec<u32> = vec![0, 1, 2, 0, 1, 3, 0, 2, 3, 1, 2, 3];

    let flat_vertices: Vec<f32> = vertices.iter().flat_map(|v| *v).collect();
    let vertex_bytes = to_bytes_f32(&flat_vertices);
    let index_bytes = to_bytes_u32(&indices);

    let mut ctx = Context::new(Mode::Export);
    ctx.configure_vertex_count(4).unwrap();
    ctx.configure_triangle_count(4).unwrap();
    ctx.configure_method(Method::Raw).unwrap();
    ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();

    let data = write_all(&mut ctx);
    assert!(data.len() > 32 + 4 * 3 * 4 + 4 * 3 * 4);

    let mut import = Context::new(Mode::Import);
    let mut cursor = Cursor::new(&data);
    import.open_read_custom(&mut |out| cursor.read(out)).unwrap();
    assert_eq!(import.get_integer(Property::VertexCount).unwrap(), 4);
    assert_eq!(import.get_integer(Property::TriangleCount).unwrap(), 4);

    let mut decoded_index_bytes = vec![0u8; 12 * 4];
    let mut decoded_vertex_bytes = vec![0u8; 12 * 4];
    import
        .bind_array_import(BindTarget::Indices, &mut decoded_index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    import
        .bind_array_import(BindTarget::Vertices, &mut decoded_vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();
    import.read_mesh(&mut |out| cursor.read(out)).unwrap();

    assert_eq!(from_bytes_u32(&decoded_index_bytes), indices);
    assert_eq!(from_bytes_f32(&decoded_vertex_bytes), flat_vertices);
}

#[test]
fn cube_mg1_preserves_triangles_and_vertices() {
    let vertices = cube_vertices();
    let indices = cube_indices();
    let before = triangle_multiset(&indices);

    let flat_vertices: Vec<f32> = vertices.iter().flat_map(|v| *v).collect();
    let vertex_bytes = to_bytes_f32(&flat_vertices);
    let index_bytes = to_bytes_u32(&indices);

    let mut ctx = Context::new(Mode::Export);
    ctx.configure_vertex_count(8).unwrap();
    ctx.configure_triangle_count(12).unwrap();
    ctx.configure_method(Method::Mg1).unwrap();
    ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();
    let data = write_all(&mut ctx);

    let mut import = Context::new(Mode::Import);
    let mut cursor = Cursor::new(&data);
    import.open_read_custom(&mut |out| cursor.read(out)).unwrap();

    let mut decoded_index_bytes = vec![0u8; 36 * 4];
    let mut decoded_vertex_bytes = vec![0u8; 24 * 4];
    import
        .bind_array_import(BindTarget::Indices, &mut decoded_index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    import
        .bind_array_import(BindTarget::Vertices, &mut decoded_vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();
    import.read_mesh(&mut |out| cursor.read(out)).unwrap();

    let decoded_indices = from_bytes_u32(&decoded_index_bytes);
    assert_eq!(triangle_multiset(&decoded_indices), before);
    assert_eq!(from_bytes_f32(&decoded_vertex_bytes), flat_vertices);
}

#[test]
fn cube_mg2_within_tolerance() {
    let vertices = cube_vertices();
    let indices = cube_indices();
    let before = triangle_multiset(&indices);

    let flat_vertices: Vec<f32> = vertices.iter().flat_map(|v| *v).collect();
    let vertex_bytes = to_bytes_f32(&flat_vertices);
    let index_bytes = to_bytes_u32(&indices);

    let precision = 0.01f32;
    let mut ctx = Context::new(Mode::Export);
    ctx.configure_vertex_count(8).unwrap();
    ctx.configure_triangle_count(12).unwrap();
    ctx.configure_method(Method::Mg2).unwrap();
    ctx.configure_vertex_precision(precision).unwrap();
    ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();
    let data = write_all(&mut ctx);

    let mut import = Context::new(Mode::Import);
    let mut cursor = Cursor::new(&data);
    import.open_read_custom(&mut |out| cursor.read(out)).unwrap();

    let mut decoded_index_bytes = vec![0u8; 36 * 4];
    let mut decoded_vertex_bytes = vec![0u8; 24 * 4];
    import
        .bind_array_import(BindTarget::Indices, &mut decoded_index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    import
        .bind_array_import(BindTarget::Vertices, &mut decoded_vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();
    import.read_mesh(&mut |out| cursor.read(out)).unwrap();

    let decoded_indices = from_bytes_u32(&decoded_index_bytes);
    assert_eq!(triangle_multiset(&decoded_indices), before);

    let decoded_flat = from_bytes_f32(&decoded_vertex_bytes);
    let decoded_vertices: Vec<[f32; 3]> = decoded_flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

    for original in &vertices {
        let closest = decoded_vertices
            .iter()
            .min_by(|a, b| {
                let da: f32 = (0..3).map(|k| (a[k] - original[k]).powi(2)).sum();
                let db: f32 = (0..3).map(|k| (b[k] - original[k]).powi(2)).sum();
                da.partial_cmp(&db).unwrap()
            })
            .unwrap();
        for k in 0..3 {
            assert!((closest[k] - original[k]).abs() <= precision / 2.0 + 1e-4);
        }
    }
}

#[test]
fn animation_frame_times_read_back() {
    let vertices0: Vec<[f32; 3]> = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let vertices1: Vec<[f32; 3]> = vec![[0.1, 0.0, 0.0], [1.1, 0.0, 0.0], [0.1, 1.0, 0.0]];
    let vertices2: Vec<[f32; 3]> = vec![[0.2, 0.0, 0.0], [1.2, 0.0, 0.0], [0.2, 1.0, 0.0]];
    let indices: Vec<u32> = vec![0, 1, 2];

    let index_bytes = to_bytes_u32(&indices);
    let vertex_bytes0 = to_bytes_f32(&vertices0.iter().flat_map(|v| *v).collect::<Vec<_>>());

    let mut ctx = Context::new(Mode::Export);
    ctx.configure_vertex_count(3).unwrap();
    ctx.configure_triangle_count(1).unwrap();
    ctx.configure_method(Method::Mg1).unwrap();
    ctx.configure_frame_count(3).unwrap();
    ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes0, 3, ElementKind::F32, 0)
        .unwrap();

    let mut out = Vec::new();
    {
        let mut write_cb = |b: &[u8]| {
            out.extend_from_slice(b);
            b.len()
        };
        ctx.save_custom(&mut write_cb).unwrap();
    }

    // `write_next_frame` re-reads the currently bound vertex view, so each
    // frame rebinds fresh bytes onto the same context. The byte buffers are
    // declared up front (rather than per-iteration) so they all outlive the
    // single lifetime `ctx`'s type was instantiated with.
    let vertex_bytes1 = to_bytes_f32(&vertices1.iter().flat_map(|v| *v).collect::<Vec<_>>());
    let vertex_bytes2 = to_bytes_f32(&vertices2.iter().flat_map(|v| *v).collect::<Vec<_>>());

    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes1, 3, ElementKind::F32, 0)
        .unwrap();
    ctx.write_next_frame(
        &mut |b: &[u8]| {
            out.extend_from_slice(b);
            b.len()
        },
        0.5,
    )
    .unwrap();

    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes2, 3, ElementKind::F32, 0)
        .unwrap();
    ctx.write_next_frame(
        &mut |b: &[u8]| {
            out.extend_from_slice(b);
            b.len()
        },
        1.0,
    )
    .unwrap();

    let mut import = Context::new(Mode::Import);
    let mut cursor = Cursor::new(&out);
    import.open_read_custom(&mut |o| cursor.read(o)).unwrap();
    assert_eq!(import.get_integer(Property::FrameCount).unwrap(), 3);

    let mut index_buf = vec![0u8; 3 * 4];
    let mut vertex_buf = vec![0u8; 9 * 4];
    import
        .bind_array_import(BindTarget::Indices, &mut index_buf, 3, ElementKind::U32, 0)
        .unwrap();
    import
        .bind_array_import(BindTarget::Vertices, &mut vertex_buf, 3, ElementKind::F32, 0)
        .unwrap();
    import.read_mesh(&mut |o| cursor.read(o)).unwrap();

    let t1 = import.read_next_frame(&mut |o| cursor.read(o)).unwrap();
    assert_eq!(t1, 0.5);
    let t2 = import.read_next_frame(&mut |o| cursor.read(o)).unwrap();
    assert_eq!(t2, 1.0);
}

#[test]
fn invalid_index_rejected_on_save() {
    let vertices: Vec<[f32; 3]> = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let indices: Vec<u32> = vec![0, 1, 3]; // 3 is out of range for V=3

    let vertex_bytes = to_bytes_f32(&vertices.iter().flat_map(|v| *v).collect::<Vec<_>>());
    let index_bytes = to_bytes_u32(&indices);

    let mut ctx = Context::new(Mode::Export);
    ctx.configure_vertex_count(3).unwrap();
    ctx.configure_triangle_count(1).unwrap();
    ctx.configure_method(Method::Raw).unwrap();
    ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();

    let mut out = Vec::new();
    let mut write_cb = |b: &[u8]| {
        out.extend_from_slice(b);
        b.len()
    };
    let result = ctx.save_custom(&mut write_cb);
    assert!(matches!(result, Err(Error::InvalidMesh(_))));
}

#[test]
fn non_monotone_frame_time_rejected() {
    let vertices: Vec<[f32; 3]> = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let indices: Vec<u32> = vec![0, 1, 2];

    let vertex_bytes = to_bytes_f32(&vertices.iter().flat_map(|v| *v).collect::<Vec<_>>());
    let index_bytes = to_bytes_u32(&indices);

    let mut ctx = Context::new(Mode::Export);
    ctx.configure_vertex_count(3).unwrap();
    ctx.configure_triangle_count(1).unwrap();
    ctx.configure_method(Method::Raw).unwrap();
    ctx.configure_frame_count(2).unwrap();
    ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::U32, 0)
        .unwrap();
    ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)
        .unwrap();

    let mut out = Vec::new();
    {
        let mut write_cb = |b: &[u8]| {
            out.extend_from_slice(b);
            b.len()
        };
        ctx.save_custom(&mut write_cb).unwrap();
        ctx.write_next_frame(&mut write_cb, 1.0).unwrap();
        let before = ctx.get_integer(Property::CurrentFrame).unwrap();
        let result = ctx.write_next_frame(&mut write_cb, 1.0);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        let after = ctx.get_integer(Property::CurrentFrame).unwrap();
        assert_eq!(before, after);
    }
}

#[test]
fn close_is_idempotent_from_the_public_api() {
    let mut ctx = Context::new(Mode::Export);
    ctx.close();
    ctx.close();
}
