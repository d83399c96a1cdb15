//! Plain in-memory mesh data shared by every pipeline, decoupled from the
//! typed array façade: the container (component G) copies to/from caller
//! buffers through [`crate::array_view`], while the pipelines (D/E/F) work
//! on these owned vectors. This mirrors the reference implementation's
//! separation between the public typed-array bindings and the internal
//! arrays the compressors actually operate on.

/// The shape of a mesh: counts and per-map metadata that stay fixed across
/// every frame of an animation.
#[derive(Debug, Clone)]
pub struct MeshShape {
    pub vertex_count: u32,
    pub triangle_count: u32,
    pub has_normals: bool,
    pub uv_components: Vec<u32>,
    pub attrib_components: Vec<u32>,
}

/// One frame's worth of per-vertex data, sharing the mesh-wide index buffer.
#[derive(Debug, Clone, Default)]
pub struct FrameData {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uv_maps: Vec<Vec<f32>>,
    pub attrib_maps: Vec<Vec<f32>>,
}

impl FrameData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}
