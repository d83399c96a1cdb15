//! The container state machine (component G): `Context` lifecycle, header
//! I/O, per-frame orchestration, integrity checks, and the v5 compatibility
//! shim, all built on top of components A–F and H.
//!
//! The reference implementation threads everything through a single mutable
//! struct with function-pointer dispatch; here the same session shape is a
//! `Context<'a>` generic over the lifetime of its bound buffers; instead of
//! borrowed arrays living behind raw pointers, `bind_array_*` takes a Rust
//! slice and the borrow checker enforces the "buffer outlives its use this
//! frame" rule the spec states as a prose invariant.

use crate::array_view::{ArrayView, ArrayViewMut, ElementKind};
use crate::error::{Error, Result};
use crate::integrity;
use crate::legacy_v5;
use crate::mesh::{FrameData, MeshShape};
use crate::mesh_map::{MeshMapList, MeshMapRecord};
use crate::pipelines::{CodecParams, Method};
use crate::stream::{ReadCallback, StreamReader, StreamWriter, WriteCallback};

const MAGIC: [u8; 4] = *b"OCTM";
const CURRENT_VERSION: u32 = 6;
const TAG_UINF: [u8; 4] = *b"UINF";
const TAG_AINF: [u8; 4] = *b"AINF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Import,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    HeaderDone,
    MeshDone(u32),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    Indices,
    Vertices,
    Normals,
    UvMap(u32),
    AttribMap(u32),
}

/// A property key for the generic [`Context::get_integer`] / [`Context::get_float`]
/// / [`Context::get_boolean`] / [`Context::get_string`] accessors, alongside the
/// typed per-field getters/setters most callers should reach for instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    VertexCount,
    TriangleCount,
    UvMapCount,
    AttribMapCount,
    HasNormals,
    CompressionMethod,
    CompressionLevel,
    FrameCount,
    CurrentFrame,
    VertexPrecision,
    NormalPrecision,
    FileComment,
}

/// A property key for the per-ordinal [`Context::get_uv_map_string`] /
/// [`Context::get_uv_map_float`] / [`Context::get_attrib_map_string`] /
/// [`Context::get_attrib_map_float`] accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapProperty {
    Name,
    FileName,
    Precision,
    Components,
}

#[derive(Default)]
struct ExportBindings<'a> {
    indices: Option<ArrayView<'a>>,
    vertices: Option<ArrayView<'a>>,
    normals: Option<ArrayView<'a>>,
    uv_maps: Vec<Option<ArrayView<'a>>>,
    attrib_maps: Vec<Option<ArrayView<'a>>>,
}

#[derive(Default)]
struct ImportBindings<'a> {
    indices: Option<ArrayViewMut<'a>>,
    vertices: Option<ArrayViewMut<'a>>,
    normals: Option<ArrayViewMut<'a>>,
    uv_maps: Vec<Option<ArrayViewMut<'a>>>,
    attrib_maps: Vec<Option<ArrayViewMut<'a>>>,
}

enum Bindings<'a> {
    Export(ExportBindings<'a>),
    Import(ImportBindings<'a>),
}

/// A mesh session: header configuration (export) or header inspection
/// (import), bound arrays, and per-frame orchestration.
pub struct Context<'a> {
    mode: Mode,
    state: State,
    format_version: u32,
    shape: MeshShape,
    uv_maps: MeshMapList,
    attrib_maps: MeshMapList,
    method: Method,
    level: u32,
    vertex_precision: f32,
    normal_precision: f32,
    frame_count: u32,
    comment: String,
    last_frame_time: f32,
    last_error: Option<Error>,
    bindings: Bindings<'a>,
    /// Indices as actually laid out on the wire for frame 0 (reordered by
    /// MG1/MG2); needed by every later `encode_frame`/`decode_frame` call.
    wire_indices: Option<Vec<u32>>,
    /// Backing buffer + cursor owned by the context between `open_read_file`
    /// and the matching `read_mesh_file`/`read_next_frame_file` calls.
    file_read: Option<(Vec<u8>, usize)>,
    /// File handle owned by the context between `save_file` and the matching
    /// `write_next_frame_file` calls.
    file_write: Option<std::fs::File>,
}

impl<'a> Context<'a> {
    pub fn new(mode: Mode) -> Self {
        let bindings = match mode {
            Mode::Export => Bindings::Export(ExportBindings::default()),
            Mode::Import => Bindings::Import(ImportBindings::default()),
        };
        Context {
            mode,
            state: State::Fresh,
            format_version: CURRENT_VERSION,
            shape: MeshShape {
                vertex_count: 0,
                triangle_count: 0,
                has_normals: false,
                uv_components: Vec::new(),
                attrib_components: Vec::new(),
            },
            uv_maps: MeshMapList::default(),
            attrib_maps: MeshMapList::default(),
            method: Method::Mg1,
            level: 1,
            vertex_precision: 2f32.powi(-10),
            normal_precision: 2f32.powi(-8),
            frame_count: 1,
            comment: String::new(),
            last_frame_time: 0.0,
            last_error: None,
            bindings,
            wire_indices: None,
            file_read: None,
            file_write: None,
        }
    }

    /// Takes and clears the last recorded error, per spec §7.
    pub fn get_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.last_error = Some(err.clone());
        Err(err)
    }

    fn require_export_fresh(&mut self) -> Result<()> {
        if self.mode != Mode::Export || self.state != State::Fresh {
            return self.fail(Error::InvalidOperation(
                "configuration is only valid in export mode before the first save".into(),
            ));
        }
        Ok(())
    }

    // -- configuration (export, FRESH only) ---------------------------------

    pub fn configure_vertex_count(&mut self, n: u32) -> Result<()> {
        self.require_export_fresh()?;
        self.shape.vertex_count = n;
        Ok(())
    }

    pub fn configure_triangle_count(&mut self, n: u32) -> Result<()> {
        self.require_export_fresh()?;
        self.shape.triangle_count = n;
        Ok(())
    }

    pub fn configure_has_normals(&mut self, value: bool) -> Result<()> {
        self.require_export_fresh()?;
        self.shape.has_normals = value;
        Ok(())
    }

    pub fn configure_method(&mut self, method: Method) -> Result<()> {
        self.require_export_fresh()?;
        self.method = method;
        Ok(())
    }

    pub fn configure_level(&mut self, level: u32) -> Result<()> {
        self.require_export_fresh()?;
        if level > 9 {
            return self.fail(Error::InvalidArgument("compression level must be 0..=9".into()));
        }
        self.level = level;
        Ok(())
    }

    pub fn configure_vertex_precision(&mut self, p: f32) -> Result<()> {
        self.require_export_fresh()?;
        if !(p > 0.0) {
            return self.fail(Error::InvalidArgument("precision must be strictly positive".into()));
        }
        self.vertex_precision = p;
        Ok(())
    }

    pub fn configure_normal_precision(&mut self, p: f32) -> Result<()> {
        self.require_export_fresh()?;
        if !(p > 0.0) {
            return self.fail(Error::InvalidArgument("precision must be strictly positive".into()));
        }
        self.normal_precision = p;
        Ok(())
    }

    /// Sets the vertex precision relative to the mesh's own scale: `rel`
    /// times the average triangle edge length, rounded from the indices and
    /// vertices already bound. The mesh must be fully bound before calling.
    pub fn configure_vertex_precision_rel(&mut self, rel: f32) -> Result<()> {
        self.require_export_fresh()?;
        if !(rel > 0.0) {
            return self.fail(Error::InvalidArgument("precision must be strictly positive".into()));
        }
        let Bindings::Export(b) = &self.bindings else { unreachable!() };
        let indices_view = match b.indices {
            Some(v) => v,
            None => return self.fail(Error::InvalidOperation("indices not bound".into())),
        };
        let vertices_view = match b.vertices {
            Some(v) => v,
            None => return self.fail(Error::InvalidOperation("vertices not bound".into())),
        };
        let indices = Self::gather_indices(&indices_view, self.shape.triangle_count);
        let vertices = Self::gather_vec3(&vertices_view, self.shape.vertex_count);

        let mut total = 0f64;
        let mut edges = 0u64;
        for tri in indices.chunks_exact(3) {
            let v = [
                vertices[tri[0] as usize],
                vertices[tri[1] as usize],
                vertices[tri[2] as usize],
            ];
            for &(a, b) in &[(0, 1), (1, 2), (2, 0)] {
                let d: f32 = (0..3).map(|k| (v[a][k] - v[b][k]).powi(2)).sum::<f32>().sqrt();
                total += d as f64;
                edges += 1;
            }
        }
        if edges == 0 {
            return self.fail(Error::InvalidOperation(
                "cannot derive a relative precision from an empty mesh".into(),
            ));
        }
        self.vertex_precision = rel * (total / edges as f64) as f32;
        Ok(())
    }

    pub fn configure_frame_count(&mut self, n: u32) -> Result<()> {
        self.require_export_fresh()?;
        if n == 0 {
            return self.fail(Error::InvalidArgument("frame count must be >= 1".into()));
        }
        self.frame_count = n;
        Ok(())
    }

    pub fn configure_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        self.require_export_fresh()?;
        self.comment = comment.into();
        Ok(())
    }

    /// Adds a UV map (2 components) and returns its 1-based ordinal.
    pub fn add_uv_map(&mut self, name: Option<&str>, file_name: Option<&str>, precision: f32) -> Result<u32> {
        self.require_export_fresh()?;
        let mut record = MeshMapRecord::new(2, precision);
        if let Some(n) = name {
            record = record.with_name(n);
        }
        if let Some(f) = file_name {
            record = record.with_file_name(f);
        }
        self.uv_maps.push(record);
        self.shape.uv_components.push(2);
        Ok(self.uv_maps.len() as u32)
    }

    /// Adds an attribute map (1..=4 components) and returns its 1-based ordinal.
    pub fn add_attrib_map(&mut self, components: u32, name: Option<&str>, precision: f32) -> Result<u32> {
        self.require_export_fresh()?;
        if !(1..=4).contains(&components) {
            return self.fail(Error::InvalidArgument("attribute maps carry 1..=4 components".into()));
        }
        let mut record = MeshMapRecord::new(components, precision);
        if let Some(n) = name {
            record = record.with_name(n);
        }
        self.attrib_maps.push(record);
        self.shape.attrib_components.push(components);
        Ok(self.attrib_maps.len() as u32)
    }

    /// Sets the quantization precision of an already-added UV map by ordinal.
    pub fn configure_uv_precision(&mut self, ordinal: u32, p: f32) -> Result<()> {
        self.require_export_fresh()?;
        if !(p > 0.0) {
            return self.fail(Error::InvalidArgument("precision must be strictly positive".into()));
        }
        match self.uv_maps.get_mut(ordinal) {
            Some(rec) => {
                rec.precision = p;
                Ok(())
            }
            None => self.fail(Error::InvalidArgument(format!("no UV map with ordinal {ordinal}"))),
        }
    }

    /// Sets the quantization precision of an already-added attribute map by ordinal.
    pub fn configure_attrib_precision(&mut self, ordinal: u32, p: f32) -> Result<()> {
        self.require_export_fresh()?;
        if !(p > 0.0) {
            return self.fail(Error::InvalidArgument("precision must be strictly positive".into()));
        }
        match self.attrib_maps.get_mut(ordinal) {
            Some(rec) => {
                rec.precision = p;
                Ok(())
            }
            None => self.fail(Error::InvalidArgument(format!("no attribute map with ordinal {ordinal}"))),
        }
    }

    // -- array binding -------------------------------------------------------

    fn check_bind_size(target: BindTarget, components: u32) -> Result<()> {
        let ok = match target {
            BindTarget::Indices | BindTarget::Vertices | BindTarget::Normals => components == 3,
            BindTarget::UvMap(_) => components == 2,
            BindTarget::AttribMap(_) => (1..=4).contains(&components),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "wrong component count {components} for {target:?}"
            )))
        }
    }

    fn check_indices_bind_timing(&self) -> Result<()> {
        match self.state {
            State::Fresh | State::HeaderDone => Ok(()),
            _ => Err(Error::InvalidOperation(
                "indices may only be (re)bound before the first mesh is processed".into(),
            )),
        }
    }

    /// Binds a read-only array for export.
    pub fn bind_array_export(
        &mut self,
        target: BindTarget,
        data: &'a [u8],
        components: u32,
        kind: ElementKind,
        stride: usize,
    ) -> Result<()> {
        if self.mode != Mode::Export {
            return self.fail(Error::InvalidOperation("bind_array_export requires export mode".into()));
        }
        Self::check_bind_size(target, components).map_err(|e| {
            self.last_error = Some(e.clone());
            e
        })?;
        if matches!(target, BindTarget::Indices) {
            self.check_indices_bind_timing().map_err(|e| {
                self.last_error = Some(e.clone());
                e
            })?;
        }
        let view = ArrayView::bind(data, components, kind, stride);
        let Bindings::Export(b) = &mut self.bindings else { unreachable!() };
        match target {
            BindTarget::Indices => b.indices = view,
            BindTarget::Vertices => b.vertices = view,
            BindTarget::Normals => b.normals = view,
            BindTarget::UvMap(ord) => {
                let idx = ord as usize - 1;
                if idx >= b.uv_maps.len() {
                    b.uv_maps.resize_with(idx + 1, || None);
                }
                b.uv_maps[idx] = view;
            }
            BindTarget::AttribMap(ord) => {
                let idx = ord as usize - 1;
                if idx >= b.attrib_maps.len() {
                    b.attrib_maps.resize_with(idx + 1, || None);
                }
                b.attrib_maps[idx] = view;
            }
        }
        Ok(())
    }

    /// Binds a read-write array for import. Attribute map component counts
    /// are carried in the header's AINF block; if `components` disagrees
    /// with the value already read from the header, the bind is rejected.
    pub fn bind_array_import(
        &mut self,
        target: BindTarget,
        data: &'a mut [u8],
        components: u32,
        kind: ElementKind,
        stride: usize,
    ) -> Result<()> {
        if self.mode != Mode::Import {
            return self.fail(Error::InvalidOperation("bind_array_import requires import mode".into()));
        }
        Self::check_bind_size(target, components).map_err(|e| {
            self.last_error = Some(e.clone());
            e
        })?;
        if matches!(target, BindTarget::Indices) {
            self.check_indices_bind_timing().map_err(|e| {
                self.last_error = Some(e.clone());
                e
            })?;
        }
        if let BindTarget::AttribMap(ord) = target {
            let idx = ord as usize - 1;
            if idx < self.shape.attrib_components.len() {
                let known = self.shape.attrib_components[idx];
                if known != components {
                    return self.fail(Error::InvalidArgument(format!(
                        "attribute map {ord} has {known} components per the header, but {components} were bound"
                    )));
                }
            } else {
                self.shape.attrib_components.resize(idx + 1, components);
            }
            if let Some(rec) = self.attrib_maps.get_mut(ord) {
                rec.components = components;
            }
        }
        let view = ArrayViewMut::bind(data, components, kind, stride);
        let Bindings::Import(b) = &mut self.bindings else { unreachable!() };
        match target {
            BindTarget::Indices => b.indices = view,
            BindTarget::Vertices => b.vertices = view,
            BindTarget::Normals => b.normals = view,
            BindTarget::UvMap(ord) => {
                let idx = ord as usize - 1;
                if idx >= b.uv_maps.len() {
                    b.uv_maps.resize_with(idx + 1, || None);
                }
                b.uv_maps[idx] = view;
            }
            BindTarget::AttribMap(ord) => {
                let idx = ord as usize - 1;
                if idx >= b.attrib_maps.len() {
                    b.attrib_maps.resize_with(idx + 1, || None);
                }
                b.attrib_maps[idx] = view;
            }
        }
        Ok(())
    }

    // -- export: gather from bound views -------------------------------------

    fn gather_indices(view: &ArrayView, triangle_count: u32) -> Vec<u32> {
        let mut out = Vec::with_capacity(triangle_count as usize * 3);
        for e in 0..triangle_count {
            for c in 0..3 {
                out.push(view.get_int(e, c) as u32);
            }
        }
        out
    }

    fn gather_vec3(view: &ArrayView, count: u32) -> Vec<[f32; 3]> {
        (0..count)
            .map(|e| [view.get_float(e, 0), view.get_float(e, 1), view.get_float(e, 2)])
            .collect()
    }

    fn gather_map(view: &ArrayView, count: u32, components: u32) -> Vec<f32> {
        let mut out = Vec::with_capacity(count as usize * components as usize);
        for e in 0..count {
            for c in 0..components {
                out.push(view.get_float(e, c));
            }
        }
        out
    }

    fn gather_frame(&mut self) -> Result<(Vec<u32>, FrameData)> {
        let Bindings::Export(b) = &self.bindings else { unreachable!() };
        let indices_view = b
            .indices
            .ok_or_else(|| Error::InvalidOperation("indices not bound".into()))?;
        let vertices_view = b
            .vertices
            .ok_or_else(|| Error::InvalidOperation("vertices not bound".into()))?;
        let indices = Self::gather_indices(&indices_view, self.shape.triangle_count);
        let vertices = Self::gather_vec3(&vertices_view, self.shape.vertex_count);

        let normals = if self.shape.has_normals {
            let view = b
                .normals
                .ok_or_else(|| Error::InvalidOperation("normals not bound".into()))?;
            Some(Self::gather_vec3(&view, self.shape.vertex_count))
        } else {
            None
        };

        let mut uv_maps = Vec::with_capacity(self.shape.uv_components.len());
        for (i, _) in self.shape.uv_components.iter().enumerate() {
            let view = b
                .uv_maps
                .get(i)
                .and_then(|v| *v)
                .ok_or_else(|| Error::InvalidOperation(format!("UV map {} not bound", i + 1)))?;
            uv_maps.push(Self::gather_map(&view, self.shape.vertex_count, 2));
        }

        let mut attrib_maps = Vec::with_capacity(self.shape.attrib_components.len());
        for (i, &components) in self.shape.attrib_components.iter().enumerate() {
            let view = b
                .attrib_maps
                .get(i)
                .and_then(|v| *v)
                .ok_or_else(|| Error::InvalidOperation(format!("attribute map {} not bound", i + 1)))?;
            attrib_maps.push(Self::gather_map(&view, self.shape.vertex_count, components));
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

    fn gather_vertex_frame_only(&mut self) -> Result<FrameData> {
        let Bindings::Export(b) = &self.bindings else { unreachable!() };
        let vertices_view = b
            .vertices
            .ok_or_else(|| Error::InvalidOperation("vertices not bound".into()))?;
        let vertices = Self::gather_vec3(&vertices_view, self.shape.vertex_count);

        let normals = if self.shape.has_normals {
            let view = b
                .normals
                .ok_or_else(|| Error::InvalidOperation("normals not bound".into()))?;
            Some(Self::gather_vec3(&view, self.shape.vertex_count))
        } else {
            None
        };

        let mut uv_maps = Vec::with_capacity(self.shape.uv_components.len());
        for i in 0..self.shape.uv_components.len() {
            let view = b
                .uv_maps
                .get(i)
                .and_then(|v| *v)
                .ok_or_else(|| Error::InvalidOperation(format!("UV map {} not bound", i + 1)))?;
            uv_maps.push(Self::gather_map(&view, self.shape.vertex_count, 2));
        }
        let mut attrib_maps = Vec::with_capacity(self.shape.attrib_components.len());
        for (i, &components) in self.shape.attrib_components.iter().enumerate() {
            let view = b
                .attrib_maps
                .get(i)
                .and_then(|v| *v)
                .ok_or_else(|| Error::InvalidOperation(format!("attribute map {} not bound", i + 1)))?;
            attrib_maps.push(Self::gather_map(&view, self.shape.vertex_count, components));
        }

        Ok(FrameData {
            vertices,
            normals,
            uv_maps,
            attrib_maps,
        })
    }

    // -- import: scatter into bound views -------------------------------------

    fn scatter_indices(view: &mut ArrayViewMut, indices: &[u32]) {
        for (i, chunk) in indices.chunks_exact(3).enumerate() {
            for (c, &v) in chunk.iter().enumerate() {
                view.set_int(i as u32, c as u32, v as i64);
            }
        }
    }

    fn scatter_vec3(view: &mut ArrayViewMut, values: &[[f32; 3]]) {
        for (e, v) in values.iter().enumerate() {
            view.set_float(e as u32, 0, v[0]);
            view.set_float(e as u32, 1, v[1]);
            view.set_float(e as u32, 2, v[2]);
        }
    }

    fn scatter_map(view: &mut ArrayViewMut, values: &[f32], components: u32) {
        let components = components as usize;
        for (e, chunk) in values.chunks_exact(components).enumerate() {
            for (c, &v) in chunk.iter().enumerate() {
                view.set_float(e as u32, c as u32, v);
            }
        }
    }

    fn scatter_mesh(&mut self, indices: &[u32], frame: &FrameData) -> Result<()> {
        let Bindings::Import(b) = &mut self.bindings else { unreachable!() };
        if let Some(view) = b.indices.as_mut() {
            Self::scatter_indices(view, indices);
        }
        self.scatter_frame_only(frame)
    }

    fn scatter_frame_only(&mut self, frame: &FrameData) -> Result<()> {
        let Bindings::Import(b) = &mut self.bindings else { unreachable!() };
        if let Some(view) = b.vertices.as_mut() {
            Self::scatter_vec3(view, &frame.vertices);
        }
        if let (Some(view), Some(normals)) = (b.normals.as_mut(), frame.normals.as_ref()) {
            Self::scatter_vec3(view, normals);
        }
        for (i, map) in frame.uv_maps.iter().enumerate() {
            if let Some(slot) = b.uv_maps.get_mut(i) {
                if let Some(view) = slot.as_mut() {
                    Self::scatter_map(view, map, 2);
                }
            }
        }
        for (i, map) in frame.attrib_maps.iter().enumerate() {
            let components = self.shape.attrib_components.get(i).copied().unwrap_or(4);
            if let Some(slot) = b.attrib_maps.get_mut(i) {
                if let Some(view) = slot.as_mut() {
                    Self::scatter_map(view, map, components);
                }
            }
        }
        Ok(())
    }

    fn codec_params(&self) -> CodecParams {
        CodecParams {
            level: self.level,
            vertex_precision: self.vertex_precision,
            normal_precision: self.normal_precision,
            uv_precisions: self.uv_maps.iter().map(|m| m.precision).collect(),
            attrib_precisions: self.attrib_maps.iter().map(|m| m.precision).collect(),
        }
    }

    // -- header I/O ------------------------------------------------------------

    fn write_header(&self, writer: &mut StreamWriter) -> Result<()> {
        writer.write_fourcc(&MAGIC)?;
        writer.write_u32(CURRENT_VERSION)?;
        writer.write_fourcc(&self.method.fourcc())?;
        writer.write_u32(self.shape.vertex_count)?;
        writer.write_u32(self.shape.triangle_count)?;
        writer.write_u32(self.uv_maps.len() as u32)?;
        writer.write_u32(self.attrib_maps.len() as u32)?;
        writer.write_u32(if self.shape.has_normals { 1 } else { 0 })?;
        writer.write_u32(self.frame_count)?;
        writer.write_string(&self.comment)?;
        if !self.uv_maps.is_empty() {
            writer.write_fourcc(&TAG_UINF)?;
            for m in self.uv_maps.iter() {
                writer.write_string(m.name.as_deref().unwrap_or(""))?;
                writer.write_string(m.file_name.as_deref().unwrap_or(""))?;
            }
        }
        if !self.attrib_maps.is_empty() {
            writer.write_fourcc(&TAG_AINF)?;
            for m in self.attrib_maps.iter() {
                writer.write_string(m.name.as_deref().unwrap_or(""))?;
                writer.write_u32(m.components)?;
            }
        }
        Ok(())
    }

    fn read_header(reader: &mut StreamReader) -> Result<(u32, Method, MeshShape, u32, String, MeshMapList, MeshMapList)> {
        reader.expect_fourcc(&MAGIC)?;
        let version = reader.read_u32()?;
        if version != CURRENT_VERSION && version != 5 {
            return Err(Error::UnsupportedFormatVersion(version));
        }
        let method_tag = reader.read_fourcc()?;
        let method = Method::from_fourcc(&method_tag)
            .ok_or_else(|| Error::BadFormat(format!("unknown method tag {:?}", String::from_utf8_lossy(&method_tag))))?;
        let vertex_count = reader.read_u32()?;
        let triangle_count = reader.read_u32()?;
        let uv_count = reader.read_u32()?;
        let attrib_count = reader.read_u32()?;
        let flags = reader.read_u32()?;
        let frame_count = reader.read_u32()?;
        let comment = reader.read_string()?;

        let mut uv_maps = MeshMapList::default();
        if uv_count > 0 {
            reader.expect_fourcc(&TAG_UINF)?;
            for _ in 0..uv_count {
                let name = reader.read_string()?;
                let file_name = reader.read_string()?;
                let mut rec = MeshMapRecord::new(2, 2f32.powi(-12));
                if !name.is_empty() {
                    rec = rec.with_name(name);
                }
                if !file_name.is_empty() {
                    rec = rec.with_file_name(file_name);
                }
                uv_maps.push(rec);
            }
        }

        let mut attrib_maps = MeshMapList::default();
        let mut attrib_components = Vec::with_capacity(attrib_count as usize);
        if attrib_count > 0 {
            reader.expect_fourcc(&TAG_AINF)?;
            for _ in 0..attrib_count {
                let name = reader.read_string()?;
                let components = reader.read_u32()?;
                let mut rec = MeshMapRecord::new(components, 2f32.powi(-8));
                if !name.is_empty() {
                    rec = rec.with_name(name);
                }
                attrib_maps.push(rec);
                attrib_components.push(components);
            }
        }

        let shape = MeshShape {
            vertex_count,
            triangle_count,
            has_normals: flags & 1 != 0,
            uv_components: vec![2; uv_count as usize],
            attrib_components,
        };

        Ok((version, method, shape, frame_count, comment, uv_maps, attrib_maps))
    }

    // -- export lifecycle --------------------------------------------------

    pub fn save_custom(&mut self, write_cb: &mut dyn WriteCallback) -> Result<()> {
        if self.mode != Mode::Export || self.state != State::Fresh {
            return self.fail(Error::InvalidOperation("save is only valid once, from the fresh state".into()));
        }
        if self.shape.vertex_count == 0 || self.shape.triangle_count == 0 {
            return self.fail(Error::InvalidMesh("vertex_count and triangle_count must be > 0".into()));
        }

        let mut writer = StreamWriter::new(write_cb);
        if let Err(e) = self.write_header(&mut writer) {
            return self.fail(e);
        }

        let (indices, frame) = match self.gather_frame() {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        if let Err(e) = integrity::check_mesh(&self.shape, &indices, &frame) {
            return self.fail(e);
        }

        let params = self.codec_params();
        let pipeline = self.method.pipeline();
        let wire_indices = match pipeline.encode_mesh(&mut writer, &self.shape, &indices, &frame, &params) {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        self.wire_indices = Some(wire_indices);
        self.state = State::MeshDone(1);
        self.last_frame_time = 0.0;
        Ok(())
    }

    /// Convenience wrapper over [`Self::save_custom`] that opens `path` and owns
    /// the resulting [`std::fs::File`] so a multi-frame export can keep writing
    /// to it via [`Self::write_next_frame_file`] without the caller re-opening it.
    pub fn save_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let mut file = match std::fs::File::create(path.as_ref()) {
            Ok(f) => f,
            Err(e) => return self.fail(Error::FileError(e.to_string())),
        };
        let result = {
            let mut write_cb = Self::file_write_callback(&mut file);
            self.save_custom(&mut write_cb)
        };
        self.file_write = Some(file);
        result
    }

    fn file_write_callback(file: &mut std::fs::File) -> impl FnMut(&[u8]) -> usize + '_ {
        use std::io::Write;
        move |buf: &[u8]| file.write_all(buf).map(|_| buf.len()).unwrap_or(0)
    }

    pub fn write_next_frame(&mut self, write_cb: &mut dyn WriteCallback, t: f32) -> Result<()> {
        let k = match (self.mode, self.state) {
            (Mode::Export, State::MeshDone(k)) if k < self.frame_count => k,
            _ => {
                return self.fail(Error::InvalidOperation(
                    "write_next_frame requires an in-progress export with remaining frames".into(),
                ))
            }
        };
        if !(t > self.last_frame_time) {
            return self.fail(Error::InvalidArgument(format!(
                "frame time {t} does not exceed previous time {}",
                self.last_frame_time
            )));
        }

        let frame = match self.gather_vertex_frame_only() {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        if let Err(e) = integrity::check_frame(&self.shape, &frame) {
            return self.fail(e);
        }

        let mut writer = StreamWriter::new(write_cb);
        if let Err(e) = writer.write_f32(t) {
            return self.fail(e);
        }
        let params = self.codec_params();
        let pipeline = self.method.pipeline();
        let indices = self.wire_indices.clone().unwrap_or_default();
        if let Err(e) = pipeline.encode_frame(&mut writer, &self.shape, &indices, &frame, &params) {
            return self.fail(e);
        }

        self.state = State::MeshDone(k + 1);
        self.last_frame_time = t;
        Ok(())
    }

    /// Convenience wrapper over [`Self::write_next_frame`] using the file handle
    /// opened by [`Self::save_file`].
    pub fn write_next_frame_file(&mut self, t: f32) -> Result<()> {
        let mut file = match self.file_write.take() {
            Some(f) => f,
            None => return self.fail(Error::InvalidOperation("no file opened via save_file".into())),
        };
        let result = {
            let mut write_cb = Self::file_write_callback(&mut file);
            self.write_next_frame(&mut write_cb, t)
        };
        self.file_write = Some(file);
        result
    }

    // -- import lifecycle ----------------------------------------------------

    pub fn open_read_custom(&mut self, read_cb: &mut dyn ReadCallback) -> Result<()> {
        if self.mode != Mode::Import || self.state != State::Fresh {
            return self.fail(Error::InvalidOperation("open_read is only valid once, from the fresh state".into()));
        }
        let mut reader = StreamReader::new(read_cb);
        let (version, method, shape, frame_count, comment, uv_maps, attrib_maps) = match Self::read_header(&mut reader) {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        self.format_version = version;
        self.method = method;
        self.shape = shape;
        self.frame_count = frame_count;
        self.comment = comment;
        self.uv_maps = uv_maps;
        self.attrib_maps = attrib_maps;
        self.state = State::HeaderDone;
        Ok(())
    }

    /// Convenience wrapper over [`Self::open_read_custom`] that reads `path`
    /// into memory and owns the resulting cursor so [`Self::read_mesh_file`]
    /// and [`Self::read_next_frame_file`] can continue from it.
    pub fn open_read_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let data = match std::fs::read(path.as_ref()) {
            Ok(d) => d,
            Err(e) => return self.fail(Error::FileError(e.to_string())),
        };
        let mut cursor = 0usize;
        let result = {
            let mut read_cb = Self::file_read_callback(&data, &mut cursor);
            self.open_read_custom(&mut read_cb)
        };
        self.file_read = Some((data, cursor));
        result
    }

    fn file_read_callback<'b>(data: &'b [u8], cursor: &'b mut usize) -> impl FnMut(&mut [u8]) -> usize + 'b {
        move |out: &mut [u8]| {
            let n = out.len().min(data.len() - *cursor);
            out[..n].copy_from_slice(&data[*cursor..*cursor + n]);
            *cursor += n;
            n
        }
    }

    pub fn read_mesh(&mut self, read_cb: &mut dyn ReadCallback) -> Result<()> {
        if self.mode != Mode::Import || self.state != State::HeaderDone {
            return self.fail(Error::InvalidOperation("read_mesh requires a header already read".into()));
        }
        let mut reader = StreamReader::new(read_cb);
        let params = self.codec_params();

        let decoded = if self.format_version == 5 {
            legacy_v5::upgrade_mesh(&mut reader, &self.shape, self.method)
        } else {
            self.method.pipeline().decode_mesh(&mut reader, &self.shape, &params)
        };
        let (indices, frame) = match decoded {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };

        self.wire_indices = Some(indices.clone());
        // Per spec: decoded data is written through the caller's views even
        // when the subsequent integrity check fails; state still advances.
        let scatter_result = self.scatter_mesh(&indices, &frame);
        self.state = State::MeshDone(1);
        self.last_frame_time = 0.0;
        if let Err(e) = scatter_result {
            return self.fail(e);
        }
        if let Err(e) = integrity::check_mesh(&self.shape, &indices, &frame) {
            return self.fail(e);
        }
        Ok(())
    }

    /// Convenience wrapper over [`Self::read_mesh`] using the cursor opened by
    /// [`Self::open_read_file`].
    pub fn read_mesh_file(&mut self) -> Result<()> {
        let (data, mut cursor) = match self.file_read.take() {
            Some(v) => v,
            None => return self.fail(Error::InvalidOperation("no file opened via open_read_file".into())),
        };
        let result = {
            let mut read_cb = Self::file_read_callback(&data, &mut cursor);
            self.read_mesh(&mut read_cb)
        };
        self.file_read = Some((data, cursor));
        result
    }

    pub fn read_next_frame(&mut self, read_cb: &mut dyn ReadCallback) -> Result<f32> {
        let k = match (self.mode, self.state) {
            (Mode::Import, State::MeshDone(k)) if k < self.frame_count => k,
            _ => {
                return self.fail(Error::InvalidOperation(
                    "read_next_frame requires an in-progress import with remaining frames".into(),
                ))
            }
        };
        let mut reader = StreamReader::new(read_cb);
        let t = match reader.read_f32() {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        if !(t > self.last_frame_time) {
            return self.fail(Error::BadFormat(format!(
                "non-monotone frame time {t} after {}",
                self.last_frame_time
            )));
        }

        let params = self.codec_params();
        let indices = self.wire_indices.clone().unwrap_or_default();
        let decoded = if self.format_version == 5 {
            legacy_v5::upgrade_frame(&mut reader, &self.shape)
        } else {
            self.method.pipeline().decode_frame(&mut reader, &self.shape, &indices, &params)
        };
        let frame = match decoded {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };

        let scatter_result = self.scatter_frame_only(&frame);
        self.state = State::MeshDone(k + 1);
        self.last_frame_time = t;
        if let Err(e) = scatter_result {
            return self.fail(e);
        }
        if let Err(e) = integrity::check_frame(&self.shape, &frame) {
            return self.fail(e);
        }
        Ok(t)
    }

    /// Convenience wrapper over [`Self::read_next_frame`] using the cursor
    /// opened by [`Self::open_read_file`].
    pub fn read_next_frame_file(&mut self) -> Result<f32> {
        let (data, mut cursor) = match self.file_read.take() {
            Some(v) => v,
            None => return self.fail(Error::InvalidOperation("no file opened via open_read_file".into())),
        };
        let result = {
            let mut read_cb = Self::file_read_callback(&data, &mut cursor);
            self.read_next_frame(&mut read_cb)
        };
        self.file_read = Some((data, cursor));
        result
    }

    // -- teardown --------------------------------------------------------------

    /// Idempotent: calling `close` on an already-closed context is a no-op.
    pub fn close(&mut self) {
        if self.state != State::Closed {
            self.file_read = None;
            self.file_write = None;
            self.state = State::Closed;
        }
    }

    /// Consumes the context, releasing every owned resource. Distinct from
    /// `close` only in spirit here — Rust's `Drop` already frees comment,
    /// map names, and scratch state; this exists for API parity with the
    /// reference's explicit `free`.
    pub fn free(self) {}

    // -- generic property access (spec §6 external interface) ------------------

    pub fn get_integer(&self, prop: Property) -> Result<i64> {
        Ok(match prop {
            Property::VertexCount => self.shape.vertex_count as i64,
            Property::TriangleCount => self.shape.triangle_count as i64,
            Property::UvMapCount => self.uv_maps.len() as i64,
            Property::AttribMapCount => self.attrib_maps.len() as i64,
            Property::CompressionLevel => self.level as i64,
            Property::FrameCount => self.frame_count as i64,
            Property::CurrentFrame => match self.state {
                State::Fresh | State::HeaderDone => 0,
                State::MeshDone(k) => k as i64,
                State::Closed => -1,
            },
            _ => return Err(Error::InvalidArgument("not an integer property".into())),
        })
    }

    pub fn get_boolean(&self, prop: Property) -> Result<bool> {
        match prop {
            Property::HasNormals => Ok(self.shape.has_normals),
            _ => Err(Error::InvalidArgument("not a boolean property".into())),
        }
    }

    pub fn get_float(&self, prop: Property) -> Result<f32> {
        match prop {
            Property::VertexPrecision => Ok(self.vertex_precision),
            Property::NormalPrecision => Ok(self.normal_precision),
            Property::CurrentFrame => Ok(self.last_frame_time),
            _ => Err(Error::InvalidArgument("not a float property".into())),
        }
    }

    pub fn get_string(&self, prop: Property) -> Result<&str> {
        match prop {
            Property::FileComment => Ok(&self.comment),
            _ => Err(Error::InvalidArgument("not a string property".into())),
        }
    }

    pub fn get_named_uv_map(&self, name: &str) -> Option<u32> {
        self.uv_maps.find_by_name(name)
    }

    pub fn get_named_attrib_map(&self, name: &str) -> Option<u32> {
        self.attrib_maps.find_by_name(name)
    }

    fn map_string_prop<'s>(rec: &'s MeshMapRecord, prop: MapProperty) -> Result<&'s str> {
        match prop {
            MapProperty::Name => Ok(rec.name.as_deref().unwrap_or("")),
            MapProperty::FileName => Ok(rec.file_name.as_deref().unwrap_or("")),
            _ => Err(Error::InvalidArgument("not a string map property".into())),
        }
    }

    fn map_float_prop(rec: &MeshMapRecord, prop: MapProperty) -> Result<f32> {
        match prop {
            MapProperty::Precision => Ok(rec.precision),
            MapProperty::Components => Ok(rec.components as f32),
            _ => Err(Error::InvalidArgument("not a float map property".into())),
        }
    }

    /// Reads a string-valued property of UV map `ordinal` (1-based).
    pub fn get_uv_map_string(&self, ordinal: u32, prop: MapProperty) -> Result<&str> {
        let rec = self
            .uv_maps
            .get(ordinal)
            .ok_or_else(|| Error::InvalidArgument(format!("no UV map with ordinal {ordinal}")))?;
        Self::map_string_prop(rec, prop)
    }

    /// Reads a float-valued property of UV map `ordinal` (1-based).
    pub fn get_uv_map_float(&self, ordinal: u32, prop: MapProperty) -> Result<f32> {
        let rec = self
            .uv_maps
            .get(ordinal)
            .ok_or_else(|| Error::InvalidArgument(format!("no UV map with ordinal {ordinal}")))?;
        Self::map_float_prop(rec, prop)
    }

    /// Reads a string-valued property of attribute map `ordinal` (1-based).
    pub fn get_attrib_map_string(&self, ordinal: u32, prop: MapProperty) -> Result<&str> {
        let rec = self
            .attrib_maps
            .get(ordinal)
            .ok_or_else(|| Error::InvalidArgument(format!("no attribute map with ordinal {ordinal}")))?;
        Self::map_string_prop(rec, prop)
    }

    /// Reads a float-valued property of attribute map `ordinal` (1-based),
    /// including its component count via [`MapProperty::Components`].
    pub fn get_attrib_map_float(&self, ordinal: u32, prop: MapProperty) -> Result<f32> {
        let rec = self
            .attrib_maps
            .get(ordinal)
            .ok_or_else(|| Error::InvalidArgument(format!("no attribute map with ordinal {ordinal}")))?;
        Self::map_float_prop(rec, prop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_export() -> Context<'static> {
        let mut ctx = Context::new(Mode::Export);
        ctx.configure_vertex_count(4).unwrap();
        ctx.configure_triangle_count(4).unwrap();
        ctx.configure_method(Method::Raw).unwrap();
        ctx
    }

    #[test]
    fn configure_outside_fresh_is_invalid_operation() {
        let mut ctx = make_export();
        ctx.state = State::MeshDone(1);
        assert!(matches!(
            ctx.configure_vertex_count(8),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn bind_array_rejects_wrong_component_count() {
        let mut ctx = make_export();
        let data = [0u8; 16];
        assert!(matches!(
            ctx.bind_array_export(BindTarget::Vertices, &data, 4, ElementKind::F32, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let mut ctx = make_export();
        ctx.close();
        ctx.close();
        assert_eq!(ctx.state, State::Closed);
    }

    #[test]
    fn tetra_raw_round_trip_through_context() {
        let indices: [i32; 12] = [0, 1, 2, 0, 1, 3, 0, 2, 3, 1, 2, 3];
        let vertices: [f32; 12] = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
        ];
        let index_bytes: Vec<u8> = indices.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let vertex_bytes: Vec<u8> = vertices.iter().flat_map(|v| v.to_ne_bytes()).collect();

        let mut ctx = make_export();
        ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::I32, 0)
            .unwrap();
        ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)
            .unwrap();

        let mut buf: Vec<u8> = Vec::new();
        {
            let mut write_cb = |b: &[u8]| {
                buf.extend_from_slice(b);
                b.len()
            };
            ctx.save_custom(&mut write_cb).unwrap();
        }
        assert!(buf.len() > 32 + 4 * 3 * 4 + 4 * 3 * 4);

        let data = buf;
        let mut cursor = 0usize;
        let mut import = Context::new(Mode::Import);
        {
            let mut read_cb = |out: &mut [u8]| {
                let n = out.len().min(data.len() - cursor);
                out[..n].copy_from_slice(&data[cursor..cursor + n]);
                cursor += n;
                n
            };
            import.open_read_custom(&mut read_cb).unwrap();
        }
        assert_eq!(import.get_integer(Property::VertexCount).unwrap(), 4);
        assert_eq!(import.get_integer(Property::TriangleCount).unwrap(), 4);

        let mut decoded_index_bytes = vec![0u8; 12 * 4];
        let mut decoded_vertex_bytes = vec![0u8; 12 * 4];
        import
            .bind_array_import(BindTarget::Indices, &mut decoded_index_bytes, 3, ElementKind::I32, 0)
            .unwrap();
        import
            .bind_array_import(BindTarget::Vertices, &mut decoded_vertex_bytes, 3, ElementKind::F32, 0)
            .unwrap();

        {
            let mut read_cb = |out: &mut [u8]| {
                let n = out.len().min(data.len() - cursor);
                out[..n].copy_from_slice(&data[cursor..cursor + n]);
                cursor += n;
                n
            };
            import.read_mesh(&mut read_cb).unwrap();
        }

        let decoded_indices: Vec<i32> = decoded_index_bytes
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        let decoded_vertices: Vec<f32> = decoded_vertex_bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(decoded_indices, indices);
        assert_eq!(decoded_vertices, vertices);
    }
}
