//! The three compression pipelines (RAW, MG1, MG2) behind one strategy
//! interface, per the "fallthrough through switch on method" redesign note
//! in the specification.

pub mod mg1;
pub mod mg2;
pub mod raw;

use crate::error::Result;
use crate::mesh::{FrameData, MeshShape};
use crate::stream::{StreamReader, StreamWriter};

/// Precision knobs and the compression level, threaded through every
/// pipeline call. `uv_precisions`/`attrib_precisions` are indexed the same
/// way as `MeshShape::uv_components`/`attrib_components` (one entry per map,
/// in ordinal order).
#[derive(Debug, Clone)]
pub struct CodecParams {
    pub level: u32,
    pub vertex_precision: f32,
    pub normal_precision: f32,
    pub uv_precisions: Vec<f32>,
    pub attrib_precisions: Vec<f32>,
}

/// A compression method's full encode/decode surface: mesh (frame 0, which
/// also carries the index buffer) and subsequent frames.
pub trait Pipeline {
    /// Encodes the index buffer and frame 0.
    fn encode_mesh(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<Vec<u32>>;

    /// Encodes frame `k >= 1`. `indices` are the (possibly reordered, for
    /// MG2) indices established by `encode_mesh`, needed by MG2's
    /// topology-driven traversal.
    fn encode_frame(
        &self,
        writer: &mut StreamWriter,
        shape: &MeshShape,
        indices: &[u32],
        frame: &FrameData,
        params: &CodecParams,
    ) -> Result<()>;

    /// Decodes the index buffer and frame 0. Returns the indices as stored
    /// on disk (reordered for MG1/MG2; the caller's array ends up holding
    /// this order, per spec).
    fn decode_mesh(
        &self,
        reader: &mut StreamReader,
        shape: &MeshShape,
        params: &CodecParams,
    ) -> Result<(Vec<u32>, FrameData)>;

    /// Decodes frame `k >= 1` using the indices already recovered by
    /// `decode_mesh`.
    fn decode_frame(
        &self,
        reader: &mut StreamReader,
        shape: &MeshShape,
        indices: &[u32],
        params: &CodecParams,
    ) -> Result<FrameData>;
}

/// The compression profile selected on a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Raw,
    Mg1,
    Mg2,
}

impl Method {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Method::Raw => *b"RAW\0",
            Method::Mg1 => *b"MG1\0",
            Method::Mg2 => *b"MG2\0",
        }
    }

    pub fn from_fourcc(tag: &[u8; 4]) -> Option<Self> {
        match tag {
            b"RAW\0" => Some(Method::Raw),
            b"MG1\0" => Some(Method::Mg1),
            b"MG2\0" => Some(Method::Mg2),
            _ => None,
        }
    }

    pub fn pipeline(self) -> &'static dyn Pipeline {
        match self {
            Method::Raw => &raw::RawPipeline,
            Method::Mg1 => &mg1::Mg1Pipeline,
            Method::Mg2 => &mg2::Mg2Pipeline,
        }
    }
}
