//! # octm — Compact Binary Mesh Container
//!
//! A compact binary container format for triangle meshes: per-vertex
//! positions, optional normals, named UV maps, named custom attribute maps,
//! and an optional animation timeline of vertex positions over time. Three
//! compression profiles trade off simplicity against size:
//!
//! - **RAW** — verbatim, bit-exact serialization.
//! - **MG1** — lossless triangle reordering and delta coding of the index
//!   buffer, plus byte-plane packed arrays.
//! - **MG2** — quantized, topology-predictive: vertices are relabeled by a
//!   breadth-first traversal of the triangle mesh, positions are delta-coded
//!   against a regular grid, and normals are predicted from a smooth
//!   per-vertex basis.
//!
//! ## Quick Start
//!
//! ```ignore
//! use octm::container::{Context, Mode, BindTarget};
//! use octm::array_view::ElementKind;
//! use octm::pipelines::Method;
//!
//! let mut ctx = Context::new(Mode::Export);
//! ctx.configure_vertex_count(4)?;
//! ctx.configure_triangle_count(4)?;
//! ctx.configure_method(Method::Raw)?;
//! ctx.bind_array_export(BindTarget::Indices, &index_bytes, 3, ElementKind::I32, 0)?;
//! ctx.bind_array_export(BindTarget::Vertices, &vertex_bytes, 3, ElementKind::F32, 0)?;
//! ctx.save_custom(&mut |b: &[u8]| { out.extend_from_slice(b); b.len() })?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! octm/
//! ├── array_view     Typed, non-owning view over caller-owned buffers (A)
//! ├── stream          Little-endian wire primitives + packed int/float coder (B, C)
//! ├── compressor      Black-box byte compressor binding (flate2) (K)
//! ├── mesh            Plain owned mesh/frame data shared by the pipelines
//! ├── mesh_map        UV / attribute map records
//! ├── pipelines       RAW, MG1, MG2 encode/decode strategies (D, E, F)
//! ├── legacy_v5       Upgrades on-disk v5 meshes to the v6 in-memory shape (H)
//! ├── integrity       Pre-write / post-read mesh validation
//! ├── error           The closed `Error` enum (I)
//! └── container       `Context`: lifecycle, header I/O, per-frame orchestration (G)
//! ```
//!
//! The on-disk format, state machine, and error model are described in full
//! in this crate's design documentation; [`container::Context`] is the entry
//! point for both reading and writing files.

pub mod array_view;
pub mod compressor;
pub mod container;
pub mod error;
pub mod integrity;
pub mod legacy_v5;
pub mod mesh;
pub mod mesh_map;
pub mod pipelines;
pub mod stream;

pub use container::{BindTarget, Context, MapProperty, Mode, Property};
pub use error::{Error, Result};
pub use pipelines::Method;
