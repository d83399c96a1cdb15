//! Wire-level stream primitives and the packed int/float coder.

pub mod packed;
pub mod primitives;

pub use primitives::{ReadCallback, StreamReader, StreamWriter, WriteCallback};
