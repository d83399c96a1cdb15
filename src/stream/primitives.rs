//! Fixed-width stream primitives (component B).
//!
//! All multi-byte integers on disk are little-endian. Per spec, 32-bit
//! values are written as four single-byte writes rather than one bulk write
//! of `to_le_bytes()` — the effect is identical, but this mirrors the
//! reference implementation's actual field-by-field approach closely enough
//! that a byte-for-byte trace of the write callback looks the same.

use crate::error::{Error, Result};

/// Caller-supplied read callback: fills `buf`, returns the number of bytes
/// actually read. Fewer than `buf.len()` signals EOF/error upstream.
pub trait ReadCallback {
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<F: FnMut(&mut [u8]) -> usize> ReadCallback for F {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self(buf)
    }
}

/// Caller-supplied write callback: returns the number of bytes actually
/// written. Fewer than `buf.len()` is an error.
pub trait WriteCallback {
    fn write(&mut self, buf: &[u8]) -> usize;
}

impl<F: FnMut(&[u8]) -> usize> WriteCallback for F {
    fn write(&mut self, buf: &[u8]) -> usize {
        self(buf)
    }
}

/// Reads big-picture stream primitives off a caller-supplied [`ReadCallback`].
pub struct StreamReader<'a> {
    callback: &'a mut dyn ReadCallback,
}

impl<'a> StreamReader<'a> {
    pub fn new(callback: &'a mut dyn ReadCallback) -> Self {
        StreamReader { callback }
    }

    /// Reads exactly `buf.len()` bytes or fails with `FileError`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let got = self.callback.read(buf);
        if got != buf.len() {
            return Err(Error::FileError(format!(
                "short read: expected {} bytes, got {got}",
                buf.len()
            )));
        }
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a 4-byte FourCC tag verbatim (source-order ASCII bytes).
    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Expects `tag` next; fails with `BadFormat` on mismatch.
    pub fn expect_fourcc(&mut self, tag: &[u8; 4]) -> Result<()> {
        let got = self.read_fourcc()?;
        if &got != tag {
            return Err(Error::BadFormat(format!(
                "expected tag {:?}, found {:?}",
                String::from_utf8_lossy(tag),
                String::from_utf8_lossy(&got)
            )));
        }
        Ok(())
    }

    /// Reads a `u32` length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::BadFormat(format!("string is not valid UTF-8: {e}")))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

/// Writes big-picture stream primitives to a caller-supplied [`WriteCallback`].
pub struct StreamWriter<'a> {
    callback: &'a mut dyn WriteCallback,
}

impl<'a> StreamWriter<'a> {
    pub fn new(callback: &'a mut dyn WriteCallback) -> Self {
        StreamWriter { callback }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let wrote = self.callback.write(buf);
        if wrote != buf.len() {
            return Err(Error::FileError(format!(
                "short write: expected {} bytes, wrote {wrote}",
                buf.len()
            )));
        }
        Ok(())
    }

    /// Writes `value` little-endian as four single-byte writes.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        for shift in [0, 8, 16, 24] {
            let byte = [(value >> shift) as u8];
            self.write_all(&byte)?;
        }
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_fourcc(&mut self, tag: &[u8; 4]) -> Result<()> {
        self.write_all(tag)
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_u32(s.len() as u32)?;
        self.write_all(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u32_and_string() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut writer = StreamWriter::new(&mut |b: &[u8]| {
                buf.extend_from_slice(b);
                b.len()
            });
            writer.write_u32(0xDEADBEEF).unwrap();
            writer.write_string("héllo").unwrap();
        }

        let mut cursor = 0usize;
        let data = buf.clone();
        let mut reader = StreamReader::new(&mut |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        });
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_string().unwrap(), "héllo");
    }

    #[test]
    fn short_read_is_file_error() {
        let data = [1u8, 2];
        let mut cursor = 0usize;
        let mut reader = StreamReader::new(&mut |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        });
        assert!(matches!(reader.read_u32(), Err(Error::FileError(_))));
    }

    #[test]
    fn fourcc_mismatch_is_bad_format() {
        let data = *b"WXYZ";
        let mut cursor = 0usize;
        let mut reader = StreamReader::new(&mut |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        });
        assert!(matches!(
            reader.expect_fourcc(b"INDX"),
            Err(Error::BadFormat(_))
        ));
    }
}
