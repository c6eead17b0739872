//! Little-endian cursor over pattern and timezone blobs.

use crate::error::DecodeError;

type ReadResult<T> = std::result::Result<T, DecodeError>;

/// Bounds-checked reader. Every read names what it was reading so a short
/// blob reports where it ran out.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, n: usize, context: &'static str) -> ReadResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                context,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize, context: &'static str) -> ReadResult<()> {
        self.take(n, context).map(|_| ())
    }

    pub fn read_u16(&mut self, context: &'static str) -> ReadResult<u16> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self, context: &'static str) -> ReadResult<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self, context: &'static str) -> ReadResult<i32> {
        let b = self.take(4, context)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Ensure `count` fixed-size items of `width` bytes are present before
    /// looping over a declared count.
    pub fn require(&self, count: usize, width: usize, context: &'static str) -> ReadResult<()> {
        let needed = count.saturating_mul(width);
        if needed > self.remaining() {
            return Err(DecodeError::Truncated {
                context,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Growable little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
