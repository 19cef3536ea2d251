//! Bounds-checked cursor over a byte buffer.
//!
//! Every read either returns the requested value and advances past it, or
//! fails with [`BufferTooShort`] and leaves the cursor where it was.
//! Multi-byte integers are little-endian unless the method name says otherwise.

use thiserror::Error;

/// A read needed more bytes than the buffer had left.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("buffer too short: needed {needed} bytes, {remaining} remaining")]
pub struct BufferTooShort {
    pub needed: usize,
    pub remaining: usize,
}

/// A borrowing cursor over an immutable byte slice.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The unread bytes, without consuming them.
    pub fn as_slice(&self) -> &'a [u8] {
        self.buf
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.buf.first().copied()
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], BufferTooShort> {
        if n > self.buf.len() {
            return Err(BufferTooShort {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferTooShort> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferTooShort> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, BufferTooShort> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, BufferTooShort> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i32_be(&mut self) -> Result<i32, BufferTooShort> {
        self.read_array().map(i32::from_be_bytes)
    }

    /// Read a little-endian `u32` and reinterpret its bit pattern as an IEEE-754 `f32`.
    pub fn read_f32_bits_le(&mut self) -> Result<f32, BufferTooShort> {
        self.read_u32_le().map(f32::from_bits)
    }

    /// Read a one-byte length followed by that many bytes.
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8], BufferTooShort> {
        let mut lookahead = *self;
        let len = lookahead.read_u8()?;
        let bytes = lookahead.take(usize::from(len))?;
        *self = lookahead;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), BufferTooShort> {
        self.take(n).map(|_| ())
    }

    /// Skip up to `n` bytes, stopping at the end of the buffer.
    pub fn skip_clamped(&mut self, n: usize) {
        self.buf = self.buf.get(n..).unwrap_or_default();
    }

    /// Skip a run of bytes matching `pred`, returning how many were skipped.
    pub fn skip_while(&mut self, pred: impl Fn(u8) -> bool) -> usize {
        let n = self.buf.iter().take_while(|&&b| pred(b)).count();
        self.buf = &self.buf[n..];
        n
    }
}
