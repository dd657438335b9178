//! Big-endian field access and 4-byte alignment rules shared by every frame body.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{FrameError, Result};
use crate::timestamp::{format_timestamp, parse_timestamp, TIMESTAMP_LEN};

/// Word size every variable-length field is padded to.
pub const ALIGNMENT: usize = 4;

/// Smallest multiple of `align` that is `>= len`.
pub fn padded_len(len: usize, align: usize) -> usize {
    if align == 0 {
        return len;
    }
    len.div_ceil(align) * align
}

/// Number of zero bytes appended to `len` bytes of content to reach alignment.
pub fn padding_len(len: usize, align: usize) -> usize {
    padded_len(len, align) - len
}

/// Content bytes occupying the final alignment word of a `len`-byte field.
///
/// `unpadded_len(5, 4) == 1`, `unpadded_len(8, 4) == 4`, `unpadded_len(0, 4) == 0`.
pub fn unpadded_len(len: usize, align: usize) -> usize {
    if len == 0 || align == 0 {
        return len;
    }
    (len - 1) % align + 1
}

/// Sequential big-endian reader over a frame body.
///
/// Every accessor fails with [`FrameError::MalformedField`] instead of
/// panicking when the body is too short.
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
    pos: usize,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, len: usize, field: &'static str) -> Result<Bytes> {
        if len > self.remaining() {
            return Err(FrameError::malformed(
                field,
                format!("needs {len} bytes, {} remaining", self.remaining()),
            ));
        }
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize, field: &'static str) -> Result<()> {
        self.take(len, field).map(|_| ())
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N]> {
        let bytes = self.take(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    pub fn get_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.array::<1>(field)?[0])
    }

    pub fn get_i16(&mut self, field: &'static str) -> Result<i16> {
        Ok(i16::from_be_bytes(self.array(field)?))
    }

    pub fn get_u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array(field)?))
    }

    pub fn get_i32(&mut self, field: &'static str) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array(field)?))
    }

    pub fn get_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array(field)?))
    }

    pub fn get_u64(&mut self, field: &'static str) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array(field)?))
    }

    pub fn get_f32(&mut self, field: &'static str) -> Result<f32> {
        Ok(f32::from_be_bytes(self.array(field)?))
    }

    /// Read an `i32` length or count that must not be negative.
    pub fn get_len(&mut self, field: &'static str) -> Result<usize> {
        let value = self.get_i32(field)?;
        usize::try_from(value)
            .map_err(|_| FrameError::malformed(field, format!("negative value {value}")))
    }

    /// Look at the next `i32` without consuming it.
    pub fn peek_i32(&self) -> Option<i32> {
        let end = self.pos.checked_add(4)?;
        let bytes = self.buf.get(self.pos..end)?;
        Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a fixed-width string field, dropping NUL padding and surrounding whitespace.
    pub fn get_string(&mut self, len: usize, field: &'static str) -> Result<String> {
        let bytes = self.take(len, field)?;
        Ok(clean_string(&bytes))
    }

    /// Read `size` content bytes followed by padding to the next word boundary.
    pub fn get_padded_bytes(&mut self, size: usize, field: &'static str) -> Result<Bytes> {
        let padded = self.take(padded_len(size, ALIGNMENT), field)?;
        Ok(padded.slice(..size))
    }

    pub fn get_padded_string(&mut self, size: usize, field: &'static str) -> Result<String> {
        let bytes = self.get_padded_bytes(size, field)?;
        Ok(clean_string(&bytes))
    }

    pub fn get_timestamp(&mut self, field: &'static str) -> Result<DateTime<Utc>> {
        let text = self.get_string(TIMESTAMP_LEN, field)?;
        parse_timestamp(&text)
    }

    /// Fail unless the whole body was consumed.
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(FrameError::TrailerOffsetMismatch {
                declared: self.buf.len() as i64,
                actual: self.pos as i64,
            });
        }
        Ok(())
    }
}

fn clean_string(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.replace('\0', "").trim().to_string()
}

/// Write `value` into a `width`-byte field, NUL-padded on the right.
pub fn put_fixed_str(
    dst: &mut BytesMut,
    value: &str,
    width: usize,
    field: &'static str,
) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(FrameError::malformed(
            field,
            format!("'{value}' exceeds {width} bytes"),
        ));
    }
    dst.put_slice(bytes);
    dst.put_bytes(0, width - bytes.len());
    Ok(())
}

/// Write `data` followed by zero padding to the next word boundary.
pub fn put_padded(dst: &mut BytesMut, data: &[u8]) {
    dst.put_slice(data);
    dst.put_bytes(0, padding_len(data.len(), ALIGNMENT));
}

/// Write an `i32` length prefix, rejecting lengths that do not fit.
pub fn put_len(dst: &mut BytesMut, len: usize, field: &'static str) -> Result<()> {
    let value = i32::try_from(len)
        .map_err(|_| FrameError::malformed(field, format!("length {len} exceeds i32")))?;
    dst.put_i32(value);
    Ok(())
}

pub fn put_timestamp(dst: &mut BytesMut, value: &DateTime<Utc>, field: &'static str) -> Result<()> {
    let text = format_timestamp(value)?;
    put_fixed_str(dst, &text, TIMESTAMP_LEN, field)
}
