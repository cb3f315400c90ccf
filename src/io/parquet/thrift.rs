//! # Thrift compact protocol
//!
//! Just enough of the compact protocol to write and read the Parquet footer and
//! page headers: structs, i32/i64 (zigzag varints), bools, binary/strings and
//! lists. Unknown fields are skipped on read, so footers written by other
//! producers parse as long as the fields used here are well formed.

use std::io;

use crate::enums::error::{InterchangeError, Result};

pub(crate) const T_BOOL_TRUE: u8 = 1;
pub(crate) const T_BOOL_FALSE: u8 = 2;
pub(crate) const T_BYTE: u8 = 3;
pub(crate) const T_I16: u8 = 4;
pub(crate) const T_I32: u8 = 5;
pub(crate) const T_I64: u8 = 6;
pub(crate) const T_DOUBLE: u8 = 7;
pub(crate) const T_BINARY: u8 = 8;
pub(crate) const T_LIST: u8 = 9;
pub(crate) const T_SET: u8 = 10;
pub(crate) const T_MAP: u8 = 11;
pub(crate) const T_STRUCT: u8 = 12;

const MAX_DEPTH: usize = 32;

fn malformed(msg: impl Into<String>) -> InterchangeError {
    InterchangeError::Io(io::Error::new(io::ErrorKind::InvalidData, msg.into()))
}

#[inline]
fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

// ---------------------------------------------------------------
// Writer
// ---------------------------------------------------------------

/// Appends compact-protocol values to a byte buffer.
#[derive(Debug, Default)]
pub(crate) struct CompactWriter {
    buf: Vec<u8>,
    last_field: i16,
    stack: Vec<i16>,
}

impl CompactWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    fn field_header(&mut self, id: i16, ty: u8) {
        let delta = id - self.last_field;
        if delta > 0 && delta <= 15 {
            self.buf.push(((delta as u8) << 4) | ty);
        } else {
            self.buf.push(ty);
            self.varint(zigzag(id as i64));
        }
        self.last_field = id;
    }

    pub fn struct_begin(&mut self) {
        self.stack.push(self.last_field);
        self.last_field = 0;
    }

    pub fn struct_end(&mut self) {
        self.buf.push(0);
        self.last_field = self.stack.pop().unwrap_or(0);
    }

    /// Begins a nested struct field; close it with [`CompactWriter::struct_end`].
    pub fn field_struct(&mut self, id: i16) {
        self.field_header(id, T_STRUCT);
        self.struct_begin();
    }

    pub fn field_i32(&mut self, id: i16, v: i32) {
        self.field_header(id, T_I32);
        self.varint(zigzag(v as i64));
    }

    pub fn field_i64(&mut self, id: i16, v: i64) {
        self.field_header(id, T_I64);
        self.varint(zigzag(v));
    }

    pub fn field_i8(&mut self, id: i16, v: i8) {
        self.field_header(id, T_BYTE);
        self.buf.push(v as u8);
    }

    pub fn field_bool(&mut self, id: i16, v: bool) {
        self.field_header(id, if v { T_BOOL_TRUE } else { T_BOOL_FALSE });
    }

    pub fn field_binary(&mut self, id: i16, v: &[u8]) {
        self.field_header(id, T_BINARY);
        self.binary(v);
    }

    pub fn field_string(&mut self, id: i16, v: &str) {
        self.field_binary(id, v.as_bytes());
    }

    /// Begins a list field of `len` elements of type `elem`.
    pub fn field_list(&mut self, id: i16, elem: u8, len: usize) {
        self.field_header(id, T_LIST);
        if len < 15 {
            self.buf.push(((len as u8) << 4) | elem);
        } else {
            self.buf.push(0xF0 | elem);
            self.varint(len as u64);
        }
    }

    /// List element of type i32.
    pub fn i32(&mut self, v: i32) {
        self.varint(zigzag(v as i64));
    }

    /// List element of type binary.
    pub fn binary(&mut self, v: &[u8]) {
        self.varint(v.len() as u64);
        self.buf.extend_from_slice(v);
    }

    pub fn string(&mut self, v: &str) {
        self.binary(v.as_bytes());
    }
}

// ---------------------------------------------------------------
// Reader
// ---------------------------------------------------------------

/// Cursor over compact-protocol bytes.
#[derive(Debug)]
pub(crate) struct CompactReader<'a> {
    buf: &'a [u8],
    pos: usize,
    last_field: i16,
    stack: Vec<i16>,
}

/// A field header: wire type and field id. Bool fields carry their value in `ty`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldHeader {
    pub ty: u8,
    pub id: i16,
}

impl FieldHeader {
    pub fn bool_value(&self) -> Result<bool> {
        match self.ty {
            T_BOOL_TRUE => Ok(true),
            T_BOOL_FALSE => Ok(false),
            t => Err(malformed(format!("field {} has type {t}, expected bool", self.id))),
        }
    }
}

impl<'a> CompactReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            last_field: 0,
            stack: Vec::new(),
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| malformed("thrift data truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64> {
        let mut out = 0u64;
        for shift in (0..64).step_by(7) {
            let b = self.byte()?;
            out |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(out);
            }
        }
        Err(malformed("varint too long"))
    }

    pub fn struct_begin(&mut self) -> Result<()> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(malformed("thrift nesting too deep"));
        }
        self.stack.push(self.last_field);
        self.last_field = 0;
        Ok(())
    }

    pub fn struct_end(&mut self) {
        self.last_field = self.stack.pop().unwrap_or(0);
    }

    /// Next field header, or `None` at the struct's stop byte.
    pub fn field(&mut self) -> Result<Option<FieldHeader>> {
        let b = self.byte()?;
        if b == 0 {
            return Ok(None);
        }
        let ty = b & 0x0f;
        let delta = (b >> 4) as i16;
        let id = if delta == 0 {
            i16::try_from(unzigzag(self.varint()?)).map_err(|_| malformed("field id out of range"))?
        } else {
            self.last_field
                .checked_add(delta)
                .ok_or_else(|| malformed("field id out of range"))?
        };
        self.last_field = id;
        Ok(Some(FieldHeader { ty, id }))
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.byte()? as i8)
    }

    pub fn i32(&mut self) -> Result<i32> {
        i32::try_from(unzigzag(self.varint()?)).map_err(|_| malformed("i32 out of range"))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(unzigzag(self.varint()?))
    }

    pub fn binary(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.varint()?).map_err(|_| malformed("binary too long"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|e| *e <= self.buf.len())
            .ok_or_else(|| malformed("binary runs past the end of the data"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn string(&mut self) -> Result<String> {
        String::from_utf8(self.binary()?.to_vec()).map_err(|_| malformed("string is not UTF-8"))
    }

    /// List header: element type and length.
    pub fn list(&mut self) -> Result<(u8, usize)> {
        let b = self.byte()?;
        let elem = b & 0x0f;
        let len = match b >> 4 {
            15 => usize::try_from(self.varint()?).map_err(|_| malformed("list too long"))?,
            n => n as usize,
        };
        if len > self.buf.len() - self.pos && elem != T_BOOL_TRUE && elem != T_BOOL_FALSE {
            return Err(malformed("list longer than the remaining data"));
        }
        Ok((elem, len))
    }

    /// Skips a value of wire type `ty`.
    pub fn skip(&mut self, ty: u8) -> Result<()> {
        self.skip_depth(ty, 0)
    }

    fn skip_depth(&mut self, ty: u8, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(malformed("thrift nesting too deep"));
        }
        match ty {
            T_BOOL_TRUE | T_BOOL_FALSE => Ok(()),
            T_BYTE => self.byte().map(|_| ()),
            T_I16 | T_I32 | T_I64 => self.varint().map(|_| ()),
            T_DOUBLE => {
                for _ in 0..8 {
                    self.byte()?;
                }
                Ok(())
            }
            T_BINARY => self.binary().map(|_| ()),
            T_LIST | T_SET => {
                let (elem, len) = self.list()?;
                for _ in 0..len {
                    if elem == T_BOOL_TRUE || elem == T_BOOL_FALSE {
                        self.byte()?;
                    } else {
                        self.skip_depth(elem, depth + 1)?;
                    }
                }
                Ok(())
            }
            T_MAP => {
                let len = usize::try_from(self.varint()?).map_err(|_| malformed("map too long"))?;
                if len == 0 {
                    return Ok(());
                }
                let kv = self.byte()?;
                for _ in 0..len {
                    self.skip_depth(kv >> 4, depth + 1)?;
                    self.skip_depth(kv & 0x0f, depth + 1)?;
                }
                Ok(())
            }
            T_STRUCT => {
                self.struct_begin()?;
                while let Some(f) = self.field()? {
                    self.skip_depth(f.ty, depth + 1)?;
                }
                self.struct_end();
                Ok(())
            }
            other => Err(malformed(format!("unknown thrift type {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_round_trip() {
        for v in [0i64, 1, -1, 63, -64, i32::MAX as i64, i64::MIN, i64::MAX] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn nested_structs_and_skipping() {
        let mut w = CompactWriter::new();
        w.struct_begin();
        w.field_i32(1, -7);
        w.field_struct(3);
        w.field_string(1, "inner");
        w.field_bool(2, true);
        w.struct_end();
        // Long delta forces the explicit id form.
        w.field_i64(40, 1 << 40);
        w.field_list(41, T_BINARY, 2);
        w.string("a");
        w.string("bc");
        w.struct_end();
        let bytes = w.into_inner();

        let mut r = CompactReader::new(&bytes);
        r.struct_begin().unwrap();
        let f = r.field().unwrap().unwrap();
        assert_eq!((f.id, f.ty), (1, T_I32));
        assert_eq!(r.i32().unwrap(), -7);
        let f = r.field().unwrap().unwrap();
        assert_eq!(f.id, 3);
        r.skip(f.ty).unwrap();
        let f = r.field().unwrap().unwrap();
        assert_eq!(f.id, 40);
        assert_eq!(r.i64().unwrap(), 1 << 40);
        let f = r.field().unwrap().unwrap();
        assert_eq!(f.id, 41);
        let (elem, len) = r.list().unwrap();
        assert_eq!((elem, len), (T_BINARY, 2));
        assert_eq!(r.string().unwrap(), "a");
        assert_eq!(r.string().unwrap(), "bc");
        assert!(r.field().unwrap().is_none());
        r.struct_end();
        assert_eq!(r.position(), bytes.len());
    }

    #[test]
    fn truncated_input_errors() {
        let mut w = CompactWriter::new();
        w.struct_begin();
        w.field_string(1, "hello");
        w.struct_end();
        let bytes = w.into_inner();
        let mut r = CompactReader::new(&bytes[..4]);
        r.struct_begin().unwrap();
        let f = r.field().unwrap().unwrap();
        assert_eq!(f.ty, T_BINARY);
        assert!(r.string().is_err());
    }
}
