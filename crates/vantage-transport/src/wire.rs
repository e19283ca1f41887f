//! Tag/varint wire primitives.
//!
//! Every field is prefixed by a varint tag `(field_number << 3) | wire_type`.
//! Integers travel as base-128 varints, doubles as 8 little-endian bytes,
//! floats as 4, and nested messages, strings and byte blobs as a varint
//! length followed by the payload.

use thiserror::Error;

/// Errors raised while decoding a wire buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("unexpected end of buffer at offset {0}")]
    UnexpectedEof(usize),
    #[error("varint longer than 10 bytes at offset {0}")]
    VarintOverflow(usize),
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(u32),
}

/// Physical encoding of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            other => Err(WireError::UnsupportedWireType(other)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Writer
// ────────────────────────────────────────────────────────────────────────────

/// Append-only encoder.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_tag(&mut self, field: u32, wire_type: WireType) {
        self.write_varint(u64::from(field) << 3 | wire_type as u64);
    }

    pub fn varint_field(&mut self, field: u32, value: u64) {
        self.write_tag(field, WireType::Varint);
        self.write_varint(value);
    }

    pub fn double_field(&mut self, field: u32, value: f64) {
        self.write_tag(field, WireType::Fixed64);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn float_field(&mut self, field: u32, value: f32) {
        self.write_tag(field, WireType::Fixed32);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes_field(&mut self, field: u32, value: &[u8]) {
        self.write_tag(field, WireType::LengthDelimited);
        self.write_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    pub fn string_field(&mut self, field: u32, value: &str) {
        self.bytes_field(field, value.as_bytes());
    }

    /// Encode a nested message with `build` and emit it length-prefixed.
    pub fn message_field(&mut self, field: u32, build: impl FnOnce(&mut WireWriter)) {
        let mut nested = WireWriter::new();
        build(&mut nested);
        self.bytes_field(field, &nested.buf);
    }

    /// A repeated double written as one packed length-delimited field.
    pub fn packed_doubles_field(&mut self, field: u32, values: &[f64]) {
        let mut packed = Vec::with_capacity(values.len() * 8);
        for v in values {
            packed.extend_from_slice(&v.to_le_bytes());
        }
        self.bytes_field(field, &packed);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reader
// ────────────────────────────────────────────────────────────────────────────

/// Cursor over an encoded buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(WireError::UnexpectedEof(self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let start = self.pos;
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(WireError::UnexpectedEof(self.pos))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow(start))
    }

    /// Next `(field_number, wire_type)` pair.
    pub fn read_tag(&mut self) -> Result<(u32, WireType), WireError> {
        let tag = self.read_varint()?;
        let wire_type = WireType::try_from((tag & 0x7) as u8)?;
        Ok(((tag >> 3) as u32, wire_type))
    }

    pub fn read_double(&mut self) -> Result<f64, WireError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_float(&mut self) -> Result<f32, WireError> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(f32::from_le_bytes(raw))
    }

    /// Payload of a length-delimited field.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self, field: u32) -> Result<String, WireError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(field))
    }

    /// Packed repeated doubles.
    pub fn read_packed_doubles(&mut self) -> Result<Vec<f64>, WireError> {
        let mut nested = WireReader::new(self.read_bytes()?);
        let mut values = Vec::new();
        while !nested.is_empty() {
            values.push(nested.read_double()?);
        }
        Ok(values)
    }

    /// Discard the payload of a field this decoder does not know.
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), WireError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(|_| ()),
            WireType::Fixed64 => self.take(8).map(|_| ()),
            WireType::LengthDelimited => self.read_bytes().map(|_| ()),
            WireType::Fixed32 => self.take(4).map(|_| ()),
        }
    }
}
