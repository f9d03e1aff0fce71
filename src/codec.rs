//! Typed reads and writes at byte offsets.

use crate::arch::{ArchitectureProfile, WordSize};
use crate::error::DecodeError;
use crate::layout::{FieldKind, FieldLayout, FieldSpec};
use crate::memory::Region;
use crate::prelude::*;

/// Name yielded for a wide string that decodes to nothing.
pub const UNKNOWN_NAME: &str = "[unknown]";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U16(u16),
    U32(u32),
    Pointer(u64),
    F32(f32),
    F64(f64),
    Text(String),
}

impl Value {
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<u64> {
        match self {
            Value::Pointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::Pointer(_) => "pointer",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Text(_) => "text",
        }
    }
}

/// Reads and writes [`FieldKind`]s in native byte order for one word size.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    word: WordSize,
}

impl Codec {
    pub fn new(profile: ArchitectureProfile) -> Self {
        Self {
            word: profile.word(),
        }
    }

    pub fn get<R: Region + ?Sized>(
        &self,
        region: &R,
        offset: usize,
        kind: FieldKind,
    ) -> Result<Value> {
        let value = match kind {
            FieldKind::U16 => Value::U16(u16::from_ne_bytes(read_array(region, offset)?)),
            FieldKind::U32 => Value::U32(u32::from_ne_bytes(read_array(region, offset)?)),
            FieldKind::F32 => Value::F32(f32::from_ne_bytes(read_array(region, offset)?)),
            FieldKind::F64 => Value::F64(f64::from_ne_bytes(read_array(region, offset)?)),
            FieldKind::Pointer => Value::Pointer(self.read_pointer(region, offset)?),
            FieldKind::WideStringFixed(units) => {
                Value::Text(self.read_wide_string(region, offset, units)?)
            }
        };
        Ok(value)
    }

    /// Writes `value` at `offset`. The only bound enforced is the region's declared size.
    pub fn put<R: Region + ?Sized>(
        &self,
        region: &mut R,
        offset: usize,
        kind: FieldKind,
        value: &Value,
    ) -> Result<()> {
        match (kind, value) {
            (FieldKind::U16, Value::U16(v)) => region.write_at(offset, &v.to_ne_bytes()),
            (FieldKind::U32, Value::U32(v)) => region.write_at(offset, &v.to_ne_bytes()),
            (FieldKind::F32, Value::F32(v)) => region.write_at(offset, &v.to_ne_bytes()),
            (FieldKind::F64, Value::F64(v)) => region.write_at(offset, &v.to_ne_bytes()),
            (FieldKind::Pointer, Value::Pointer(v)) => match self.word {
                WordSize::Four => {
                    let narrow = u32::try_from(*v).map_err(|_| Error::InvalidValue {
                        kind,
                        reason: format!("0x{v:x} does not fit in a 4 byte word"),
                    })?;
                    region.write_at(offset, &narrow.to_ne_bytes())
                }
                WordSize::Eight => region.write_at(offset, &v.to_ne_bytes()),
            },
            (FieldKind::WideStringFixed(units), Value::Text(text)) => {
                write_wide_string(region, offset, units, text)
            }
            (kind, value) => Err(Error::InvalidValue {
                kind,
                reason: format!("cannot store a {} value", value.type_name()),
            }),
        }
    }

    pub fn read_u16<R: Region + ?Sized>(&self, region: &R, offset: usize) -> Result<u16> {
        Ok(u16::from_ne_bytes(read_array(region, offset)?))
    }

    pub fn read_u32<R: Region + ?Sized>(&self, region: &R, offset: usize) -> Result<u32> {
        Ok(u32::from_ne_bytes(read_array(region, offset)?))
    }

    pub fn read_pointer<R: Region + ?Sized>(&self, region: &R, offset: usize) -> Result<u64> {
        match self.word {
            WordSize::Four => Ok(u32::from_ne_bytes(read_array(region, offset)?).into()),
            WordSize::Eight => Ok(u64::from_ne_bytes(read_array(region, offset)?)),
        }
    }

    pub fn write_u32<R: Region + ?Sized>(
        &self,
        region: &mut R,
        offset: usize,
        value: u32,
    ) -> Result<()> {
        region.write_at(offset, &value.to_ne_bytes())
    }

    pub fn write_pointer<R: Region + ?Sized>(
        &self,
        region: &mut R,
        offset: usize,
        value: u64,
    ) -> Result<()> {
        self.put(region, offset, FieldKind::Pointer, &Value::Pointer(value))
    }

    /// Decodes up to `units` UTF-16 code units, stopping at the first zero unit.
    ///
    /// Surrounding whitespace is trimmed and an empty result becomes [`UNKNOWN_NAME`].
    /// Unpaired surrogates are reported as a [`DecodeError`].
    pub fn read_wide_string<R: Region + ?Sized>(
        &self,
        region: &R,
        offset: usize,
        units: usize,
    ) -> Result<String> {
        let mut bytes = vec![0u8; units * 2];
        region.read_at(offset, &mut bytes)?;

        let code_units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .take_while(|unit| *unit != 0)
            .collect::<Vec<_>>();

        let text = String::from_utf16(&code_units).map_err(|e| DecodeError {
            offset,
            reason: e.to_string(),
        })?;
        let text = text.replace('\0', "");
        let text = text.trim();
        if text.is_empty() {
            trace!("Wide string at offset {offset} is empty");
            return Ok(UNKNOWN_NAME.to_string());
        }
        Ok(text.to_string())
    }

    pub fn read_field<R: Region + ?Sized>(&self, region: &R, field: &FieldSpec) -> Result<Value> {
        self.get(region, field.offset, field.kind)
    }

    pub fn write_field<R: Region + ?Sized>(
        &self,
        region: &mut R,
        field: &FieldSpec,
        value: &Value,
    ) -> Result<()> {
        self.put(region, field.offset, field.kind, value)
    }

    /// Writes zero to every field of `layout`, one field at a time.
    pub fn zero_fields<R: Region + ?Sized>(
        &self,
        region: &mut R,
        layout: &FieldLayout,
    ) -> Result<()> {
        for field in layout.fields {
            region.write_at(field.offset, &vec![0u8; field.size])?;
        }
        Ok(())
    }
}

fn read_array<const N: usize, R: Region + ?Sized>(region: &R, offset: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    region.read_at(offset, &mut out)?;
    Ok(out)
}

fn write_wide_string<R: Region + ?Sized>(
    region: &mut R,
    offset: usize,
    units: usize,
    text: &str,
) -> Result<()> {
    if units == 0 {
        return Ok(());
    }
    // Keep room for the terminator.
    let encoded = text.encode_utf16().take(units - 1).collect::<Vec<_>>();
    let mut bytes = vec![0u8; units * 2];
    for (i, unit) in encoded.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&unit.to_ne_bytes());
    }
    region.write_at(offset, &bytes)
}
