//! Typed slot values and their in-tuple encoding.

use crate::{SlotType, Timestamp};

/// A non-null slot value, borrowing variable-length data from wherever the
/// tuple's heaps live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    String(&'a [u8]),
    Binary(&'a [u8]),
    Timestamp(Timestamp),
}

impl<'a> Value<'a> {
    pub fn slot_type(&self) -> SlotType {
        match self {
            Self::Boolean(_) => SlotType::Boolean,
            Self::TinyInt(_) => SlotType::TinyInt,
            Self::SmallInt(_) => SlotType::SmallInt,
            Self::Int(_) => SlotType::Int,
            Self::BigInt(_) => SlotType::BigInt,
            Self::Float(_) => SlotType::Float,
            Self::Double(_) => SlotType::Double,
            Self::String(_) => SlotType::String,
            Self::Binary(_) => SlotType::Binary,
            Self::Timestamp(_) => SlotType::Timestamp,
        }
    }

    /// String contents, if this is a string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Self::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Out-of-line bytes of a string or binary value.
    pub fn var_len_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Self::String(bytes) | Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Self::String(s.as_bytes())
    }
}

impl From<i32> for Value<'_> {
    fn from(n: i32) -> Self {
        Self::Int(n)
    }
}

impl From<i64> for Value<'_> {
    fn from(n: i64) -> Self {
        Self::BigInt(n)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Timestamp> for Value<'_> {
    fn from(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }
}

/// Location of variable-length bytes: heap index, offset, length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeapRef {
    pub heap: u32,
    pub offset: u32,
    pub len: u32,
}

impl HeapRef {
    pub(crate) fn write(self, dst: &mut [u8]) {
        dst[0..4].copy_from_slice(&self.heap.to_le_bytes());
        dst[4..8].copy_from_slice(&self.offset.to_le_bytes());
        dst[8..12].copy_from_slice(&self.len.to_le_bytes());
    }

    pub(crate) fn read(src: &[u8]) -> Option<Self> {
        Some(Self {
            heap: u32::from_le_bytes(src.get(0..4)?.try_into().ok()?),
            offset: u32::from_le_bytes(src.get(4..8)?.try_into().ok()?),
            len: u32::from_le_bytes(src.get(8..12)?.try_into().ok()?),
        })
    }
}

/// Write a fixed-width value into its slot bytes. `dst` is exactly the
/// slot's size; variable-length values are written by the caller as a
/// [`HeapRef`].
pub(crate) fn encode_fixed(value: &Value<'_>, dst: &mut [u8]) {
    match *value {
        Value::Boolean(b) => dst[0] = u8::from(b),
        Value::TinyInt(n) => dst.copy_from_slice(&n.to_le_bytes()),
        Value::SmallInt(n) => dst.copy_from_slice(&n.to_le_bytes()),
        Value::Int(n) => dst.copy_from_slice(&n.to_le_bytes()),
        Value::BigInt(n) => dst.copy_from_slice(&n.to_le_bytes()),
        Value::Float(n) => dst.copy_from_slice(&n.to_le_bytes()),
        Value::Double(n) => dst.copy_from_slice(&n.to_le_bytes()),
        Value::Timestamp(ts) => {
            let (nanos, day) = ts.to_parts();
            dst[0..8].copy_from_slice(&nanos.to_le_bytes());
            dst[8..12].copy_from_slice(&day.to_le_bytes());
            dst[12..16].fill(0);
        },
        Value::String(_) | Value::Binary(_) => {},
    }
}

/// Read a value of type `ty` from its slot bytes, resolving heap references
/// through `resolve`.
pub(crate) fn decode<'a>(ty: SlotType, src: &[u8], resolve: impl FnOnce(HeapRef) -> Option<&'a [u8]>) -> Option<Value<'a>> {
    Some(match ty {
        SlotType::Boolean => Value::Boolean(*src.first()? != 0),
        SlotType::TinyInt => Value::TinyInt(i8::from_le_bytes(src.get(..1)?.try_into().ok()?)),
        SlotType::SmallInt => Value::SmallInt(i16::from_le_bytes(src.get(..2)?.try_into().ok()?)),
        SlotType::Int => Value::Int(i32::from_le_bytes(src.get(..4)?.try_into().ok()?)),
        SlotType::BigInt => Value::BigInt(i64::from_le_bytes(src.get(..8)?.try_into().ok()?)),
        SlotType::Float => Value::Float(f32::from_le_bytes(src.get(..4)?.try_into().ok()?)),
        SlotType::Double => Value::Double(f64::from_le_bytes(src.get(..8)?.try_into().ok()?)),
        SlotType::Timestamp => {
            let nanos = i64::from_le_bytes(src.get(0..8)?.try_into().ok()?);
            let day = i32::from_le_bytes(src.get(8..12)?.try_into().ok()?);
            Value::Timestamp(Timestamp::from_parts(nanos, day)?)
        },
        SlotType::String => Value::String(resolve(HeapRef::read(src)?)?),
        SlotType::Binary => Value::Binary(resolve(HeapRef::read(src)?)?),
    })
}
