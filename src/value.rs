//! Property value encoding and decoding
//!
//! Property values are a closed tagged union over nine kinds. The write path
//! works with the owned [`PropertyValue`] enum; the read path hands out
//! borrowed [`Value`] views that decode the payload on demand.
//!
//! # Format
//!
//! A stored value is a [`ValueHeader`](crate::schema::ValueHeader) (kind tag
//! and payload byte length) immediately followed by the payload: fixed-width
//! little-endian for the numeric kinds, one byte 0/1 for booleans, raw UTF-8
//! of the declared length for strings (no terminator), raw bytes as-is.

use crate::buffer::Buffer;
use crate::error::{GraphError, Result};
use crate::schema::{ValueHeader, ValueKind};

/// Owned property value for the write path
///
/// This enum mirrors the nine on-disk value kinds one to one. It converts to
/// and from JSON; deserialization picks the narrowest numeric kind that can
/// hold the number, the same policy the on-disk encoding favors.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 string
    String(String),
    /// Signed 32-bit integer
    I32(i32),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Signed 64-bit integer
    I64(i64),
    /// Unsigned 64-bit integer
    U64(u64),
    /// IEEE 754 single precision float
    F32(f32),
    /// IEEE 754 double precision float
    F64(f64),
    /// Boolean value
    Bool(bool),
    /// Raw byte array
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// The on-disk kind tag for this value
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::String(_) => ValueKind::String,
            PropertyValue::I32(_) => ValueKind::I32,
            PropertyValue::U32(_) => ValueKind::U32,
            PropertyValue::I64(_) => ValueKind::I64,
            PropertyValue::U64(_) => ValueKind::U64,
            PropertyValue::F32(_) => ValueKind::F32,
            PropertyValue::F64(_) => ValueKind::F64,
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Append the payload encoding to `out` and return its byte length
    pub(crate) fn encode_payload(&self, out: &mut Vec<u8>) -> usize {
        let before = out.len();
        match self {
            PropertyValue::String(s) => out.extend_from_slice(s.as_bytes()),
            PropertyValue::I32(n) => out.extend_from_slice(&n.to_le_bytes()),
            PropertyValue::U32(n) => out.extend_from_slice(&n.to_le_bytes()),
            PropertyValue::I64(n) => out.extend_from_slice(&n.to_le_bytes()),
            PropertyValue::U64(n) => out.extend_from_slice(&n.to_le_bytes()),
            PropertyValue::F32(x) => out.extend_from_slice(&x.to_le_bytes()),
            PropertyValue::F64(x) => out.extend_from_slice(&x.to_le_bytes()),
            PropertyValue::Bool(b) => out.push(u8::from(*b)),
            PropertyValue::Bytes(b) => out.extend_from_slice(b),
        }
        out.len() - before
    }
}

impl serde::Serialize for PropertyValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            PropertyValue::String(s) => serializer.serialize_str(s),
            PropertyValue::I32(n) => serializer.serialize_i32(*n),
            PropertyValue::U32(n) => serializer.serialize_u32(*n),
            PropertyValue::I64(n) => serializer.serialize_i64(*n),
            PropertyValue::U64(n) => serializer.serialize_u64(*n),
            PropertyValue::F32(x) => serializer.serialize_f32(*x),
            PropertyValue::F64(x) => serializer.serialize_f64(*x),
            PropertyValue::Bool(b) => serializer.serialize_bool(*b),
            PropertyValue::Bytes(b) => serializer.serialize_bytes(b),
        }
    }
}

impl<'de> serde::Deserialize<'de> for PropertyValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PropertyValueVisitor;

        impl<'de> serde::de::Visitor<'de> for PropertyValueVisitor {
            type Value = PropertyValue;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a graph property value")
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<PropertyValue, E> {
                // Narrowest signed kind that holds the number
                if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
                    Ok(PropertyValue::I32(v as i32))
                } else {
                    Ok(PropertyValue::I64(v))
                }
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<PropertyValue, E> {
                if v <= i32::MAX as u64 {
                    Ok(PropertyValue::I32(v as i32))
                } else if v <= u32::MAX as u64 {
                    Ok(PropertyValue::U32(v as u32))
                } else {
                    Ok(PropertyValue::U64(v))
                }
            }

            fn visit_f32<E>(self, v: f32) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::F32(v))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::F64(v))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::String(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::String(v))
            }

            fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::Bytes(v.to_vec()))
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> std::result::Result<PropertyValue, E> {
                Ok(PropertyValue::Bytes(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<PropertyValue, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                // JSON has no bytes type; a sequence of small integers is the
                // conventional spelling
                let mut bytes = Vec::new();
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Ok(PropertyValue::Bytes(bytes))
            }
        }

        deserializer.deserialize_any(PropertyValueVisitor)
    }
}

/// Borrowed view of one stored value
///
/// Wraps the payload slice together with the decoded kind tag. The typed
/// `as_*` accessors verify the kind and fail with
/// [`GraphError::TypeMismatch`]; the `try_as_*` variants return `None`
/// instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value<'g> {
    kind: ValueKind,
    payload: &'g [u8],
    offset: u32,
}

impl<'g> Value<'g> {
    /// Decode the value header at `offset` and borrow its payload
    ///
    /// Fixed-width kinds must declare exactly their width; unknown kind tags
    /// and width mismatches are [`GraphError::InvalidArgument`].
    pub(crate) fn read(buffer: &'g Buffer, offset: u32) -> Result<Self> {
        let header: ValueHeader = buffer.read_record(offset)?;
        let kind = ValueKind::try_from(header.value_kind)?;
        if let Some(expected) = kind.fixed_payload_len() {
            if header.value_byte_length as usize != expected {
                return Err(GraphError::InvalidArgument(format!(
                    "{:?} value at offset {} declares {} payload bytes, expected {}",
                    kind, offset, header.value_byte_length, expected
                )));
            }
        }
        let payload_offset = offset.checked_add(8).ok_or(GraphError::OutOfRange {
            offset,
            length: 8,
            image_len: buffer.len(),
        })?;
        let payload = buffer.slice(payload_offset, header.value_byte_length)?;
        Ok(Self {
            kind,
            payload,
            offset,
        })
    }

    /// The stored kind tag
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Payload length in bytes
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }

    fn expect_kind(&self, want: ValueKind) -> Result<()> {
        if self.kind != want {
            return Err(GraphError::TypeMismatch {
                expected: want,
                found: self.kind,
            });
        }
        Ok(())
    }

    fn fixed_bytes<const N: usize>(&self, want: ValueKind) -> Result<[u8; N]> {
        self.expect_kind(want)?;
        self.payload
            .try_into()
            .map_err(|_| GraphError::InvalidArgument(format!(
                "{:?} value at offset {} has a {}-byte payload",
                want,
                self.offset,
                self.payload.len()
            )))
    }

    /// Borrow the payload as UTF-8 text
    pub fn as_str(&self) -> Result<&'g str> {
        self.expect_kind(ValueKind::String)?;
        std::str::from_utf8(self.payload).map_err(|_| GraphError::InvalidUtf8 {
            offset: self.offset,
        })
    }

    /// Read an i32 payload
    pub fn as_i32(&self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.fixed_bytes(ValueKind::I32)?))
    }

    /// Read a u32 payload
    pub fn as_u32(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.fixed_bytes(ValueKind::U32)?))
    }

    /// Read an i64 payload
    pub fn as_i64(&self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.fixed_bytes(ValueKind::I64)?))
    }

    /// Read a u64 payload
    pub fn as_u64(&self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.fixed_bytes(ValueKind::U64)?))
    }

    /// Read an f32 payload
    pub fn as_f32(&self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.fixed_bytes(ValueKind::F32)?))
    }

    /// Read an f64 payload
    pub fn as_f64(&self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.fixed_bytes(ValueKind::F64)?))
    }

    /// Read a boolean payload
    pub fn as_bool(&self) -> Result<bool> {
        let [byte] = self.fixed_bytes::<1>(ValueKind::Bool)?;
        Ok(byte != 0)
    }

    /// Borrow the payload as raw bytes
    pub fn as_bytes(&self) -> Result<&'g [u8]> {
        self.expect_kind(ValueKind::Bytes)?;
        Ok(self.payload)
    }

    /// `as_str` without the failure: `None` on kind mismatch
    pub fn try_as_str(&self) -> Option<&'g str> {
        self.as_str().ok()
    }

    /// `as_i32` without the failure
    pub fn try_as_i32(&self) -> Option<i32> {
        self.as_i32().ok()
    }

    /// `as_u32` without the failure
    pub fn try_as_u32(&self) -> Option<u32> {
        self.as_u32().ok()
    }

    /// `as_i64` without the failure
    pub fn try_as_i64(&self) -> Option<i64> {
        self.as_i64().ok()
    }

    /// `as_u64` without the failure
    pub fn try_as_u64(&self) -> Option<u64> {
        self.as_u64().ok()
    }

    /// `as_f32` without the failure
    pub fn try_as_f32(&self) -> Option<f32> {
        self.as_f32().ok()
    }

    /// `as_f64` without the failure
    pub fn try_as_f64(&self) -> Option<f64> {
        self.as_f64().ok()
    }

    /// `as_bool` without the failure
    pub fn try_as_bool(&self) -> Option<bool> {
        self.as_bool().ok()
    }

    /// `as_bytes` without the failure
    pub fn try_as_bytes(&self) -> Option<&'g [u8]> {
        self.as_bytes().ok()
    }

    /// Copy this view into an owned [`PropertyValue`]
    pub fn to_property_value(&self) -> Result<PropertyValue> {
        Ok(match self.kind {
            ValueKind::String => PropertyValue::String(self.as_str()?.to_string()),
            ValueKind::I32 => PropertyValue::I32(self.as_i32()?),
            ValueKind::U32 => PropertyValue::U32(self.as_u32()?),
            ValueKind::I64 => PropertyValue::I64(self.as_i64()?),
            ValueKind::U64 => PropertyValue::U64(self.as_u64()?),
            ValueKind::F32 => PropertyValue::F32(self.as_f32()?),
            ValueKind::F64 => PropertyValue::F64(self.as_f64()?),
            ValueKind::Bool => PropertyValue::Bool(self.as_bool()?),
            ValueKind::Bytes => PropertyValue::Bytes(self.as_bytes()?.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_encodings() {
        let mut out = Vec::new();
        assert_eq!(PropertyValue::I32(-2).encode_payload(&mut out), 4);
        assert_eq!(out, (-2i32).to_le_bytes());

        out.clear();
        assert_eq!(PropertyValue::Bool(true).encode_payload(&mut out), 1);
        assert_eq!(out, [1]);

        out.clear();
        assert_eq!(
            PropertyValue::String("hi".to_string()).encode_payload(&mut out),
            2
        );
        assert_eq!(out, b"hi");

        out.clear();
        assert_eq!(PropertyValue::F64(3.5).encode_payload(&mut out), 8);
        assert_eq!(out, 3.5f64.to_le_bytes());
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(PropertyValue::U64(1).kind(), ValueKind::U64);
        assert_eq!(PropertyValue::Bytes(vec![]).kind(), ValueKind::Bytes);
        assert_eq!(PropertyValue::F32(0.0).kind(), ValueKind::F32);
    }

    #[test]
    fn json_round_trip() {
        let values = vec![
            PropertyValue::String("text".to_string()),
            PropertyValue::I32(-5),
            PropertyValue::I64(1 << 40),
            PropertyValue::U64(u64::MAX),
            PropertyValue::F64(2.25),
            PropertyValue::Bool(false),
        ];
        for value in values {
            let json = serde_json::to_string(&value).unwrap();
            let back: PropertyValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn json_picks_narrow_integers() {
        let v: PropertyValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, PropertyValue::I32(42));

        let v: PropertyValue = serde_json::from_str("4000000000").unwrap();
        assert_eq!(v, PropertyValue::U32(4_000_000_000));

        let v: PropertyValue = serde_json::from_str("-3000000000").unwrap();
        assert_eq!(v, PropertyValue::I64(-3_000_000_000));
    }

    #[test]
    fn json_byte_sequences() {
        let v: PropertyValue = serde_json::from_str("[1, 2, 255]").unwrap();
        assert_eq!(v, PropertyValue::Bytes(vec![1, 2, 255]));
    }
}
