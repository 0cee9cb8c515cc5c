use std::fmt;

use bytes::{Buf, BufMut};

use super::DataType;

/// A typed value stored in one column of a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - stored as a zeroed column plus a bit in the null bitmap
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Character data for a `Char(n)` column
    String(String),
    /// Microseconds since Unix epoch
    Timestamp(i64),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value can be written into a column of `data_type`.
    /// Narrower integers widen; strings must fit in the column width.
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Boolean(_), DataType::Boolean) => true,
            (Value::TinyInt(_), DataType::TinyInt | DataType::SmallInt)
            | (Value::TinyInt(_), DataType::Integer | DataType::BigInt) => true,
            (Value::SmallInt(_), DataType::SmallInt | DataType::Integer | DataType::BigInt) => {
                true
            }
            (Value::Integer(_), DataType::Integer | DataType::BigInt) => true,
            (Value::BigInt(_), DataType::BigInt) => true,
            (Value::Float(_), DataType::Float | DataType::Double) => true,
            (Value::Double(_), DataType::Double) => true,
            (Value::String(s), DataType::Char(n)) => s.len() <= *n as usize,
            (Value::Timestamp(_), DataType::Timestamp) => true,
            _ => false,
        }
    }

    /// Writes exactly `data_type.size()` bytes for this value into `buf`.
    /// Returns false, writing nothing, if the value does not fit the type.
    pub fn serialize_into<B: BufMut>(&self, data_type: &DataType, buf: &mut B) -> bool {
        if !self.fits(data_type) {
            return false;
        }
        match (self, data_type) {
            (Value::Null, dt) => buf.put_bytes(0, dt.size()),
            (Value::Boolean(b), _) => buf.put_u8(u8::from(*b)),
            (Value::TinyInt(v), dt) => put_int(buf, dt, *v as i64),
            (Value::SmallInt(v), dt) => put_int(buf, dt, *v as i64),
            (Value::Integer(v), dt) => put_int(buf, dt, *v as i64),
            (Value::BigInt(v), _) => buf.put_i64_le(*v),
            (Value::Float(v), DataType::Double) => buf.put_f64_le(*v as f64),
            (Value::Float(v), _) => buf.put_f32_le(*v),
            (Value::Double(v), _) => buf.put_f64_le(*v),
            (Value::String(s), dt) => {
                // Space-padded to the column width
                buf.put_slice(s.as_bytes());
                buf.put_bytes(b' ', dt.size() - s.len());
            }
            (Value::Timestamp(v), _) => buf.put_i64_le(*v),
        }
        true
    }

    /// Reads one value of `data_type` from the front of `buf`.
    /// Returns None if fewer than `data_type.size()` bytes remain.
    pub fn deserialize_from<B: Buf>(buf: &mut B, data_type: &DataType) -> Option<Self> {
        if buf.remaining() < data_type.size() {
            return None;
        }
        let value = match data_type {
            DataType::Boolean => Value::Boolean(buf.get_u8() != 0),
            DataType::TinyInt => Value::TinyInt(buf.get_i8()),
            DataType::SmallInt => Value::SmallInt(buf.get_i16_le()),
            DataType::Integer => Value::Integer(buf.get_i32_le()),
            DataType::BigInt => Value::BigInt(buf.get_i64_le()),
            DataType::Float => Value::Float(buf.get_f32_le()),
            DataType::Double => Value::Double(buf.get_f64_le()),
            DataType::Char(n) => {
                let mut raw = vec![0u8; *n as usize];
                buf.copy_to_slice(&mut raw);
                let s = String::from_utf8_lossy(&raw).trim_end().to_string();
                Value::String(s)
            }
            DataType::Timestamp => Value::Timestamp(buf.get_i64_le()),
        };
        Some(value)
    }
}

fn put_int<B: BufMut>(buf: &mut B, data_type: &DataType, v: i64) {
    match data_type {
        DataType::TinyInt => buf.put_i8(v as i8),
        DataType::SmallInt => buf.put_i16_le(v as i16),
        DataType::Integer => buf.put_i32_le(v as i32),
        _ => buf.put_i64_le(v),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Timestamp(v) => write!(f, "TIMESTAMP({})", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
