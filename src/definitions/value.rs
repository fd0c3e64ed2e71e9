use chrono::{DateTime, NaiveDateTime, Utc};

use crate::Error;
use crate::codec;
use crate::error::{DecodeError, require_len};

/// Structured value decoded from, or encoded into, a characteristic buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    /// Fallback for formats the catalogue does not describe.
    Hex(String),
}

impl Value {
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(v) => f.write_str(v),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Signed(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Hex(v) => f.write_str(v),
        }
    }
}

/// Decode rule bound to a characteristic definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Utf8,
    /// NUL terminated, firmware padded string.
    CString,
    U8,
    U16,
    U32,
    I16,
    /// Single byte, 0..=100.
    Percent,
    Boolean,
    GattDateTime,
    UnixTime,
    Hex,
}

impl Decoder {
    /// Pure decode; the buffer is neither modified nor retained.
    pub fn decode(self, buffer: &[u8]) -> Result<Value, DecodeError> {
        let value = match self {
            Decoder::Utf8 => Value::Text(String::from_utf8_lossy(buffer).trim().to_string()),
            Decoder::CString => Value::Text(codec::read_cstring(buffer)),
            Decoder::U8 => {
                require_len(buffer, 1)?;
                Value::Unsigned(buffer[0].into())
            }
            Decoder::U16 => Value::Unsigned(codec::le_u16(buffer, 0)?.into()),
            Decoder::U32 => Value::Unsigned(codec::le_u32(buffer, 0)?.into()),
            Decoder::I16 => Value::Signed(codec::le_i16(buffer, 0)?.into()),
            Decoder::Percent => {
                require_len(buffer, 1)?;
                if buffer[0] > 100 {
                    return Err(DecodeError::invalid(
                        "percentage",
                        format!("{} exceeds 100", buffer[0]),
                    ));
                }
                Value::Unsigned(buffer[0].into())
            }
            Decoder::Boolean => {
                require_len(buffer, 1)?;
                Value::Boolean(buffer[0] != 0)
            }
            Decoder::GattDateTime => Value::DateTime(codec::gatt_date_time(buffer)?),
            Decoder::UnixTime => Value::Timestamp(codec::unix_time(buffer, 0)?),
            Decoder::Hex => Value::Hex(codec::to_hex(buffer)),
        };
        Ok(value)
    }
}

/// What a characteristic accepts on write, checked before anything is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8 { max_len: usize },
    CString { width: usize },
    Unsigned { width: usize, min: u64, max: u64 },
    Signed { width: usize, min: i64, max: i64 },
    Boolean,
    GattDateTime,
    UnixTime,
    Raw,
}

impl Encoding {
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, Error> {
        match (self, value) {
            (Encoding::Utf8 { max_len }, Value::Text(text)) => {
                if text.len() > *max_len {
                    return Err(Error::InvalidValue(format!(
                        "text is {} bytes, at most {max_len} allowed",
                        text.len()
                    )));
                }
                Ok(text.as_bytes().to_vec())
            }
            (Encoding::CString { width }, Value::Text(text)) => {
                if text.len() >= *width {
                    return Err(Error::InvalidValue(format!(
                        "text is {} bytes, at most {} allowed",
                        text.len(),
                        width - 1
                    )));
                }
                Ok(codec::write_cstring(text, *width))
            }
            (Encoding::Unsigned { width, min, max }, Value::Unsigned(v)) => {
                if v < min || v > max {
                    return Err(Error::InvalidValue(format!("{v} outside {min}..={max}")));
                }
                Ok(v.to_le_bytes()[..*width].to_vec())
            }
            (Encoding::Signed { width, min, max }, Value::Signed(v)) => {
                if v < min || v > max {
                    return Err(Error::InvalidValue(format!("{v} outside {min}..={max}")));
                }
                Ok(v.to_le_bytes()[..*width].to_vec())
            }
            (Encoding::Boolean, Value::Boolean(v)) => Ok(vec![u8::from(*v)]),
            (Encoding::GattDateTime, Value::DateTime(v)) => Ok(codec::encode_gatt_date_time(v)),
            (Encoding::UnixTime, Value::Timestamp(v)) => Ok(codec::encode_unix_time(v).to_vec()),
            (Encoding::Raw, Value::Hex(v)) => Ok(codec::from_hex(v)?),
            (encoding, value) => Err(Error::InvalidValue(format!(
                "{value:?} cannot be written as {encoding:?}"
            ))),
        }
    }
}
