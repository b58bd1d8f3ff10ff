//! Typed attribute values.
//!
//! Values are parsed from agent supplied text (`set` requests), rendered back into text for
//! the agent, and converted to and from their RADIUS wire form.

use std::{borrow::Cow, fmt, net::Ipv4Addr};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::dictionary::{Attr, DataType};

/// Format used when rendering `date` values.
const DATE_FORMAT: &str = "%b %e %Y %H:%M:%S UTC";

/// Errors produced while parsing or decoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Invalid {data_type} value \"{text}\"")]
    Invalid { data_type: DataType, text: String },

    #[error("Invalid length {len} for {data_type} value")]
    BadLength { data_type: DataType, len: usize },

    #[error("Attributes of type \"{0}\" do not carry a value")]
    Structural(DataType),
}

/// A value carried by a leaf attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Byte(u8),
    Short(u16),
    Integer(u32),
    Integer64(u64),
    Signed(i32),
    /// Seconds since the Unix epoch.
    Date(u32),
    IpAddr(Ipv4Addr),
    /// Kept as sent; RADIUS strings need not be UTF-8.
    String(Vec<u8>),
    Octets(Vec<u8>),
}

impl Value {
    /// Parses agent supplied text according to the type of `attr`.
    ///
    /// Integer types accept decimal, `0x` hex and the names registered with `VALUE`. Octets
    /// accept `0x` hex or are taken literally. Dates accept seconds since the epoch or an
    /// RFC 3339 timestamp.
    ///
    /// # Errors
    /// Returns `ValueError::Invalid` if the text does not fit the type and
    /// `ValueError::Structural` for group types.
    pub fn parse(attr: &Attr, text: &str) -> Result<Self, ValueError> {
        let data_type = attr.data_type();
        let invalid = || ValueError::Invalid {
            data_type,
            text: text.to_string(),
        };
        let integer = || -> Result<u64, ValueError> {
            if let Some(value) = attr.value_by_name(text) {
                return Ok(value);
            }
            parse_unsigned(text).ok_or_else(invalid)
        };

        match data_type {
            DataType::Byte => u8::try_from(integer()?).map(Value::Byte).map_err(|_| invalid()),
            DataType::Short => u16::try_from(integer()?).map(Value::Short).map_err(|_| invalid()),
            DataType::Integer => u32::try_from(integer()?).map(Value::Integer).map_err(|_| invalid()),
            DataType::Integer64 => integer().map(Value::Integer64),
            DataType::Signed => match attr.value_by_name(text) {
                Some(value) => i32::try_from(value).map(Value::Signed).map_err(|_| invalid()),
                None => text.parse::<i32>().map(Value::Signed).map_err(|_| invalid()),
            },
            DataType::Date => parse_date(text).map(Value::Date).ok_or_else(invalid),
            DataType::IpAddr => text.parse::<Ipv4Addr>().map(Value::IpAddr).map_err(|_| invalid()),
            DataType::String => Ok(Value::String(text.as_bytes().to_vec())),
            DataType::Octets => match text.strip_prefix("0x") {
                Some(hex_digits) => hex::decode(hex_digits)
                    .map(Value::Octets)
                    .map_err(|_| invalid()),
                None => Ok(Value::Octets(text.as_bytes().to_vec())),
            },
            structural => Err(ValueError::Structural(structural)),
        }
    }

    /// Value attached to a leaf when the query supplies none.
    ///
    /// RADIUS cannot carry empty attributes, so strings and octets get a single NUL byte.
    pub fn placeholder(data_type: DataType) -> Result<Self, ValueError> {
        match data_type {
            DataType::Byte => Ok(Value::Byte(0)),
            DataType::Short => Ok(Value::Short(0)),
            DataType::Integer => Ok(Value::Integer(0)),
            DataType::Integer64 => Ok(Value::Integer64(0)),
            DataType::Signed => Ok(Value::Signed(0)),
            DataType::Date => Ok(Value::Date(0)),
            DataType::IpAddr => Ok(Value::IpAddr(Ipv4Addr::UNSPECIFIED)),
            DataType::String => Ok(Value::String(vec![0])),
            DataType::Octets => Ok(Value::Octets(vec![0])),
            structural => Err(ValueError::Structural(structural)),
        }
    }

    /// Decodes the wire form of a value of the given type.
    pub fn from_wire(data_type: DataType, data: &[u8]) -> Result<Self, ValueError> {
        let bad_length = || ValueError::BadLength {
            data_type,
            len: data.len(),
        };
        match data_type {
            DataType::Byte => <[u8; 1]>::try_from(data)
                .map(|b| Value::Byte(b[0]))
                .map_err(|_| bad_length()),
            DataType::Short => <[u8; 2]>::try_from(data)
                .map(|b| Value::Short(u16::from_be_bytes(b)))
                .map_err(|_| bad_length()),
            DataType::Integer => <[u8; 4]>::try_from(data)
                .map(|b| Value::Integer(u32::from_be_bytes(b)))
                .map_err(|_| bad_length()),
            DataType::Integer64 => <[u8; 8]>::try_from(data)
                .map(|b| Value::Integer64(u64::from_be_bytes(b)))
                .map_err(|_| bad_length()),
            DataType::Signed => <[u8; 4]>::try_from(data)
                .map(|b| Value::Signed(i32::from_be_bytes(b)))
                .map_err(|_| bad_length()),
            DataType::Date => <[u8; 4]>::try_from(data)
                .map(|b| Value::Date(u32::from_be_bytes(b)))
                .map_err(|_| bad_length()),
            DataType::IpAddr => <[u8; 4]>::try_from(data)
                .map(|b| Value::IpAddr(Ipv4Addr::from(b)))
                .map_err(|_| bad_length()),
            DataType::String => Ok(Value::String(data.to_vec())),
            DataType::Octets => Ok(Value::Octets(data.to_vec())),
            structural => Err(ValueError::Structural(structural)),
        }
    }

    /// Wire form of the value.
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Value::Byte(v) => vec![*v],
            Value::Short(v) => v.to_be_bytes().to_vec(),
            Value::Integer(v) | Value::Date(v) => v.to_be_bytes().to_vec(),
            Value::Integer64(v) => v.to_be_bytes().to_vec(),
            Value::Signed(v) => v.to_be_bytes().to_vec(),
            Value::IpAddr(addr) => addr.octets().to_vec(),
            Value::String(bytes) | Value::Octets(bytes) => bytes.clone(),
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Byte(v) => Some(u64::from(*v)),
            Value::Short(v) => Some(u64::from(*v)),
            Value::Integer(v) => Some(u64::from(*v)),
            Value::Integer64(v) => Some(*v),
            Value::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Text rendering, using the enumerated names of `attr` where one matches.
    pub fn render(&self, attr: &Attr) -> String {
        if let Some(name) = self.as_u64().and_then(|v| attr.value_name(v)) {
            return name.to_string();
        }
        self.to_string()
    }

    /// Bytes written to the agent: raw for strings and octets, the rendering otherwise.
    pub fn agent_bytes(&self, attr: &Attr) -> Cow<'_, [u8]> {
        match self {
            Value::String(bytes) | Value::Octets(bytes) => Cow::Borrowed(bytes),
            other => Cow::Owned(other.render(attr).into_bytes()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Integer64(v) => write!(f, "{}", v),
            Value::Signed(v) => write!(f, "{}", v),
            Value::Date(secs) => match DateTime::<Utc>::from_timestamp(i64::from(*secs), 0) {
                Some(date) => write!(f, "{}", date.format(DATE_FORMAT)),
                None => write!(f, "{}", secs),
            },
            Value::IpAddr(addr) => write!(f, "{}", addr),
            Value::String(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Value::Octets(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

fn parse_unsigned(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_date(text: &str) -> Option<u32> {
    if let Ok(secs) = text.parse::<u32>() {
        return Some(secs);
    }
    let date = DateTime::parse_from_rfc3339(text).ok()?;
    u32::try_from(date.timestamp()).ok()
}
