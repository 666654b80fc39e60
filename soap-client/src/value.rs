//! Typed argument values and their UPnP string forms

use std::fmt;

use crate::error::CoercionError;

/// Declared type of an action argument or an evented state variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    /// Signed 32-bit integer (`i4`)
    Int,
    /// Unsigned 32-bit integer (`ui4`)
    UInt,
    Bool,
    /// `r8` / `number`
    Float,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Bool => "boolean",
            ValueType::Float => "float",
        };
        f.write_str(name)
    }
}

/// A value carried in a SOAP argument or a GENA property
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Float(f64),
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::String(_) => ValueType::String,
            TypedValue::Int(_) => ValueType::Int,
            TypedValue::UInt(_) => ValueType::UInt,
            TypedValue::Bool(_) => ValueType::Bool,
            TypedValue::Float(_) => ValueType::Float,
        }
    }

    /// Convert a wire string into a value of `target` type.
    ///
    /// Integer targets are parsed through an `i32` first, so `UInt` rejects
    /// negative numbers and anything above `i32::MAX`. Booleans accept
    /// `true/false`, `yes/no` (any case) and otherwise any integer, where
    /// non-zero means true.
    pub fn coerce(raw: &str, target: ValueType) -> Result<TypedValue, CoercionError> {
        let fail = || CoercionError {
            value: raw.to_string(),
            target,
        };

        match target {
            ValueType::String => Ok(TypedValue::String(raw.to_string())),
            ValueType::Int => parse_i32(raw).map(TypedValue::Int).ok_or_else(fail),
            ValueType::UInt => parse_i32(raw)
                .and_then(|i| u32::try_from(i).ok())
                .map(TypedValue::UInt)
                .ok_or_else(fail),
            ValueType::Bool => parse_bool(raw).map(TypedValue::Bool).ok_or_else(fail),
            ValueType::Float => raw
                .trim()
                .parse::<f64>()
                .map(TypedValue::Float)
                .map_err(|_| fail()),
        }
    }

    /// Canonical string form used on the wire
    pub fn to_wire_string(&self) -> String {
        self.to_string()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            TypedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            TypedValue::UInt(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => f.write_str(s),
            TypedValue::Int(i) => write!(f, "{i}"),
            TypedValue::UInt(u) => write!(f, "{u}"),
            TypedValue::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            // Rust's float Display is the shortest string that parses back
            // to the same f64.
            TypedValue::Float(v) => write!(f, "{v}"),
        }
    }
}

fn parse_i32(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        parse_i32(trimmed).map(|i| i != 0)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::String(value)
    }
}

impl From<i32> for TypedValue {
    fn from(value: i32) -> Self {
        TypedValue::Int(value)
    }
}

impl From<u32> for TypedValue {
    fn from(value: u32) -> Self {
        TypedValue::UInt(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Float(value)
    }
}
