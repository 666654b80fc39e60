//! Named action arguments

use crate::value::{TypedValue, ValueType};

/// An in-argument of an action invocation.
///
/// Arguments are always passed as an ordered slice; many devices depend on
/// the element order in the request body.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: TypedValue,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Declaration of an expected out-argument: its name and the type the
/// returned string must be converted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutArgument {
    pub name: String,
    pub value_type: ValueType,
}

impl OutArgument {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}
