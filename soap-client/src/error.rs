//! Error types for the wire codec

use std::fmt;

use thiserror::Error;

use crate::value::ValueType;

/// Errors raised while decoding SOAP envelopes or GENA property sets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The document is not well-formed XML
    #[error("XML parsing error: {0}")]
    Xml(String),

    /// The document root is not the element the format requires
    #[error("unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    /// The envelope is missing `Body` or the body has no payload element
    #[error("invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    /// A `Fault` is present but has no usable `UPnPError` detail
    #[error("invalid SOAP fault: {0}")]
    InvalidFault(String),
}

/// A control error reported by the device inside a SOAP `Fault`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    /// `UPnPError/errorCode`
    pub code: i32,
    /// `UPnPError/errorDescription`, when the device sent one
    pub description: Option<String>,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "UPnP error {}: {}", self.code, description),
            None => write!(f, "UPnP error {}", self.code),
        }
    }
}

impl std::error::Error for SoapFault {}

/// Outcome of decoding an action response that did not yield out-arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The body carried a SOAP fault
    #[error("SOAP fault: {0}")]
    Fault(SoapFault),

    /// The body could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A string could not be represented as the requested type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert '{value}' to {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: ValueType,
}
