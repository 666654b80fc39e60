//! Error types for service proxies

use std::fmt;

use soap_client::{CoercionError, ControlErrorKind};
use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Sub-kind of an HTTP-level failure of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    /// A 500 response whose body is not a SOAP envelope
    InternalServerError,
    NotFound,
    NotImplemented,
    /// A 500 response carrying an envelope without a usable fault
    InvalidResponse,
    /// The endpoint has no URL for the requested operation
    InvalidUrl,
    Other,
}

impl ServerErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ServerErrorKind::NotFound,
            500 => ServerErrorKind::InternalServerError,
            501 => ServerErrorKind::NotImplemented,
            _ => ServerErrorKind::Other,
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerErrorKind::InternalServerError => "internal server error",
            ServerErrorKind::NotFound => "not found",
            ServerErrorKind::NotImplemented => "not implemented",
            ServerErrorKind::InvalidResponse => "invalid response",
            ServerErrorKind::InvalidUrl => "invalid URL",
            ServerErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`ServiceProxy`](crate::ServiceProxy) operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    /// The request never produced an HTTP response
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered with a SOAP fault
    #[error("control error {code} ({kind}): {description}")]
    Control {
        kind: ControlErrorKind,
        code: i32,
        description: String,
    },

    /// The device answered with an HTTP error that is not a SOAP fault
    #[error("server error ({kind}): {reason}")]
    Server {
        kind: ServerErrorKind,
        status: Option<u16>,
        reason: String,
    },

    /// A 200 response that could not be decoded or lacked an out-argument
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The action handle was never issued, was canceled, or was already
    /// finished with `end_action`
    #[error("unknown or released action handle")]
    UnknownAction,

    /// `end_action` was called before the completion callback fired
    #[error("action has not completed yet")]
    ActionPending,

    #[error("no notify registration matches variable '{variable}'")]
    NotifyNotFound { variable: String },

    /// The listener id is not connected
    #[error("unknown listener")]
    UnknownListener,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An action or argument name that cannot be written as an XML element
    #[error("invalid name {0:?}")]
    InvalidName(String),
}

impl From<CoercionError> for ProxyError {
    fn from(err: CoercionError) -> Self {
        ProxyError::TypeMismatch(err.to_string())
    }
}

/// Why a subscription ended without being asked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionLostKind {
    /// The device rejected a SUBSCRIBE or renewal, or the request failed
    SubscriptionFailed,
    /// The device accepted a SUBSCRIBE but sent no `SID`
    SubscriptionLost,
    /// The endpoint has no event subscription URL
    InvalidUrl,
}

/// Payload of the `subscription-lost` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionLost {
    pub kind: SubscriptionLostKind,
    /// HTTP status of the failed response, when there was one
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for SubscriptionLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}
