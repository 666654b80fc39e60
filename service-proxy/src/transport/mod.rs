//! The HTTP collaborator a service proxy drives.
//!
//! A [`Transport`] owns the network and the event loop. The proxy submits
//! requests, schedules timers and registers handlers for inbound requests;
//! the transport calls back into the proxy from its reactor. Every callback
//! is delivered later, never from inside the call that registered it, and
//! always on the thread that owns the proxy.

use std::rc::Rc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use thiserror::Error;

#[cfg(feature = "http")]
pub mod http_transport;

pub const CONTENT_TYPE_XML: &str = r#"text/xml; charset="utf-8""#;

/// Lowercase header names used by SOAP and GENA
pub mod headers {
    pub const SOAP_ACTION: &str = "soapaction";
    pub const MPOST_SOAP_ACTION: &str = "01-soapaction";
    pub const MAN: &str = "man";
    pub const ACCEPT_LANGUAGE: &str = "accept-language";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CALLBACK: &str = "callback";
    pub const NT: &str = "nt";
    pub const NTS: &str = "nts";
    pub const TIMEOUT: &str = "timeout";
    pub const SID: &str = "sid";
    pub const SEQ: &str = "seq";
}

/// Errors raised by the transport itself, before any HTTP status exists
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, DNS or timeout failure
    #[error("network error: {0}")]
    Network(String),

    /// The request could not be expressed on the wire
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport has shut down")]
    Shutdown,
}

/// An HTTP request, outbound or inbound.
///
/// For requests delivered to a path handler, `url` holds the request path.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: &'static str, value: &str) -> Result<(), TransportError> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            TransportError::InvalidRequest(format!("invalid value for header {name}: {value:?}"))
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The canonical reason phrase for the status code
    pub fn reason_phrase(&self) -> String {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Identifies a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

impl RequestHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Identifies a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

pub type ResponseCallback = Box<dyn FnOnce(Result<HttpResponse, TransportError>)>;
pub type TimerCallback = Box<dyn FnOnce()>;
pub type PathHandler = Rc<dyn Fn(&HttpRequest) -> HttpResponse>;

/// HTTP client, HTTP listener and timer source for service proxies
pub trait Transport {
    /// Send `request`; `on_complete` runs on the reactor once the exchange
    /// finishes, unless the request is canceled first.
    fn submit_request(&self, request: HttpRequest, on_complete: ResponseCallback) -> RequestHandle;

    /// Send `request` and block the calling thread until it completes.
    fn send_blocking(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Abort a submitted request. Its callback must not run afterwards.
    fn cancel_request(&self, handle: RequestHandle);

    /// Route inbound requests for `path` to `handler`, replacing any handler
    /// already registered for it.
    fn register_path_handler(&self, path: &str, handler: PathHandler);

    fn unregister_path_handler(&self, path: &str);

    /// Base URL under which registered paths are reachable, without a
    /// trailing slash
    fn server_url(&self) -> String;

    fn schedule_timer(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle;

    /// Cancel a timer. Its callback must not run afterwards.
    fn cancel_timer(&self, handle: TimerHandle);
}
