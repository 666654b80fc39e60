//! Error types for the callback server

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackServerError {
    /// Every port in the configured range is taken
    #[error("no available port found in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },

    /// The outbound interface address could not be determined
    #[error("failed to detect local IP address")]
    LocalIpUnavailable,

    /// The server task ended abnormally while shutting down
    #[error("callback server shutdown failed: {0}")]
    Shutdown(String),
}
