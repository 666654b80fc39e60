//! Configuration types for service proxies and the HTTP transport

use std::net::IpAddr;
use std::time::Duration;

use crate::error::{ProxyError, Result};

/// Subscription timeout requested when nothing else is configured, and the
/// value assumed when a device answers with an unreadable `Timeout` header
pub const DEFAULT_SUBSCRIPTION_TIMEOUT: u32 = 1800;
pub const MIN_SUBSCRIPTION_TIMEOUT: u32 = 1800;
/// Seven days
pub const MAX_SUBSCRIPTION_TIMEOUT: u32 = 604_800;

/// Configuration for a single [`ServiceProxy`](crate::ServiceProxy)
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Subscription timeout to request, in seconds. `0` requests `infinite`;
    /// other values are clamped to 1800..=604800.
    /// Default: 1800
    pub subscription_timeout: u32,

    /// Fraction of the granted timeout after which the subscription is
    /// renewed. Must be strictly between 0 and 1.
    /// Default: 0.9
    pub renewal_fraction: f64,

    /// Value for the `Accept-Language` header on action requests
    /// Default: None (header omitted)
    pub accept_language: Option<String>,

    /// Prefix for the NOTIFY delivery path; each proxy appends a unique id
    /// Default: "/gena/"
    pub delivery_path_prefix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            subscription_timeout: DEFAULT_SUBSCRIPTION_TIMEOUT,
            renewal_fraction: 0.9,
            accept_language: None,
            delivery_path_prefix: "/gena/".to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an `infinite` subscription
    pub fn infinite_subscription() -> Self {
        Self {
            subscription_timeout: 0,
            ..Default::default()
        }
    }

    /// The timeout to put in the SUBSCRIBE `Timeout` header, `None` meaning
    /// `infinite`
    pub fn requested_timeout(&self) -> Option<u32> {
        match self.subscription_timeout {
            0 => None,
            secs => Some(secs.clamp(MIN_SUBSCRIPTION_TIMEOUT, MAX_SUBSCRIPTION_TIMEOUT)),
        }
    }

    /// The `Accept-Language` value, if one should be sent
    pub fn accept_language(&self) -> Option<&str> {
        self.accept_language
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if !(self.renewal_fraction > 0.0 && self.renewal_fraction < 1.0) {
            return Err(ProxyError::InvalidConfig(format!(
                "renewal fraction must be between 0 and 1 (exclusive), got {}",
                self.renewal_fraction
            )));
        }

        if !self.delivery_path_prefix.starts_with('/') {
            return Err(ProxyError::InvalidConfig(
                "delivery path prefix must start with '/'".to_string(),
            ));
        }

        if self
            .delivery_path_prefix
            .chars()
            .any(|c| c.is_whitespace() || c == '?' || c == '#')
        {
            return Err(ProxyError::InvalidConfig(format!(
                "delivery path prefix is not a plain path: {:?}",
                self.delivery_path_prefix
            )));
        }

        Ok(())
    }
}

/// Configuration for [`HttpTransport`](crate::HttpTransport)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Port range for the NOTIFY callback server
    /// Default: (3400, 3500)
    pub callback_port_range: (u16, u16),

    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Overall timeout for a single request
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Address advertised in `Callback` headers instead of the detected
    /// local address
    /// Default: None
    pub advertised_ip: Option<IpAddr>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            callback_port_range: (3400, 3500),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            advertised_ip: None,
        }
    }
}

impl HttpTransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.callback_port_range.0 > self.callback_port_range.1 {
            return Err(ProxyError::InvalidConfig(
                "Invalid callback port range: start must not exceed end".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ProxyError::InvalidConfig(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProxyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.requested_timeout(), Some(1800));
        assert_eq!(config.accept_language(), None);
    }

    #[rstest]
    #[case(0, None)]
    #[case(1, Some(1800))]
    #[case(1800, Some(1800))]
    #[case(3600, Some(3600))]
    #[case(604_800, Some(604_800))]
    #[case(1_000_000, Some(604_800))]
    fn test_requested_timeout_clamping(#[case] configured: u32, #[case] expected: Option<u32>) {
        let config = ProxyConfig {
            subscription_timeout: configured,
            ..Default::default()
        };
        assert_eq!(config.requested_timeout(), expected);
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(-0.5)]
    #[case(f64::NAN)]
    fn test_invalid_renewal_fraction(#[case] fraction: f64) {
        let config = ProxyConfig {
            renewal_fraction: fraction,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProxyError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_path_prefix() {
        let config = ProxyConfig {
            delivery_path_prefix: "gena/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProxyConfig {
            delivery_path_prefix: "/gena?x=".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_accept_language_is_omitted() {
        let config = ProxyConfig {
            accept_language: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.accept_language(), None);

        let config = ProxyConfig {
            accept_language: Some("en-US, fr;q=0.5".to_string()),
            ..Default::default()
        };
        assert_eq!(config.accept_language(), Some("en-US, fr;q=0.5"));
    }

    #[test]
    fn test_transport_config_validation() {
        assert!(HttpTransportConfig::default().validate().is_ok());

        let config = HttpTransportConfig {
            callback_port_range: (3500, 3400),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
