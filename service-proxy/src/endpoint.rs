//! Remote service description

use url::Url;

use crate::error::{ProxyError, Result};

/// The parts of a device description a proxy needs to reach one service.
///
/// Either URL may be absent; operations that need a missing URL fail with
/// an `InvalidUrl` error instead of at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    service_type: String,
    udn: String,
    control_url: Option<Url>,
    event_subscription_url: Option<Url>,
}

impl ServiceEndpoint {
    /// `service_type` is the service type URI, e.g.
    /// `urn:schemas-upnp-org:service:RenderingControl:1`
    pub fn new(service_type: impl Into<String>, udn: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            udn: udn.into(),
            control_url: None,
            event_subscription_url: None,
        }
    }

    pub fn with_control_url(mut self, url: &str) -> Result<Self> {
        self.control_url = Some(parse_http_url(url)?);
        Ok(self)
    }

    pub fn with_event_subscription_url(mut self, url: &str) -> Result<Self> {
        self.event_subscription_url = Some(parse_http_url(url)?);
        Ok(self)
    }

    /// Resolve description-relative paths, e.g. `/MediaRenderer/RenderingControl/Control`,
    /// against the device's base URL
    pub fn from_description(
        base_url: &str,
        service_type: impl Into<String>,
        udn: impl Into<String>,
        control_path: Option<&str>,
        event_sub_path: Option<&str>,
    ) -> Result<Self> {
        let base = parse_http_url(base_url)?;
        let resolve = |path: &str| {
            base.join(path)
                .map_err(|e| ProxyError::InvalidConfig(format!("invalid URL {path:?}: {e}")))
        };

        Ok(Self {
            service_type: service_type.into(),
            udn: udn.into(),
            control_url: control_path.map(resolve).transpose()?,
            event_subscription_url: event_sub_path.map(resolve).transpose()?,
        })
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn control_url(&self) -> Option<&Url> {
        self.control_url.as_ref()
    }

    pub fn event_subscription_url(&self) -> Option<&Url> {
        self.event_subscription_url.as_ref()
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let url =
        Url::parse(raw).map_err(|e| ProxyError::InvalidConfig(format!("invalid URL {raw:?}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProxyError::InvalidConfig(format!(
            "unsupported URL scheme {other:?} in {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

    #[test]
    fn test_endpoint_urls() {
        let endpoint = ServiceEndpoint::new(RENDERING_CONTROL, "uuid:RINCON_1")
            .with_control_url("http://192.168.1.20:1400/MediaRenderer/RenderingControl/Control")
            .unwrap();

        assert_eq!(endpoint.service_type(), RENDERING_CONTROL);
        assert_eq!(endpoint.udn(), "uuid:RINCON_1");
        assert_eq!(
            endpoint.control_url().unwrap().as_str(),
            "http://192.168.1.20:1400/MediaRenderer/RenderingControl/Control"
        );
        assert!(endpoint.event_subscription_url().is_none());
    }

    #[test]
    fn test_from_description_resolves_paths() {
        let endpoint = ServiceEndpoint::from_description(
            "http://192.168.1.20:1400/xml/device_description.xml",
            RENDERING_CONTROL,
            "uuid:RINCON_1",
            Some("/MediaRenderer/RenderingControl/Control"),
            Some("/MediaRenderer/RenderingControl/Event"),
        )
        .unwrap();

        assert_eq!(
            endpoint.event_subscription_url().unwrap().as_str(),
            "http://192.168.1.20:1400/MediaRenderer/RenderingControl/Event"
        );
    }

    #[test]
    fn test_rejects_bad_urls() {
        let endpoint = ServiceEndpoint::new(RENDERING_CONTROL, "uuid:RINCON_1");
        assert!(endpoint.clone().with_control_url("not a url").is_err());
        assert!(endpoint.with_event_subscription_url("ftp://host/event").is_err());
    }
}
