//! GENA subscription lifecycle.
//!
//! ```text
//!               set_subscribed(true)          2xx + SID
//! Unsubscribed ---------------------> Subscribing ----------> Subscribed
//!      ^                                   |                   |    ^
//!      |  failure (subscription-lost)      |      renewal timer|    | 2xx + SID
//!      +-----------------------------------+-------------------+    |
//!      |                                                       v    |
//!      +---------------------------------------------------- Renewing
//! ```
//!
//! A sequence gap on an inbound NOTIFY sends UNSUBSCRIBE and a fresh
//! SUBSCRIBE without reporting anything to the application, unless the
//! application has already asked to unsubscribe.

use std::time::Duration;

use tracing::{debug, error, warn};
use url::Url;

use crate::config::{ProxyConfig, DEFAULT_SUBSCRIPTION_TIMEOUT};
use crate::error::{SubscriptionLost, SubscriptionLostKind};
use crate::proxy::{ProxyInner, ServiceProxy};
use crate::transport::{
    headers, HttpRequest, HttpResponse, PathHandler, RequestHandle, TimerHandle, TransportError,
};

const NT_UPNP_EVENT: &str = "upnp:event";

/// Protocol state of a proxy's subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    /// Initial SUBSCRIBE in flight
    Subscribing,
    Subscribed,
    /// Renewal SUBSCRIBE in flight
    Renewing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SequenceCheck {
    InOrder,
    /// At least one NOTIFY was missed
    Gap,
}

/// Timeout granted by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrantedTimeout {
    Seconds(u32),
    Infinite,
}

pub(crate) struct Subscription {
    pub(crate) state: SubscriptionState,
    /// Whether the application wants to be subscribed
    pub(crate) desired: bool,
    pub(crate) subscription_id: Option<String>,
    /// SEQ expected on the next NOTIFY
    pub(crate) sequence: u32,
    pub(crate) renewal_timer: Option<TimerHandle>,
    pub(crate) in_flight: Option<RequestHandle>,
    pub(crate) handler_registered: bool,
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self {
            state: SubscriptionState::Unsubscribed,
            desired: false,
            subscription_id: None,
            sequence: 0,
            renewal_timer: None,
            in_flight: None,
            handler_registered: false,
        }
    }

    pub(crate) fn check_sequence(&self, seq: u32) -> SequenceCheck {
        if seq > self.sequence {
            SequenceCheck::Gap
        } else {
            SequenceCheck::InOrder
        }
    }

    /// Advance after an accepted NOTIFY. Wraps from `i32::MAX` to 1; 0 only
    /// ever starts a subscription.
    pub(crate) fn advance_sequence(&mut self) {
        self.sequence = if self.sequence < i32::MAX as u32 {
            self.sequence + 1
        } else {
            1
        };
    }

    /// Forget the subscription; returns the renewal timer to cancel
    fn reset(&mut self) -> Option<TimerHandle> {
        self.state = SubscriptionState::Unsubscribed;
        self.subscription_id = None;
        self.sequence = 0;
        self.renewal_timer.take()
    }
}

/// `Timeout` request header value
pub(crate) fn timeout_header(requested: Option<u32>) -> String {
    match requested {
        Some(secs) => format!("Second-{secs}"),
        None => "infinite".to_string(),
    }
}

/// Interpret the `Timeout` header of a SUBSCRIBE response
pub(crate) fn parse_timeout_header(value: Option<&str>, requested: Option<u32>) -> GrantedTimeout {
    let Some(value) = value.map(str::trim) else {
        warn!("no Timeout in SUBSCRIBE response, assuming the requested one");
        return requested.map_or(GrantedTimeout::Infinite, GrantedTimeout::Seconds);
    };

    if value.eq_ignore_ascii_case("infinite") {
        return GrantedTimeout::Infinite;
    }

    let seconds = value
        .get(..7)
        .filter(|prefix| prefix.eq_ignore_ascii_case("Second-"))
        .and_then(|_| value[7..].trim().parse::<u32>().ok())
        .filter(|secs| *secs > 0);

    match seconds {
        Some(secs) => GrantedTimeout::Seconds(secs),
        None => {
            warn!(
                timeout = value,
                default = DEFAULT_SUBSCRIPTION_TIMEOUT,
                "invalid Timeout in SUBSCRIBE response, assuming default"
            );
            GrantedTimeout::Seconds(DEFAULT_SUBSCRIPTION_TIMEOUT)
        }
    }
}

/// Delay before renewing a subscription granted for `granted_secs`;
/// always strictly shorter than the grant.
pub(crate) fn renewal_delay(granted_secs: u32, config: &ProxyConfig) -> Duration {
    Duration::from_secs_f64(f64::from(granted_secs) * config.renewal_fraction)
}

impl ServiceProxy {
    /// Subscribe to or unsubscribe from the service's events.
    ///
    /// Unsubscribing while a SUBSCRIBE or renewal is in flight lets that
    /// request finish; if it granted a subscription, UNSUBSCRIBE follows
    /// immediately.
    pub fn set_subscribed(&self, subscribed: bool) {
        let state = {
            let mut sub = self.inner.subscription.borrow_mut();
            if sub.desired == subscribed {
                return;
            }
            sub.desired = subscribed;
            sub.state
        };

        match (subscribed, state) {
            (true, SubscriptionState::Unsubscribed) => self.subscribe(),
            (false, SubscriptionState::Subscribed) => {
                self.inner.unsubscribe(false);
                self.inner.unregister_delivery_path();
            }
            (false, SubscriptionState::Unsubscribed) => {}
            (_, in_flight) => {
                debug!(?in_flight, subscribed, "request in flight, change applied on completion");
            }
        }
    }

    /// Whether the application asked to be subscribed and no failure has
    /// ended the subscription since
    pub fn get_subscribed(&self) -> bool {
        self.inner.subscription.borrow().desired
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.inner.subscription.borrow().state
    }

    /// SID granted by the device, if subscribed
    pub fn subscription_id(&self) -> Option<String> {
        self.inner.subscription.borrow().subscription_id.clone()
    }

    /// SEQ expected on the next NOTIFY
    pub fn event_sequence(&self) -> u32 {
        self.inner.subscription.borrow().sequence
    }

    fn subscribe(&self) {
        let Some(event_url) = self.inner.endpoint.event_subscription_url() else {
            self.fail_subscribe_later(SubscriptionLost {
                kind: SubscriptionLostKind::InvalidUrl,
                status: None,
                message: "No valid event subscription URL defined".to_string(),
            });
            return;
        };

        self.register_delivery_path();
        let requested = self.inner.config.requested_timeout();
        let request = match subscribe_request(event_url, &self.delivery_url(), requested) {
            Ok(request) => request,
            Err(err) => {
                self.lose_subscription(SubscriptionLost {
                    kind: SubscriptionLostKind::SubscriptionFailed,
                    status: None,
                    message: err.to_string(),
                });
                return;
            }
        };

        debug!(url = %event_url, timeout = %timeout_header(requested), "subscribing");
        self.inner.subscription.borrow_mut().state = SubscriptionState::Subscribing;
        self.submit_subscribe(request, false);
    }

    /// Unsubscribe and subscribe again without telling the application
    pub(crate) fn resubscribe(&self) {
        debug!(path = %self.inner.delivery_path, "resubscribing");
        self.inner.unsubscribe(false);
        self.subscribe();
    }

    fn renew(&self) {
        let sid = {
            let mut sub = self.inner.subscription.borrow_mut();
            sub.renewal_timer = None;
            if sub.state != SubscriptionState::Subscribed {
                return;
            }
            sub.subscription_id.clone()
        };

        let (Some(sid), Some(event_url)) = (sid, self.inner.endpoint.event_subscription_url())
        else {
            return;
        };

        let requested = self.inner.config.requested_timeout();
        match renew_request(event_url, &sid, requested) {
            Ok(request) => {
                debug!(%sid, "renewing subscription");
                self.inner.subscription.borrow_mut().state = SubscriptionState::Renewing;
                self.submit_subscribe(request, true);
            }
            Err(err) => self.lose_subscription(SubscriptionLost {
                kind: SubscriptionLostKind::SubscriptionFailed,
                status: None,
                message: err.to_string(),
            }),
        }
    }

    fn submit_subscribe(&self, request: HttpRequest, renewal: bool) {
        let weak = self.downgrade();
        let handle = self.inner.transport.submit_request(
            request,
            Box::new(move |result| {
                if let Some(proxy) = ServiceProxy::upgrade(&weak) {
                    proxy.on_subscribe_response(result, renewal);
                }
            }),
        );
        self.inner.subscription.borrow_mut().in_flight = Some(handle);
    }

    fn on_subscribe_response(
        &self,
        result: Result<HttpResponse, TransportError>,
        renewal: bool,
    ) {
        let desired = {
            let mut sub = self.inner.subscription.borrow_mut();
            sub.in_flight = None;
            // Never leave a stale SID around while the outcome is decided.
            sub.subscription_id = None;
            sub.desired
        };

        let requested = self.inner.config.requested_timeout();
        let outcome = match result {
            Ok(response) if response.is_success() => match response.header(headers::SID) {
                Some(sid) => Ok((
                    sid.to_string(),
                    parse_timeout_header(response.header(headers::TIMEOUT), requested),
                )),
                None => Err(SubscriptionLost {
                    kind: SubscriptionLostKind::SubscriptionLost,
                    status: Some(response.status),
                    message: "No SID in SUBSCRIBE response".to_string(),
                }),
            },
            Ok(response) => Err(SubscriptionLost {
                kind: SubscriptionLostKind::SubscriptionFailed,
                status: Some(response.status),
                message: response.reason_phrase(),
            }),
            Err(err) => Err(SubscriptionLost {
                kind: SubscriptionLostKind::SubscriptionFailed,
                status: None,
                message: err.to_string(),
            }),
        };

        match outcome {
            Ok((sid, granted)) => {
                debug!(%sid, ?granted, renewal, "subscription granted");
                {
                    let mut sub = self.inner.subscription.borrow_mut();
                    sub.subscription_id = Some(sid);
                    if !renewal {
                        sub.sequence = 0;
                    }
                    sub.state = SubscriptionState::Subscribed;
                }

                if desired {
                    self.arm_renewal_timer(granted);
                } else {
                    debug!("unsubscribe was requested while subscribing");
                    self.inner.unsubscribe(false);
                    self.inner.unregister_delivery_path();
                }
            }
            Err(lost) if desired => self.lose_subscription(lost),
            Err(lost) => {
                debug!(%lost, "subscribe failed after unsubscribe was requested");
                let timer = self.inner.subscription.borrow_mut().reset();
                if let Some(timer) = timer {
                    self.inner.transport.cancel_timer(timer);
                }
                self.inner.unregister_delivery_path();
            }
        }
    }

    fn arm_renewal_timer(&self, granted: GrantedTimeout) {
        let GrantedTimeout::Seconds(secs) = granted else {
            debug!("infinite subscription, no renewal scheduled");
            return;
        };

        let delay = renewal_delay(secs, &self.inner.config);
        let weak = self.downgrade();
        let timer = self.inner.transport.schedule_timer(
            delay,
            Box::new(move || {
                if let Some(proxy) = ServiceProxy::upgrade(&weak) {
                    proxy.renew();
                }
            }),
        );

        let previous = self.inner.subscription.borrow_mut().renewal_timer.replace(timer);
        if let Some(previous) = previous {
            self.inner.transport.cancel_timer(previous);
        }
    }

    /// End the subscription because of a failure and tell the listeners
    fn lose_subscription(&self, lost: SubscriptionLost) {
        warn!(%lost, "subscription lost");
        let timer = {
            let mut sub = self.inner.subscription.borrow_mut();
            sub.desired = false;
            sub.reset()
        };
        if let Some(timer) = timer {
            self.inner.transport.cancel_timer(timer);
        }
        self.inner.unregister_delivery_path();
        self.emit_subscription_lost(&lost);
    }

    /// Report a failure found before anything was sent, from the reactor
    fn fail_subscribe_later(&self, lost: SubscriptionLost) {
        self.inner.subscription.borrow_mut().desired = false;

        let weak = self.downgrade();
        self.inner.transport.schedule_timer(
            Duration::ZERO,
            Box::new(move || {
                if let Some(proxy) = ServiceProxy::upgrade(&weak) {
                    warn!(%lost, "subscription lost");
                    proxy.emit_subscription_lost(&lost);
                }
            }),
        );
    }

    fn register_delivery_path(&self) {
        {
            let mut sub = self.inner.subscription.borrow_mut();
            if sub.handler_registered {
                return;
            }
            sub.handler_registered = true;
        }

        let weak = self.downgrade();
        let handler: PathHandler = std::rc::Rc::new(move |request: &HttpRequest| {
            match ServiceProxy::upgrade(&weak) {
                Some(proxy) => proxy.handle_notify(request),
                None => HttpResponse::new(412),
            }
        });
        self.inner
            .transport
            .register_path_handler(&self.inner.delivery_path, handler);
    }
}

impl ProxyInner {
    /// Send UNSUBSCRIBE for the current SID, if any, and forget the
    /// subscription. `blocking` uses the transport's blocking path.
    pub(crate) fn unsubscribe(&self, blocking: bool) {
        let (sid, timer, in_flight) = {
            let mut sub = self.subscription.borrow_mut();
            let sid = sub.subscription_id.take();
            let timer = sub.reset();
            (sid, timer, sub.in_flight.take())
        };

        if let Some(timer) = timer {
            self.transport.cancel_timer(timer);
        }
        if let Some(request) = in_flight {
            self.transport.cancel_request(request);
        }

        let (Some(sid), Some(event_url)) = (sid, self.endpoint.event_subscription_url()) else {
            return;
        };

        let request = match unsubscribe_request(event_url, &sid) {
            Ok(request) => request,
            Err(err) => {
                error!(%sid, error = %err, "cannot build UNSUBSCRIBE");
                return;
            }
        };

        debug!(%sid, blocking, "unsubscribing");
        if blocking {
            match self.transport.send_blocking(request) {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    warn!(%sid, status = response.status, "UNSUBSCRIBE rejected")
                }
                Err(err) => error!(%sid, error = %err, "failed to unsubscribe"),
            }
        } else {
            self.transport.submit_request(
                request,
                Box::new(move |result| match result {
                    Ok(response) if response.is_success() => {}
                    Ok(response) => {
                        warn!(%sid, status = response.status, "UNSUBSCRIBE rejected")
                    }
                    Err(err) => warn!(%sid, error = %err, "failed to unsubscribe"),
                }),
            );
        }
    }

    pub(crate) fn unregister_delivery_path(&self) {
        let registered = std::mem::replace(
            &mut self.subscription.borrow_mut().handler_registered,
            false,
        );
        if registered {
            self.transport.unregister_path_handler(&self.delivery_path);
        }
    }
}

fn subscribe_request(
    event_url: &Url,
    delivery_url: &str,
    requested: Option<u32>,
) -> Result<HttpRequest, TransportError> {
    let mut request = HttpRequest::new("SUBSCRIBE", event_url.as_str());
    request.set_header(headers::CALLBACK, &format!("<{delivery_url}>"))?;
    request.set_header(headers::NT, NT_UPNP_EVENT)?;
    request.set_header(headers::TIMEOUT, &timeout_header(requested))?;
    Ok(request)
}

fn renew_request(
    event_url: &Url,
    sid: &str,
    requested: Option<u32>,
) -> Result<HttpRequest, TransportError> {
    let mut request = HttpRequest::new("SUBSCRIBE", event_url.as_str());
    request.set_header(headers::SID, sid)?;
    request.set_header(headers::TIMEOUT, &timeout_header(requested))?;
    Ok(request)
}

fn unsubscribe_request(event_url: &Url, sid: &str) -> Result<HttpRequest, TransportError> {
    let mut request = HttpRequest::new("UNSUBSCRIBE", event_url.as_str());
    request.set_header(headers::SID, sid)?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_sequence_wraps_to_one() {
        let mut sub = Subscription::new();
        sub.sequence = i32::MAX as u32;

        assert_eq!(sub.check_sequence(i32::MAX as u32), SequenceCheck::InOrder);
        sub.advance_sequence();
        assert_eq!(sub.sequence, 1);
    }

    #[test]
    fn test_sequence_gap_detection() {
        let mut sub = Subscription::new();
        sub.sequence = 5;
        assert_eq!(sub.check_sequence(5), SequenceCheck::InOrder);
        assert_eq!(sub.check_sequence(3), SequenceCheck::InOrder);
        assert_eq!(sub.check_sequence(7), SequenceCheck::Gap);
    }

    #[rstest]
    #[case(Some("Second-1800"), GrantedTimeout::Seconds(1800))]
    #[case(Some("second-300"), GrantedTimeout::Seconds(300))]
    #[case(Some("Second- 42 "), GrantedTimeout::Seconds(42))]
    #[case(Some("infinite"), GrantedTimeout::Infinite)]
    #[case(Some("INFINITE"), GrantedTimeout::Infinite)]
    #[case(Some("Second--5"), GrantedTimeout::Seconds(1800))]
    #[case(Some("Second-0"), GrantedTimeout::Seconds(1800))]
    #[case(Some("forever"), GrantedTimeout::Seconds(1800))]
    #[case(None, GrantedTimeout::Seconds(3600))]
    fn test_parse_timeout_header(#[case] header: Option<&str>, #[case] expected: GrantedTimeout) {
        assert_eq!(parse_timeout_header(header, Some(3600)), expected);
    }

    #[test]
    fn test_missing_timeout_with_infinite_request() {
        assert_eq!(parse_timeout_header(None, None), GrantedTimeout::Infinite);
    }

    #[test]
    fn test_timeout_header() {
        assert_eq!(timeout_header(Some(1800)), "Second-1800");
        assert_eq!(timeout_header(None), "infinite");
    }

    #[test]
    fn test_renewal_delay_has_margin() {
        let config = ProxyConfig::default();
        assert_eq!(renewal_delay(1800, &config), Duration::from_secs(1620));
        assert!(renewal_delay(1, &config) < Duration::from_secs(1));
    }

    #[test]
    fn test_subscribe_request_headers() {
        let url = Url::parse("http://10.0.0.5:1400/MediaRenderer/RenderingControl/Event").unwrap();
        let request = subscribe_request(&url, "http://10.0.0.2:3400/gena/abc", Some(1800)).unwrap();

        assert_eq!(request.method, "SUBSCRIBE");
        assert_eq!(request.header("Callback"), Some("<http://10.0.0.2:3400/gena/abc>"));
        assert_eq!(request.header("NT"), Some("upnp:event"));
        assert_eq!(request.header("Timeout"), Some("Second-1800"));
        assert_eq!(request.header("SID"), None);

        let renewal = renew_request(&url, "uuid:sub-1", None).unwrap();
        assert_eq!(renewal.header("SID"), Some("uuid:sub-1"));
        assert_eq!(renewal.header("Timeout"), Some("infinite"));
        assert_eq!(renewal.header("Callback"), None);
        assert_eq!(renewal.header("NT"), None);
    }
}
