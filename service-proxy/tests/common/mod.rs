//! Scripted in-memory transport for driving a proxy by hand.
//!
//! Nothing completes on its own: tests complete requests, fire timers and
//! deliver inbound requests explicitly. Canceled requests keep their
//! callback so a test can play a network that completes anyway.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use service_proxy::{
    HttpRequest, HttpResponse, PathHandler, ProxyConfig, RequestHandle, ResponseCallback,
    ServiceEndpoint, ServiceProxy, TimerCallback, TimerHandle, Transport, TransportError,
};

pub const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
pub const CONTROL_URL: &str = "http://192.168.1.100:1400/MediaRenderer/RenderingControl/Control";
pub const EVENT_URL: &str = "http://192.168.1.100:1400/MediaRenderer/RenderingControl/Event";
pub const SERVER_URL: &str = "http://192.168.1.50:3400";

struct Submitted {
    handle: RequestHandle,
    request: HttpRequest,
    callback: Option<ResponseCallback>,
    canceled: bool,
}

struct Timer {
    handle: TimerHandle,
    delay: Duration,
    callback: Option<TimerCallback>,
    canceled: bool,
}

#[derive(Default)]
pub struct MockTransport {
    next_id: Cell<u64>,
    submitted: RefCell<Vec<Submitted>>,
    blocking: RefCell<Vec<HttpRequest>>,
    blocking_responses: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    handlers: RefCell<HashMap<String, PathHandler>>,
    timers: RefCell<Vec<Timer>>,
}

impl MockTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Every request passed to `submit_request`, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.submitted
            .borrow()
            .iter()
            .map(|s| s.request.clone())
            .collect()
    }

    pub fn methods(&self) -> Vec<String> {
        self.submitted
            .borrow()
            .iter()
            .map(|s| s.request.method.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.submitted.borrow().len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.submitted.borrow().last().map(|s| s.request.clone())
    }

    pub fn was_canceled(&self, index: usize) -> bool {
        self.submitted.borrow()[index].canceled
    }

    /// Complete the request at `index`, canceled or not. Returns `false` if
    /// it was already completed.
    pub fn complete(&self, index: usize, result: Result<HttpResponse, TransportError>) -> bool {
        let callback = self.submitted.borrow_mut()[index].callback.take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    pub fn complete_last(&self, result: Result<HttpResponse, TransportError>) -> bool {
        let index = self.request_count() - 1;
        self.complete(index, result)
    }

    /// Requests sent through `send_blocking`
    pub fn blocking_requests(&self) -> Vec<HttpRequest> {
        self.blocking.borrow().clone()
    }

    /// Queue the answer for the next `send_blocking`; 200 when empty
    pub fn queue_blocking_response(&self, result: Result<HttpResponse, TransportError>) {
        self.blocking_responses.borrow_mut().push_back(result);
    }

    pub fn has_handler(&self, path: &str) -> bool {
        self.handlers.borrow().contains_key(path)
    }

    /// Hand an inbound request to the handler registered for `path`
    pub fn deliver(&self, path: &str, request: &HttpRequest) -> Option<HttpResponse> {
        let handler = self.handlers.borrow().get(path).cloned()?;
        Some(handler(request))
    }

    /// Timers neither fired nor canceled
    pub fn pending_timers(&self) -> Vec<(TimerHandle, Duration)> {
        self.timers
            .borrow()
            .iter()
            .filter(|t| t.callback.is_some() && !t.canceled)
            .map(|t| (t.handle, t.delay))
            .collect()
    }

    /// Fire a timer unless it was canceled or already fired
    pub fn fire_timer(&self, handle: TimerHandle) -> bool {
        let callback = self
            .timers
            .borrow_mut()
            .iter_mut()
            .find(|t| t.handle == handle && !t.canceled)
            .and_then(|t| t.callback.take());
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Fire pending zero-delay timers, including ones they schedule
    pub fn run_zero_timers(&self) -> usize {
        let mut fired = 0;
        loop {
            let due = self
                .pending_timers()
                .into_iter()
                .find(|(_, delay)| delay.is_zero());
            match due {
                Some((handle, _)) => {
                    self.fire_timer(handle);
                    fired += 1;
                }
                None => return fired,
            }
        }
    }
}

impl Transport for MockTransport {
    fn submit_request(&self, request: HttpRequest, on_complete: ResponseCallback) -> RequestHandle {
        let handle = RequestHandle::new(self.allocate_id());
        self.submitted.borrow_mut().push(Submitted {
            handle,
            request,
            callback: Some(on_complete),
            canceled: false,
        });
        handle
    }

    fn send_blocking(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.blocking.borrow_mut().push(request);
        self.blocking_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200)))
    }

    fn cancel_request(&self, handle: RequestHandle) {
        if let Some(submitted) = self
            .submitted
            .borrow_mut()
            .iter_mut()
            .find(|s| s.handle == handle)
        {
            submitted.canceled = true;
        }
    }

    fn register_path_handler(&self, path: &str, handler: PathHandler) {
        self.handlers.borrow_mut().insert(path.to_string(), handler);
    }

    fn unregister_path_handler(&self, path: &str) {
        self.handlers.borrow_mut().remove(path);
    }

    fn server_url(&self) -> String {
        SERVER_URL.to_string()
    }

    fn schedule_timer(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::new(self.allocate_id());
        self.timers.borrow_mut().push(Timer {
            handle,
            delay,
            callback: Some(on_fire),
            canceled: false,
        });
        handle
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        if let Some(timer) = self
            .timers
            .borrow_mut()
            .iter_mut()
            .find(|t| t.handle == handle)
        {
            timer.canceled = true;
        }
    }
}

pub fn endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new(RENDERING_CONTROL, "uuid:RINCON_000E58A0123401400")
        .with_control_url(CONTROL_URL)
        .unwrap()
        .with_event_subscription_url(EVENT_URL)
        .unwrap()
}

pub fn proxy_with(transport: &Rc<MockTransport>, endpoint: ServiceEndpoint, config: ProxyConfig) -> ServiceProxy {
    ServiceProxy::new(endpoint, transport.clone() as Rc<dyn Transport>, config).unwrap()
}

pub fn proxy(transport: &Rc<MockTransport>) -> ServiceProxy {
    proxy_with(transport, endpoint(), ProxyConfig::default())
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
    let mut response = HttpResponse::new(status);
    for (name, value) in headers {
        response.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    response.body = body.to_vec();
    response
}

pub fn subscribe_ok(sid: &str) -> Result<HttpResponse, TransportError> {
    Ok(response(200, &[("SID", sid), ("TIMEOUT", "Second-1800")], b""))
}

/// Subscribe `proxy` and grant `sid`. Returns the renewal timer.
pub fn subscribe(transport: &MockTransport, proxy: &ServiceProxy, sid: &str) -> TimerHandle {
    proxy.set_subscribed(true);
    assert!(transport.complete_last(subscribe_ok(sid)));
    let timers = transport.pending_timers();
    assert_eq!(timers.len(), 1, "exactly one renewal timer");
    timers[0].0
}

pub fn notify_request(sid: &str, seq: u32, body: &[u8]) -> HttpRequest {
    let mut request = HttpRequest::new("NOTIFY", "/");
    for (name, value) in [
        ("nt", "upnp:event"),
        ("nts", "upnp:propchange"),
        ("sid", sid),
    ] {
        request.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    request
        .headers
        .insert(HeaderName::from_static("seq"), HeaderValue::from(seq));
    request.body = body.to_vec();
    request
}

/// Deliver a NOTIFY to `proxy`'s path and return the status
pub fn notify(transport: &MockTransport, proxy: &ServiceProxy, sid: &str, seq: u32, body: &[u8]) -> u16 {
    let mut request = notify_request(sid, seq, body);
    request.url = proxy.delivery_path().to_string();
    transport
        .deliver(proxy.delivery_path(), &request)
        .expect("delivery path registered")
        .status
}
