//! SOAP action invocation.
//!
//! An action is submitted with [`ServiceProxy::begin_action`] and finished
//! from its completion callback with [`ServiceProxy::end_action`]. Devices
//! that reject `POST` with `405 Method Not Allowed` get exactly one retry in
//! the `M-POST` form.

use std::collections::HashMap;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use soap_client::{
    decode_action_response, encode_action_request, is_xml_name, Argument, ControlErrorKind,
    DecodeError, OutArgument, ResponseError, SoapFault, TypedValue,
};
use tracing::{debug, warn};

use crate::error::{ProxyError, Result, ServerErrorKind};
use crate::proxy::ServiceProxy;
use crate::transport::{
    headers, HttpRequest, HttpResponse, RequestHandle, TimerHandle, Transport, TransportError,
    CONTENT_TYPE_XML,
};

/// `Man` header value of the `M-POST` form; `ns=01` matches the
/// `01-SOAPAction` header name.
const MAN_SOAP_ENVELOPE: &str = r#""http://schemas.xmlsoap.org/soap/envelope/"; ns=01"#;

/// Identifies an action started with [`ServiceProxy::begin_action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle(u64);

impl ActionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub type ActionCallback = Box<dyn FnOnce(&ServiceProxy, ActionHandle)>;

enum InFlight {
    Request(RequestHandle),
    /// A failure found before anything was sent, delivered by a zero-delay
    /// timer
    Deferred(TimerHandle),
    Done,
}

struct PendingAction {
    name: String,
    /// The `POST` form, kept for the `M-POST` retry
    request: Option<HttpRequest>,
    in_flight: InFlight,
    retried: bool,
    callback: Option<ActionCallback>,
    outcome: Option<std::result::Result<HttpResponse, ProxyError>>,
}

pub(crate) struct ActionTable {
    next_id: u64,
    pending: HashMap<ActionHandle, PendingAction>,
}

impl ActionTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    fn allocate(&mut self) -> ActionHandle {
        let handle = ActionHandle(self.next_id);
        self.next_id += 1;
        handle
    }

    /// Drop every pending action, canceling whatever is still in flight.
    /// Returns how many actions were dropped.
    pub(crate) fn cancel_all(&mut self, transport: &dyn Transport) -> usize {
        let count = self.pending.len();
        for (_, action) in self.pending.drain() {
            match action.in_flight {
                InFlight::Request(request) => transport.cancel_request(request),
                InFlight::Deferred(timer) => transport.cancel_timer(timer),
                InFlight::Done => {}
            }
        }
        count
    }
}

impl ServiceProxy {
    /// Start invoking `action` with `args`, in that order.
    ///
    /// Returns immediately. `callback` runs once, later, from the
    /// transport's reactor, unless the action is canceled first; it should
    /// call [`end_action`](Self::end_action) to collect the result. Failures
    /// found before sending, such as a missing control URL, are delivered
    /// the same way.
    pub fn begin_action(
        &self,
        action: &str,
        args: &[Argument],
        callback: impl FnOnce(&ServiceProxy, ActionHandle) + 'static,
    ) -> ActionHandle {
        let request = self.build_action_request(action, args);
        let handle = {
            let mut actions = self.inner.actions.borrow_mut();
            let handle = actions.allocate();
            actions.pending.insert(
                handle,
                PendingAction {
                    name: action.to_string(),
                    request: request.as_ref().ok().cloned(),
                    in_flight: InFlight::Done,
                    retried: false,
                    callback: Some(Box::new(callback)),
                    outcome: None,
                },
            );
            handle
        };

        let in_flight = match request {
            Ok(request) => {
                debug!(action, handle = handle.0, url = %request.url, "submitting action");
                InFlight::Request(self.submit_action_request(handle, request))
            }
            Err(error) => {
                debug!(action, %error, "action failed before sending");
                let weak = self.downgrade();
                InFlight::Deferred(self.inner.transport.schedule_timer(
                    Duration::ZERO,
                    Box::new(move || {
                        if let Some(proxy) = ServiceProxy::upgrade(&weak) {
                            proxy.complete_action(handle, Err(error));
                        }
                    }),
                ))
            }
        };

        if let Some(pending) = self.inner.actions.borrow_mut().pending.get_mut(&handle) {
            pending.in_flight = in_flight;
        }
        handle
    }

    /// Collect the result of a completed action, converting each requested
    /// out-argument to its declared type.
    ///
    /// Releases the action; a second call returns
    /// [`ProxyError::UnknownAction`].
    pub fn end_action(
        &self,
        handle: ActionHandle,
        out_args: &[OutArgument],
    ) -> Result<Vec<(String, TypedValue)>> {
        let response = self.take_outcome(handle)??;
        coerce_out_args(map_action_response(&response)?, out_args)
    }

    /// Like [`end_action`](Self::end_action), keyed by argument name
    pub fn end_action_map(
        &self,
        handle: ActionHandle,
        out_args: &[OutArgument],
    ) -> Result<HashMap<String, TypedValue>> {
        Ok(self.end_action(handle, out_args)?.into_iter().collect())
    }

    /// Cancel a pending action. Its callback will not run.
    ///
    /// Canceling an action that already completed, was already canceled or
    /// whose callback is running is an error.
    pub fn cancel_action(&self, handle: ActionHandle) -> Result<()> {
        let action = {
            let mut actions = self.inner.actions.borrow_mut();
            match actions.pending.get(&handle) {
                Some(pending) if pending.callback.is_some() && pending.outcome.is_none() => {
                    actions.pending.remove(&handle)
                }
                _ => None,
            }
        };

        let action = action.ok_or(ProxyError::UnknownAction)?;
        match action.in_flight {
            InFlight::Request(request) => self.inner.transport.cancel_request(request),
            InFlight::Deferred(timer) => self.inner.transport.cancel_timer(timer),
            InFlight::Done => {}
        }

        debug!(action = %action.name, handle = handle.0, "canceled action");
        Ok(())
    }

    /// Invoke `action` and block until it completes.
    ///
    /// Uses the transport's blocking path with the same retry and result
    /// mapping as [`begin_action`](Self::begin_action).
    pub fn send_action(
        &self,
        action: &str,
        args: &[Argument],
        out_args: &[OutArgument],
    ) -> Result<Vec<(String, TypedValue)>> {
        let request = self.build_action_request(action, args)?;
        let transport = &self.inner.transport;

        let mut response = transport.send_blocking(request.clone())?;
        if response.status == 405 {
            debug!(action, "405 Method Not Allowed, retrying with M-POST");
            response = transport.send_blocking(mpost_request(&request))?;
        }

        coerce_out_args(map_action_response(&response)?, out_args)
    }

    fn build_action_request(&self, action: &str, args: &[Argument]) -> Result<HttpRequest> {
        let endpoint = &self.inner.endpoint;
        let control_url = endpoint.control_url().ok_or_else(|| ProxyError::Server {
            kind: ServerErrorKind::InvalidUrl,
            status: None,
            reason: "No valid control URL defined".to_string(),
        })?;

        let names = std::iter::once(action).chain(args.iter().map(|arg| arg.name.as_str()));
        for name in names {
            if !is_xml_name(name) {
                return Err(ProxyError::InvalidName(name.to_string()));
            }
        }

        let mut request = HttpRequest::new("POST", control_url.as_str());
        request.set_header(
            headers::SOAP_ACTION,
            &format!("\"{}#{}\"", endpoint.service_type(), action),
        )?;
        request.set_header(headers::CONTENT_TYPE, CONTENT_TYPE_XML)?;
        if let Some(language) = self.inner.config.accept_language() {
            request.set_header(headers::ACCEPT_LANGUAGE, language)?;
        }
        request.body = encode_action_request(endpoint.service_type(), action, args);
        Ok(request)
    }

    fn submit_action_request(&self, handle: ActionHandle, request: HttpRequest) -> RequestHandle {
        let weak = self.downgrade();
        self.inner.transport.submit_request(
            request,
            Box::new(move |result| {
                if let Some(proxy) = ServiceProxy::upgrade(&weak) {
                    proxy.on_action_response(handle, result);
                }
            }),
        )
    }

    fn on_action_response(
        &self,
        handle: ActionHandle,
        result: std::result::Result<HttpResponse, TransportError>,
    ) {
        let retry = {
            let mut actions = self.inner.actions.borrow_mut();
            let Some(pending) = actions.pending.get_mut(&handle) else {
                // Canceled while the response was on its way.
                return;
            };

            match (&result, &pending.request) {
                (Ok(response), Some(request)) if response.status == 405 && !pending.retried => {
                    pending.retried = true;
                    debug!(action = %pending.name, "405 Method Not Allowed, retrying with M-POST");
                    Some(mpost_request(request))
                }
                _ => None,
            }
        };

        match retry {
            Some(request) => {
                let in_flight = InFlight::Request(self.submit_action_request(handle, request));
                if let Some(pending) = self.inner.actions.borrow_mut().pending.get_mut(&handle) {
                    pending.in_flight = in_flight;
                }
            }
            None => self.complete_action(handle, result.map_err(ProxyError::from)),
        }
    }

    fn complete_action(
        &self,
        handle: ActionHandle,
        outcome: std::result::Result<HttpResponse, ProxyError>,
    ) {
        let callback = {
            let mut actions = self.inner.actions.borrow_mut();
            let Some(pending) = actions.pending.get_mut(&handle) else {
                return;
            };
            pending.in_flight = InFlight::Done;
            pending.outcome = Some(outcome);
            pending.callback.take()
        };

        if let Some(callback) = callback {
            callback(self, handle);
        }

        // Released once the callback returns, whether or not it called
        // end_action.
        self.inner.actions.borrow_mut().pending.remove(&handle);
    }

    fn take_outcome(
        &self,
        handle: ActionHandle,
    ) -> Result<std::result::Result<HttpResponse, ProxyError>> {
        let mut actions = self.inner.actions.borrow_mut();
        let pending = actions
            .pending
            .get_mut(&handle)
            .ok_or(ProxyError::UnknownAction)?;
        let outcome = pending.outcome.take().ok_or(ProxyError::ActionPending)?;
        actions.pending.remove(&handle);
        Ok(outcome)
    }
}

/// The `M-POST` form of an action request
fn mpost_request(request: &HttpRequest) -> HttpRequest {
    let mut retry = request.clone();
    retry.method = "M-POST".to_string();
    if let Some(action) = retry.headers.remove(headers::SOAP_ACTION) {
        retry
            .headers
            .insert(HeaderName::from_static(headers::MPOST_SOAP_ACTION), action);
    }
    retry.headers.insert(
        HeaderName::from_static(headers::MAN),
        HeaderValue::from_static(MAN_SOAP_ENVELOPE),
    );
    retry
}

/// Map a final action response to its out-arguments or an error
pub(crate) fn map_action_response(response: &HttpResponse) -> Result<Vec<(String, String)>> {
    match response.status {
        200 => decode_action_response(&response.body).map_err(|err| match err {
            ResponseError::Fault(fault) => control_error(fault, response),
            ResponseError::Decode(err) => ProxyError::InvalidResponse(err.to_string()),
        }),
        500 => Err(match decode_action_response(&response.body) {
            Err(ResponseError::Fault(fault)) => control_error(fault, response),
            Err(ResponseError::Decode(DecodeError::Xml(_))) => ProxyError::Server {
                kind: ServerErrorKind::InternalServerError,
                status: Some(500),
                reason: response.reason_phrase(),
            },
            Err(ResponseError::Decode(DecodeError::InvalidFault(_))) | Ok(_) => {
                invalid_response("Invalid Fault")
            }
            Err(ResponseError::Decode(_)) => invalid_response("Invalid Envelope"),
        }),
        status => Err(ProxyError::Server {
            kind: ServerErrorKind::from_status(status),
            status: Some(status),
            reason: response.reason_phrase(),
        }),
    }
}

fn invalid_response(reason: &str) -> ProxyError {
    ProxyError::Server {
        kind: ServerErrorKind::InvalidResponse,
        status: Some(500),
        reason: reason.to_string(),
    }
}

fn control_error(fault: SoapFault, response: &HttpResponse) -> ProxyError {
    ProxyError::Control {
        kind: ControlErrorKind::from_code(fault.code),
        code: fault.code,
        description: fault
            .description
            .unwrap_or_else(|| response.reason_phrase()),
    }
}

fn coerce_out_args(
    values: Vec<(String, String)>,
    out_args: &[OutArgument],
) -> Result<Vec<(String, TypedValue)>> {
    out_args
        .iter()
        .map(|wanted| {
            let raw = values
                .iter()
                .find(|(name, _)| *name == wanted.name)
                .map(|(_, value)| value.as_str())
                .ok_or_else(|| {
                    warn!(argument = %wanted.name, "out-argument missing from response");
                    ProxyError::InvalidResponse(format!(
                        "missing out-argument '{}'",
                        wanted.name
                    ))
                })?;
            let value = TypedValue::coerce(raw, wanted.value_type)?;
            Ok((wanted.name.clone(), value))
        })
        .collect()
}
