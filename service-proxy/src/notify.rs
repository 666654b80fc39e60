//! Inbound NOTIFY validation and per-variable fan-out.

use std::collections::HashMap;
use std::rc::Rc;

use soap_client::{decode_notify_body, TypedValue, ValueType};
use tracing::{debug, warn};

use crate::callbacks::{CallbackList, ListenerId};
use crate::error::{ProxyError, Result};
use crate::proxy::ServiceProxy;
use crate::subscription::SequenceCheck;
use crate::transport::{headers, HttpRequest, HttpResponse};

const NT_UPNP_EVENT: &str = "upnp:event";
const NTS_PROPCHANGE: &str = "upnp:propchange";

pub(crate) type NotifyCallback = dyn Fn(&ServiceProxy, &str, &TypedValue);
pub(crate) type RawNotifyCallback = dyn Fn(&ServiceProxy, &[u8]);

struct VariableRegistration {
    value_type: ValueType,
    callbacks: CallbackList<NotifyCallback>,
}

pub(crate) struct NotifyRegistry {
    variables: HashMap<String, VariableRegistration>,
    raw: CallbackList<RawNotifyCallback>,
}

impl NotifyRegistry {
    pub(crate) fn new() -> Self {
        Self {
            variables: HashMap::new(),
            raw: CallbackList::new(),
        }
    }
}

/// Check the GENA headers of an inbound NOTIFY against the current SID.
///
/// Returns the claimed SEQ, or the HTTP status to reject the request with.
pub(crate) fn validate_notify(
    request: &HttpRequest,
    current_sid: Option<&str>,
) -> std::result::Result<u32, u16> {
    if request.method != "NOTIFY" {
        return Err(501);
    }
    if request.header(headers::NT) != Some(NT_UPNP_EVENT) {
        return Err(412);
    }
    if request.header(headers::NTS) != Some(NTS_PROPCHANGE) {
        return Err(412);
    }
    match (request.header(headers::SID), current_sid) {
        (Some(claimed), Some(current)) if claimed == current => {}
        _ => return Err(412),
    }
    request
        .header(headers::SEQ)
        .and_then(|seq| seq.trim().parse::<u32>().ok())
        .ok_or(412)
}

impl ServiceProxy {
    /// Call `callback` with the new value of `variable` on every accepted
    /// NOTIFY that carries it.
    ///
    /// Values are converted to `value_type`. All callbacks of a variable
    /// share one type; registering under a different one fails with
    /// [`ProxyError::TypeMismatch`].
    pub fn add_notify(
        &self,
        variable: &str,
        value_type: ValueType,
        callback: impl Fn(&ServiceProxy, &str, &TypedValue) + 'static,
    ) -> Result<ListenerId> {
        let mut registry = self.inner.notify.borrow_mut();
        let registration = registry
            .variables
            .entry(variable.to_string())
            .or_insert_with(|| VariableRegistration {
                value_type,
                callbacks: CallbackList::new(),
            });

        if registration.value_type != value_type {
            return Err(ProxyError::TypeMismatch(format!(
                "variable '{variable}' is registered as {}, not {value_type}",
                registration.value_type
            )));
        }

        Ok(registration.callbacks.add(Rc::new(callback)))
    }

    pub fn remove_notify(&self, variable: &str, id: ListenerId) -> Result<()> {
        let mut registry = self.inner.notify.borrow_mut();
        let not_found = || ProxyError::NotifyNotFound {
            variable: variable.to_string(),
        };

        let registration = registry.variables.get_mut(variable).ok_or_else(not_found)?;
        if !registration.callbacks.remove(id) {
            return Err(not_found());
        }
        if registration.callbacks.is_empty() {
            registry.variables.remove(variable);
        }
        Ok(())
    }

    /// Call `callback` with the body of every accepted NOTIFY, before the
    /// per-variable callbacks run
    pub fn add_raw_notify(&self, callback: impl Fn(&ServiceProxy, &[u8]) + 'static) -> ListenerId {
        self.inner.notify.borrow_mut().raw.add(Rc::new(callback))
    }

    pub fn remove_raw_notify(&self, id: ListenerId) -> Result<()> {
        if self.inner.notify.borrow_mut().raw.remove(id) {
            Ok(())
        } else {
            Err(ProxyError::UnknownListener)
        }
    }

    /// Path handler body for this proxy's delivery path
    pub(crate) fn handle_notify(&self, request: &HttpRequest) -> HttpResponse {
        let current_sid = self.subscription_id();
        let seq = match validate_notify(request, current_sid.as_deref()) {
            Ok(seq) => seq,
            Err(status) => {
                debug!(
                    status,
                    method = %request.method,
                    sid = request.header(headers::SID),
                    "rejecting NOTIFY"
                );
                return HttpResponse::new(status);
            }
        };

        let (check, desired) = {
            let sub = self.inner.subscription.borrow();
            (sub.check_sequence(seq), sub.desired)
        };
        match check {
            // The pending response runs the queued unsubscribe.
            SequenceCheck::Gap if !desired => {
                debug!(seq, "missed events after unsubscribe was requested, ignoring");
            }
            SequenceCheck::Gap => {
                debug!(seq, expected = self.event_sequence(), "missed events, resubscribing");
                self.resubscribe();
            }
            SequenceCheck::InOrder => {
                self.inner.subscription.borrow_mut().advance_sequence();
                self.dispatch_notify(&request.body);
            }
        }

        HttpResponse::new(200)
    }

    fn dispatch_notify(&self, body: &[u8]) {
        let raw = self.inner.notify.borrow().raw.snapshot();
        for listener in raw {
            listener(self, body);
        }

        let changes = match decode_notify_body(body) {
            Ok(changes) => changes,
            Err(err) => {
                warn!(error = %err, "ignoring unparsable NOTIFY body");
                return;
            }
        };

        for (variable, raw_value) in changes {
            let registered = self
                .inner
                .notify
                .borrow()
                .variables
                .get(&variable)
                .map(|reg| (reg.value_type, reg.callbacks.snapshot()));
            let Some((value_type, callbacks)) = registered else {
                continue;
            };

            let value = match TypedValue::coerce(&raw_value, value_type) {
                Ok(value) => value,
                Err(err) => {
                    warn!(%variable, error = %err, "skipping notification");
                    continue;
                }
            };

            for callback in callbacks {
                callback(self, &variable, &value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn notify(method: &str, nt: Option<&str>, nts: Option<&str>, sid: Option<&str>, seq: Option<&str>) -> HttpRequest {
        let mut request = HttpRequest::new(method, "/gena/abc");
        for (name, value) in [
            (headers::NT, nt),
            (headers::NTS, nts),
            (headers::SID, sid),
            (headers::SEQ, seq),
        ] {
            if let Some(value) = value {
                request.set_header(name, value).unwrap();
            }
        }
        request
    }

    const EVENT: Option<&str> = Some("upnp:event");
    const PROPCHANGE: Option<&str> = Some("upnp:propchange");
    const SID: Option<&str> = Some("uuid:sub-1");

    #[rstest]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, SID, Some("0")), Ok(0))]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, SID, Some(" 12 ")), Ok(12))]
    #[case(notify("POST", EVENT, PROPCHANGE, SID, Some("0")), Err(501))]
    #[case(notify("NOTIFY", None, PROPCHANGE, SID, Some("0")), Err(412))]
    #[case(notify("NOTIFY", Some("upnp:other"), PROPCHANGE, SID, Some("0")), Err(412))]
    #[case(notify("NOTIFY", EVENT, None, SID, Some("0")), Err(412))]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, None, Some("0")), Err(412))]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, Some("uuid:stale"), Some("0")), Err(412))]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, SID, None), Err(412))]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, SID, Some("-1")), Err(412))]
    #[case(notify("NOTIFY", EVENT, PROPCHANGE, SID, Some("seven")), Err(412))]
    fn test_validate_notify(#[case] request: HttpRequest, #[case] expected: std::result::Result<u32, u16>) {
        assert_eq!(validate_notify(&request, Some("uuid:sub-1")), expected);
    }

    #[test]
    fn test_validate_notify_without_subscription() {
        let request = notify("NOTIFY", EVENT, PROPCHANGE, SID, Some("0"));
        assert_eq!(validate_notify(&request, None), Err(412));
    }

    #[test]
    fn test_method_checked_before_headers() {
        let request = notify("GET", None, None, None, None);
        assert_eq!(validate_notify(&request, None), Err(501));
    }
}
