//! The service proxy: one remote UPnP service as seen by a control point.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::action::ActionTable;
use crate::callbacks::{CallbackList, ListenerId};
use crate::config::ProxyConfig;
use crate::endpoint::ServiceEndpoint;
use crate::error::{ProxyError, Result, SubscriptionLost};
use crate::notify::NotifyRegistry;
use crate::subscription::Subscription;
use crate::transport::Transport;

pub(crate) type SubscriptionLostCallback = dyn Fn(&ServiceProxy, &SubscriptionLost);

/// A handle to one remote service.
///
/// Invokes actions on the service's control URL and keeps a GENA event
/// subscription on its event URL. Cloning is cheap and yields another handle
/// to the same proxy; the proxy is torn down when the last handle is
/// dropped.
///
/// A proxy is tied to the thread of its [`Transport`]: every callback it
/// runs is delivered on that thread, from the transport's reactor.
///
/// # Teardown
///
/// Dropping the last handle cancels every pending action (their callbacks
/// never run) and, when subscribed, sends UNSUBSCRIBE through
/// [`Transport::send_blocking`] before returning.
#[derive(Clone)]
pub struct ServiceProxy {
    pub(crate) inner: Rc<ProxyInner>,
}

pub(crate) struct ProxyInner {
    pub(crate) endpoint: ServiceEndpoint,
    pub(crate) config: ProxyConfig,
    pub(crate) transport: Rc<dyn Transport>,
    /// Path NOTIFY requests for this proxy are delivered to
    pub(crate) delivery_path: String,
    pub(crate) actions: RefCell<ActionTable>,
    pub(crate) subscription: RefCell<Subscription>,
    pub(crate) notify: RefCell<NotifyRegistry>,
    pub(crate) lost_listeners: RefCell<CallbackList<SubscriptionLostCallback>>,
}

impl ServiceProxy {
    /// Create a proxy for `endpoint` on top of `transport`.
    ///
    /// Fails with [`ProxyError::InvalidConfig`] if `config` is invalid.
    pub fn new(
        endpoint: ServiceEndpoint,
        transport: Rc<dyn Transport>,
        config: ProxyConfig,
    ) -> Result<Self> {
        config.validate()?;

        let delivery_path = format!(
            "{}{}",
            config.delivery_path_prefix,
            Uuid::new_v4().simple()
        );

        debug!(
            service_type = endpoint.service_type(),
            udn = endpoint.udn(),
            %delivery_path,
            "created service proxy"
        );

        Ok(Self {
            inner: Rc::new(ProxyInner {
                endpoint,
                config,
                transport,
                delivery_path,
                actions: RefCell::new(ActionTable::new()),
                subscription: RefCell::new(Subscription::new()),
                notify: RefCell::new(NotifyRegistry::new()),
                lost_listeners: RefCell::new(CallbackList::new()),
            }),
        })
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.inner.config
    }

    /// Path on the transport's server that receives this proxy's NOTIFYs
    pub fn delivery_path(&self) -> &str {
        &self.inner.delivery_path
    }

    /// Full URL sent in the SUBSCRIBE `Callback` header
    pub fn delivery_url(&self) -> String {
        format!(
            "{}{}",
            self.inner.transport.server_url(),
            self.inner.delivery_path
        )
    }

    /// Call `callback` whenever the subscription ends because of a failure.
    ///
    /// Listeners run in connection order. An explicit
    /// `set_subscribed(false)` never triggers them.
    pub fn connect_subscription_lost(
        &self,
        callback: impl Fn(&ServiceProxy, &SubscriptionLost) + 'static,
    ) -> ListenerId {
        self.inner
            .lost_listeners
            .borrow_mut()
            .add(Rc::new(callback))
    }

    pub fn disconnect_subscription_lost(&self, id: ListenerId) -> Result<()> {
        if self.inner.lost_listeners.borrow_mut().remove(id) {
            Ok(())
        } else {
            Err(ProxyError::UnknownListener)
        }
    }

    pub(crate) fn emit_subscription_lost(&self, lost: &SubscriptionLost) {
        let listeners = self.inner.lost_listeners.borrow().snapshot();
        for listener in listeners {
            listener(self, lost);
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ProxyInner>) -> Option<ServiceProxy> {
        weak.upgrade().map(|inner| ServiceProxy { inner })
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("service_type", &self.inner.endpoint.service_type())
            .field("udn", &self.inner.endpoint.udn())
            .field("delivery_path", &self.inner.delivery_path)
            .field("subscription_state", &self.subscription_state())
            .finish()
    }
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        // Pending actions go first; the UNSUBSCRIBE below still needs the
        // transport.
        let canceled = self.actions.get_mut().cancel_all(self.transport.as_ref());
        if canceled > 0 {
            debug!(canceled, "canceled pending actions on teardown");
        }

        self.unsubscribe(true);
        self.unregister_delivery_path();
    }
}
