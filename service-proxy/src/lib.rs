//! # upnp-service-proxy
//!
//! Control-point side of a remote UPnP service: SOAP action invocation and
//! GENA event subscriptions, on a single-threaded reactor.
//!
//! A [`ServiceProxy`] is bound to one [`ServiceEndpoint`] and drives a
//! [`Transport`]. Actions are asynchronous: [`ServiceProxy::begin_action`]
//! returns a handle and the completion callback collects the result with
//! [`ServiceProxy::end_action`]. Subscribing with
//! [`ServiceProxy::set_subscribed`] keeps the subscription renewed, checks
//! every inbound NOTIFY against the granted SID and expected sequence
//! number, and fans changed state variables out to the callbacks added with
//! [`ServiceProxy::add_notify`].
//!
//! ```no_run
//! use std::rc::Rc;
//! use service_proxy::{
//!     Argument, HttpTransport, HttpTransportConfig, OutArgument, ProxyConfig, ServiceEndpoint,
//!     ServiceProxy, Transport, ValueType,
//! };
//!
//! # async fn run() -> service_proxy::Result<()> {
//! let transport = HttpTransport::start(HttpTransportConfig::default()).await?;
//! let endpoint = ServiceEndpoint::new("urn:schemas-upnp-org:service:RenderingControl:1", "uuid:RINCON_1")
//!     .with_control_url("http://192.168.1.100:1400/MediaRenderer/RenderingControl/Control")?
//!     .with_event_subscription_url("http://192.168.1.100:1400/MediaRenderer/RenderingControl/Event")?;
//! let proxy = ServiceProxy::new(endpoint, transport as Rc<dyn Transport>, ProxyConfig::default())?;
//!
//! proxy.begin_action(
//!     "GetVolume",
//!     &[Argument::new("InstanceID", 0u32), Argument::new("Channel", "Master")],
//!     |proxy, handle| match proxy.end_action(handle, &[OutArgument::new("CurrentVolume", ValueType::UInt)]) {
//!         Ok(values) => println!("{values:?}"),
//!         Err(e) => eprintln!("GetVolume failed: {e}"),
//!     },
//! );
//!
//! proxy.add_notify("Volume", ValueType::String, |_, variable, value| {
//!     println!("{variable} = {value:?}");
//! })?;
//! proxy.set_subscribed(true);
//! # Ok(())
//! # }
//! ```

mod action;
mod callbacks;
mod config;
mod endpoint;
mod error;
pub mod logging;
mod notify;
mod proxy;
mod subscription;
pub mod transport;

pub use action::{ActionCallback, ActionHandle};
pub use callbacks::ListenerId;
pub use config::{
    HttpTransportConfig, ProxyConfig, DEFAULT_SUBSCRIPTION_TIMEOUT, MAX_SUBSCRIPTION_TIMEOUT,
    MIN_SUBSCRIPTION_TIMEOUT,
};
pub use endpoint::ServiceEndpoint;
pub use error::{ProxyError, Result, ServerErrorKind, SubscriptionLost, SubscriptionLostKind};
pub use proxy::ServiceProxy;
pub use subscription::SubscriptionState;
pub use transport::{
    HttpRequest, HttpResponse, PathHandler, RequestHandle, ResponseCallback, TimerCallback,
    TimerHandle, Transport, TransportError,
};

#[cfg(feature = "http")]
pub use transport::http_transport::HttpTransport;

pub use soap_client::{Argument, ControlErrorKind, OutArgument, TypedValue, ValueType};
