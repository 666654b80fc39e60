//! [`Transport`] over real HTTP on a tokio `LocalSet`.
//!
//! Asynchronous requests go through `reqwest`, the blocking path through
//! `ureq`. Completions and timers are `spawn_local` tasks, so every callback
//! runs on the thread driving the `LocalSet`. Inbound NOTIFY requests are
//! received by a [`CallbackServer`] and handed to the reactor through a
//! channel; the registered [`PathHandler`] answers them there.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

use callback_server::{CallbackRequest, CallbackResponse, CallbackServer, PathRouter, PendingCallback};
use http::header::{HeaderName, HeaderValue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::HttpTransportConfig;
use crate::error::Result;
use crate::transport::{
    HttpRequest, HttpResponse, PathHandler, RequestHandle, ResponseCallback, TimerCallback,
    TimerHandle, Transport, TransportError,
};

type Handlers = Rc<RefCell<HashMap<String, PathHandler>>>;
type Tasks = Rc<RefCell<HashMap<u64, JoinHandle<()>>>>;

/// HTTP transport for service proxies.
///
/// Must be started and used from inside a [`tokio::task::LocalSet`]:
///
/// ```no_run
/// use std::rc::Rc;
/// use service_proxy::{HttpTransport, HttpTransportConfig, ProxyConfig, ServiceEndpoint, ServiceProxy, Transport};
///
/// # async fn run() -> service_proxy::Result<()> {
/// let transport = HttpTransport::start(HttpTransportConfig::default()).await?;
/// let endpoint = ServiceEndpoint::new("urn:schemas-upnp-org:service:RenderingControl:1", "uuid:RINCON_1")
///     .with_control_url("http://192.168.1.100:1400/MediaRenderer/RenderingControl/Control")?;
/// let proxy = ServiceProxy::new(endpoint, transport as Rc<dyn Transport>, ProxyConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub struct HttpTransport {
    client: reqwest::Client,
    agent: ureq::Agent,
    server: CallbackServer,
    router: PathRouter,
    handlers: Handlers,
    tasks: Tasks,
    pump: JoinHandle<()>,
    next_id: Cell<u64>,
}

impl HttpTransport {
    /// Start the callback server and the NOTIFY pump
    pub async fn start(config: HttpTransportConfig) -> Result<Rc<Self>> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                TransportError::Network(format!("Failed to create HTTP client: {e}"))
            })?;

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .build();

        let (tx, rx) = mpsc::unbounded_channel();
        let server = CallbackServer::with_advertised_ip(
            config.callback_port_range,
            config.advertised_ip,
            tx,
        )
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
        let router = server.router().clone();

        let handlers: Handlers = Rc::new(RefCell::new(HashMap::new()));
        let pump = tokio::task::spawn_local(pump_callbacks(rx, Rc::clone(&handlers)));

        debug!(base_url = server.base_url(), "HTTP transport started");

        Ok(Rc::new(Self {
            client,
            agent,
            server,
            router,
            handlers,
            tasks: Rc::new(RefCell::new(HashMap::new())),
            pump,
            next_id: Cell::new(1),
        }))
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn spawn_task(&self, id: u64, task: impl std::future::Future<Output = ()> + 'static) {
        let tasks = Rc::clone(&self.tasks);
        let handle = tokio::task::spawn_local(async move {
            task.await;
            tasks.borrow_mut().remove(&id);
        });
        self.tasks.borrow_mut().insert(id, handle);
    }

    fn abort_task(&self, id: u64) {
        if let Some(handle) = self.tasks.borrow_mut().remove(&id) {
            handle.abort();
        }
    }
}

impl Transport for HttpTransport {
    fn submit_request(&self, request: HttpRequest, on_complete: ResponseCallback) -> RequestHandle {
        let id = self.allocate_id();
        let client = self.client.clone();
        let tasks = Rc::clone(&self.tasks);

        self.spawn_task(id, async move {
            let result = send_async(&client, request).await;
            // Forget the task before the callback so it can submit again.
            tasks.borrow_mut().remove(&id);
            on_complete(result);
        });
        RequestHandle::new(id)
    }

    fn send_blocking(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut call = self.agent.request(&request.method, &request.url);
        for (name, value) in &request.headers {
            let value = value
                .to_str()
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            call = call.set(name.as_str(), value);
        }

        let response = match call.send_bytes(&request.body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => return Err(TransportError::Network(e.to_string())),
        };

        let mut converted = HttpResponse::new(response.status());
        for name in response.headers_names() {
            let (Ok(header), Some(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                response.header(&name).and_then(|v| HeaderValue::from_str(v).ok()),
            ) else {
                continue;
            };
            converted.headers.append(header, value);
        }
        response
            .into_reader()
            .read_to_end(&mut converted.body)
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(converted)
    }

    fn cancel_request(&self, handle: RequestHandle) {
        self.abort_task(handle.id());
    }

    fn register_path_handler(&self, path: &str, handler: PathHandler) {
        self.handlers.borrow_mut().insert(path.to_string(), handler);
        self.router.register(path);
    }

    fn unregister_path_handler(&self, path: &str) {
        self.router.unregister(path);
        self.handlers.borrow_mut().remove(path);
    }

    fn server_url(&self) -> String {
        self.server.base_url().to_string()
    }

    fn schedule_timer(&self, delay: Duration, on_fire: TimerCallback) -> TimerHandle {
        let id = self.allocate_id();
        let tasks = Rc::clone(&self.tasks);

        self.spawn_task(id, async move {
            // A zero delay still yields, so the callback never runs inline.
            tokio::time::sleep(delay).await;
            tasks.borrow_mut().remove(&id);
            on_fire();
        });
        TimerHandle::new(id)
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        self.abort_task(handle.id());
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.pump.abort();
        for (_, task) in self.tasks.borrow_mut().drain() {
            task.abort();
        }
    }
}

async fn send_async(
    client: &reqwest::Client,
    request: HttpRequest,
) -> std::result::Result<HttpResponse, TransportError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

    let response = client
        .request(method, &request.url)
        .headers(request.headers)
        .body(request.body)
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    Ok(HttpResponse {
        status,
        headers,
        body: body.to_vec(),
    })
}

/// Answer inbound requests on the reactor thread
async fn pump_callbacks(mut rx: mpsc::UnboundedReceiver<PendingCallback>, handlers: Handlers) {
    while let Some(pending) = rx.recv().await {
        let (request, reply) = pending.into_parts();
        let handler = handlers.borrow().get(&request.path).cloned();

        let response = match handler {
            Some(handler) => into_callback_response(handler(&into_http_request(request))),
            None => {
                debug!(path = %request.path, "no handler for callback path");
                CallbackResponse::status(404)
            }
        };

        if reply.send(response).is_err() {
            warn!("callback client went away before the reply");
        }
    }
}

fn into_http_request(request: CallbackRequest) -> HttpRequest {
    HttpRequest {
        method: request.method,
        url: request.path,
        headers: request.headers,
        body: request.body.to_vec(),
    }
}

fn into_callback_response(response: HttpResponse) -> CallbackResponse {
    CallbackResponse {
        status: response.status,
        headers: response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
            })
            .collect(),
        body: response.body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_http_request_keeps_path() {
        let mut headers = http::HeaderMap::new();
        headers.insert("sid", HeaderValue::from_static("uuid:sub-1"));
        let request = into_http_request(CallbackRequest {
            method: "NOTIFY".to_string(),
            path: "/gena/abc".to_string(),
            headers,
            body: bytes_body(b"<e:propertyset/>"),
        });

        assert_eq!(request.url, "/gena/abc");
        assert_eq!(request.header("SID"), Some("uuid:sub-1"));
        assert_eq!(request.body, b"<e:propertyset/>");
    }

    #[test]
    fn test_into_callback_response() {
        let mut response = HttpResponse::new(412);
        response
            .headers
            .insert("content-length", HeaderValue::from_static("0"));
        let converted = into_callback_response(response);
        assert_eq!(converted.status, 412);
        assert_eq!(
            converted.headers,
            vec![("content-length".to_string(), "0".to_string())]
        );
    }

    fn bytes_body(body: &'static [u8]) -> callback_server::Bytes {
        callback_server::Bytes::from_static(body)
    }
}
