//! HTTP listener for callback requests.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use warp::http::{HeaderMap, Method, Response, StatusCode};
use warp::Filter;

use crate::error::CallbackServerError;
use crate::router::{CallbackRequest, CallbackResponse, PathRouter, PendingCallback};

/// HTTP server that receives GENA NOTIFY requests for registered paths.
///
/// The server binds the first free port in a range, accepts requests of any
/// method, and forwards those whose path is registered with its
/// [`PathRouter`]. Unregistered paths are answered with `404 Not Found`.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackResponse, CallbackServer};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel();
///
///     let server = CallbackServer::new((3400, 3500), tx)
///         .await
///         .expect("Failed to create callback server");
///     server.router().register("/gena/rendering");
///
///     println!("Deliver events to {}/gena/rendering", server.base_url());
///
///     while let Some(pending) = rx.recv().await {
///         pending.respond(CallbackResponse::status(200));
///     }
/// }
/// ```
pub struct CallbackServer {
    port: u16,
    /// Address peers should use to reach this server, without a trailing slash
    base_url: String,
    router: PathRouter,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Start a server on the first free port in `port_range`, advertising
    /// the address of the interface used for outbound traffic.
    pub async fn new(
        port_range: (u16, u16),
        sender: mpsc::UnboundedSender<PendingCallback>,
    ) -> Result<Self, CallbackServerError> {
        Self::with_advertised_ip(port_range, None, sender).await
    }

    /// Start a server, advertising `advertised_ip` when given instead of the
    /// detected local address.
    pub async fn with_advertised_ip(
        port_range: (u16, u16),
        advertised_ip: Option<IpAddr>,
        sender: mpsc::UnboundedSender<PendingCallback>,
    ) -> Result<Self, CallbackServerError> {
        let local_ip = match advertised_ip {
            Some(ip) => ip,
            None => Self::detect_local_ip().ok_or(CallbackServerError::LocalIpUnavailable)?,
        };

        let router = PathRouter::new(sender);
        let route_state = router.clone();
        let routes = warp::method()
            .and(warp::path::full())
            .and(warp::header::headers_cloned())
            .and(warp::body::bytes())
            .and(warp::any().map(move || route_state.clone()))
            .and_then(handle_callback)
            .recover(handle_rejection);

        let (start, end) = port_range;
        for port in start..=end {
            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);

            let bound = warp::serve(routes.clone()).try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.await;
            });

            match bound {
                Ok((addr, server)) => {
                    let base_url = format!("http://{local_ip}:{port}");
                    info!(%addr, %base_url, "callback server listening");

                    return Ok(Self {
                        port,
                        base_url,
                        router,
                        shutdown_tx: Some(shutdown_tx),
                        server_handle: Some(tokio::spawn(server)),
                    });
                }
                Err(e) => debug!(port, error = %e, "port unavailable"),
            }
        }

        Err(CallbackServerError::NoAvailablePort { start, end })
    }

    /// Base URL for callback registration, e.g. `http://192.168.1.10:3400`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> &PathRouter {
        &self.router
    }

    /// Stop accepting requests and wait for the server task to finish
    pub async fn shutdown(mut self) -> Result<(), CallbackServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| CallbackServerError::Shutdown(e.to_string()))?;
        }

        info!(port = self.port, "callback server stopped");
        Ok(())
    }

    /// Detect the local IP address for callback URLs.
    ///
    /// Connecting a UDP socket sends nothing; it only makes the OS pick the
    /// interface it would route through.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_callback(
    method: Method,
    path: warp::path::FullPath,
    headers: HeaderMap,
    body: Bytes,
    router: PathRouter,
) -> Result<Response<Vec<u8>>, warp::Rejection> {
    debug!(%method, path = path.as_str(), body_len = body.len(), "incoming callback request");

    let request = CallbackRequest {
        method: method.as_str().to_string(),
        path: path.as_str().to_string(),
        headers,
        body,
    };

    let Some(reply) = router.route(request) else {
        debug!(path = path.as_str(), "no handler for callback path");
        return Ok(status_only(StatusCode::NOT_FOUND));
    };

    match reply.await {
        Ok(response) => Ok(into_http_response(response)),
        Err(_) => {
            warn!(path = path.as_str(), "callback handler dropped the request");
            Ok(status_only(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn status_only(status: StatusCode) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = status;
    response
}

fn into_http_response(response: CallbackResponse) -> Response<Vec<u8>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder.body(response.body).unwrap_or_else(|e| {
        warn!(error = %e, "invalid callback response");
        status_only(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

/// Turn rejections (unreadable bodies and the like) into plain responses.
async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        debug!(?err, "rejected callback request");
        (StatusCode::BAD_REQUEST, "Bad request")
    };

    Ok(warp::reply::with_status(message, code))
}
