//! Path routing for inbound callback requests.
//!
//! The [`PathRouter`] holds the set of delivery paths that currently have a
//! handler. Requests for a registered path are forwarded, together with a
//! one-shot reply slot, to whoever owns the receiving end of the channel.
//! The HTTP layer never runs handler logic itself.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use warp::http::HeaderMap;

/// An inbound HTTP request on a registered callback path
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// Request method, e.g. `NOTIFY`
    pub method: String,
    /// Request path without the query string
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The reply produced for a [`CallbackRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CallbackResponse {
    /// A response with a status code and nothing else
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// A routed request waiting for its reply.
///
/// Dropping it without calling [`PendingCallback::respond`] makes the server
/// answer `500 Internal Server Error`.
#[derive(Debug)]
pub struct PendingCallback {
    pub request: CallbackRequest,
    reply: oneshot::Sender<CallbackResponse>,
}

impl PendingCallback {
    /// Send the reply back to the HTTP layer
    pub fn respond(self, response: CallbackResponse) {
        // The client may have hung up already.
        let _ = self.reply.send(response);
    }

    pub fn into_parts(self) -> (CallbackRequest, oneshot::Sender<CallbackResponse>) {
        (self.request, self.reply)
    }
}

/// Routes requests from the HTTP listener to a channel.
#[derive(Clone)]
pub struct PathRouter {
    /// Paths with a live handler
    paths: Arc<RwLock<HashSet<String>>>,
    sender: mpsc::UnboundedSender<PendingCallback>,
}

impl PathRouter {
    /// Create a router forwarding to `sender`.
    ///
    /// # Example
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use callback_server::router::{PathRouter, PendingCallback};
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<PendingCallback>();
    /// let router = PathRouter::new(tx);
    /// router.register("/gena/1");
    /// assert!(router.is_registered("/gena/1"));
    /// ```
    pub fn new(sender: mpsc::UnboundedSender<PendingCallback>) -> Self {
        Self {
            paths: Arc::new(RwLock::new(HashSet::new())),
            sender,
        }
    }

    /// Start accepting requests for `path`. Returns `false` if it was
    /// already registered.
    pub fn register(&self, path: impl Into<String>) -> bool {
        self.paths.write().insert(path.into())
    }

    /// Stop accepting requests for `path`. Returns `false` if it was not
    /// registered.
    pub fn unregister(&self, path: &str) -> bool {
        self.paths.write().remove(path)
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.paths.read().contains(path)
    }

    /// Forward `request` if its path is registered.
    ///
    /// Returns `None` for unknown paths. Otherwise the returned receiver
    /// resolves to the handler's reply, or errors if the handler side went
    /// away without answering.
    pub fn route(&self, request: CallbackRequest) -> Option<oneshot::Receiver<CallbackResponse>> {
        if !self.is_registered(&request.path) {
            return None;
        }

        let (reply, receiver) = oneshot::channel();
        // A closed channel drops the reply sender, which the caller observes
        // as a receive error.
        let _ = self.sender.send(PendingCallback { request, reply });
        Some(receiver)
    }
}
