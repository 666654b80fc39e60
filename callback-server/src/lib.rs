//! HTTP callback listener for UPnP event delivery.
//!
//! This crate provides a small warp server that receives GENA NOTIFY
//! requests. It knows nothing about subscriptions or property sets: it only
//! decides whether a request's path has a handler and, if so, hands the
//! request to the owner of a channel together with a one-shot reply slot.
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds the first free port in a range and serves
//!   requests of any method.
//! - [`PathRouter`]: the set of registered delivery paths and the channel
//!   requests are forwarded on.
//! - [`PendingCallback`]: a forwarded request waiting for its
//!   [`CallbackResponse`].
//!
//! Handlers typically run on a single reactor thread that drains the
//! channel, so all subscription state can stay single-threaded while the
//! listener itself runs on the tokio runtime.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackResponse, CallbackServer, PendingCallback};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::CallbackServerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<PendingCallback>();
//!     let server = CallbackServer::new((3400, 3500), tx).await?;
//!     server.router().register("/gena/avtransport");
//!
//!     tokio::spawn(async move {
//!         while let Some(pending) = rx.recv().await {
//!             println!("{} {}", pending.request.method, pending.request.path);
//!             pending.respond(CallbackResponse::status(200));
//!         }
//!     });
//!
//!     server.shutdown().await
//! }
//! ```

mod error;
pub mod router;
mod server;

pub use error::CallbackServerError;
pub use router::{CallbackRequest, CallbackResponse, PathRouter, PendingCallback};
pub use server::CallbackServer;

pub use bytes::Bytes;
