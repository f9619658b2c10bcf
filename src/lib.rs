//! Session-authenticated request dispatch.
//!
//! This crate sits between a raw HTTP transport and application route
//! handlers. It authenticates each request via an opaque session token
//! carried in a cookie, routes the built-in session-lifecycle endpoints
//! (`POST /sign-in`, `POST /u/sign-out`), delegates all other requests to
//! handlers supplied by the embedding application, and uniformly turns the
//! outcome into both an HTTP response and one log line per request.
//!
//! The transport stays external: requests arrive as [`http::Request`] values
//! with a buffered body, and responses leave as [`http::Response`] values
//! whose [`ResponseBody`] the transport writes to the socket.
//!
//! # Resolutions
//!
//! Every request produces exactly one [`Resolution`]: content, a served
//! file, a redirect, an error, a method rejection or a protocol upgrade.
//! The resolution is the only place response headers and body are emitted,
//! and it knows how to summarize itself for the log line. Handlers and
//! [`guards`] can exit early by raising an [`Abort`] carrying the error
//! resolution; the dispatcher recovers it at the request boundary.
//!
//! # Sessions
//!
//! The [`SessionStore`] maps opaque 192-bit random tokens to session
//! records under a single lock. Sessions expire lazily after the configured
//! max-age, and stale-but-valid sessions are refreshed with a sliding
//! window so that cookie re-issue and snapshot persistence stay bounded on
//! busy sessions. The [`Controller`] is notified after every mutation and
//! may persist the mapping.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use http::StatusCode;
//! use session_dispatch::{Controller, Dispatcher, Handler, SessionMap, UserIdentity};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Clone)]
//! struct User(String);
//!
//! impl UserIdentity for User {
//!     fn username(&self) -> &str {
//!         &self.0
//!     }
//! }
//!
//! struct App;
//!
//! #[async_trait]
//! impl Controller for App {
//!     type User = User;
//!
//!     fn bind_address(&self) -> String {
//!         "127.0.0.1:8080".to_owned()
//!     }
//!     fn session_cookie_name(&self) -> String {
//!         "id".to_owned()
//!     }
//!     fn session_max_age(&self) -> Duration {
//!         Duration::from_secs(14 * 24 * 60 * 60)
//!     }
//!     async fn login(&self, username: &str, password: &str) -> Option<User> {
//!         (password == "correct").then(|| User(username.to_owned()))
//!     }
//!     fn handler_for(&self, _segments: &[String]) -> Option<Arc<dyn Handler<User>>> {
//!         None
//!     }
//!     fn sessions_changed(&self, _token: &str, _sessions: &SessionMap<User>) {}
//! }
//!
//! # async_std::task::block_on(async {
//! let dispatcher = Dispatcher::new(Arc::new(App)).unwrap();
//!
//! let request = http::Request::builder()
//!     .method(http::Method::POST)
//!     .uri("/sign-in")
//!     .body(b"user=alice&password=correct".to_vec())
//!     .unwrap();
//! let response = dispatcher
//!     .dispatch(request, "127.0.0.1:40000".parse().unwrap())
//!     .await;
//!
//! // Successful sign-in redirects to the user's pages and sets the cookie.
//! assert_eq!(response.status(), StatusCode::SEE_OTHER);
//! assert!(response.headers().contains_key(http::header::SET_COOKIE));
//! # });
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

mod controller;
mod dispatcher;
mod error;
pub mod guards;
mod message;
mod resolution;
mod session;
mod session_store;
mod url;

pub use controller::{Controller, ExpiredSessionPolicy, Handler, UserIdentity};
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use message::{Message, Severity};
pub use resolution::{Abort, Encoding, Outcome, Request, Resolution, Response, ResponseBody};
pub use session::{Session, SessionMap};
pub use session_store::{SessionLookup, SessionPolicy, SessionStore, SessionsChangedCallback};
pub use url::{split_url_path, url_parts_match};
