//! Inverse proxy: viewers ("fronts") reach named sources ("backs") that
//! dialed in and registered with a token.
//!
//! ```text
//!  viewer --front--> Forwarder --back--> source agent (ServerSession)
//!                       |
//!        registry: name -> back connection
//!        back forwards:  back cseq  -> (front, front cseq, front Session)
//!        front forwards: front cseq -> (back, back cseq)
//!        media routes:   (back, media session) -> front
//! ```
//!
//! A front addresses a source by the first `/` segment of the request URI.
//! Every session is owned by the [`Forwarder`] and referred to by
//! [`ConnectionId`], so tearing one down never leaves dangling references:
//! lookups of a closed connection simply miss.

mod back;
mod forwarder;
mod front;

use std::collections::BTreeMap;
use std::fmt;

use crate::protocol::{Request, Response};

pub use back::{BackSession, MediaRoute};
pub use forwarder::Forwarder;
pub use front::FrontSession;

/// Proxy-local handle of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which listener a connection came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
}

/// Static proxy configuration: which sources may register, with which
/// token, and the token viewers must present (if any).
#[derive(Debug, Clone, Default)]
pub struct ForwardContext {
    sources: BTreeMap<String, String>,
    viewer_token: Option<String>,
}

impl ForwardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, name: &str, token: &str) -> Self {
        self.add_source(name, token);
        self
    }

    pub fn with_viewer_token(mut self, token: &str) -> Self {
        self.viewer_token = Some(token.to_string());
        self
    }

    pub fn add_source(&mut self, name: &str, token: &str) {
        self.sources.insert(name.to_string(), token.to_string());
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn source_token(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// 401/403 for a front request lacking the viewer token.
    pub(crate) fn check_viewer(&self, request: &Request) -> Option<Response> {
        let expected = self.viewer_token.as_deref()?;
        match request.bearer_token() {
            Some(token) if token == expected => None,
            None => Some(Response::unauthorized().reply_to(request)),
            Some(_) => Some(Response::forbidden().reply_to(request)),
        }
    }
}

/// Split a front URI into source name and the URI the source sees.
/// `cam1/main` gives `("cam1", "main")`; a bare name addresses `*`.
pub fn split_source_uri(uri: &str) -> (&str, &str) {
    match uri.split_once('/') {
        Some((name, rest)) if !rest.is_empty() => (name, rest),
        Some((name, _)) => (name, "*"),
        None => (uri, "*"),
    }
}

/// Inverse of [`split_source_uri`], for requests travelling back to fronts.
pub fn join_source_uri(name: &str, inner: &str) -> String {
    if inner == "*" {
        name.to_string()
    } else {
        format!("{name}/{inner}")
    }
}
