//! WEBRTSP session state (one per connection).
//!
//! A [`Session`] is the correlation engine every role builds on. It:
//!
//! - Allocates CSeq values for outgoing requests (monotonic from 1).
//! - Remembers each sent request until its response arrives, so a response
//!   can be matched to the method and URI it answers, regardless of order.
//! - Queues outgoing messages. The owner drains them with
//!   [`poll_write`](Session::poll_write) and puts them on the wire.
//!
//! [`ServerSession`](server::ServerSession) and
//! [`ClientSession`](client::ClientSession) implement [`MethodHandler`] on
//! top of it. The proxy's front and back sessions wrap one directly and are
//! routed by the [`Forwarder`](crate::proxy::Forwarder).
//!
//! ## Connection lifecycle
//!
//! ```text
//! bytes -> handle_message -> on_<method>_request / on_<method>_response
//!                                  |
//!                 send_request / send_response -> poll_write -> bytes
//! Err from any hook -> owner calls disconnect() -> Outgoing::Disconnect
//! ```

pub mod client;
pub mod handler;
pub mod media;
pub mod server;

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, WebRtspError};
use crate::peer::IceServers;
use crate::protocol::{CSeq, Method, Request, Response};

pub use handler::MethodHandler;
pub use media::{MediaSession, MediaSessionKind, MediaState};

/// Something the session wants the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Request(Request),
    Response(Response),
    /// Close the connection. Always the last item a session produces.
    Disconnect,
}

impl Outgoing {
    /// Wire bytes, or `None` for [`Outgoing::Disconnect`].
    pub fn serialize(&self) -> Option<Vec<u8>> {
        match self {
            Outgoing::Request(request) => Some(request.serialize()),
            Outgoing::Response(response) => Some(response.serialize()),
            Outgoing::Disconnect => None,
        }
    }
}

/// Per-connection correlation engine.
#[derive(Debug)]
pub struct Session {
    next_cseq: CSeq,
    outstanding: HashMap<CSeq, Request>,
    write_outs: VecDeque<Outgoing>,
    ice_servers: IceServers,
    closed: bool,
}

impl Session {
    pub fn new() -> Self {
        Session {
            next_cseq: 1,
            outstanding: HashMap::new(),
            write_outs: VecDeque::new(),
            ice_servers: IceServers::new(),
            closed: false,
        }
    }

    pub fn with_ice_servers(ice_servers: IceServers) -> Self {
        Session {
            ice_servers,
            ..Self::new()
        }
    }

    pub fn ice_servers(&self) -> &IceServers {
        &self.ice_servers
    }

    pub fn set_ice_servers(&mut self, ice_servers: IceServers) {
        self.ice_servers = ice_servers;
    }

    fn allocate_cseq(&mut self) -> CSeq {
        loop {
            let cseq = self.next_cseq;
            self.next_cseq = self.next_cseq.checked_add(1).unwrap_or(1);
            if cseq != 0 && !self.outstanding.contains_key(&cseq) {
                return cseq;
            }
        }
    }

    /// Build a request carrying a freshly allocated CSeq and, if given, the
    /// `Session` header. It is tracked once passed to [`send_request`](Self::send_request).
    pub fn create_request(&mut self, method: Method, uri: &str, media_session: Option<&str>) -> Request {
        let mut request = Request::new(method, uri);
        request.cseq = self.allocate_cseq();
        if let Some(id) = media_session {
            request.set_media_session(id);
        }
        request
    }

    /// Track `request` as outstanding and queue it. Returns its CSeq.
    pub fn send_request(&mut self, request: Request) -> CSeq {
        let cseq = request.cseq;
        if self.closed {
            tracing::trace!(cseq, method = %request.method, "dropping request on closed session");
            return cseq;
        }
        tracing::debug!(cseq, method = %request.method, uri = %request.uri, "request out");
        self.outstanding.insert(cseq, request.clone());
        self.write_outs.push_back(Outgoing::Request(request));
        cseq
    }

    pub fn send_response(&mut self, response: Response) {
        if self.closed {
            tracing::trace!(cseq = response.cseq, "dropping response on closed session");
            return;
        }
        tracing::debug!(cseq = response.cseq, status = response.status_code, "response out");
        self.write_outs.push_back(Outgoing::Response(response));
    }

    /// Keepalive: `GET_PARAMETER *` without a body.
    pub fn send_ping(&mut self) -> CSeq {
        let request = self.create_request(Method::GetParameter, "*", None);
        self.send_request(request)
    }

    /// Remove and return the request answered by `cseq`. Each CSeq can be
    /// taken once; a second response for it is a protocol error.
    pub fn take_outstanding(&mut self, cseq: CSeq) -> Result<Request> {
        self.outstanding
            .remove(&cseq)
            .ok_or(WebRtspError::UnknownCSeq(cseq))
    }

    pub fn is_outstanding(&self, cseq: CSeq) -> bool {
        self.outstanding.contains_key(&cseq)
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Terminal and idempotent: queues one [`Outgoing::Disconnect`] and
    /// drops everything sent afterwards.
    pub fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        tracing::debug!(abandoned = self.outstanding.len(), "session disconnect");
        self.closed = true;
        self.outstanding.clear();
        self.write_outs.push_back(Outgoing::Disconnect);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next queued message, in the order it was sent.
    pub fn poll_write(&mut self) -> Option<Outgoing> {
        self.write_outs.pop_front()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
