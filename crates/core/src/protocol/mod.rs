//! WEBRTSP wire protocol.
//!
//! This module handles the text-based signaling protocol: parsing requests
//! and responses, serializing them back, and the small body formats carried
//! inside them. Nothing here does I/O or keeps session state.
//!
//! ## Message format
//!
//! WEBRTSP follows RTSP/1.0 syntax with its own protocol tag and method set:
//!
//! ```text
//! DESCRIBE cam1/main WEBRTSP/0.1\r\n
//! CSeq: 2\r\n
//! Authorization: Bearer 0xdeadbeef\r\n
//! ```
//!
//! Differences from RTSP:
//! - The message boundary is the transport frame (one WebSocket message),
//!   so there is no `Content-Length`.
//! - The header block of a body-less message may end at end of input.
//! - A body is preceded by a blank line and followed by one CRLF.
//!
//! ## Methods
//!
//! | Method | Direction | Purpose |
//! |--------|-----------|---------|
//! | OPTIONS | client → server | Capability discovery (`Public`) |
//! | LIST | client → server | Enumerate streams (`text/list`) |
//! | DESCRIBE | client → server | Request an SDP offer, opens a media session |
//! | SETUP | both | Trickle ICE candidates |
//! | PLAY | client → server | SDP answer, start playback |
//! | RECORD | both | Push an SDP offer toward the other side |
//! | SUBSCRIBE | client → server | Ask the server to RECORD toward us |
//! | TEARDOWN | both | Destroy a media session |
//! | GET_PARAMETER | both | Keepalive ping |
//! | SET_PARAMETER | source → proxy | Source registration |

macro_rules! impl_message_accessors {
    ($ty:ty) => {
        impl $ty {
            /// Case-insensitive header lookup.
            pub fn header(&self, name: &str) -> Option<&str> {
                self.headers.get(name)
            }

            /// The media session this message belongs to (non-empty `Session` header).
            pub fn media_session(&self) -> Option<&str> {
                self.headers
                    .get($crate::protocol::header::SESSION)
                    .filter(|id| !id.is_empty())
            }

            pub fn set_media_session(&mut self, id: &str) {
                self.headers.insert($crate::protocol::header::SESSION, id);
            }

            pub fn content_type(&self) -> Option<&str> {
                self.headers.get($crate::protocol::header::CONTENT_TYPE)
            }

            /// Body as text; WEBRTSP bodies are SDP, parameters or candidates.
            pub fn body_text(&self) -> $crate::error::Result<&str> {
                std::str::from_utf8(&self.body)
                    .map_err(|_| $crate::error::ParseErrorKind::InvalidEncoding.into())
            }
        }
    };
}
pub(crate) use impl_message_accessors;

pub mod headers;
pub mod method;
pub mod params;
pub mod parser;
pub mod request;
pub mod response;

pub use headers::HeaderFields;
pub use method::{Method, Protocol};
pub use parser::is_request;
pub use request::Request;
pub use response::Response;

/// Sequence number correlating a request with its response. 0 is reserved.
pub type CSeq = u32;

/// Server-minted identifier of one negotiated WebRTC exchange.
pub type MediaSessionId = String;

/// Well-known header names, in their canonical spelling.
pub mod header {
    pub const CSEQ: &str = "CSeq";
    pub const SESSION: &str = "Session";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const PUBLIC: &str = "Public";
    pub const AUTHORIZATION: &str = "Authorization";
}

/// Body content types.
pub mod content_type {
    pub const PARAMETERS: &str = "text/parameters";
    pub const LIST: &str = "text/list";
    pub const SDP: &str = "application/sdp";
    pub const ICE_CANDIDATE: &str = "application/x-ice-candidate";
}

fn write_headers_and_body(out: &mut Vec<u8>, headers: &HeaderFields, body: &[u8]) {
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    if !body.is_empty() {
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
    }
}

/// Either kind of inbound message, classified by [`is_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn parse(buf: &[u8]) -> crate::error::Result<Self> {
        if is_request(buf) {
            Request::parse(buf).map(Message::Request)
        } else {
            Response::parse(buf).map(Message::Response)
        }
    }

    pub fn cseq(&self) -> CSeq {
        match self {
            Message::Request(request) => request.cseq,
            Message::Response(response) => response.cseq,
        }
    }
}
