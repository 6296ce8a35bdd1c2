use super::headers::HeaderFields;
use super::method::{Method, Protocol};
use super::{CSeq, header, parser};

/// A WEBRTSP request.
///
/// ```text
/// Method SP Request-URI SP WEBRTSP/0.1 CRLF
/// CSeq: n CRLF
/// *(Header: Value CRLF)
/// [CRLF body CRLF]
/// ```
///
/// `cseq` is a typed field and never appears in `headers`. Build outgoing
/// requests through [`Session::create_request`](crate::session::Session::create_request)
/// so the CSeq is allocated and tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Request {
    pub method: Method,
    /// Request-URI, opaque to the codec. `*` addresses the whole peer.
    /// It must not contain SP or CRLF; the request line has no escaping,
    /// so such a URI serializes but does not parse back.
    pub uri: String,
    pub protocol: Protocol,
    pub headers: HeaderFields,
    pub cseq: CSeq,
    pub body: Vec<u8>,
}

impl Request {
    /// A request with no CSeq assigned yet (CSeq 0 is "unassigned").
    pub fn new(method: Method, uri: &str) -> Self {
        Request {
            method,
            uri: uri.to_string(),
            protocol: Protocol::default(),
            headers: HeaderFields::new(),
            cseq: 0,
            body: Vec::new(),
        }
    }

    /// Parse a complete request. Any deviation from the grammar is an error.
    pub fn parse(buf: &[u8]) -> crate::error::Result<Self> {
        parser::parse_request(buf)
    }

    /// Serialize to the wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} {}\r\n{}: {}\r\n",
            self.method,
            self.uri,
            self.protocol,
            header::CSEQ,
            self.cseq
        )
        .into_bytes();
        super::write_headers_and_body(&mut out, &self.headers, &self.body);
        out
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body together with its `Content-Type`.
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(header::CONTENT_TYPE, content_type);
        self.body = body.into();
        self
    }

    /// Bearer token from `Authorization: Bearer <token>`.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.headers.get(header::AUTHORIZATION)?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty()).then_some(token)
    }
}

super::impl_message_accessors!(Request);
