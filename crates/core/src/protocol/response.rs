use super::headers::HeaderFields;
use super::method::Protocol;
use super::request::Request;
use super::{CSeq, header, parser};

/// A WEBRTSP response.
///
/// ```text
/// WEBRTSP/0.1 200 OK\r\n
/// CSeq: 3\r\n
/// Session: 5F2A09C1\r\n
/// Content-Type: application/sdp\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern: start from one of the status constructors, then
/// [`reply_to`](Self::reply_to) the request being answered and chain
/// [`add_header`](Self::add_header) / [`with_body`](Self::with_body).
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Response {
    pub protocol: Protocol,
    pub status_code: u16,
    pub reason: String,
    pub headers: HeaderFields,
    pub cseq: CSeq,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16, reason: &str) -> Self {
        Response {
            protocol: Protocol::default(),
            status_code,
            reason: reason.to_string(),
            headers: HeaderFields::new(),
            cseq: 0,
            body: Vec::new(),
        }
    }

    /// 200 OK
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 400 Bad Request
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 401 Unauthorized, sent when no credentials were presented.
    pub fn unauthorized() -> Self {
        Self::new(401, "Unauthorized")
    }

    /// 403 Forbidden, sent when the presented credentials were rejected.
    pub fn forbidden() -> Self {
        Self::new(403, "Forbidden")
    }

    /// 404 Not Found
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// 502 Bad Gateway, sent when the source behind the proxy went away.
    pub fn bad_gateway() -> Self {
        Self::new(502, "Bad Gateway")
    }

    /// 503 Service Unavailable, sent when the source is known but not connected.
    pub fn service_unavailable() -> Self {
        Self::new(503, "Service Unavailable")
    }

    /// Correlate with `request`: copy its CSeq and echo its `Session` header.
    pub fn reply_to(mut self, request: &Request) -> Self {
        self.cseq = request.cseq;
        if let Some(session) = request.media_session() {
            self.headers.insert(header::SESSION, session);
        }
        self
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

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Parse a complete response. Any deviation from the grammar is an error.
    pub fn parse(buf: &[u8]) -> crate::error::Result<Self> {
        parser::parse_response(buf)
    }

    /// Serialize to the wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} {}\r\n{}: {}\r\n",
            self.protocol,
            self.status_code,
            self.reason,
            header::CSEQ,
            self.cseq
        )
        .into_bytes();
        super::write_headers_and_body(&mut out, &self.headers, &self.body);
        out
    }
}

super::impl_message_accessors!(Response);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Method, content_type};

    #[test]
    fn serialize_public_list() {
        let mut resp = Response::ok().add_header("Public", "DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE");
        resp.cseq = 1;
        assert_eq!(
            String::from_utf8(resp.serialize()).unwrap(),
            "WEBRTSP/0.1 200 OK\r\nCSeq: 1\r\nPublic: DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE\r\n"
        );
    }

    #[test]
    fn reply_to_copies_cseq_and_session() {
        let mut req = Request::new(Method::Teardown, "cam").add_header("Session", "77");
        req.cseq = 31;
        let resp = Response::ok().reply_to(&req);
        assert_eq!(resp.cseq, 31);
        assert_eq!(resp.media_session(), Some("77"));

        let mut bare = Request::new(Method::Options, "*");
        bare.cseq = 2;
        assert!(Response::ok().reply_to(&bare).headers.is_empty());
    }

    #[test]
    fn roundtrip_with_body() {
        let mut resp = Response::ok()
            .add_header("session", "9")
            .with_body(content_type::SDP, "v=0\r\ns=-\r\n");
        resp.cseq = 8;
        let parsed = Response::parse(&resp.serialize()).unwrap();
        assert_eq!(parsed.status_code, 200);
        assert_eq!(parsed.reason, "OK");
        assert_eq!(parsed.cseq, 8);
        assert_eq!(parsed.body, resp.body);
        assert_eq!(parsed.headers.get("content-type"), Some(content_type::SDP));
    }

    #[test]
    fn success_range() {
        assert!(Response::ok().is_success());
        assert!(Response::new(204, "No Content").is_success());
        assert!(!Response::not_found().is_success());
        assert!(!Response::new(199, "Early").is_success());
    }
}
