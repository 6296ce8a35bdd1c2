//! Error types for the WEBRTSP library.

use std::fmt;

use crate::protocol::{CSeq, Method};

/// Errors that can occur in the WEBRTSP library.
///
/// Every variant except [`Io`](Self::Io) and
/// [`WebSocket`](Self::WebSocket) is a protocol failure and is fatal to the
/// connection it happened on. Variants map to the layers of the stack:
///
/// - **Codec**: [`Parse`](Self::Parse).
/// - **Session**: [`UnknownCSeq`](Self::UnknownCSeq),
///   [`Unsupported`](Self::Unsupported),
///   [`MediaSessionNotFound`](Self::MediaSessionNotFound),
///   [`MediaSessionMismatch`](Self::MediaSessionMismatch),
///   [`ContentType`](Self::ContentType),
///   [`RequestFailed`](Self::RequestFailed).
/// - **Resources**: [`PeerUnavailable`](Self::PeerUnavailable).
/// - **Proxy**: [`UnknownSource`](Self::UnknownSource),
///   [`InvalidToken`](Self::InvalidToken),
///   [`AlreadyRegistered`](Self::AlreadyRegistered),
///   [`NotRegistered`](Self::NotRegistered).
#[derive(Debug, thiserror::Error)]
pub enum WebRtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing failure.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// Failed to parse a WEBRTSP message or one of its bodies.
    #[error("WEBRTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A response arrived for a CSeq with no outstanding request.
    #[error("response for unknown CSeq {0}")]
    UnknownCSeq(CSeq),

    /// The method is not handled by this session role, or is disabled for
    /// the requested URI.
    #[error("{method} not supported for {uri}")]
    Unsupported { method: Method, uri: String },

    /// No media session with the given id exists on this connection.
    #[error("media session not found: {0}")]
    MediaSessionNotFound(String),

    /// A grant (DESCRIBE, SUBSCRIBE, RECORD) succeeded without a `Session`.
    #[error("{0} response carries no media session")]
    MissingMediaSession(Method),

    /// A message carried a different media session id than expected.
    #[error("media session mismatch: expected {expected:?}, got {actual:?}")]
    MediaSessionMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Missing or unexpected `Content-Type`.
    #[error("expected content type {expected}, got {actual:?}")]
    ContentType {
        expected: &'static str,
        actual: Option<String>,
    },

    /// The peer answered one of our requests with a non-2xx status.
    #[error("{method} failed with status {status}")]
    RequestFailed { method: Method, status: u16 },

    /// The peer factory did not produce a `WebRtcPeer` for the URI.
    #[error("no WebRTC peer available for {0}")]
    PeerUnavailable(String),

    /// A back connection tried to register a name that is not configured.
    #[error("unknown source name: {0}")]
    UnknownSource(String),

    /// A back connection presented the wrong token for its name.
    #[error("invalid token for source: {0}")]
    InvalidToken(String),

    /// A back connection tried to register a name that is already live.
    #[error("source already registered: {0}")]
    AlreadyRegistered(String),

    /// A back connection sent a request before registering.
    #[error("source connection not registered")]
    NotRegistered,
}

impl From<tokio_tungstenite::tungstenite::Error> for WebRtspError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        WebRtspError::WebSocket(Box::new(err))
    }
}

impl From<ParseErrorKind> for WebRtspError {
    fn from(kind: ParseErrorKind) -> Self {
        WebRtspError::Parse { kind }
    }
}

/// Specific kind of WEBRTSP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty.
    EmptyMessage,
    /// Request line did not match `METHOD SP URI SP PROTOCOL CRLF`.
    InvalidRequestLine,
    /// Status line did not match `PROTOCOL SP CODE SP REASON CRLF`.
    InvalidStatusLine,
    /// The method token is not one of the known methods.
    UnknownMethod,
    /// The protocol tag is malformed or not `WEBRTSP/0.1`.
    UnsupportedProtocol,
    /// Status code is not three digits in 100..=599.
    InvalidStatusCode,
    /// A header line is malformed or not CRLF-terminated.
    InvalidHeader,
    /// A control character appeared inside a header value.
    ControlCharacter,
    /// The mandatory CSeq header is absent.
    MissingCSeq,
    /// CSeq is zero, non-numeric, or overflows.
    InvalidCSeq,
    /// A body that must be text is not valid UTF-8.
    InvalidEncoding,
    /// A `name: value` body line is malformed.
    InvalidParameter,
    /// An `index/candidate` body line is malformed.
    InvalidIceCandidate,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::UnknownMethod => write!(f, "unknown method"),
            Self::UnsupportedProtocol => write!(f, "unsupported protocol"),
            Self::InvalidStatusCode => write!(f, "invalid status code"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::ControlCharacter => write!(f, "control character in header value"),
            Self::MissingCSeq => write!(f, "missing CSeq"),
            Self::InvalidCSeq => write!(f, "invalid CSeq"),
            Self::InvalidEncoding => write!(f, "body is not valid UTF-8"),
            Self::InvalidParameter => write!(f, "invalid parameter line"),
            Self::InvalidIceCandidate => write!(f, "invalid ICE candidate line"),
        }
    }
}

/// Convenience alias for `Result<T, WebRtspError>`.
pub type Result<T> = std::result::Result<T, WebRtspError>;
