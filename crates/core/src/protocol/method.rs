use std::fmt;
use std::str::FromStr;

use crate::error::{ParseErrorKind, WebRtspError};

/// WEBRTSP request methods.
///
/// The set is closed: a token that is not one of these fails the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    List,
    Describe,
    Setup,
    Play,
    Record,
    Subscribe,
    Teardown,
    GetParameter,
    SetParameter,
}

impl Method {
    pub const ALL: [Method; 10] = [
        Method::Options,
        Method::List,
        Method::Describe,
        Method::Setup,
        Method::Play,
        Method::Record,
        Method::Subscribe,
        Method::Teardown,
        Method::GetParameter,
        Method::SetParameter,
    ];

    /// The literal method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::List => "LIST",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Record => "RECORD",
            Method::Subscribe => "SUBSCRIBE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::SetParameter => "SET_PARAMETER",
        }
    }

    /// Exact, case-sensitive lookup of a method token.
    pub fn from_token(token: &[u8]) -> Option<Method> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str().as_bytes() == token)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = WebRtspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_token(s.as_bytes()).ok_or(WebRtspError::Parse {
            kind: ParseErrorKind::UnknownMethod,
        })
    }
}

/// Protocol version tag carried on every request and status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    WebRtsp0_1,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::WebRtsp0_1 => "WEBRTSP/0.1",
        }
    }

    /// Lookup of a `WEBRTSP/<digit>.<digit>` token. Only 0.1 is recognized.
    pub fn from_token(token: &[u8]) -> Option<Protocol> {
        match token {
            b"WEBRTSP/0.1" => Some(Protocol::WebRtsp0_1),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
