//! Body sub-formats.
//!
//! ```text
//! text/parameters, text/list      names only          ICE candidates
//! name: value\r\n                 name\r\n            0/candidate:1 1 UDP ...\r\n
//! other: value\r\n                other\r\n           0/a=end-of-candidates\r\n
//! ```

use super::Method;
use crate::error::{ParseErrorKind, Result};

/// Wire spelling of the empty candidate (end-of-candidates).
pub const END_OF_CANDIDATES: &str = "a=end-of-candidates";

fn lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines().filter(|line| !line.is_empty())
}

/// Parse `name: value` lines. Names must be non-empty; values may be.
pub fn parse_parameters(body: &str) -> Result<Vec<(String, String)>> {
    lines(body)
        .map(|line| -> Result<(String, String)> {
            let (name, value) = line.split_once(':').ok_or(ParseErrorKind::InvalidParameter)?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ParseErrorKind::InvalidParameter.into());
            }
            Ok((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn render_parameters<N: AsRef<str>, V: AsRef<str>>(params: &[(N, V)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name.as_ref(), value.as_ref()))
        .collect()
}

/// Look up one parameter by name (case-insensitive).
pub fn find_parameter<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub fn parse_names(body: &str) -> Vec<String> {
    lines(body).map(|line| line.trim().to_string()).collect()
}

pub fn render_names<N: AsRef<str>>(names: &[N]) -> String {
    names
        .iter()
        .map(|name| format!("{}\r\n", name.as_ref()))
        .collect()
}

/// One trickled ICE candidate. An empty `candidate` means end-of-candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub mline_index: u32,
    pub candidate: String,
}

impl IceCandidate {
    pub fn new(mline_index: u32, candidate: &str) -> Self {
        Self {
            mline_index,
            candidate: candidate.to_string(),
        }
    }

    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.is_empty()
    }

    /// Parse one `index/candidate` line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let (index, candidate) = line.split_once('/').ok_or(ParseErrorKind::InvalidIceCandidate)?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseErrorKind::InvalidIceCandidate.into());
        }
        let mline_index = index
            .parse::<u32>()
            .map_err(|_| ParseErrorKind::InvalidIceCandidate)?;
        let candidate = candidate.trim_end();
        if candidate.is_empty() {
            return Err(ParseErrorKind::InvalidIceCandidate.into());
        }
        let candidate = if candidate == END_OF_CANDIDATES { "" } else { candidate };
        Ok(Self::new(mline_index, candidate))
    }

    pub fn render_line(&self) -> String {
        let candidate = if self.is_end_of_candidates() {
            END_OF_CANDIDATES
        } else {
            self.candidate.as_str()
        };
        format!("{}/{}\r\n", self.mline_index, candidate)
    }
}

/// Lazily parse a candidate body line by line, so callers can apply each
/// candidate as soon as it is read.
pub fn ice_candidates(body: &str) -> impl Iterator<Item = Result<IceCandidate>> + '_ {
    lines(body).map(IceCandidate::parse_line)
}

pub fn render_ice_candidates(candidates: &[IceCandidate]) -> String {
    candidates.iter().map(IceCandidate::render_line).collect()
}

/// `Public` header value: method names joined by `", "`.
pub fn render_public(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a `Public` header value, ignoring names this side does not know.
pub fn parse_public(value: &str) -> Vec<Method> {
    value
        .split(',')
        .filter_map(|name| name.trim().parse().ok())
        .collect()
}
