//! Byte-level grammar shared by request and response parsing.
//!
//! The grammar is RFC 822 flavored 7-bit ASCII:
//!
//! ```text
//! request-line = token SP uri SP protocol CRLF
//! status-line  = protocol SP 3DIGIT SP reason CRLF
//! protocol     = "WEBRTSP/" DIGIT "." DIGIT
//! header       = token ":" [LWS] value CRLF
//! LWS          = [CRLF] 1*(SP / HT)
//! ```
//!
//! The parser is strict: no extra spaces, no bare LF, no trailing data on
//! the start line. The message boundary comes from transport framing, so
//! whatever follows the blank line is the body.

use super::headers::HeaderFields;
use super::method::{Method, Protocol};
use super::{CSeq, Request, Response};
use crate::error::{ParseErrorKind, Result};

const PROTOCOL_PREFIX: &[u8] = b"WEBRTSP/";

fn is_ctl(b: u8) -> bool {
    b < 0x20 || b == 0x7f
}

fn is_wsp(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn is_separator(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
            | b' '
            | b'\t'
    )
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii() && !is_ctl(b) && !is_separator(b)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos + offset).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.buf[start..self.pos]
    }

    /// A non-empty run of token characters. `None` stands for the empty token.
    fn token(&mut self) -> Option<&'a [u8]> {
        let token = self.take_while(is_token_char);
        (!token.is_empty()).then_some(token)
    }

    fn expect(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_crlf(&self) -> bool {
        self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n')
    }

    fn expect_crlf(&mut self) -> bool {
        if self.at_crlf() {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    /// CRLF followed by SP or HT: a folded continuation line.
    fn at_fold(&self) -> bool {
        self.at_crlf() && self.peek_at(2).is_some_and(is_wsp)
    }

    fn skip_lws(&mut self) {
        loop {
            if self.peek().is_some_and(is_wsp) {
                self.pos += 1;
            } else if self.at_fold() {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn uri(&mut self) -> Option<&'a str> {
        let uri = self.take_while(|b| b.is_ascii_graphic());
        if uri.is_empty() {
            return None;
        }
        std::str::from_utf8(uri).ok()
    }

    fn protocol(&mut self) -> Result<Protocol> {
        let start = self.pos;
        let shape_ok = self.rest().starts_with(PROTOCOL_PREFIX) && {
            self.pos += PROTOCOL_PREFIX.len();
            let major = self.peek().is_some_and(|b| b.is_ascii_digit());
            let dot = self.peek_at(1) == Some(b'.');
            let minor = self.peek_at(2).is_some_and(|b| b.is_ascii_digit());
            self.pos += 3;
            major && dot && minor
        };
        if !shape_ok {
            return Err(ParseErrorKind::UnsupportedProtocol.into());
        }
        Protocol::from_token(&self.buf[start..self.pos])
            .ok_or_else(|| ParseErrorKind::UnsupportedProtocol.into())
    }

    /// Header value up to the terminating CRLF, with folded lines joined.
    fn header_value(&mut self) -> Result<String> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseErrorKind::InvalidHeader.into()),
                Some(b'\r') if self.at_fold() => {
                    self.pos += 2;
                }
                Some(b'\r') if self.at_crlf() => {
                    self.pos += 2;
                    break;
                }
                Some(b'\t') => {
                    value.push('\t');
                    self.pos += 1;
                }
                Some(b) if is_ctl(b) => return Err(ParseErrorKind::ControlCharacter.into()),
                Some(b) if !b.is_ascii() => return Err(ParseErrorKind::InvalidHeader.into()),
                Some(b) => {
                    value.push(b as char);
                    self.pos += 1;
                }
            }
        }
        Ok(value.trim_end_matches([' ', '\t']).to_string())
    }

    /// Header block. Ends at a blank line or, for body-less messages, at
    /// end of input right after a complete header line.
    fn headers(&mut self) -> Result<HeaderFields> {
        let mut headers = HeaderFields::new();
        loop {
            if self.at_end() || self.expect_crlf() {
                break;
            }
            let name = self.token().ok_or(ParseErrorKind::InvalidHeader)?;
            if !self.expect(b':') {
                return Err(ParseErrorKind::InvalidHeader.into());
            }
            self.skip_lws();
            let value = self.header_value()?;
            // Token characters are ASCII, so this cannot fail.
            let name = String::from_utf8_lossy(name).to_ascii_lowercase();
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Remaining bytes, minus the single CRLF the serializer appends.
    fn body(&self) -> Vec<u8> {
        let rest = self.rest();
        rest.strip_suffix(b"\r\n").unwrap_or(rest).to_vec()
    }
}

/// Move the mandatory CSeq out of the header map.
fn take_cseq(headers: &mut HeaderFields) -> Result<CSeq> {
    let raw = headers.remove("cseq").ok_or(ParseErrorKind::MissingCSeq)?;
    parse_cseq(&raw).ok_or_else(|| ParseErrorKind::InvalidCSeq.into())
}

/// Positive decimal without sign or whitespace; overflow is rejected.
pub(crate) fn parse_cseq(raw: &str) -> Option<CSeq> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = raw.bytes().try_fold(0 as CSeq, |acc, digit| {
        acc.checked_mul(10)?.checked_add(CSeq::from(digit - b'0'))
    })?;
    (value != 0).then_some(value)
}

/// Classify a buffer by its first token: a request iff it names a method.
pub fn is_request(buf: &[u8]) -> bool {
    Cursor::new(buf)
        .token()
        .and_then(Method::from_token)
        .is_some()
}

pub(crate) fn parse_request(buf: &[u8]) -> Result<Request> {
    if buf.is_empty() {
        return Err(ParseErrorKind::EmptyMessage.into());
    }
    let mut cursor = Cursor::new(buf);

    let token = cursor.token().ok_or(ParseErrorKind::InvalidRequestLine)?;
    let method = Method::from_token(token).ok_or(ParseErrorKind::UnknownMethod)?;
    if !cursor.expect(b' ') {
        return Err(ParseErrorKind::InvalidRequestLine.into());
    }
    let uri = cursor.uri().ok_or(ParseErrorKind::InvalidRequestLine)?;
    if !cursor.expect(b' ') {
        return Err(ParseErrorKind::InvalidRequestLine.into());
    }
    let protocol = cursor.protocol()?;
    if !cursor.expect_crlf() {
        return Err(ParseErrorKind::InvalidRequestLine.into());
    }

    let mut headers = cursor.headers()?;
    let cseq = take_cseq(&mut headers)?;

    Ok(Request {
        method,
        uri: uri.to_string(),
        protocol,
        headers,
        cseq,
        body: cursor.body(),
    })
}

pub(crate) fn parse_response(buf: &[u8]) -> Result<Response> {
    if buf.is_empty() {
        return Err(ParseErrorKind::EmptyMessage.into());
    }
    let mut cursor = Cursor::new(buf);

    let protocol = cursor.protocol()?;
    if !cursor.expect(b' ') {
        return Err(ParseErrorKind::InvalidStatusLine.into());
    }
    let digits = cursor.take_while(|b| b.is_ascii_digit());
    if digits.len() != 3 {
        return Err(ParseErrorKind::InvalidStatusCode.into());
    }
    let status_code = digits
        .iter()
        .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));
    if !(100..=599).contains(&status_code) {
        return Err(ParseErrorKind::InvalidStatusCode.into());
    }
    if !cursor.expect(b' ') {
        return Err(ParseErrorKind::InvalidStatusLine.into());
    }
    let reason = cursor.take_while(|b| b.is_ascii() && (!is_ctl(b) || b == b'\t'));
    if !cursor.expect_crlf() {
        return Err(ParseErrorKind::InvalidStatusLine.into());
    }

    let mut headers = cursor.headers()?;
    let cseq = take_cseq(&mut headers)?;

    Ok(Response {
        protocol,
        status_code,
        reason: String::from_utf8_lossy(reason).into_owned(),
        headers,
        cseq,
        body: cursor.body(),
    })
}
