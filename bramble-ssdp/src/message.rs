//! Parsing and building SSDP datagrams
//!
//! The parser is a byte-at-a-time state machine rather than a
//! split-into-lines affair: discovery traffic on port 1900 is mostly
//! noise from other people's devices, and the machine lets us bail out
//! of an uninteresting packet as soon as the method token fails to
//! match, without buffering or allocating for the rest of it.

use core::fmt::Write;

const METHOD_MAX: usize = 9; // "M-SEARCH" plus NUL-equivalent slack
const URI_MAX: usize = 1;
const HEADER_MAX: usize = 63;

/// One successfully-parsed inbound datagram
#[derive(Debug, PartialEq, Eq)]
pub enum Datagram {
    /// An `M-SEARCH` discovery query
    Search {
        /// The `ST` (search target) header, if present
        search_target: Option<String>,
        /// The `MX` header: longest acceptable response delay, seconds
        maximum_wait_sec: u8,
    },
    /// A peer's `NOTIFY` announcement
    Notify,
}

/// Why a datagram was discarded
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not an SSDP request we answer (bad method, URI, or framing)
    #[error("malformed SSDP datagram")]
    InvalidData,
    /// The datagram ended before its header block did
    #[error("truncated SSDP datagram")]
    UnexpectedEof,
}

#[derive(PartialEq, Eq)]
enum State {
    Method,
    Uri,
    Proto,
    HeaderKey,
    HeaderValue,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Header {
    Other,
    Man,
    St,
    Mx,
}

#[derive(Clone, Copy)]
enum Method {
    Search,
    Notify,
}

fn accumulate(token: &mut String, c: u8, max: usize) {
    if token.len() < max {
        token.push(c as char);
    }
}

/// Parse one received datagram
///
/// Anything other than a well-formed `M-SEARCH * HTTP/1.1` or
/// `NOTIFY * HTTP/1.1` request is an error, and errors never produce a
/// response: the caller discards and moves on.
///
/// # Errors
///
/// `InvalidData` for an unrecognised method, a URI other than `*`, or
/// stray framing; `UnexpectedEof` if the header block never ends.
pub fn parse(buf: &[u8]) -> Result<Datagram, Error> {
    let mut state = State::Method;
    let mut method = None;
    let mut header = Header::Other;
    let mut token = String::new();
    let mut value = String::new();
    let mut search_target = None;
    let mut maximum_wait_sec = 0u8;
    let mut crlf = 0u32; // consecutive CR or LF bytes seen

    for &c in buf {
        if c == b'\r' || c == b'\n' {
            crlf += 1;
        } else {
            crlf = 0;
        }

        match state {
            State::Method => {
                if c == b' ' {
                    method = match token.as_str() {
                        "M-SEARCH" => Some(Method::Search),
                        "NOTIFY" => Some(Method::Notify),
                        _ => return Err(Error::InvalidData),
                    };
                    token.clear();
                    state = State::Uri;
                } else {
                    accumulate(&mut token, c, METHOD_MAX);
                }
            }
            State::Uri => {
                if c == b' ' {
                    if token != "*" {
                        return Err(Error::InvalidData);
                    }
                    token.clear();
                    state = State::Proto;
                } else {
                    accumulate(&mut token, c, URI_MAX);
                }
            }
            State::Proto => {
                if crlf == 2 {
                    state = State::HeaderKey;
                    token.clear();
                }
            }
            State::HeaderKey => {
                if crlf == 4 {
                    // blank line: end of headers, decision time
                    return match method {
                        Some(Method::Search) => Ok(Datagram::Search {
                            search_target,
                            maximum_wait_sec,
                        }),
                        Some(Method::Notify) => Ok(Datagram::Notify),
                        None => Err(Error::InvalidData),
                    };
                } else if c == b' ' {
                    header = match token.as_str() {
                        s if s.starts_with("MA") => Header::Man,
                        "ST" => Header::St,
                        "MX" => Header::Mx,
                        _ => Header::Other,
                    };
                    token.clear();
                    value.clear();
                    state = State::HeaderValue;
                } else if c != b'\r' && c != b'\n' && c != b':' {
                    accumulate(&mut token, c, HEADER_MAX);
                }
            }
            State::HeaderValue => {
                if crlf == 2 {
                    match header {
                        Header::Mx => {
                            maximum_wait_sec =
                                value.trim().parse().unwrap_or(0);
                        }
                        Header::St => {
                            search_target =
                                Some(value.trim().to_string());
                        }
                        Header::Man | Header::Other => {}
                    }
                    header = Header::Other;
                    token.clear();
                    state = State::HeaderKey;
                } else if c != b'\r' && c != b'\n' {
                    accumulate(&mut value, c, HEADER_MAX);
                }
            }
        }
    }
    Err(Error::UnexpectedEof)
}

/// A replacement for Cursor that can't overrun its buffer
struct MessageCursor<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> MessageCursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> MessageCursor<'a> {
        MessageCursor { buf, offset: 0 }
    }

    pub const fn position(&self) -> usize {
        self.offset
    }
}

impl core::fmt::Write for MessageCursor<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let n = s.len();
        if n + self.offset > self.buf.len() {
            return Err(core::fmt::Error);
        }
        self.buf[self.offset..self.offset + n]
            .clone_from_slice(s.as_bytes());
        self.offset += n;
        Ok(())
    }
}

fn write_common(
    cursor: &mut MessageCursor,
    max_age: u32,
    server: &str,
    unique_id: &str,
    location: &str,
) {
    let _ = write!(
        cursor,
        "CACHE-CONTROL: max-age={}\r
SERVER: {}/{} UPnP/1.1 {}\r
USN: uuid:{}\r
LOCATION: {}\r
\r\n",
        max_age,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        server,
        unique_id,
        location,
    );
}

/// Build the unicast response to an `M-SEARCH`
pub fn build_response(
    buf: &mut [u8],
    max_age: u32,
    server: &str,
    unique_id: &str,
    location: &str,
) -> usize {
    let mut cursor = MessageCursor::new(buf);
    let _ = write!(
        &mut cursor,
        "HTTP/1.1 200 OK\r
EXT:\r
ST: upnp:rootdevice\r\n"
    );
    write_common(&mut cursor, max_age, server, unique_id, location);
    cursor.position()
}

/// Build the periodic multicast "alive" announcement
pub fn build_notify(
    buf: &mut [u8],
    max_age: u32,
    server: &str,
    unique_id: &str,
    location: &str,
) -> usize {
    let mut cursor = MessageCursor::new(buf);
    let _ = write!(
        &mut cursor,
        "NOTIFY * HTTP/1.1\r
HOST: 239.255.255.250:1900\r
NT: upnp:rootdevice\r
NTS: ssdp:alive\r\n"
    );
    write_common(&mut cursor, max_age, server, unique_id, location);
    cursor.position()
}
