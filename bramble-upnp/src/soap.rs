//! Just enough SOAP
//!
//! Control requests and responses travel inside a fixed
//! `<s:Envelope><s:Body>` wrapper. Nothing here parses XML; the
//! envelope is located by its literal markers, which is all that real
//! control points require and all the original wire traffic contains.

/// Opening half of the response envelope used by action handlers
pub const ENVELOPE_HEADER: &str = "<?xml version=\"1.0\"?>\r\n\
<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\r\n\
<s:Body>\r\n";

/// Closing half of the response envelope
pub const ENVELOPE_TRAILER: &str = "</s:Body>\r\n</s:Envelope>\r\n";

/// Wrap a handler's response fragment in the SOAP envelope
#[must_use]
pub fn envelope(inner: &str) -> String {
    let mut r = String::with_capacity(
        ENVELOPE_HEADER.len() + inner.len() + ENVELOPE_TRAILER.len(),
    );
    r.push_str(ENVELOPE_HEADER);
    r.push_str(inner);
    r.push_str(ENVELOPE_TRAILER);
    r
}

/// Extract the action name from a control-request body
///
/// The body must contain `<s:Body>` ... `</s:Body>` in that order, and
/// the content in between must open with a `<u:`-prefixed call tag;
/// the action name runs from there to the first space or `>`. Any
/// deviation yields `None`, and callers respond to `None` by dropping
/// the request without an error reply. Control points treat silence as
/// a retryable condition, so a quiet discard is the compatible answer
/// to garbage.
#[must_use]
pub fn action_name(body: &str) -> Option<&str> {
    let open = body.find("<s:Body>")? + "<s:Body>".len();
    let close = body.find("</s:Body>")?;
    if close <= open {
        return None;
    }
    let inner = &body[open..close];
    let call = inner.trim_start();
    if !call.starts_with("<u:") {
        return None;
    }
    let name = &call[3..];
    let end = name.find([' ', '>'])?;
    if end == 0 {
        return None;
    }
    Some(&name[..end])
}
