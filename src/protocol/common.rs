//! Core ICAP wire types: methods, encapsulation sections, request/response
//! headers, and the `Payload` that bundles the (at most four) encapsulated
//! byte strings a message can carry.

use bytes::Bytes;
use http::HeaderMap;

/// An ICAP request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcapMethod {
    Options,
    Reqmod,
    Respmod,
    /// A syntactically valid token that isn't one of the three supported
    /// methods. Kept instead of rejected at parse time so the worker can
    /// respond `405` (a `RouteError`) rather than `400`.
    Other(String),
}

impl IcapMethod {
    pub fn as_str(&self) -> &str {
        match self {
            IcapMethod::Options => "OPTIONS",
            IcapMethod::Reqmod => "REQMOD",
            IcapMethod::Respmod => "RESPMOD",
            IcapMethod::Other(s) => s,
        }
    }

    pub fn parse(token: &str) -> IcapMethod {
        match token {
            "OPTIONS" => IcapMethod::Options,
            "REQMOD" => IcapMethod::Reqmod,
            "RESPMOD" => IcapMethod::Respmod,
            other => IcapMethod::Other(other.to_string()),
        }
    }
}

/// One of the encapsulation section kinds defined by RFC 3507.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionName {
    ReqHdr,
    ReqBody,
    ResHdr,
    ResBody,
    OptBody,
    NullBody,
}

impl SectionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::ReqHdr => "req-hdr",
            SectionName::ReqBody => "req-body",
            SectionName::ResHdr => "res-hdr",
            SectionName::ResBody => "res-body",
            SectionName::OptBody => "opt-body",
            SectionName::NullBody => "null-body",
        }
    }

    pub fn parse(token: &str) -> Option<SectionName> {
        match token {
            "req-hdr" => Some(SectionName::ReqHdr),
            "req-body" => Some(SectionName::ReqBody),
            "res-hdr" => Some(SectionName::ResHdr),
            "res-body" => Some(SectionName::ResBody),
            "opt-body" => Some(SectionName::OptBody),
            "null-body" => Some(SectionName::NullBody),
            _ => None,
        }
    }

    /// Whether this section is a body terminal (as opposed to a header section).
    pub fn is_body(&self) -> bool {
        matches!(
            self,
            SectionName::ReqBody | SectionName::ResBody | SectionName::OptBody | SectionName::NullBody
        )
    }
}

/// One `section=offset` pair from the `Encapsulated:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncapsulatedEntry {
    pub section: SectionName,
    pub offset: usize,
}

/// A parsed ICAP request line plus header block.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub method: IcapMethod,
    pub uri: String,
    pub version: String,
    pub headers: HeaderMap,
    pub encapsulated: Vec<EncapsulatedEntry>,
    pub preview: Option<usize>,
    pub allow_204: bool,
}

impl RequestHeader {
    /// The path component of `uri`, used to key the modifier registry.
    ///
    /// `icap://host[:port]/path` -> `/path`; a bare path is returned as-is.
    pub fn uri_path(&self) -> &str {
        match self.uri.find("://") {
            Some(scheme_end) => {
                let rest = &self.uri[scheme_end + 3..];
                match rest.find('/') {
                    Some(slash) => &rest[slash..],
                    None => "/",
                }
            }
            None => &self.uri,
        }
    }

    pub fn connection_close(&self) -> bool {
        self.headers
            .get("connection")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}

/// A parsed ICAP status line plus header block.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub status: u16,
    pub reason: String,
    pub version: String,
    pub headers: HeaderMap,
    pub encapsulated: Vec<EncapsulatedEntry>,
}

impl ResponseHeader {
    pub fn new(status: u16) -> Self {
        ResponseHeader {
            status,
            reason: reason_phrase(status).to_string(),
            version: "1.0".to_string(),
            headers: HeaderMap::new(),
            encapsulated: Vec::new(),
        }
    }
}

/// Recognized ICAP/HTTP status constants (§3).
pub mod status {
    pub const CONTINUE: u16 = 100;
    pub const OK: u16 = 200;
    pub const NO_CONTENT: u16 = 204;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const HEADER_TOO_LARGE: u16 = 414;
    pub const SERVER_ERROR: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 501;
    pub const VERSION_NOT_SUPPORTED: u16 = 505;
}

pub fn reason_phrase(status: u16) -> &'static str {
    use status::*;
    match status {
        CONTINUE => "Continue",
        OK => "OK",
        NO_CONTENT => "No Content",
        BAD_REQUEST => "Bad Request",
        NOT_FOUND => "Not Found",
        METHOD_NOT_ALLOWED => "Method Not Allowed",
        REQUEST_TIMEOUT => "Request Timeout",
        HEADER_TOO_LARGE => "Request Header Fields Too Large",
        SERVER_ERROR => "Server Error",
        NOT_IMPLEMENTED => "Not Implemented",
        VERSION_NOT_SUPPORTED => "ICAP Version Not Supported",
        _ => "Unknown",
    }
}

/// The (up to four) encapsulated byte strings a request or response carries.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub req_header: Bytes,
    pub req_body: Bytes,
    pub res_header: Bytes,
    pub res_body: Bytes,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        self.req_header.is_empty()
            && self.req_body.is_empty()
            && self.res_header.is_empty()
            && self.res_body.is_empty()
    }
}
