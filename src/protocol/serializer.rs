//! ICAP response serialization.
//!
//! The one rule that matters here: `Encapsulated` offsets must reflect the
//! true byte length of each section as actually emitted, not an estimate.
//! Getting this wrong breaks every client that trusts the header to seek
//! into the body.

use std::fmt::Write as _;
use std::sync::OnceLock;

use bytes::{Bytes, BytesMut};

use super::chunked::encode_chunked;
use super::common::{status, EncapsulatedEntry, Payload, ResponseHeader, SectionName};

static ISTAG: OnceLock<String> = OnceLock::new();

/// The process-wide `ISTag` cache-validation token: opaque, stable for the
/// lifetime of the process.
pub fn istag() -> &'static str {
    ISTAG.get_or_init(|| format!("\"{}-{}\"", crate::version::VERSION, std::process::id()))
}

fn section_bytes<'a>(section: SectionName, payload: &'a Payload) -> &'a [u8] {
    match section {
        SectionName::ReqHdr => &payload.req_header,
        SectionName::ResHdr => &payload.res_header,
        SectionName::ReqBody => &payload.req_body,
        SectionName::ResBody => &payload.res_body,
        SectionName::OptBody => &payload.res_body,
        SectionName::NullBody => &[],
    }
}

/// Serialize a response header and payload into the bytes written to the wire.
///
/// `header.encapsulated` supplies the *order* of sections to emit (their
/// incoming offsets are ignored and recomputed here); a `204` response is
/// forced to a bare `null-body=0` regardless of what the caller set.
pub fn serialize_response(header: &ResponseHeader, payload: &Payload) -> Bytes {
    let mut out = BytesMut::new();

    let sections: Vec<SectionName> = if header.status == status::NO_CONTENT {
        vec![SectionName::NullBody]
    } else if header.encapsulated.is_empty() {
        vec![SectionName::NullBody]
    } else {
        header.encapsulated.iter().map(|e| e.section).collect()
    };

    let mut body = BytesMut::new();
    let mut resolved = Vec::with_capacity(sections.len());
    for section in sections {
        let offset = body.len();
        resolved.push(EncapsulatedEntry { section, offset });
        if header.status == status::NO_CONTENT {
            continue;
        }
        match section {
            SectionName::ReqHdr | SectionName::ResHdr => {
                body.extend_from_slice(section_bytes(section, payload));
            }
            SectionName::ReqBody | SectionName::ResBody | SectionName::OptBody => {
                let chunked = encode_chunked(section_bytes(section, payload));
                body.extend_from_slice(&chunked);
            }
            SectionName::NullBody => {}
        }
    }

    let mut status_line = String::new();
    let _ = write!(
        status_line,
        "ICAP/{} {} {}\r\n",
        header.version, header.status, header.reason
    );
    out.extend_from_slice(status_line.as_bytes());

    for (name, value) in header.headers.iter() {
        let lower = name.as_str();
        if lower.eq_ignore_ascii_case("date")
            || lower.eq_ignore_ascii_case("server")
            || lower.eq_ignore_ascii_case("istag")
            || lower.eq_ignore_ascii_case("encapsulated")
        {
            continue;
        }
        let _ = write!(out, "{}: ", name.as_str());
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    if !header.headers.contains_key("date") {
        let _ = write!(out, "Date: {}\r\n", httpdate_now());
    }
    if !header.headers.contains_key("server") {
        let _ = write!(out, "Server: icapd/{}\r\n", crate::version::VERSION);
    }
    if !header.headers.contains_key("istag") {
        let _ = write!(out, "ISTag: {}\r\n", istag());
    }

    let encapsulated_value = resolved
        .iter()
        .map(|e| format!("{}={}", e.section.as_str(), e.offset))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(out, "Encapsulated: {encapsulated_value}\r\n");

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body);

    out.freeze()
}

fn httpdate_now() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parser::parse_response_header;

    #[test]
    fn no_content_response_serializes_to_null_body() {
        let header = ResponseHeader::new(status::NO_CONTENT);
        let bytes = serialize_response(&header, &Payload::default());
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("ICAP/1.0 204 No Content\r\n"));
        assert!(text.contains("Encapsulated: null-body=0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn encapsulated_offsets_match_true_section_lengths() {
        let mut header = ResponseHeader::new(status::OK);
        header.encapsulated = vec![
            EncapsulatedEntry {
                section: SectionName::ReqHdr,
                offset: 0,
            },
            EncapsulatedEntry {
                section: SectionName::NullBody,
                offset: 0,
            },
        ];
        let payload = Payload {
            req_header: Bytes::from_static(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            ..Default::default()
        };
        let bytes = serialize_response(&header, &payload);
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let expected_offset = payload.req_header.len();
        assert!(text.contains(&format!("Encapsulated: req-hdr=0, null-body={expected_offset}")));
    }

    #[test]
    fn body_section_is_chunk_encoded_in_wire_bytes() {
        let mut header = ResponseHeader::new(status::OK);
        header.encapsulated = vec![EncapsulatedEntry {
            section: SectionName::ReqBody,
            offset: 0,
        }];
        let payload = Payload {
            req_body: Bytes::from_static(b"hello"),
            ..Default::default()
        };
        let bytes = serialize_response(&header, &payload);
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.ends_with("5\r\nhello\r\n0\r\n\r\n"));
    }

    #[test]
    fn empty_body_section_serializes_to_bare_terminal_chunk() {
        let mut header = ResponseHeader::new(status::OK);
        header.encapsulated = vec![EncapsulatedEntry {
            section: SectionName::ResBody,
            offset: 0,
        }];
        let bytes = serialize_response(&header, &Payload::default());
        assert!(bytes.ends_with(b"0\r\n\r\n"));
    }

    #[test]
    fn istag_is_stable_across_calls() {
        assert_eq!(istag(), istag());
    }

    #[test]
    fn injected_headers_are_parseable_by_our_own_response_parser() {
        let header = ResponseHeader::new(status::OK);
        let bytes = serialize_response(&header, &Payload::default());
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let head_end = text.find("\r\n\r\n").unwrap();
        let reparsed = parse_response_header(&text[..head_end + 2]).unwrap();
        assert_eq!(reparsed.status, 200);
        assert!(reparsed.headers.contains_key("istag"));
    }
}
