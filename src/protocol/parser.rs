//! ICAP header-block parsing: request line / status line, header fields with
//! obs-fold continuation, and the `Encapsulated`/`Preview`/`Allow` headers
//! the server itself introspects.
//!
//! The caller is responsible for reading a complete `CRLF CRLF`-terminated
//! header block off the socket (see [`crate::socket`]) and enforcing the size
//! cap; this module is a pure function of that byte slice.

use http::{HeaderMap, HeaderName, HeaderValue};
use nom::bytes::complete::{tag, take_until};
use nom::combinator::rest;
use nom::sequence::terminated;
use nom::IResult;

use crate::error::IcapError;

use super::common::{EncapsulatedEntry, IcapMethod, RequestHeader, ResponseHeader, SectionName};

/// Split a header block into logical lines, joining obs-fold continuations
/// (a line beginning with SP or HTAB) onto the previous line's value.
fn logical_lines(block: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in block.split("\r\n") {
        if raw.is_empty() {
            continue;
        }
        if (raw.starts_with(' ') || raw.starts_with('\t')) && !lines.is_empty() {
            let last = lines.last_mut().unwrap();
            last.push(' ');
            last.push_str(raw.trim_start());
        } else {
            lines.push(raw.to_string());
        }
    }
    lines
}

fn request_line(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, method) = terminated(take_until(" "), tag(" "))(input)?;
    let (input, uri) = terminated(take_until(" "), tag(" "))(input)?;
    let (input, _) = tag("ICAP/")(input)?;
    let (input, version) = rest(input)?;
    Ok((input, (method, uri, version)))
}

fn status_line(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, _) = tag("ICAP/")(input)?;
    let (input, version) = terminated(take_until(" "), tag(" "))(input)?;
    let (input, code) = terminated(take_until(" "), tag(" "))(input)?;
    let (input, reason) = rest(input)?;
    Ok((input, (version, code, reason)))
}

fn split_header_line(line: &str) -> Result<(&str, &str), IcapError> {
    let colon = line
        .find(':')
        .ok_or_else(|| IcapError::protocol(400, format!("malformed header line: {line}")))?;
    let name = &line[..colon];
    let value = line[colon + 1..].trim();
    Ok((name, value))
}

fn build_header_map(lines: &[String]) -> Result<HeaderMap, IcapError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = split_header_line(line)?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| IcapError::protocol(400, format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|_| IcapError::protocol(400, format!("invalid header value: {value}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn parse_encapsulated(value: &str) -> Result<Vec<EncapsulatedEntry>, IcapError> {
    let mut entries = Vec::new();
    let mut last_offset = 0usize;
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, offset) = part
            .split_once('=')
            .ok_or_else(|| IcapError::protocol(400, format!("malformed Encapsulated entry: {part}")))?;
        let section = SectionName::parse(name.trim())
            .ok_or_else(|| IcapError::protocol(400, format!("unknown encapsulation section: {name}")))?;
        let offset: usize = offset
            .trim()
            .parse()
            .map_err(|_| IcapError::protocol(400, format!("non-numeric offset: {offset}")))?;
        if offset < last_offset {
            return Err(IcapError::protocol(400, "Encapsulated offsets must be non-decreasing"));
        }
        last_offset = offset;
        entries.push(EncapsulatedEntry { section, offset });
    }
    Ok(entries)
}

fn parse_preview(value: &str) -> Result<usize, IcapError> {
    value
        .trim()
        .parse()
        .map_err(|_| IcapError::protocol(400, format!("non-numeric Preview: {value}")))
}

fn allow_204(headers: &HeaderMap) -> bool {
    headers.get_all("allow").iter().any(|v| {
        v.to_str()
            .map(|s| s.split(',').any(|tok| tok.trim() == "204"))
            .unwrap_or(false)
    })
}

fn decode_special(headers: &HeaderMap) -> Result<(Vec<EncapsulatedEntry>, Option<usize>), IcapError> {
    let encapsulated = match headers.get("encapsulated") {
        Some(v) => {
            let s = v
                .to_str()
                .map_err(|_| IcapError::protocol(400, "non-UTF8 Encapsulated header"))?;
            parse_encapsulated(s)?
        }
        None => Vec::new(),
    };
    let preview = match headers.get("preview") {
        Some(v) => {
            let s = v
                .to_str()
                .map_err(|_| IcapError::protocol(400, "non-UTF8 Preview header"))?;
            Some(parse_preview(s)?)
        }
        None => None,
    };
    Ok((encapsulated, preview))
}

/// Parse a complete `CRLF CRLF`-terminated ICAP request header block
/// (the trailing blank line must already be stripped by the caller).
pub fn parse_request_header(block: &str) -> Result<RequestHeader, IcapError> {
    let lines = logical_lines(block);
    let (first, rest) = lines
        .split_first()
        .ok_or_else(|| IcapError::protocol(400, "empty request"))?;

    let (_, (method, uri, version)) = request_line(first)
        .map_err(|_| IcapError::protocol(400, format!("malformed request line: {first}")))?;
    if version != "1.0" {
        return Err(IcapError::protocol(505, format!("unsupported version: ICAP/{version}")));
    }

    let headers = build_header_map(rest)?;
    let (encapsulated, preview) = decode_special(&headers)?;

    Ok(RequestHeader {
        method: IcapMethod::parse(method),
        uri: uri.to_string(),
        version: version.to_string(),
        allow_204: allow_204(&headers),
        headers,
        encapsulated,
        preview,
    })
}

/// Parse a complete ICAP response header block. Used by tests exercising the
/// `serialize(parse(x)) == x` round-trip property; the server itself never
/// needs to parse its own responses in production.
pub fn parse_response_header(block: &str) -> Result<ResponseHeader, IcapError> {
    let lines = logical_lines(block);
    let (first, rest) = lines
        .split_first()
        .ok_or_else(|| IcapError::protocol(400, "empty response"))?;

    let (_, (version, code, reason)) = status_line(first)
        .map_err(|_| IcapError::protocol(400, format!("malformed status line: {first}")))?;
    let status: u16 = code
        .parse()
        .map_err(|_| IcapError::protocol(400, format!("non-numeric status: {code}")))?;

    let headers = build_header_map(rest)?;
    let (encapsulated, _preview) = decode_special(&headers)?;

    Ok(ResponseHeader {
        status,
        reason: reason.to_string(),
        version: version.to_string(),
        headers,
        encapsulated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_request() {
        let block = "OPTIONS icap://h/reqmod ICAP/1.0\r\nHost: h\r\nEncapsulated: null-body=0\r\n";
        let header = parse_request_header(block).unwrap();
        assert_eq!(header.method, IcapMethod::Options);
        assert_eq!(header.uri, "icap://h/reqmod");
        assert_eq!(header.encapsulated.len(), 1);
        assert_eq!(header.encapsulated[0].section, SectionName::NullBody);
    }

    #[test]
    fn rejects_unsupported_version() {
        let block = "REQMOD icap://h/ ICAP/2.0\r\n";
        let err = parse_request_header(block).unwrap_err();
        assert_eq!(err.icap_status(), Some(505));
    }

    #[test]
    fn rejects_malformed_request_line() {
        let err = parse_request_header("garbage\r\n").unwrap_err();
        assert_eq!(err.icap_status(), Some(400));
    }

    #[test]
    fn decodes_preview_and_allow_204() {
        let block = "REQMOD icap://h/r ICAP/1.0\r\nPreview: 10\r\nAllow: 204\r\n";
        let header = parse_request_header(block).unwrap();
        assert_eq!(header.preview, Some(10));
        assert!(header.allow_204);
    }

    #[test]
    fn obs_fold_continuation_is_joined() {
        let block = "REQMOD icap://h/r ICAP/1.0\r\nX-Long: part-one\r\n part-two\r\n";
        let header = parse_request_header(block).unwrap();
        assert_eq!(
            header.headers.get("x-long").unwrap().to_str().unwrap(),
            "part-one part-two"
        );
    }

    #[test]
    fn rejects_unknown_encapsulated_section() {
        let block = "REQMOD icap://h/r ICAP/1.0\r\nEncapsulated: bogus=0\r\n";
        let err = parse_request_header(block).unwrap_err();
        assert_eq!(err.icap_status(), Some(400));
    }

    #[test]
    fn rejects_decreasing_encapsulated_offsets() {
        let block = "REQMOD icap://h/r ICAP/1.0\r\nEncapsulated: req-hdr=10, null-body=0\r\n";
        let err = parse_request_header(block).unwrap_err();
        assert_eq!(err.icap_status(), Some(400));
    }

    #[test]
    fn parses_response_status_line() {
        let block = "ICAP/1.0 204 No Content\r\nISTag: \"abc\"\r\n";
        let header = parse_response_header(block).unwrap();
        assert_eq!(header.status, 204);
        assert_eq!(header.reason, "No Content");
    }

    #[test]
    fn header_names_are_case_insensitive_on_lookup() {
        let block = "REQMOD icap://h/r ICAP/1.0\r\nHOST: example\r\n";
        let header = parse_request_header(block).unwrap();
        assert_eq!(header.headers.get("host").unwrap(), "example");
    }
}
