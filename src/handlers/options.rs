//! The built-in `OPTIONS` handler: a static capability document, synthesized
//! without invoking any modifier.

use http::HeaderValue;

use crate::modules::AdaptationResponse;
use crate::protocol::common::status;
use crate::protocol::serializer::istag;
use crate::protocol::{EncapsulatedEntry, Payload, ResponseHeader, SectionName};

/// Suggested preview size advertised to clients, in bytes.
const DEFAULT_PREVIEW_SIZE: u64 = 4096;

/// Build the `OPTIONS` response for a request whose URI path selects
/// `method` (`REQMOD` or `RESPMOD`).
pub fn response(method: &str) -> AdaptationResponse {
    let mut header = ResponseHeader::new(status::OK);
    header.headers.insert(
        "methods",
        HeaderValue::from_str(method).expect("method token is always a valid header value"),
    );
    header
        .headers
        .insert("service", HeaderValue::from_static("icapd ICAP server"));
    header
        .headers
        .insert("istag", HeaderValue::from_str(istag()).expect("istag is ASCII"));
    header
        .headers
        .insert("max-connections", HeaderValue::from_static("1000"));
    header
        .headers
        .insert("options-ttl", HeaderValue::from_static("3600"));
    header
        .headers
        .insert("allow", HeaderValue::from_static("204"));
    header.headers.insert(
        "preview",
        HeaderValue::from_str(&DEFAULT_PREVIEW_SIZE.to_string()).unwrap(),
    );
    header
        .headers
        .insert("transfer-preview", HeaderValue::from_static("*"));
    header
        .headers
        .insert("transfer-ignore", HeaderValue::from_static(""));
    header
        .headers
        .insert("transfer-complete", HeaderValue::from_static("*"));
    header.encapsulated = vec![EncapsulatedEntry {
        section: SectionName::NullBody,
        offset: 0,
    }];

    AdaptationResponse {
        header,
        payload: Payload::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announces_the_requested_method_and_istag() {
        let response = response("REQMOD");
        assert_eq!(response.header.headers.get("methods").unwrap(), "REQMOD");
        assert!(response.header.headers.contains_key("istag"));
        assert_eq!(response.header.headers.get("allow").unwrap(), "204");
    }
}
