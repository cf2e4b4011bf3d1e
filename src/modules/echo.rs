//! The `echo` built-in modifier: never changes the message, it only decides
//! whether a `204 No Content` is acceptable or whether the unmodified content
//! has to be echoed back in full.

use crate::protocol::common::status;
use crate::protocol::{EncapsulatedEntry, ResponseHeader};

use super::{AdaptationRequest, AdaptationResponse, Modifier, ModifierOutcome};

pub struct EchoModifier;

impl EchoModifier {
    pub fn new() -> Self {
        EchoModifier
    }
}

impl Default for EchoModifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Modifier for EchoModifier {
    fn name(&self) -> &str {
        "echo"
    }

    fn preview(&self, request: &AdaptationRequest) -> crate::error::IcapResult<ModifierOutcome> {
        if request.header.allow_204 {
            Ok(ModifierOutcome::NoContent204)
        } else {
            Ok(ModifierOutcome::Continue100)
        }
    }

    fn modify(&self, request: &AdaptationRequest) -> crate::error::IcapResult<AdaptationResponse> {
        if request.header.allow_204 {
            return Ok(AdaptationResponse {
                header: ResponseHeader::new(status::NO_CONTENT),
                payload: request.payload.clone(),
            });
        }
        let mut header = ResponseHeader::new(status::OK);
        header.encapsulated = request
            .header
            .encapsulated
            .iter()
            .map(|e| EncapsulatedEntry {
                section: e.section,
                offset: e.offset,
            })
            .collect();
        Ok(AdaptationResponse {
            header,
            payload: request.payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{IcapMethod, Payload, RequestHeader};
    use bytes::Bytes;
    use http::HeaderMap;

    fn request(allow_204: bool) -> AdaptationRequest {
        AdaptationRequest {
            header: RequestHeader {
                method: IcapMethod::Reqmod,
                uri: "icap://h/echo".to_string(),
                version: "1.0".to_string(),
                headers: HeaderMap::new(),
                encapsulated: Vec::new(),
                preview: None,
                allow_204,
            },
            payload: Payload {
                req_header: Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"),
                ..Default::default()
            },
        }
    }

    #[test]
    fn preview_prefers_204_when_allowed() {
        let echo = EchoModifier::new();
        assert!(matches!(
            echo.preview(&request(true)).unwrap(),
            ModifierOutcome::NoContent204
        ));
    }

    #[test]
    fn preview_requests_the_rest_of_the_body_when_204_is_not_allowed() {
        let echo = EchoModifier::new();
        assert!(matches!(
            echo.preview(&request(false)).unwrap(),
            ModifierOutcome::Continue100
        ));
    }

    #[test]
    fn modify_echoes_payload_unchanged_when_204_not_allowed() {
        let echo = EchoModifier::new();
        let req = request(false);
        let original = req.payload.req_header.clone();
        let response = echo.modify(&req).unwrap();
        assert_eq!(response.header.status, status::OK);
        assert_eq!(response.payload.req_header, original);
    }

    #[test]
    fn modify_returns_204_when_allowed() {
        let echo = EchoModifier::new();
        let response = echo.modify(&request(true)).unwrap();
        assert_eq!(response.header.status, status::NO_CONTENT);
    }
}
