/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! The `content_filter` built-in modifier.
//!
//! Trimmed from a richer design (MIME-type gating, file-size limits, regex
//! patterns, per-category scoring) down to the single strategy `SPEC_FULL.md`
//! §10.7 keeps: substring matching against the `Host` header and the body,
//! with one synthesized block response. Everything else is future work, not
//! dropped by oversight.

use bytes::Bytes;

use crate::error::IcapResult;
use crate::protocol::common::status;
use crate::protocol::{Payload, ResponseHeader};

use super::{AdaptationRequest, AdaptationResponse, Modifier, ModifierOutcome};

/// What happens to a blocked request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockingAction {
    /// Synthesize an HTTP `403 Forbidden`.
    Forbidden,
    /// Synthesize an HTTP response with a caller-chosen status code.
    Custom(u16),
}

impl Default for BlockingAction {
    fn default() -> Self {
        BlockingAction::Forbidden
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentFilterConfig {
    pub blocked_domains: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub case_insensitive: bool,
    pub blocking_action: BlockingAction,
}

enum BlockReason {
    Domain(String),
    Keyword(String),
}

pub struct ContentFilterModifier {
    config: ContentFilterConfig,
}

impl ContentFilterModifier {
    pub fn new(config: ContentFilterConfig) -> Self {
        ContentFilterModifier { config }
    }

    fn contains(&self, haystack: &str, needle: &str) -> bool {
        if self.config.case_insensitive {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        } else {
            haystack.contains(needle)
        }
    }

    fn check_host(&self, request: &AdaptationRequest) -> Option<BlockReason> {
        let host = request.header.headers.get("host")?.to_str().ok()?;
        self.config
            .blocked_domains
            .iter()
            .find(|domain| self.contains(host, domain))
            .map(|domain| BlockReason::Domain(domain.clone()))
    }

    fn check_body(&self, payload: &Payload) -> Option<BlockReason> {
        let body = String::from_utf8_lossy(&payload.req_body);
        let body2 = String::from_utf8_lossy(&payload.res_body);
        self.config
            .blocked_keywords
            .iter()
            .find(|kw| self.contains(&body, kw) || self.contains(&body2, kw))
            .map(|kw| BlockReason::Keyword(kw.clone()))
    }

    fn block_response(&self, reason: BlockReason) -> AdaptationResponse {
        let code = match self.config.blocking_action {
            BlockingAction::Forbidden => 403,
            BlockingAction::Custom(code) => code,
        };
        let reason_text = match reason {
            BlockReason::Domain(domain) => format!("blocked domain: {domain}"),
            BlockReason::Keyword(keyword) => format!("blocked keyword: {keyword}"),
        };
        let body = format!("Content blocked by content_filter ({reason_text})\n");
        let http_status_line = format!("HTTP/1.1 {code} Blocked\r\n");
        let http_headers = format!(
            "Content-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let res_header = Bytes::from(format!("{http_status_line}{http_headers}"));

        let mut header = ResponseHeader::new(status::OK);
        header.encapsulated = vec![
            crate::protocol::EncapsulatedEntry {
                section: crate::protocol::SectionName::ResHdr,
                offset: 0,
            },
            crate::protocol::EncapsulatedEntry {
                section: crate::protocol::SectionName::ResBody,
                offset: 0,
            },
        ];
        AdaptationResponse {
            header,
            payload: Payload {
                res_header,
                res_body: Bytes::from(body),
                ..Default::default()
            },
        }
    }
}

impl Default for ContentFilterModifier {
    fn default() -> Self {
        ContentFilterModifier::new(ContentFilterConfig::default())
    }
}

impl Modifier for ContentFilterModifier {
    fn name(&self) -> &str {
        "content_filter"
    }

    fn preview(&self, request: &AdaptationRequest) -> IcapResult<ModifierOutcome> {
        if let Some(reason) = self.check_host(request) {
            return Ok(ModifierOutcome::Final(self.block_response(reason)));
        }
        if self.config.blocked_keywords.is_empty() && request.header.allow_204 {
            return Ok(ModifierOutcome::NoContent204);
        }
        Ok(ModifierOutcome::Continue100)
    }

    fn modify(&self, request: &AdaptationRequest) -> IcapResult<AdaptationResponse> {
        if let Some(reason) = self.check_host(request) {
            return Ok(self.block_response(reason));
        }
        if let Some(reason) = self.check_body(&request.payload) {
            return Ok(self.block_response(reason));
        }
        if request.header.allow_204 {
            return Ok(AdaptationResponse {
                header: ResponseHeader::new(status::NO_CONTENT),
                payload: request.payload.clone(),
            });
        }
        let mut header = ResponseHeader::new(status::OK);
        header.encapsulated = request.header.encapsulated.clone();
        Ok(AdaptationResponse {
            header,
            payload: request.payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{IcapMethod, RequestHeader};
    use http::{HeaderMap, HeaderValue};

    fn request(host: Option<&str>, body: &[u8], allow_204: bool) -> AdaptationRequest {
        let mut headers = HeaderMap::new();
        if let Some(host) = host {
            headers.insert("host", HeaderValue::from_str(host).unwrap());
        }
        AdaptationRequest {
            header: RequestHeader {
                method: IcapMethod::Reqmod,
                uri: "icap://h/filter".to_string(),
                version: "1.0".to_string(),
                headers,
                encapsulated: Vec::new(),
                preview: None,
                allow_204,
            },
            payload: Payload {
                req_body: Bytes::copy_from_slice(body),
                ..Default::default()
            },
        }
    }

    #[test]
    fn blocks_on_matching_host() {
        let modifier = ContentFilterModifier::new(ContentFilterConfig {
            blocked_domains: vec!["bad.example".to_string()],
            case_insensitive: true,
            ..Default::default()
        });
        let response = modifier
            .modify(&request(Some("BAD.example"), b"hello", false))
            .unwrap();
        assert_eq!(response.header.status, status::OK);
        assert!(String::from_utf8_lossy(&response.payload.res_header).starts_with("HTTP/1.1 403"));
    }

    #[test]
    fn blocks_on_matching_body_keyword() {
        let modifier = ContentFilterModifier::new(ContentFilterConfig {
            blocked_keywords: vec!["forbidden-term".to_string()],
            case_insensitive: true,
            ..Default::default()
        });
        let response = modifier
            .modify(&request(None, b"this has a Forbidden-Term in it", false))
            .unwrap();
        assert!(String::from_utf8_lossy(&response.payload.res_header).starts_with("HTTP/1.1 403"));
    }

    #[test]
    fn custom_blocking_action_uses_its_status_code() {
        let modifier = ContentFilterModifier::new(ContentFilterConfig {
            blocked_keywords: vec!["x".to_string()],
            blocking_action: BlockingAction::Custom(451),
            ..Default::default()
        });
        let response = modifier.modify(&request(None, b"x", false)).unwrap();
        assert!(String::from_utf8_lossy(&response.payload.res_header).starts_with("HTTP/1.1 451"));
    }

    #[test]
    fn unmatched_content_passes_through_as_204() {
        let modifier = ContentFilterModifier::default();
        let response = modifier.modify(&request(Some("fine.example"), b"clean", true)).unwrap();
        assert_eq!(response.header.status, status::NO_CONTENT);
    }

    #[test]
    fn preview_blocks_early_on_host_without_waiting_for_body() {
        let modifier = ContentFilterModifier::new(ContentFilterConfig {
            blocked_domains: vec!["bad.example".to_string()],
            ..Default::default()
        });
        let outcome = modifier
            .preview(&request(Some("bad.example"), b"", false))
            .unwrap();
        assert!(matches!(outcome, ModifierOutcome::Final(_)));
    }
}

