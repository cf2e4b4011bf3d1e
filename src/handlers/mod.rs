//! Per-method request handlers (§4.6): route a parsed request to a modifier
//! chain, apply the tie-breaking rule across multiple modifiers, and enforce
//! that a `204` only ever leaves the wire when the client asked for one.

pub mod options;
pub mod reqmod;
pub mod respmod;

use std::sync::Arc;

use crate::error::IcapResult;
use crate::modules::{AdaptationRequest, AdaptationResponse, Modifier, ModifierOutcome};
use crate::protocol::common::status;
use crate::protocol::{EncapsulatedEntry, ResponseHeader};

/// What happened after consulting every modifier's `preview`.
pub enum PreviewDecision {
    /// At least one modifier asked for the rest of the body and none
    /// short-circuited with a final response yet.
    NeedsBody,
    /// The transaction is decided without reading any more of the body.
    Final(AdaptationResponse),
}

/// `204` if the client allows it, otherwise a `200` echoing the input
/// unchanged — the fallback used whenever a chain (or the empty chain)
/// agrees no modification is needed.
fn no_content_or_echo(request: &AdaptationRequest) -> AdaptationResponse {
    if request.header.allow_204 {
        return AdaptationResponse {
            header: ResponseHeader::new(status::NO_CONTENT),
            payload: request.payload.clone(),
        };
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
    AdaptationResponse {
        header,
        payload: request.payload.clone(),
    }
}

/// A `204` must never reach the wire unless the client advertised
/// `Allow: 204` — modifiers are trusted to respect this for their own
/// responses, but the chain-level fallback enforces it regardless.
fn finalize(response: AdaptationResponse, request: &AdaptationRequest) -> AdaptationResponse {
    if response.header.status == status::NO_CONTENT && !request.header.allow_204 {
        no_content_or_echo(request)
    } else {
        response
    }
}

/// Run the preview phase of a modifier chain (§4.5/§4.6 tie-breaking):
/// invoke in registration order, first non-`204` final response wins.
pub fn run_preview(
    chain: &[Arc<dyn Modifier>],
    request: &AdaptationRequest,
) -> IcapResult<PreviewDecision> {
    if chain.is_empty() {
        return Ok(PreviewDecision::Final(finalize(
            no_content_or_echo(request),
            request,
        )));
    }
    let mut needs_body = false;
    for modifier in chain {
        match modifier.preview(request)? {
            ModifierOutcome::Final(response) => {
                return Ok(PreviewDecision::Final(finalize(response, request)))
            }
            ModifierOutcome::Continue100 => needs_body = true,
            ModifierOutcome::NoContent204 => {}
        }
    }
    if needs_body {
        Ok(PreviewDecision::NeedsBody)
    } else {
        Ok(PreviewDecision::Final(finalize(
            no_content_or_echo(request),
            request,
        )))
    }
}

/// Run the full-body phase: only reached if `run_preview` returned
/// `NeedsBody` or the request announced no preview at all.
pub fn run_modify(
    chain: &[Arc<dyn Modifier>],
    request: &AdaptationRequest,
) -> IcapResult<AdaptationResponse> {
    if chain.is_empty() {
        return Ok(finalize(no_content_or_echo(request), request));
    }
    let mut last_no_content = None;
    for modifier in chain {
        let response = modifier.modify(request)?;
        if response.header.status != status::NO_CONTENT {
            return Ok(finalize(response, request));
        }
        last_no_content = Some(response);
    }
    Ok(finalize(
        last_no_content.unwrap_or_else(|| no_content_or_echo(request)),
        request,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IcapError;
    use crate::protocol::{IcapMethod, Payload, RequestHeader};
    use http::HeaderMap;

    struct AlwaysFinal(u16);
    impl Modifier for AlwaysFinal {
        fn name(&self) -> &str {
            "always-final"
        }
        fn preview(&self, _: &AdaptationRequest) -> IcapResult<ModifierOutcome> {
            Ok(ModifierOutcome::Final(AdaptationResponse {
                header: ResponseHeader::new(self.0),
                payload: Payload::default(),
            }))
        }
        fn modify(&self, _: &AdaptationRequest) -> IcapResult<AdaptationResponse> {
            Ok(AdaptationResponse {
                header: ResponseHeader::new(self.0),
                payload: Payload::default(),
            })
        }
    }

    struct AlwaysNoContent;
    impl Modifier for AlwaysNoContent {
        fn name(&self) -> &str {
            "always-204"
        }
        fn preview(&self, _: &AdaptationRequest) -> IcapResult<ModifierOutcome> {
            Ok(ModifierOutcome::NoContent204)
        }
        fn modify(&self, request: &AdaptationRequest) -> IcapResult<AdaptationResponse> {
            Ok(AdaptationResponse {
                header: ResponseHeader::new(status::NO_CONTENT),
                payload: request.payload.clone(),
            })
        }
    }

    struct AlwaysError;
    impl Modifier for AlwaysError {
        fn name(&self) -> &str {
            "always-error"
        }
        fn preview(&self, _: &AdaptationRequest) -> IcapResult<ModifierOutcome> {
            Err(IcapError::module("always-error", "should not be reached"))
        }
        fn modify(&self, _: &AdaptationRequest) -> IcapResult<AdaptationResponse> {
            Err(IcapError::module("always-error", "should not be reached"))
        }
    }

    fn request(allow_204: bool) -> AdaptationRequest {
        AdaptationRequest {
            header: RequestHeader {
                method: IcapMethod::Reqmod,
                uri: "icap://h/r".to_string(),
                version: "1.0".to_string(),
                headers: HeaderMap::new(),
                encapsulated: Vec::new(),
                preview: None,
                allow_204,
            },
            payload: Payload::default(),
        }
    }

    #[test]
    fn empty_chain_yields_204_when_allowed() {
        let decision = run_preview(&[], &request(true)).unwrap();
        match decision {
            PreviewDecision::Final(r) => assert_eq!(r.header.status, status::NO_CONTENT),
            _ => panic!("expected Final"),
        }
    }

    #[test]
    fn empty_chain_echoes_as_200_when_204_not_allowed() {
        let decision = run_preview(&[], &request(false)).unwrap();
        match decision {
            PreviewDecision::Final(r) => assert_eq!(r.header.status, status::OK),
            _ => panic!("expected Final"),
        }
    }

    #[test]
    fn first_non_204_modifier_short_circuits_later_ones() {
        let chain: Vec<Arc<dyn Modifier>> =
            vec![Arc::new(AlwaysFinal(403)), Arc::new(AlwaysError)];
        let decision = run_preview(&chain, &request(true)).unwrap();
        match decision {
            PreviewDecision::Final(r) => assert_eq!(r.header.status, 403),
            _ => panic!("expected Final"),
        }
    }

    #[test]
    fn all_204_preview_chain_resolves_without_needing_body() {
        let chain: Vec<Arc<dyn Modifier>> = vec![Arc::new(AlwaysNoContent), Arc::new(AlwaysNoContent)];
        let decision = run_preview(&chain, &request(true)).unwrap();
        match decision {
            PreviewDecision::Final(r) => assert_eq!(r.header.status, status::NO_CONTENT),
            _ => panic!("expected Final"),
        }
    }

    #[test]
    fn modifier_204_is_converted_to_200_echo_when_client_disallows_204() {
        let chain: Vec<Arc<dyn Modifier>> = vec![Arc::new(AlwaysNoContent)];
        let response = run_modify(&chain, &request(false)).unwrap();
        assert_eq!(response.header.status, status::OK);
    }

    #[test]
    fn modify_first_non_204_wins() {
        let chain: Vec<Arc<dyn Modifier>> =
            vec![Arc::new(AlwaysNoContent), Arc::new(AlwaysFinal(403))];
        let response = run_modify(&chain, &request(true)).unwrap();
        assert_eq!(response.header.status, 403);
    }
}
