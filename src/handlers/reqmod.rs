//! `REQMOD` orchestration: parse an encapsulated HTTP request (`req-hdr` +
//! optional `req-body`), run it through the configured `reqmod` modifier
//! chain, and return either the original request (`204`), a modified
//! request, or a self-contained HTTP response that short-circuits the
//! transaction.

use crate::error::IcapResult;
use crate::modules::{AdaptationRequest, AdaptationResponse, ModifierRegistry};

use super::{run_modify, run_preview, PreviewDecision};

pub fn preview(registry: &ModifierRegistry, request: &AdaptationRequest) -> IcapResult<PreviewDecision> {
    run_preview(registry.reqmod_chain(), request)
}

pub fn modify(registry: &ModifierRegistry, request: &AdaptationRequest) -> IcapResult<AdaptationResponse> {
    run_modify(registry.reqmod_chain(), request)
}
