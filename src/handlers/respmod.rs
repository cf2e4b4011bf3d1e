//! `RESPMOD` orchestration: parse an encapsulated HTTP response (`req-hdr` +
//! `res-hdr` + optional `res-body`), run it through the configured
//! `respmod` modifier chain, and return `204` or a modified response.

use crate::error::IcapResult;
use crate::modules::{AdaptationRequest, AdaptationResponse, ModifierRegistry};

use super::{run_modify, run_preview, PreviewDecision};

pub fn preview(registry: &ModifierRegistry, request: &AdaptationRequest) -> IcapResult<PreviewDecision> {
    run_preview(registry.respmod_chain(), request)
}

pub fn modify(registry: &ModifierRegistry, request: &AdaptationRequest) -> IcapResult<AdaptationResponse> {
    run_modify(registry.respmod_chain(), request)
}
