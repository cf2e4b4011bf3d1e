/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

//! The modifier capability set and its registry.
//!
//! A [`Modifier`] is deliberately narrow: `name`, `preview`, `modify`. Modules
//! are resolved by name from a static registry built at process startup
//! rather than `dlopen`'d — see `SPEC_FULL.md` §9/§10.7 for why.

pub mod content_filter;
pub mod echo;

use std::sync::Arc;

use crate::error::IcapResult;
use crate::protocol::{Payload, RequestHeader, ResponseHeader};

/// The request side of an adaptation: the parsed ICAP request header plus
/// whatever encapsulated HTTP header/body bytes came with it (or have
/// arrived so far, for `preview`).
pub struct AdaptationRequest {
    pub header: RequestHeader,
    pub payload: Payload,
}

/// A complete adapted response, ready for the worker to serialize.
pub struct AdaptationResponse {
    pub header: ResponseHeader,
    pub payload: Payload,
}

/// What a modifier decided after looking at the preview (or the complete
/// body, for `modify`).
pub enum ModifierOutcome {
    /// Ask the client for the rest of the body via `100 Continue`.
    Continue100,
    /// The request/response needs no adaptation.
    NoContent204,
    /// A complete response the worker should send as-is.
    Final(AdaptationResponse),
}

/// A pluggable adaptation unit.
pub trait Modifier: Send + Sync {
    /// Stable identifier, used in logs and to resolve config entries.
    fn name(&self) -> &str;

    /// Called once the preview bytes (if any) have been read. Implementors
    /// that don't care about previews can always return `Continue100`.
    fn preview(&self, request: &AdaptationRequest) -> IcapResult<ModifierOutcome>;

    /// Called after the complete body has been read; only invoked if
    /// `preview` returned `Continue100` or the request announced no preview.
    fn modify(&self, request: &AdaptationRequest) -> IcapResult<AdaptationResponse>;
}

type ModifierConstructor = fn() -> Arc<dyn Modifier>;

/// Every module name this build knows how to construct.
pub fn known_module_names() -> &'static [&'static str] {
    &["echo", "content_filter"]
}

fn constructor_for(module_name: &str) -> Option<ModifierConstructor> {
    match module_name {
        "echo" => Some(|| Arc::new(echo::EchoModifier::new()) as Arc<dyn Modifier>),
        "content_filter" => {
            Some(|| Arc::new(content_filter::ContentFilterModifier::default()) as Arc<dyn Modifier>)
        }
        _ => None,
    }
}

/// Maps ICAP method to an ordered chain of modifiers, built once at startup
/// from [`crate::config::Config`].
pub struct ModifierRegistry {
    reqmod: Vec<Arc<dyn Modifier>>,
    respmod: Vec<Arc<dyn Modifier>>,
}

impl ModifierRegistry {
    pub fn from_config(config: &crate::config::Config) -> Self {
        let build = |names: &[String]| -> Vec<Arc<dyn Modifier>> {
            names
                .iter()
                .filter_map(|name| config.modules.get(name))
                .filter_map(|module_config| constructor_for(&module_config.module_name))
                .map(|ctor| ctor())
                .collect()
        };
        ModifierRegistry {
            reqmod: build(&config.handlers.reqmod),
            respmod: build(&config.handlers.respmod),
        }
    }

    pub fn empty() -> Self {
        ModifierRegistry {
            reqmod: Vec::new(),
            respmod: Vec::new(),
        }
    }

    pub fn reqmod_chain(&self) -> &[Arc<dyn Modifier>] {
        &self.reqmod
    }

    pub fn respmod_chain(&self) -> &[Arc<dyn Modifier>] {
        &self.respmod
    }
}
