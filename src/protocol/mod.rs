//! The ICAP wire protocol: framing, header parsing, chunked bodies with the
//! `ieof` extension, and response serialization.

pub mod chunked;
pub mod common;
pub mod parser;
pub mod serializer;

pub use common::{
    reason_phrase, status, EncapsulatedEntry, IcapMethod, Payload, RequestHeader, ResponseHeader,
    SectionName,
};
