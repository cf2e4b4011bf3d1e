//! Version information for the ICAP server

/// The version of the ICAP server
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the ICAP server
pub const NAME: &str = "icapd";

/// The description of the ICAP server
pub const DESCRIPTION: &str = "ICAP server for request/response content adaptation";
