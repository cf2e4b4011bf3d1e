//! Error types for the ICAP server
//!
//! Mirrors the error taxonomy in kind (not in type name): I/O failure, malformed
//! protocol input tagged with the status it should produce, inactivity timeout,
//! routing failure, modifier failure, and fatal startup failure.

use thiserror::Error;

/// Result type for ICAP server operations.
pub type IcapResult<T> = Result<T, IcapError>;

/// Error taxonomy for the ICAP server.
#[derive(Error, Debug)]
pub enum IcapError {
    /// Socket read/write failure, connection reset, or EOF mid-frame.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request line, header, `Encapsulated`, or chunked body.
    ///
    /// `code` is the ICAP status the worker should emit before closing the connection.
    #[error("protocol error ({code}): {message}")]
    Protocol { code: u16, message: String },

    /// Inactivity exceeded the configured read timeout.
    #[error("request timed out")]
    Timeout,

    /// Unknown URI or unsupported method.
    ///
    /// `code` is `404` or `405`; unlike `Protocol` the connection stays open.
    #[error("routing error ({code}): {message}")]
    Route { code: u16, message: String },

    /// A modifier failed or returned an invalid response.
    #[error("modifier `{module}` failed: {message}")]
    Module { module: String, message: String },

    /// Configuration file missing, unreadable, or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Startup failure: bind, fork, or PID-file lock.
    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl From<serde_yaml::Error> for IcapError {
    fn from(err: serde_yaml::Error) -> Self {
        IcapError::Config(err.to_string())
    }
}

/// Coarse severity, used to pick a log level without repeating the match at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IcapError {
    /// The ICAP status code a worker should emit in response to this error, if any.
    ///
    /// `Io` and `Fatal` have no associated response: the connection is already
    /// gone, or the process is about to exit.
    pub fn icap_status(&self) -> Option<u16> {
        match self {
            IcapError::Io(_) | IcapError::Fatal(_) | IcapError::Config(_) => None,
            IcapError::Protocol { code, .. } => Some(*code),
            IcapError::Timeout => Some(408),
            IcapError::Route { code, .. } => Some(*code),
            IcapError::Module { .. } => Some(500),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IcapError::Io(_) => ErrorSeverity::Medium,
            IcapError::Protocol { .. } => ErrorSeverity::Medium,
            IcapError::Timeout => ErrorSeverity::Low,
            IcapError::Route { .. } => ErrorSeverity::Low,
            IcapError::Module { .. } => ErrorSeverity::High,
            IcapError::Config(_) | IcapError::Fatal(_) => ErrorSeverity::Critical,
        }
    }

    /// Whether the connection should stay open after this error is handled.
    pub fn keeps_connection_open(&self) -> bool {
        matches!(self, IcapError::Route { .. } | IcapError::Module { .. })
    }

    pub fn protocol(code: u16, message: impl Into<String>) -> Self {
        IcapError::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn route(code: u16, message: impl Into<String>) -> Self {
        IcapError::Route {
            code,
            message: message.into(),
        }
    }

    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        IcapError::Module {
            module: module.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_maps_to_its_code() {
        let err = IcapError::protocol(414, "header block too large");
        assert_eq!(err.icap_status(), Some(414));
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn timeout_maps_to_408() {
        assert_eq!(IcapError::Timeout.icap_status(), Some(408));
    }

    #[test]
    fn io_and_fatal_have_no_response() {
        let io = IcapError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(io.icap_status(), None);
        assert_eq!(IcapError::Fatal("bind failed".into()).icap_status(), None);
    }

    #[test]
    fn route_and_module_errors_keep_connection_open() {
        assert!(IcapError::route(404, "no such service").keeps_connection_open());
        assert!(IcapError::module("filter", "panicked").keeps_connection_open());
        assert!(!IcapError::Timeout.keeps_connection_open());
    }
}
