use std::fmt;

/// Message returned to denied callers, whatever the reason.
pub const DENIED_MESSAGE: &str = "permission denied, please check your capabilities";

/// Reasons a request is denied by the capability gate.
///
/// The variants exist for logs and tests; callers only ever see
/// [`DENIED_MESSAGE`].
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The identity lookup failed or returned an unusable answer.
    #[error("identity lookup failed: {0}")]
    LookupFailed(String),

    /// The caller's identity carries no grant in this namespace.
    #[error("missing capability namespace {namespace}")]
    MissingCapability { namespace: String },

    /// The namespace value could not be parsed as a list of grants.
    #[error("malformed capability: {0}")]
    MalformedCapability(String),

    /// No grant matches the request's method and endpoint.
    #[error("not permitted: {method} on {endpoint:?}")]
    NotPermitted { method: String, endpoint: String },
}

impl GateError {
    /// The text shown to the caller.
    pub fn public_message(&self) -> &'static str {
        DENIED_MESSAGE
    }
}

impl PartialEq for GateError {
    fn eq(&self, other: &Self) -> bool {
        // Compare by display representation for test convenience.
        fmt::format(format_args!("{self}")) == fmt::format(format_args!("{other}"))
    }
}

impl Eq for GateError {}

/// Result alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;
