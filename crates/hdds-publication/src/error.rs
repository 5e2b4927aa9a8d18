// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by publication engine operations.
//!
//! Every public operation returns an explicit [`Result`]. The variants map
//! one-to-one onto DDS return codes, see [`Error::return_code`].

use crate::filter::FilterError;

/// Errors returned by the publication engine.
///
/// # Example
///
/// ```rust
/// use hdds_publication::Error;
///
/// let err = Error::PreconditionNotMet("instance handle mismatch".into());
/// assert_eq!(err.return_code(), "RETCODE_PRECONDITION_NOT_MET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Entity state
    // ========================================================================
    /// Operation attempted before `enable()`.
    NotEnabled,
    /// Writer was deleted (or its owning publisher/participant is gone).
    AlreadyDeleted,
    /// Invalid state for the requested operation.
    InvalidState(String),
    /// Handle or sample does not match a live instance.
    PreconditionNotMet(String),
    /// Argument rejected (unknown handle, malformed filter, ...).
    BadParameter(String),

    // ========================================================================
    // Resources
    // ========================================================================
    /// Buffer acquisition or acknowledgment wait hit its deadline.
    Timeout,
    /// Resource limits prevent the operation.
    ResourceExhausted(String),

    // ========================================================================
    // Data / collaborators
    // ========================================================================
    /// Sample or key could not be serialized.
    SerializationError(String),
    /// Transport could not establish a link with a reader.
    AssociationFailed(String),
    /// Denied by the security access-control plugin.
    NotAllowedBySecurity,

    // ========================================================================
    // QoS
    // ========================================================================
    /// QoS is invalid or self-inconsistent.
    InconsistentPolicy(String),
    /// QoS change touches a policy that cannot change after enable.
    ImmutablePolicy(String),

    /// Collaborator failure not covered above.
    Internal(String),
}

impl Error {
    /// DDS return-code name for this error.
    pub fn return_code(&self) -> &'static str {
        match self {
            Error::NotEnabled => "RETCODE_NOT_ENABLED",
            Error::AlreadyDeleted => "RETCODE_ALREADY_DELETED",
            Error::InvalidState(_) | Error::PreconditionNotMet(_) => "RETCODE_PRECONDITION_NOT_MET",
            Error::BadParameter(_) => "RETCODE_BAD_PARAMETER",
            Error::Timeout => "RETCODE_TIMEOUT",
            Error::ResourceExhausted(_) => "RETCODE_OUT_OF_RESOURCES",
            Error::SerializationError(_) | Error::AssociationFailed(_) | Error::Internal(_) => {
                "RETCODE_ERROR"
            }
            Error::NotAllowedBySecurity => "RETCODE_NOT_ALLOWED_BY_SECURITY",
            Error::InconsistentPolicy(_) => "RETCODE_INCONSISTENT_POLICY",
            Error::ImmutablePolicy(_) => "RETCODE_IMMUTABLE_POLICY",
        }
    }

    /// True for the timeout class (buffer or ack wait).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotEnabled => write!(f, "Entity is not enabled"),
            Error::AlreadyDeleted => write!(f, "Entity already deleted"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::PreconditionNotMet(msg) => write!(f, "Precondition not met: {}", msg),
            Error::BadParameter(msg) => write!(f, "Bad parameter: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ResourceExhausted(msg) => write!(f, "Out of resources: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization failed: {}", msg),
            Error::AssociationFailed(msg) => write!(f, "Association failed: {}", msg),
            Error::NotAllowedBySecurity => write!(f, "Not allowed by security"),
            Error::InconsistentPolicy(msg) => write!(f, "Inconsistent QoS policy: {}", msg),
            Error::ImmutablePolicy(msg) => write!(f, "Immutable QoS policy: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<FilterError> for Error {
    fn from(e: FilterError) -> Self {
        Error::BadParameter(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

/// Convenient alias for engine results.
pub type Result<T> = core::result::Result<T, Error>;
