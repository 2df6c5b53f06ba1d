//! Error types for Onshape addressing, transport and mutation.

use thiserror::Error;

/// Result type for Onshape REST calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors produced while building or parsing a resource address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// A component required by a more specific one is absent.
    #[error("{missing} is required when {required_by} is given")]
    MissingComponent {
        /// The absent component.
        missing: &'static str,
        /// The component that needs it.
        required_by: &'static str,
    },

    /// The state token is not one of `w`, `v` or `m`.
    #[error("unrecognised state '{token}': expected one of w, v, m")]
    UnknownState {
        /// The offending token.
        token: String,
    },

    /// An identifier is empty or contains reserved characters.
    #[error("invalid {component} '{value}'")]
    InvalidIdentifier {
        /// Which component was rejected.
        component: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The URI does not match any of the resource templates.
    #[error("malformed resource URI '{uri}': {reason}")]
    Malformed {
        /// The URI as received.
        uri: String,
        /// What did not match.
        reason: String,
    },
}

/// Errors returned by the REST transport.
///
/// Error messages never include the authorization header or the
/// configured secret key.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("Onshape API returned {status} {status_text}: {raw_body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase.
        status_text: String,
        /// Response body as received.
        raw_body: String,
    },

    /// No usable credentials, or the backend rejected them.
    #[error("unauthorised: {message}")]
    Unauthorized {
        /// Description of the failure.
        message: String,
    },

    /// The request never produced a response.
    #[error("request to {path} failed: {message}")]
    Network {
        /// REST path that was requested.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// A successful response carried a body that is not JSON.
    #[error("failed to decode response from {path}")]
    Decode {
        /// REST path that was requested.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that stop a feature-list mutation before or during the write.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Versions and microversions are immutable.
    #[error("cannot modify {target}: only workspaces accept changes")]
    InvalidState {
        /// Description of the addressed state.
        target: String,
    },

    /// The preceding read did not return every version stamp.
    #[error("feature list read is missing required version stamps: {}", missing.join(", "))]
    Precondition {
        /// Names of the absent stamps.
        missing: Vec<&'static str>,
    },

    /// The target address is incomplete or malformed.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// The write payload is not a JSON object.
    #[error("invalid mutation payload: {message}")]
    InvalidPayload {
        /// Description of the problem.
        message: String,
    },

    /// The read or write failed at the transport.
    #[error(transparent)]
    Api(#[from] ApiError),
}
