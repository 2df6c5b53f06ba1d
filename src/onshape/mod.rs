//! Onshape REST API access.
//!
//! - [`address`]: resource addresses and their URI / REST path forms
//! - [`client`]: the HTTP transport and its test seam
//! - [`features`]: feature-list reads and version-stamped writes
//! - [`error`]: error types for all of the above

pub mod address;
pub mod client;
pub mod error;
pub mod features;

pub use address::{Address, AddressShape, StateSelector, URI_PREFIX};
pub use client::{ApiRequest, ApiTransport, Credentials, Method, OnshapeClient};
pub use error::{AddressError, ApiError, ApiResult, MutationError};
pub use features::{
    mutate, read_features, ElementKind, FeatureListSnapshot, MutationPayload, MutationRequest,
    MutationResult, MutationWarning, Notice,
};
