//! Feature-list reads and version-stamped feature-list writes.
//!
//! The backend keeps a per-document microversion counter and refuses to
//! apply a feature-list write unless it carries the `serializationVersion`,
//! `libraryVersion` and `sourceMicroversion` returned by a read of the same
//! list. [`mutate`] performs exactly one read and one write per call:
//!
//! 1. reject anything but a workspace (no network traffic);
//! 2. read the current [`FeatureListSnapshot`];
//! 3. stop with [`MutationError::Precondition`] if a stamp is missing;
//! 4. write the caller's payload with the three stamps copied verbatim;
//! 5. report the new microversion, notices, evaluation errors and skew.
//!
//! A feature that evaluates to an error is still persisted by the backend,
//! so that case is a successful [`MutationResult`] carrying a
//! [`MutationWarning::FeatureEvaluation`]. Skew is reported, never retried.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::address::{Address, StateSelector};
use super::client::{ApiRequest, ApiTransport};
use super::error::MutationError;

const SERIALIZATION_VERSION: &str = "serializationVersion";
const LIBRARY_VERSION: &str = "libraryVersion";
const SOURCE_MICROVERSION: &str = "sourceMicroversion";

/// The element types that own a feature list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementKind {
    /// A part studio.
    #[default]
    PartStudio,
    /// An assembly.
    Assembly,
}

impl ElementKind {
    /// Parses the tool argument spelling.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "partstudio" | "PARTSTUDIO" => Some(Self::PartStudio),
            "assembly" | "ASSEMBLY" => Some(Self::Assembly),
            _ => None,
        }
    }

    /// REST family prefix.
    #[must_use]
    pub const fn api_family(self) -> &'static str {
        match self {
            Self::PartStudio => "/partstudios",
            Self::Assembly => "/assemblies",
        }
    }
}

/// A feature list as read from one document state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureListSnapshot {
    /// Serialization format version, echoed back on write.
    pub serialization_version: Option<Value>,
    /// Standard library version, echoed back on write.
    pub library_version: Option<Value>,
    /// Microversion the list was read at.
    pub source_microversion: Option<Value>,
    /// Features in list order.
    pub features: Vec<Value>,
}

impl FeatureListSnapshot {
    /// Extracts a snapshot from a feature-list response.
    #[must_use]
    pub fn from_response(body: &Value) -> Self {
        let stamp = |key: &str| body.get(key).filter(|v| !v.is_null()).cloned();
        Self {
            serialization_version: stamp(SERIALIZATION_VERSION),
            library_version: stamp(LIBRARY_VERSION),
            source_microversion: stamp(SOURCE_MICROVERSION),
            features: body
                .get("features")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// The three stamps a write must carry.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Precondition`] naming every absent stamp.
    pub fn stamps(&self) -> Result<VersionStamps, MutationError> {
        match (
            &self.serialization_version,
            &self.library_version,
            &self.source_microversion,
        ) {
            (Some(serialization), Some(library), Some(microversion)) => Ok(VersionStamps {
                serialization_version: serialization.clone(),
                library_version: library.clone(),
                source_microversion: microversion.clone(),
            }),
            _ => {
                let missing = [
                    (SERIALIZATION_VERSION, &self.serialization_version),
                    (LIBRARY_VERSION, &self.library_version),
                    (SOURCE_MICROVERSION, &self.source_microversion),
                ]
                .into_iter()
                .filter_map(|(name, value)| value.is_none().then_some(name))
                .collect();
                Err(MutationError::Precondition { missing })
            }
        }
    }
}

/// Version information copied from a read into the following write.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStamps {
    /// `serializationVersion` as read.
    pub serialization_version: Value,
    /// `libraryVersion` as read.
    pub library_version: Value,
    /// `sourceMicroversion` as read.
    pub source_microversion: Value,
}

impl VersionStamps {
    fn apply(&self, body: &mut Map<String, Value>) {
        body.insert(
            SERIALIZATION_VERSION.into(),
            self.serialization_version.clone(),
        );
        body.insert(LIBRARY_VERSION.into(), self.library_version.clone());
        body.insert(SOURCE_MICROVERSION.into(), self.source_microversion.clone());
    }
}

/// What a mutation writes.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationPayload {
    /// Append a feature definition.
    AddFeature(Value),
    /// Replace the definition of an existing feature.
    UpdateFeature {
        /// Feature to replace.
        feature_id: String,
        /// New definition.
        feature: Value,
    },
    /// Move assembly occurrences; the object is sent as the request body.
    TransformOccurrences(Value),
}

/// A feature-list edit targeting one workspace element.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    /// Document, workspace and element to edit.
    pub target: Address,
    /// Whether the element is a part studio or an assembly.
    pub element_kind: ElementKind,
    /// The edit.
    pub payload: MutationPayload,
}

/// A mutation paired with the snapshot it was read against.
#[derive(Debug, Clone)]
pub struct PreparedMutation<'a> {
    request: &'a MutationRequest,
    features_path: String,
    base: FeatureListSnapshot,
    stamps: VersionStamps,
}

impl<'a> PreparedMutation<'a> {
    /// Binds `request` to `base`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Precondition`] if `base` lacks a stamp.
    pub fn new(
        request: &'a MutationRequest,
        features_path: String,
        base: FeatureListSnapshot,
    ) -> Result<Self, MutationError> {
        let stamps = base.stamps()?;
        Ok(Self {
            request,
            features_path,
            base,
            stamps,
        })
    }

    /// The snapshot the write is stamped against.
    #[must_use]
    pub const fn base(&self) -> &FeatureListSnapshot {
        &self.base
    }

    /// Builds the write request.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::InvalidPayload`] if a transform body is not
    /// a JSON object.
    pub fn write_request(&self) -> Result<ApiRequest, MutationError> {
        let (path, mut body) = match &self.request.payload {
            MutationPayload::AddFeature(feature) => (
                self.features_path.clone(),
                feature_body(feature.clone()),
            ),
            MutationPayload::UpdateFeature {
                feature_id,
                feature,
            } => (
                format!("{}/featureid/{feature_id}", self.features_path),
                feature_body(feature.clone()),
            ),
            MutationPayload::TransformOccurrences(transform) => {
                let Value::Object(body) = transform.clone() else {
                    return Err(MutationError::InvalidPayload {
                        message: "occurrence transform must be a JSON object".to_string(),
                    });
                };
                let path = self
                    .features_path
                    .strip_suffix("/features")
                    .map_or_else(
                        || self.features_path.clone(),
                        |element| format!("{element}/occurrencetransforms"),
                    );
                (path, body)
            }
        };
        self.stamps.apply(&mut body);
        Ok(ApiRequest::post(path, Value::Object(body)))
    }
}

fn feature_body(feature: Value) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("feature".into(), feature);
    body
}

/// Severity-tagged message attached to a write response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity as reported (`INFO`, `WARNING`, `ERROR`).
    pub level: String,
    /// Message text.
    pub message: String,
}

/// Evaluation status of a feature that was persisted with an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureErrorState {
    /// Status string, normally `ERROR`.
    pub feature_status: String,
    /// Error detail if the backend supplied one.
    pub message: Option<String>,
}

/// Informational outcomes that do not fail a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationWarning {
    /// The document changed between the read and the write.
    Skew {
        /// Microversion the write was stamped with.
        base_microversion: Option<String>,
        /// Microversion after the write.
        new_microversion: Option<String>,
    },
    /// The feature was saved but evaluates to an error.
    FeatureEvaluation {
        /// Feature that failed, if the response named it.
        feature_id: Option<String>,
        /// Reported status.
        status: String,
    },
}

impl fmt::Display for MutationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skew {
                base_microversion,
                new_microversion,
            } => write!(
                f,
                "microversion skew: document changed between read ({}) and write ({})",
                base_microversion.as_deref().unwrap_or("unknown"),
                new_microversion.as_deref().unwrap_or("unknown"),
            ),
            Self::FeatureEvaluation { feature_id, status } => write!(
                f,
                "feature {} was saved but evaluates to {status}",
                feature_id.as_deref().unwrap_or("(unnamed)"),
            ),
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Microversion after the write.
    pub new_source_microversion: Option<String>,
    /// Whether the backend reported skew.
    pub skew_detected: bool,
    /// Notices attached to the response.
    pub notices: Vec<Notice>,
    /// Evaluation error of the written feature, if any.
    pub error_state: Option<FeatureErrorState>,
    /// Identifier of the written feature, if returned.
    pub feature_id: Option<String>,
    /// Skew and evaluation warnings.
    pub warnings: Vec<MutationWarning>,
}

impl MutationResult {
    /// Interprets a write response against the stamps it was sent with.
    #[must_use]
    pub fn from_response(body: &Value, base_microversion: Option<&Value>) -> Self {
        let new_source_microversion = body.get(SOURCE_MICROVERSION).and_then(stamp_text);
        let feature_id = body
            .pointer("/feature/featureId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let notices = body
            .get("notices")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_notice).collect())
            .unwrap_or_default();

        let error_state = body
            .get("featureState")
            .and_then(|state| {
                let status = state.get("featureStatus")?.as_str()?;
                (status == "ERROR").then(|| FeatureErrorState {
                    feature_status: status.to_string(),
                    message: state
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            });

        let skew_detected = body
            .get("microversionSkew")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut warnings = Vec::new();
        if let Some(state) = &error_state {
            warnings.push(MutationWarning::FeatureEvaluation {
                feature_id: feature_id.clone(),
                status: state.feature_status.clone(),
            });
        }
        if skew_detected {
            warnings.push(MutationWarning::Skew {
                base_microversion: base_microversion.and_then(stamp_text),
                new_microversion: new_source_microversion.clone(),
            });
        }

        Self {
            new_source_microversion,
            skew_detected,
            notices,
            error_state,
            feature_id,
            warnings,
        }
    }
}

/// Text form of a microversion stamp. Numbers are accepted; other
/// non-null values are logged and dropped.
fn stamp_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null => None,
        other => {
            tracing::warn!(value = %other, "Ignoring microversion stamp that is not a string");
            None
        }
    }
}

fn parse_notice(item: &Value) -> Option<Notice> {
    let level = item
        .get("level")
        .and_then(Value::as_str)
        .unwrap_or("INFO")
        .to_string();
    let message = match item.get("message")? {
        Value::String(text) => text.clone(),
        Value::Object(inner) => inner.get("message")?.as_str()?.to_string(),
        _ => return None,
    };
    Some(Notice { level, message })
}

/// Path of the feature list for an element address.
///
/// # Errors
///
/// Returns [`MutationError::Address`] if the address has no element.
fn features_path(address: &Address, kind: ElementKind) -> Result<String, MutationError> {
    Ok(format!("{}{}/features", kind.api_family(), address.element_path()?))
}

/// Reads the feature list of an element at any state.
///
/// # Errors
///
/// Returns [`MutationError`] if the address has no element or the read
/// fails.
pub async fn read_features(
    api: &dyn ApiTransport,
    address: &Address,
    kind: ElementKind,
) -> Result<FeatureListSnapshot, MutationError> {
    let path = features_path(address, kind)?;
    let body = api.execute(ApiRequest::get(path)).await?;
    Ok(FeatureListSnapshot::from_response(&body))
}

/// Applies a feature-list edit with version stamps from a fresh read.
///
/// # Errors
///
/// - [`MutationError::InvalidState`] if the target is not a workspace;
///   no request is made.
/// - [`MutationError::Address`] if the workspace target has no element;
///   no request is made.
/// - [`MutationError::InvalidPayload`] for an occurrence transform on a
///   part studio; no request is made.
/// - [`MutationError::Precondition`] if the read lacks a stamp; no write is
///   made.
/// - [`MutationError::Api`] if either request fails.
pub async fn mutate(
    api: &dyn ApiTransport,
    request: &MutationRequest,
) -> Result<MutationResult, MutationError> {
    let target = &request.target;
    match &target.state {
        Some(StateSelector::Workspace(_)) => {}
        Some(other) => {
            return Err(MutationError::InvalidState {
                target: other.to_string(),
            })
        }
        None => {
            return Err(MutationError::InvalidState {
                target: format!("{target} (no workspace given)"),
            })
        }
    }
    if matches!(request.payload, MutationPayload::TransformOccurrences(_))
        && request.element_kind != ElementKind::Assembly
    {
        return Err(MutationError::InvalidPayload {
            message: "occurrence transforms apply to assemblies only".to_string(),
        });
    }

    let path = features_path(target, request.element_kind)?;
    let base = read_features(api, target, request.element_kind).await?;
    let prepared = PreparedMutation::new(request, path, base)?;

    let write = prepared.write_request()?;
    tracing::info!(
        target = %target,
        path = %write.path,
        base_microversion = ?prepared.base().source_microversion,
        "Writing feature list"
    );
    let response = api.execute(write).await?;

    let result =
        MutationResult::from_response(&response, prepared.base().source_microversion.as_ref());
    for warning in &result.warnings {
        tracing::warn!(target = %target, "{warning}");
    }
    Ok(result)
}
