//! Tool handlers.
//!
//! Each tool takes its address as flat arguments (`documentId`, `state`,
//! `stateId`, `elementId`, `partId`) and resolves REST paths through
//! [`Address`], so no handler spells out `/d/{did}/w/{wid}` by hand.
//! Feature-list edits go through [`mutate`]; everything else is a single
//! request whose response is trimmed to the fields an agent needs.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::mcp::registry::{OperationDescriptor, RegistryBuilder, RegistryError};
use crate::onshape::{
    mutate, read_features, Address, ApiRequest, ApiTransport, ElementKind, MutationPayload,
    MutationRequest, MutationResult, StateSelector,
};

/// Identifier syntax accepted in every address argument.
pub const ID_PATTERN: &str = r"^[^/?#\s]+$";

const DEFAULT_PAGE_SIZE: u64 = 20;

/// Registers every tool.
///
/// # Errors
///
/// Returns [`RegistryError`] if a tool name is already taken.
#[allow(clippy::too_many_lines)]
pub fn register(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder
        .register(OperationDescriptor::tool(
            "resolve_address",
            "Resolve a document, state, element or part address to its resource URI and \
             REST path. Makes no API calls.",
            address_schema(&["documentId", "state", "stateId"], &["elementId", "partId"], json!({})),
            resolve_address,
        ))?
        .register(OperationDescriptor::tool(
            "list_documents",
            "Search documents visible to the configured account. Returns id, name and \
             default workspace for each match.",
            object_schema(
                json!({
                    "query": { "type": "string", "description": "Optional: search text" },
                    "limit": { "type": "integer", "minimum": 1, "description": "Optional: page size (default: 20)" },
                    "offset": { "type": "integer", "minimum": 0, "description": "Optional: skip first N documents" }
                }),
                &[],
            ),
            list_documents,
        ))?
        .register(OperationDescriptor::tool(
            "get_document",
            "Get document metadata including its default workspace.",
            address_schema(&["documentId"], &[], json!({})),
            get_document,
        ))?
        .register(OperationDescriptor::tool(
            "list_workspaces",
            "List the workspaces of a document.",
            address_schema(&["documentId"], &[], json!({})),
            list_workspaces,
        ))?
        .register(OperationDescriptor::tool(
            "list_versions",
            "List the named versions of a document.",
            address_schema(&["documentId"], &[], json!({})),
            list_versions,
        ))?
        .register(OperationDescriptor::tool(
            "create_version",
            "Create a named, immutable version from the current state of a workspace.",
            object_schema(
                json!({
                    "documentId": id_property("Document ID"),
                    "workspaceId": id_property("Workspace to snapshot"),
                    "name": { "type": "string", "description": "Optional: version name (default: timestamped)" },
                    "description": { "type": "string", "description": "Optional: version description" }
                }),
                &["documentId", "workspaceId"],
            ),
            create_version,
        ))?
        .register(OperationDescriptor::tool(
            "list_elements",
            "List the elements (part studios, assemblies, drawings, ...) of a document \
             state.",
            address_schema(
                &["documentId", "state", "stateId"],
                &[],
                json!({
                    "elementType": {
                        "type": "string",
                        "enum": ["PARTSTUDIO", "ASSEMBLY", "DRAWING", "BLOB", "APPLICATION"],
                        "description": "Optional: only return elements of this type"
                    }
                }),
            ),
            list_elements,
        ))?
        .register(OperationDescriptor::tool(
            "get_features",
            "Read the feature list of a part studio or assembly, including the version \
             stamps (serializationVersion, libraryVersion, sourceMicroversion) it was read at.",
            address_schema(
                &["documentId", "state", "stateId", "elementId"],
                &[],
                json!({
                    "elementKind": element_kind_property(),
                    "includeDefinitions": {
                        "type": "boolean",
                        "description": "Optional: return full feature definitions (default: summaries)"
                    }
                }),
            ),
            get_features,
        ))?
        .register(OperationDescriptor::tool(
            "add_feature",
            "Append a feature to a part studio or assembly feature list. Workspaces only. \
             The current version stamps are read immediately before the write. A feature \
             that evaluates to an error is still saved and reported as a warning.",
            address_schema(
                &["documentId", "state", "stateId", "elementId"],
                &[],
                json!({
                    "elementKind": element_kind_property(),
                    "feature": { "type": "object", "description": "Feature definition, passed through unchanged" }
                }),
            )
            .with_required("feature"),
            add_feature,
        ))?
        .register(OperationDescriptor::tool(
            "update_feature",
            "Replace the definition of an existing feature. Workspaces only. Version \
             stamps are read immediately before the write.",
            address_schema(
                &["documentId", "state", "stateId", "elementId"],
                &[],
                json!({
                    "elementKind": element_kind_property(),
                    "featureId": id_property("Feature to replace"),
                    "feature": { "type": "object", "description": "New feature definition, passed through unchanged" }
                }),
            )
            .with_required("featureId")
            .with_required("feature"),
            update_feature,
        ))?
        .register(OperationDescriptor::tool(
            "transform_occurrences",
            "Move occurrences in an assembly. Workspaces only. The transform object \
             (occurrences, transform, isRelative) is sent with fresh version stamps.",
            address_schema(
                &["documentId", "state", "stateId", "elementId"],
                &[],
                json!({
                    "transform": { "type": "object", "description": "Occurrence transform body" }
                }),
            )
            .with_required("transform"),
            transform_occurrences,
        ))?
        .register(OperationDescriptor::tool(
            "list_parts",
            "List the parts in a part studio.",
            address_schema(&["documentId", "state", "stateId", "elementId"], &[], json!({})),
            list_parts,
        ))?
        .register(OperationDescriptor::tool(
            "get_mass_properties",
            "Get mass, volume, centroid and inertia of a part.",
            address_schema(
                &["documentId", "state", "stateId", "elementId", "partId"],
                &[],
                json!({}),
            ),
            get_mass_properties,
        ))?;
    Ok(())
}

// === Schemas ===

trait SchemaExt {
    fn with_required(self, name: &str) -> Self;
}

impl SchemaExt for Value {
    fn with_required(mut self, name: &str) -> Self {
        if let Some(required) = self.get_mut("required").and_then(Value::as_array_mut) {
            required.push(Value::String(name.to_string()));
        }
        self
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn id_property(description: &str) -> Value {
    json!({ "type": "string", "pattern": ID_PATTERN, "description": description })
}

fn element_kind_property() -> Value {
    json!({
        "type": "string",
        "enum": ["partstudio", "assembly"],
        "description": "Optional: element type owning the feature list (default: partstudio)"
    })
}

/// Schema with address fields plus `extra` properties.
fn address_schema(required: &[&str], optional: &[&str], extra: Value) -> Value {
    let mut properties = Map::new();
    for name in required.iter().chain(optional) {
        let property = match *name {
            "state" => json!({
                "type": "string",
                "enum": ["w", "v", "m"],
                "description": "w = workspace, v = version, m = microversion"
            }),
            "documentId" => id_property("Document ID"),
            "stateId" => id_property("Workspace, version or microversion ID"),
            "elementId" => id_property("Element (tab) ID"),
            "partId" => id_property("Part ID"),
            other => id_property(other),
        };
        properties.insert((*name).to_string(), property);
    }
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    object_schema(Value::Object(properties), required)
}

// === Helpers ===

fn render(value: &Value) -> Result<String, ToolError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Validation(format!("missing required parameter: {name}")))
}

/// Entries of a list response, whether bare or wrapped in `items`.
fn items(body: &Value) -> &[Value] {
    body.as_array()
        .or_else(|| body.get("items").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Copies the named fields that are present.
fn pick(item: &Value, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| {
            item.get(*field)
                .filter(|v| !v.is_null())
                .map(|v| ((*field).to_string(), v.clone()))
        })
        .collect()
}

fn element_kind(args: &Value) -> ElementKind {
    args.get("elementKind")
        .and_then(Value::as_str)
        .and_then(ElementKind::from_name)
        .unwrap_or_default()
}

// === Handlers ===

async fn resolve_address(_api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let address = Address::from_params(&args)?;
    let shape = address.shape()?;
    Ok(format!(
        "{address}\nShape: {shape:?}\nURI: {}\nREST path: {}",
        address.to_uri()?,
        address.rest_path()?,
    ))
}

async fn list_documents(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0);

    let mut request = ApiRequest::get("/documents")
        .with_query("limit", limit)
        .with_query("offset", offset);
    if let Some(query) = args.get("query").and_then(Value::as_str) {
        request = request.with_query("q", query);
    }

    let body = api.execute(request).await?;
    let documents: Vec<Value> = items(&body)
        .iter()
        .map(|doc| {
            let mut summary = pick(doc, &["id", "name", "modifiedAt"]);
            if let Some(workspace) = doc.pointer("/defaultWorkspace/id") {
                summary.insert("defaultWorkspaceId".into(), workspace.clone());
            }
            if let Some(uri) = doc
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| Address::document(id).to_uri().ok())
            {
                summary.insert("uri".into(), Value::String(uri));
            }
            Value::Object(summary)
        })
        .collect();

    render(&json!({
        "returned_count": documents.len(),
        "offset": offset,
        "has_more": body.get("next").is_some_and(|next| !next.is_null()),
        "documents": documents,
    }))
}

async fn get_document(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let address = Address::from_params(&args)?;
    let body = api.execute(ApiRequest::get(address.rest_path()?)).await?;

    let mut summary = pick(
        &body,
        &["id", "name", "description", "createdAt", "modifiedAt", "public"],
    );
    if let Some(owner) = body.pointer("/owner/name") {
        summary.insert("owner".into(), owner.clone());
    }
    summary.insert("uri".into(), Value::String(address.to_uri()?));
    if let Some(workspace_id) = body.pointer("/defaultWorkspace/id").and_then(Value::as_str) {
        let workspace = address.with_state(StateSelector::Workspace(workspace_id.to_string()));
        summary.insert(
            "defaultWorkspace".into(),
            json!({ "id": workspace_id, "uri": workspace.to_uri()? }),
        );
    }
    render(&Value::Object(summary))
}

async fn list_workspaces(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    list_states(api, &args, "workspaces", StateSelector::Workspace).await
}

async fn list_versions(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    list_states(api, &args, "versions", StateSelector::Version).await
}

async fn list_states(
    api: Arc<dyn ApiTransport>,
    args: &Value,
    collection: &str,
    selector: fn(String) -> StateSelector,
) -> Result<String, ToolError> {
    let address = Address::from_params(args)?;
    let path = format!("/documents/d/{}/{collection}", address.document_id);
    let body = api.execute(ApiRequest::get(path)).await?;

    let states: Vec<Value> = items(&body)
        .iter()
        .map(|state| {
            let mut summary = pick(
                state,
                &["id", "name", "description", "microversion", "createdAt", "isReadOnly"],
            );
            if let Some(id) = state.get("id").and_then(Value::as_str) {
                let uri = address
                    .clone()
                    .with_state(selector(id.to_string()))
                    .to_uri();
                if let Ok(uri) = uri {
                    summary.insert("uri".into(), Value::String(uri));
                }
            }
            Value::Object(summary)
        })
        .collect();

    let mut result = Map::new();
    result.insert("documentId".into(), Value::String(address.document_id));
    result.insert(collection.to_string(), Value::Array(states));
    render(&Value::Object(result))
}

async fn create_version(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let document_id = str_arg(&args, "documentId")?;
    let workspace_id = str_arg(&args, "workspaceId")?;
    let workspace =
        Address::document(document_id).with_state(StateSelector::Workspace(workspace_id.into()));
    workspace.validate()?;

    let name = args
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(
            || format!("MCP snapshot {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")),
            str::to_string,
        );
    let description = args
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let body = api
        .execute(ApiRequest::post(
            format!("/documents/d/{document_id}/versions"),
            json!({
                "documentId": document_id,
                "workspaceId": workspace_id,
                "name": name,
                "description": description,
            }),
        ))
        .await?;

    let mut summary = pick(&body, &["id", "name", "microversion", "createdAt"]);
    if let Some(version_id) = body.get("id").and_then(Value::as_str) {
        let version = Address::document(document_id)
            .with_state(StateSelector::Version(version_id.to_string()));
        summary.insert("uri".into(), Value::String(version.to_uri()?));
    }
    tracing::info!(document = document_id, version = %name, "Created version");
    render(&Value::Object(summary))
}

async fn list_elements(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let address = Address::from_params(&args)?;
    let mut request = ApiRequest::get(format!("/documents{}/elements", address.state_path()?));
    if let Some(element_type) = args.get("elementType").and_then(Value::as_str) {
        request = request.with_query("elementType", element_type);
    }
    let body = api.execute(request).await?;

    let elements: Vec<Value> = items(&body)
        .iter()
        .map(|element| {
            let mut summary = pick(element, &["id", "name", "elementType", "dataType"]);
            if let Some(id) = element.get("id").and_then(Value::as_str) {
                if let Ok(uri) = address.clone().with_element(id).to_uri() {
                    summary.insert("uri".into(), Value::String(uri));
                }
            }
            Value::Object(summary)
        })
        .collect();

    render(&json!({
        "state": address.to_uri()?,
        "elements": elements,
    }))
}

async fn get_features(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let address = Address::from_params(&args)?;
    let snapshot = read_features(api.as_ref(), &address, element_kind(&args)).await?;
    let include_definitions = args
        .get("includeDefinitions")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let features: Vec<Value> = if include_definitions {
        snapshot.features.clone()
    } else {
        snapshot
            .features
            .iter()
            .map(|feature| {
                Value::Object(pick(
                    feature,
                    &["featureId", "name", "featureType", "suppressed"],
                ))
            })
            .collect()
    };

    render(&json!({
        "element": address.to_uri()?,
        "serializationVersion": snapshot.serialization_version,
        "libraryVersion": snapshot.library_version,
        "sourceMicroversion": snapshot.source_microversion,
        "feature_count": snapshot.features.len(),
        "features": features,
    }))
}

async fn add_feature(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let feature = args.get("feature").cloned().unwrap_or(Value::Null);
    apply_mutation(api, &args, MutationPayload::AddFeature(feature)).await
}

async fn update_feature(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let payload = MutationPayload::UpdateFeature {
        feature_id: str_arg(&args, "featureId")?.to_string(),
        feature: args.get("feature").cloned().unwrap_or(Value::Null),
    };
    apply_mutation(api, &args, payload).await
}

async fn transform_occurrences(
    api: Arc<dyn ApiTransport>,
    args: Value,
) -> Result<String, ToolError> {
    let transform = args.get("transform").cloned().unwrap_or(Value::Null);
    let request = MutationRequest {
        target: Address::from_params(&args)?,
        element_kind: ElementKind::Assembly,
        payload: MutationPayload::TransformOccurrences(transform),
    };
    let result = mutate(api.as_ref(), &request).await?;
    render_mutation(&request.target, &result)
}

async fn apply_mutation(
    api: Arc<dyn ApiTransport>,
    args: &Value,
    payload: MutationPayload,
) -> Result<String, ToolError> {
    let request = MutationRequest {
        target: Address::from_params(args)?,
        element_kind: element_kind(args),
        payload,
    };
    let result = mutate(api.as_ref(), &request).await?;
    render_mutation(&request.target, &result)
}

fn render_mutation(target: &Address, result: &MutationResult) -> Result<String, ToolError> {
    let warnings: Vec<String> = result.warnings.iter().map(ToString::to_string).collect();
    render(&json!({
        "status": "applied",
        "element": target.to_uri()?,
        "featureId": result.feature_id,
        "newSourceMicroversion": result.new_source_microversion,
        "skewDetected": result.skew_detected,
        "errorState": result.error_state,
        "notices": result.notices,
        "warnings": warnings,
    }))
}

async fn list_parts(api: Arc<dyn ApiTransport>, args: Value) -> Result<String, ToolError> {
    let address = Address::from_params(&args)?;
    let body = api
        .execute(ApiRequest::get(format!("/parts{}", address.element_path()?)))
        .await?;

    let parts: Vec<Value> = items(&body)
        .iter()
        .map(|part| {
            let mut summary = pick(part, &["partId", "name", "bodyType", "isHidden"]);
            if let Some(id) = part.get("partId").and_then(Value::as_str) {
                if let Ok(uri) = address.clone().with_part(id).to_uri() {
                    summary.insert("uri".into(), Value::String(uri));
                }
            }
            Value::Object(summary)
        })
        .collect();

    render(&json!({
        "element": address.to_uri()?,
        "part_count": parts.len(),
        "parts": parts,
    }))
}

async fn get_mass_properties(
    api: Arc<dyn ApiTransport>,
    args: Value,
) -> Result<String, ToolError> {
    let address = Address::from_params(&args)?;
    let part_id = str_arg(&args, "partId")?;
    let path = format!(
        "/parts{}/partid/{part_id}/massproperties",
        address.element_path()?
    );
    let body = api.execute(ApiRequest::get(path)).await?;

    let bodies = body.get("bodies").cloned().unwrap_or(Value::Null);
    render(&json!({
        "part": address.to_uri()?,
        "bodies": bodies,
    }))
}
