//! Tests for tool and resource dispatch through the registry.

mod common;

use std::sync::Arc;

use common::RecordingApi;
use serde_json::{json, Value};

use onshape_mcp::mcp::registry::Registry;
use onshape_mcp::onshape::{ApiTransport, Method};

fn registry() -> Registry {
    Registry::standard().unwrap()
}

fn as_transport(api: &Arc<RecordingApi>) -> Arc<dyn ApiTransport> {
    Arc::clone(api) as Arc<dyn ApiTransport>
}

#[tokio::test]
async fn test_unknown_tool_is_in_band_error() {
    let api = Arc::new(RecordingApi::new());
    let result = registry()
        .call_tool(as_transport(&api), "no_such_tool", json!({}))
        .await;

    assert!(result.is_error);
    assert_eq!(result.joined_text(), "Unknown tool: no_such_tool");
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_resolve_address_makes_no_calls() {
    let api = Arc::new(RecordingApi::new());
    let result = registry()
        .call_tool(
            as_transport(&api),
            "resolve_address",
            json!({"documentId": "D1", "state": "v", "stateId": "V1"}),
        )
        .await;

    assert!(!result.is_error, "{}", result.joined_text());
    let text = result.joined_text();
    assert!(text.contains("D1"));
    assert!(text.contains("V1"));
    assert!(text.contains("onshape://document/D1/v/V1"));
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_schema_violation_reaches_no_handler() {
    let api = Arc::new(RecordingApi::new());
    let registry = registry();

    let missing = registry
        .call_tool(as_transport(&api), "get_document", json!({}))
        .await;
    assert!(missing.is_error);
    assert_eq!(
        missing.joined_text(),
        "Invalid arguments: missing required parameter: documentId"
    );

    let bad_state = registry
        .call_tool(
            as_transport(&api),
            "list_elements",
            json!({"documentId": "D1", "state": "x", "stateId": "S1"}),
        )
        .await;
    assert!(bad_state.is_error);
    assert!(bad_state.joined_text().starts_with("Invalid arguments: state"));

    let bad_id = registry
        .call_tool(as_transport(&api), "get_document", json!({"documentId": "a/b"}))
        .await;
    assert!(bad_id.is_error);

    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_mutation_on_version_is_in_band_error() {
    let api = Arc::new(RecordingApi::new());
    let result = registry()
        .call_tool(
            as_transport(&api),
            "add_feature",
            json!({
                "documentId": "D1",
                "state": "v",
                "stateId": "V1",
                "elementId": "E1",
                "feature": {"name": "Extrude 1"}
            }),
        )
        .await;

    assert!(result.is_error);
    assert!(result.joined_text().contains("only workspaces accept changes"));
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_add_feature_reports_outcome() {
    let features = "/partstudios/d/D1/w/W1/e/E1/features";
    let api = Arc::new(
        RecordingApi::new()
            .respond(
                Method::Get,
                features,
                json!({
                    "serializationVersion": "1.1.23",
                    "libraryVersion": 2144,
                    "sourceMicroversion": "MV0",
                    "features": []
                }),
            )
            .respond(
                Method::Post,
                features,
                json!({
                    "feature": {"featureId": "F1"},
                    "featureState": {"featureStatus": "ERROR"},
                    "sourceMicroversion": "MV1"
                }),
            ),
    );

    let result = registry()
        .call_tool(
            as_transport(&api),
            "add_feature",
            json!({
                "documentId": "D1",
                "state": "w",
                "stateId": "W1",
                "elementId": "E1",
                "feature": {"name": "Extrude 1"}
            }),
        )
        .await;

    assert!(!result.is_error, "{}", result.joined_text());
    let report: Value = serde_json::from_str(&result.joined_text()).unwrap();
    assert_eq!(report["status"], "applied");
    assert_eq!(report["featureId"], "F1");
    assert_eq!(report["newSourceMicroversion"], "MV1");
    assert_eq!(report["warnings"].as_array().unwrap().len(), 1);
    assert_eq!(api.request_count(), 2);
}

#[tokio::test]
async fn test_api_failure_is_in_band_error() {
    let api = Arc::new(RecordingApi::new());
    let result = registry()
        .call_tool(as_transport(&api), "get_document", json!({"documentId": "D1"}))
        .await;

    assert!(result.is_error);
    assert!(result.joined_text().contains("404"));
    assert_eq!(api.request_count(), 1);
}

#[tokio::test]
async fn test_read_resource_routes_by_shape() {
    let api = Arc::new(
        RecordingApi::new()
            .respond(Method::Get, "/documents/D1", json!({"id": "D1", "name": "Bracket"}))
            .respond(
                Method::Get,
                "/metadata/d/D1/w/W1/e/E1/pi/JHD",
                json!({"partId": "JHD"}),
            ),
    );
    let registry = registry();

    let document = registry
        .read_resource(as_transport(&api), "onshape://document/D1")
        .await;
    assert!(!document.is_error, "{}", document.joined_text());
    assert!(document.joined_text().contains("Bracket"));

    let part = registry
        .read_resource(
            as_transport(&api),
            "onshape://document/D1/w/W1/element/E1/part/JHD",
        )
        .await;
    assert!(!part.is_error, "{}", part.joined_text());

    let paths: Vec<String> = api.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, ["/documents/D1", "/metadata/d/D1/w/W1/e/E1/pi/JHD"]);
}

#[tokio::test]
async fn test_read_resource_rejects_bad_uri() {
    let api = Arc::new(RecordingApi::new());
    let result = registry()
        .read_resource(as_transport(&api), "onshape://document/D1/q/Q1")
        .await;

    assert!(result.is_error);
    assert!(result.joined_text().starts_with("Invalid address"));
    assert_eq!(api.request_count(), 0);
}

#[test]
fn test_registry_lists_tools_and_templates() {
    let registry = registry();
    let tools = registry.tool_definitions();
    let templates = registry.resource_templates();

    assert_eq!(templates.len(), 4);
    assert_eq!(tools.len() + templates.len(), registry.len());
    assert!(tools.iter().any(|tool| tool.name == "resolve_address"));
    assert!(templates
        .iter()
        .any(|t| t.uri_template == "onshape://document/{documentId}"));
}
