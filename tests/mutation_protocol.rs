//! Tests for version-stamped feature-list mutations.
//!
//! These run against an in-memory API and check which requests are made,
//! in which order, and with which bodies.

mod common;

use common::RecordingApi;
use serde_json::{json, Value};

use onshape_mcp::onshape::{
    mutate, Address, AddressError, ElementKind, Method, MutationError, MutationPayload, MutationRequest,
    MutationWarning, StateSelector,
};

const FEATURES: &str = "/partstudios/d/D1/w/W1/e/E1/features";

fn workspace_element() -> Address {
    Address::document("D1")
        .with_state(StateSelector::Workspace("W1".to_string()))
        .with_element("E1")
}

fn snapshot() -> Value {
    json!({
        "serializationVersion": "1.1.23",
        "libraryVersion": 2144,
        "sourceMicroversion": "MV0",
        "features": [{"featureId": "F0", "name": "Sketch 1"}]
    })
}

fn add_sketch(target: Address) -> MutationRequest {
    MutationRequest {
        target,
        element_kind: ElementKind::PartStudio,
        payload: MutationPayload::AddFeature(json!({"name": "Extrude 1", "featureType": "extrude"})),
    }
}

#[tokio::test]
async fn test_version_and_microversion_targets_make_no_calls() {
    for state in [
        StateSelector::Version("V1".to_string()),
        StateSelector::Microversion("M1".to_string()),
    ] {
        let api = RecordingApi::new();
        let target = Address::document("D1").with_state(state).with_element("E1");

        let err = mutate(&api, &add_sketch(target)).await.unwrap_err();
        assert!(matches!(err, MutationError::InvalidState { .. }), "{err}");
        assert_eq!(api.request_count(), 0);
    }
}

#[tokio::test]
async fn test_document_target_without_state_makes_no_calls() {
    let api = RecordingApi::new();
    let target = Address::document("D1");

    let err = mutate(&api, &add_sketch(target)).await.unwrap_err();
    assert!(matches!(err, MutationError::InvalidState { .. }), "{err}");
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_workspace_without_element_reports_address_error() {
    let api = RecordingApi::new();
    let target = Address::document("D1").with_state(StateSelector::Workspace("W1".to_string()));

    let err = mutate(&api, &add_sketch(target)).await.unwrap_err();
    assert!(
        matches!(
            err,
            MutationError::Address(AddressError::MissingComponent {
                missing: "elementId",
                ..
            })
        ),
        "{err}"
    );
    assert!(!err.to_string().contains("only workspaces"));
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_transform_on_part_studio_makes_no_calls() {
    let api = RecordingApi::new();
    let request = MutationRequest {
        target: workspace_element(),
        element_kind: ElementKind::PartStudio,
        payload: MutationPayload::TransformOccurrences(json!({"occurrences": []})),
    };

    let err = mutate(&api, &request).await.unwrap_err();
    assert!(matches!(err, MutationError::InvalidPayload { .. }), "{err}");
    assert_eq!(api.request_count(), 0);
}

#[tokio::test]
async fn test_missing_stamp_blocks_write() {
    let api = RecordingApi::new().respond(
        Method::Get,
        FEATURES,
        json!({
            "serializationVersion": "1.1.23",
            "sourceMicroversion": "MV0",
            "features": []
        }),
    );

    let err = mutate(&api, &add_sketch(workspace_element()))
        .await
        .unwrap_err();
    let MutationError::Precondition { missing } = err else {
        panic!("expected precondition failure, got {err}");
    };
    assert_eq!(missing, vec!["libraryVersion"]);

    let requests = api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
}

#[tokio::test]
async fn test_write_echoes_stamps_unmodified() {
    let api = RecordingApi::new()
        .respond(Method::Get, FEATURES, snapshot())
        .respond(
            Method::Post,
            FEATURES,
            json!({"feature": {"featureId": "F1"}, "sourceMicroversion": "MV1"}),
        );

    let result = mutate(&api, &add_sketch(workspace_element()))
        .await
        .unwrap();
    assert_eq!(result.feature_id.as_deref(), Some("F1"));
    assert_eq!(result.new_source_microversion.as_deref(), Some("MV1"));
    assert!(!result.skew_detected);
    assert!(result.warnings.is_empty());

    let requests = api.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[1].method, Method::Post);

    let body = requests[1].body.as_ref().unwrap();
    assert_eq!(body["serializationVersion"], "1.1.23");
    assert_eq!(body["libraryVersion"], 2144);
    assert_eq!(body["sourceMicroversion"], "MV0");
    assert_eq!(body["feature"]["name"], "Extrude 1");
}

#[tokio::test]
async fn test_feature_error_state_is_a_warning() {
    let api = RecordingApi::new()
        .respond(Method::Get, FEATURES, snapshot())
        .respond(
            Method::Post,
            FEATURES,
            json!({
                "feature": {"featureId": "F1"},
                "featureState": {"featureStatus": "ERROR", "message": "no faces"},
                "sourceMicroversion": "MV1"
            }),
        );

    let result = mutate(&api, &add_sketch(workspace_element()))
        .await
        .unwrap();
    let error_state = result.error_state.as_ref().unwrap();
    assert_eq!(error_state.feature_status, "ERROR");
    assert_eq!(
        result.warnings,
        vec![MutationWarning::FeatureEvaluation {
            feature_id: Some("F1".to_string()),
            status: "ERROR".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_skew_is_reported_not_retried() {
    let api = RecordingApi::new()
        .respond(Method::Get, FEATURES, snapshot())
        .respond(
            Method::Post,
            FEATURES,
            json!({"microversionSkew": true, "sourceMicroversion": "MV9"}),
        );

    let result = mutate(&api, &add_sketch(workspace_element()))
        .await
        .unwrap();
    assert!(result.skew_detected);
    assert_eq!(result.new_source_microversion.as_deref(), Some("MV9"));
    assert!(result.warnings.contains(&MutationWarning::Skew {
        base_microversion: Some("MV0".to_string()),
        new_microversion: Some("MV9".to_string()),
    }));
    assert_eq!(api.request_count(), 2);
}

#[tokio::test]
async fn test_update_posts_to_feature_id() {
    let api = RecordingApi::new()
        .respond(Method::Get, FEATURES, snapshot())
        .respond(
            Method::Post,
            &format!("{FEATURES}/featureid/F0"),
            json!({"feature": {"featureId": "F0"}}),
        );

    let request = MutationRequest {
        target: workspace_element(),
        element_kind: ElementKind::PartStudio,
        payload: MutationPayload::UpdateFeature {
            feature_id: "F0".to_string(),
            feature: json!({"name": "Sketch 1 (renamed)"}),
        },
    };
    let result = mutate(&api, &request).await.unwrap();
    assert_eq!(result.feature_id.as_deref(), Some("F0"));
}

#[tokio::test]
async fn test_occurrence_transform_on_assembly() {
    let assembly_features = "/assemblies/d/D1/w/W1/e/E1/features";
    let api = RecordingApi::new()
        .respond(Method::Get, assembly_features, snapshot())
        .respond(
            Method::Post,
            "/assemblies/d/D1/w/W1/e/E1/occurrencetransforms",
            json!({}),
        );

    let request = MutationRequest {
        target: workspace_element(),
        element_kind: ElementKind::Assembly,
        payload: MutationPayload::TransformOccurrences(json!({
            "occurrences": [{"path": ["O1"]}],
            "transform": [1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1],
            "isRelative": true
        })),
    };
    mutate(&api, &request).await.unwrap();

    let requests = api.requests();
    let body = requests[1].body.as_ref().unwrap();
    assert_eq!(body["isRelative"], true);
    assert_eq!(body["sourceMicroversion"], "MV0");
}

#[tokio::test]
async fn test_write_failure_surfaces_api_error() {
    // No POST route: the in-memory API answers 404.
    let api = RecordingApi::new().respond(Method::Get, FEATURES, snapshot());

    let err = mutate(&api, &add_sketch(workspace_element()))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Api(_)));
    assert!(err.to_string().contains("404"));
}
