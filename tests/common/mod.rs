//! Shared test fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use onshape_mcp::onshape::{ApiError, ApiRequest, ApiResult, ApiTransport, Method};

/// In-memory API that records every request and answers from canned
/// responses keyed by method and path. Unknown routes answer 404.
#[derive(Default)]
pub struct RecordingApi {
    responses: Mutex<HashMap<(Method, String), Value>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `method path` with `body`.
    pub fn respond(self, method: Method, path: &str, body: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method, path.to_string()), body);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ApiTransport for RecordingApi {
    async fn execute(&self, request: ApiRequest) -> ApiResult<Value> {
        let key = (request.method, request.path.clone());
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                status_text: "Not Found".to_string(),
                raw_body: format!("no route for {} {}", key.0, key.1),
            })
    }
}
