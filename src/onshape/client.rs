//! HTTP transport for the Onshape REST API.
//!
//! [`ApiTransport`] is the seam between the rest of the crate and the
//! network: the mutation protocol and the tool handlers only ever see
//! [`ApiRequest`] in and JSON out. [`OnshapeClient`] is the production
//! implementation on top of `reqwest`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};

/// Versioned media type sent as both `Accept` and `Content-Type`.
pub const ONSHAPE_MEDIA_TYPE: &str = "application/vnd.onshape.v1+json;charset=UTF-8;qs=0.09";

/// HTTP methods used against the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read.
    Get,
    /// Create or modify.
    Post,
    /// Remove.
    Delete,
}

impl Method {
    const fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// A single REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    /// A `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            query: Vec::new(),
        }
    }

    /// A `POST` request carrying `body`.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            query: Vec::new(),
        }
    }

    /// A `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
            query: Vec::new(),
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// Executes REST calls against the backend.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Performs `request` and returns the parsed JSON body.
    ///
    /// An empty successful body yields an empty JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for non-success statuses, network failures and
    /// undecodable bodies.
    async fn execute(&self, request: ApiRequest) -> ApiResult<Value>;
}

/// API key pair used for Basic authentication.
#[derive(Clone)]
pub struct Credentials {
    /// Access key.
    pub access_key: String,
    /// Secret key.
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Builds the `Authorization` header value.
    fn header_value(&self) -> Option<HeaderValue> {
        let token = BASE64_STANDARD.encode(format!("{}:{}", self.access_key, self.secret_key));
        let mut value = HeaderValue::from_str(&format!("Basic {token}")).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

/// `reqwest`-backed [`ApiTransport`].
///
/// The authorization header is computed once at construction. A client
/// built without credentials still works as a value, but every call fails
/// with [`ApiError::Unauthorized`] before reaching the network.
#[derive(Debug, Clone)]
pub struct OnshapeClient {
    base_url: String,
    http: reqwest::Client,
    authorization: Option<HeaderValue>,
}

impl OnshapeClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ONSHAPE_MEDIA_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(ONSHAPE_MEDIA_TYPE));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network {
                path: base_url.to_string(),
                message: e.to_string(),
            })?;

        let authorization = credentials.and_then(Credentials::header_value);
        if credentials.is_some() && authorization.is_none() {
            tracing::warn!("API credentials contain characters not allowed in a header");
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            authorization,
        })
    }

    /// Returns the configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns `true` if an authorization header is available.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.authorization.is_some()
    }
}

#[async_trait]
impl ApiTransport for OnshapeClient {
    async fn execute(&self, request: ApiRequest) -> ApiResult<Value> {
        let Some(authorization) = self.authorization.clone() else {
            return Err(ApiError::Unauthorized {
                message: "no API credentials configured".to_string(),
            });
        };

        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, path = %request.path, "Sending API request");

        let mut builder = self
            .http
            .request(request.method.as_reqwest(), &url)
            .header(AUTHORIZATION, authorization);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| ApiError::Network {
            path: request.path.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|e| ApiError::Network {
            path: request.path.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(status = status.as_u16(), path = %request.path, "Received API response");
        map_response(&request.path, status, raw_body)
    }
}

/// Maps a response status and body to a result.
///
/// # Errors
///
/// - [`ApiError::Unauthorized`] for 401.
/// - [`ApiError::Status`] for any other non-success status, body kept as
///   received.
/// - [`ApiError::Decode`] if a successful body is not JSON.
pub fn map_response(path: &str, status: StatusCode, raw_body: String) -> ApiResult<Value> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized {
            message: format!("backend rejected credentials for {path}"),
        });
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            raw_body,
        });
    }
    parse_body(path, &raw_body)
}

/// Parses a successful response body, treating whitespace as empty.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] if the body is not JSON.
pub fn parse_body(path: &str, raw_body: &str) -> ApiResult<Value> {
    if raw_body.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw_body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_empty_object() {
        assert_eq!(parse_body("/x", "").unwrap(), json!({}));
        assert_eq!(parse_body("/x", "  \n").unwrap(), json!({}));
    }

    #[test]
    fn invalid_body_is_decode_error() {
        let err = parse_body("/x", "<html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode { ref path, .. } if path == "/x"));
    }

    #[test]
    fn basic_header_encodes_key_pair() {
        let creds = Credentials {
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
        };
        let header = creds.header_value().unwrap();
        // base64("access:secret")
        assert_eq!(header.to_str().unwrap(), "Basic YWNjZXNzOnNlY3JldA==");
        assert!(header.is_sensitive());
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials {
            access_key: "access".to_string(),
            secret_key: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_network() {
        let client =
            OnshapeClient::new("https://cad.example.invalid/api/", None, Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url(), "https://cad.example.invalid/api");
        assert!(!client.has_credentials());

        let err = client.execute(ApiRequest::get("/documents")).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
    }

    #[test]
    fn unauthorized_status_maps_to_unauthorized() {
        let err = map_response("/documents", StatusCode::UNAUTHORIZED, "denied".to_string())
            .unwrap_err();
        let ApiError::Unauthorized { message } = err else {
            panic!("expected Unauthorized, got {err}");
        };
        assert!(message.contains("/documents"));
    }

    #[test]
    fn error_status_keeps_raw_body() {
        let body = r#"{"message":"Document not found","status":404}"#;
        let err = map_response("/documents/D1", StatusCode::NOT_FOUND, body.to_string())
            .unwrap_err();
        let ApiError::Status {
            status,
            status_text,
            raw_body,
        } = err
        else {
            panic!("expected Status, got {err}");
        };
        assert_eq!(status, 404);
        assert_eq!(status_text, "Not Found");
        assert_eq!(raw_body, body);
    }

    #[test]
    fn success_statuses_parse_body() {
        assert_eq!(
            map_response("/x", StatusCode::NO_CONTENT, String::new()).unwrap(),
            json!({})
        );
        assert_eq!(
            map_response("/x", StatusCode::OK, r#"{"id":"D1"}"#.to_string()).unwrap(),
            json!({"id": "D1"})
        );
        assert!(matches!(
            map_response("/x", StatusCode::OK, "<html>".to_string()),
            Err(ApiError::Decode { .. })
        ));
    }

    #[test]
    fn request_builders() {
        let req = ApiRequest::get("/documents").with_query("limit", 5);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.query, vec![("limit".to_string(), "5".to_string())]);
        assert_eq!(ApiRequest::delete("/x").method.to_string(), "DELETE");
    }
}
