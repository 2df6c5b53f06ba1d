//! The operation table behind `tools/*` and `resources/*`.
//!
//! Every tool and resource template is described by an
//! [`OperationDescriptor`] registered once through a [`RegistryBuilder`].
//! The finished [`Registry`] is immutable and shared by `Arc` between the
//! dispatch loop and handler tasks.
//!
//! A call moves through `Received → Validated → Executing → Succeeded |
//! Failed → Responded`. Every path ends in a [`ToolCallResult`]; unknown
//! names, schema violations and handler errors become `isError: true`
//! results rather than escaping the registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ToolError;
use crate::mcp::schema;
use crate::onshape::{Address, AddressShape, ApiTransport};

/// Future returned by operation handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

/// An operation handler: API transport plus validated arguments in, text out.
pub type Handler = Arc<dyn Fn(Arc<dyn ApiTransport>, Value) -> HandlerFuture + Send + Sync>;

/// Errors raised while building the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two operations share a name.
    #[error("operation '{name}' is registered twice")]
    Duplicate {
        /// The repeated name.
        name: String,
    },
}

/// Whether an operation is a tool or a resource template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Called through `tools/call`.
    Tool,
    /// Read through `resources/read` for URIs of the given shape.
    Resource(AddressShape),
}

/// A registered tool or resource template.
#[derive(Clone)]
pub struct OperationDescriptor {
    /// Unique name.
    pub name: String,
    /// Tool or resource.
    pub kind: OperationKind,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
    /// The handler.
    pub handler: Handler,
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl OperationDescriptor {
    /// Describes a tool.
    pub fn tool<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<dyn ApiTransport>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self::new(name, OperationKind::Tool, description, input_schema, handler)
    }

    /// Describes a resource template for one address shape.
    pub fn resource<F, Fut>(
        name: impl Into<String>,
        shape: AddressShape,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<dyn ApiTransport>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self::new(
            name,
            OperationKind::Resource(shape),
            description,
            input_schema,
            handler,
        )
    }

    fn new<F, Fut>(
        name: impl Into<String>,
        kind: OperationKind,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<dyn ApiTransport>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            input_schema,
            handler: Arc::new(move |api: Arc<dyn ApiTransport>, args: Value| -> HandlerFuture {
                Box::pin(handler(api, args))
            }),
        }
    }
}

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// A resource template for the `resources/templates/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// RFC 6570 URI template.
    pub uri_template: String,
    /// Template name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Media type of the contents.
    pub mime_type: &'static str,
}

/// Content item in a call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call or resource read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the operation.
    pub content: Vec<ToolContent>,
    /// Whether the operation failed.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Concatenated text of all content items.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|ToolContent::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lifecycle of a single call, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// The call arrived.
    Received,
    /// Arguments matched the schema.
    Validated,
    /// The handler is running.
    Executing,
    /// The handler returned a result.
    Succeeded,
    /// Lookup, validation or the handler failed.
    Failed,
    /// A result has been produced for the caller.
    Responded,
}

/// Collects operations before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    operations: IndexMap<String, OperationDescriptor>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is already taken.
    pub fn register(&mut self, descriptor: OperationDescriptor) -> Result<&mut Self, RegistryError> {
        if self.operations.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate {
                name: descriptor.name,
            });
        }
        self.operations.insert(descriptor.name.clone(), descriptor);
        Ok(self)
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            operations: self.operations,
        }
    }
}

/// Immutable table of tools and resource templates.
pub struct Registry {
    operations: IndexMap<String, OperationDescriptor>,
}

impl Registry {
    /// Builds the registry with every tool and resource this server offers.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if two operations share a name.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::new();
        crate::mcp::tools::register(&mut builder)?;
        crate::mcp::resources::register(&mut builder)?;
        Ok(builder.build())
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Tool definitions in registration order.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.operations
            .values()
            .filter(|op| op.kind == OperationKind::Tool)
            .map(|op| ToolDefinition {
                name: op.name.clone(),
                description: Some(op.description.clone()),
                input_schema: op.input_schema.clone(),
            })
            .collect()
    }

    /// Resource templates in registration order.
    #[must_use]
    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.operations
            .values()
            .filter_map(|op| match op.kind {
                OperationKind::Resource(shape) => Some(ResourceTemplate {
                    uri_template: shape.uri_template().to_string(),
                    name: op.name.clone(),
                    description: op.description.clone(),
                    mime_type: "application/json",
                }),
                OperationKind::Tool => None,
            })
            .collect()
    }

    /// Calls the tool `name`.
    pub async fn call_tool(
        &self,
        api: Arc<dyn ApiTransport>,
        name: &str,
        arguments: Value,
    ) -> ToolCallResult {
        trace_phase(name, CallPhase::Received);
        let descriptor = self
            .operations
            .get(name)
            .filter(|op| op.kind == OperationKind::Tool);
        let Some(descriptor) = descriptor else {
            trace_phase(name, CallPhase::Failed);
            return respond(name, ToolCallResult::error(format!("Unknown tool: {name}")));
        };

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        invoke(descriptor, api, arguments).await
    }

    /// Reads the resource identified by `uri`.
    ///
    /// The URI is parsed here; the handler sees only the path parameters.
    pub async fn read_resource(&self, api: Arc<dyn ApiTransport>, uri: &str) -> ToolCallResult {
        trace_phase(uri, CallPhase::Received);
        let parsed = Address::parse_uri(uri).and_then(|address| Ok((address.shape()?, address)));
        let (shape, address) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                trace_phase(uri, CallPhase::Failed);
                return respond(uri, ToolCallResult::error(ToolError::from(e).to_string()));
            }
        };

        let descriptor = self
            .operations
            .values()
            .find(|op| op.kind == OperationKind::Resource(shape));
        let Some(descriptor) = descriptor else {
            trace_phase(uri, CallPhase::Failed);
            return respond(uri, ToolCallResult::error(format!("Unknown resource: {uri}")));
        };

        invoke(descriptor, api, address.to_params()).await
    }
}

async fn invoke(
    descriptor: &OperationDescriptor,
    api: Arc<dyn ApiTransport>,
    arguments: Value,
) -> ToolCallResult {
    let name = descriptor.name.as_str();

    if let Err(message) = schema::validate(&descriptor.input_schema, &arguments) {
        trace_phase(name, CallPhase::Failed);
        let error = ToolError::Validation(message);
        return respond(name, ToolCallResult::error(error.to_string()));
    }
    trace_phase(name, CallPhase::Validated);

    trace_phase(name, CallPhase::Executing);
    let result = match (descriptor.handler)(api, arguments).await {
        Ok(text) => {
            trace_phase(name, CallPhase::Succeeded);
            ToolCallResult::text(text)
        }
        Err(e) => {
            tracing::warn!(operation = name, error = %e, "Operation failed");
            trace_phase(name, CallPhase::Failed);
            ToolCallResult::error(e.to_string())
        }
    };
    respond(name, result)
}

fn respond(operation: &str, result: ToolCallResult) -> ToolCallResult {
    tracing::debug!(operation, is_error = result.is_error, phase = ?CallPhase::Responded, "Call phase");
    result
}

fn trace_phase(operation: &str, phase: CallPhase) {
    tracing::debug!(operation, ?phase, "Call phase");
}
