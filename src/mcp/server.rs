//! MCP server implementation for the Onshape API.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and resource reads
//! 3. **Shutdown**: Graceful connection termination
//!
//! # Concurrency
//!
//! One loop reads requests in order. Cheap requests (`initialize`, `ping`,
//! the `*/list` methods) are answered inline. `tools/call` and
//! `resources/read` run as separate tasks that share the immutable
//! [`Registry`] and the API transport; their responses come back over a
//! channel and are written by the loop, so several API calls can be in
//! flight at once and may complete in any order. Nothing is cancelled once
//! started, and the loop does not exit on EOF until every started call has
//! been answered.

use std::future::Future;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Outgoing, RequestId,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::registry::{Registry, ToolCallResult};
use crate::mcp::transport::StdioTransport;
use crate::onshape::ApiTransport;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ListCapabilities,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
}

/// Capabilities of a list that never changes during a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapabilities {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Resource capabilities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    pub list_changed: bool,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceReadParams {
    /// URI of the resource.
    pub uri: String,
}

/// The MCP server for the Onshape API.
pub struct McpServer<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: StdioTransport<R, W>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Tools and resource templates.
    registry: Arc<Registry>,
    /// REST transport shared by handler tasks.
    api: Arc<dyn ApiTransport>,
    /// Responses posted by handler tasks.
    outbound_tx: mpsc::UnboundedSender<Outgoing>,
    outbound_rx: mpsc::UnboundedReceiver<Outgoing>,
    /// Handler tasks started but not yet answered.
    in_flight: usize,
}

impl McpServer {
    /// Creates a server on stdin/stdout.
    #[must_use]
    pub fn new(registry: Arc<Registry>, api: Arc<dyn ApiTransport>) -> Self {
        Self::with_transport(registry, api, StdioTransport::new())
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails or signal handlers cannot be
    /// installed.
    #[cfg(unix)]
    pub async fn run(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let shutdown = async move {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        };

        self.serve_until(shutdown).await
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(windows)]
    pub async fn run(&mut self) -> io::Result<()> {
        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
        };

        self.serve_until(shutdown).await
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server on an explicit transport.
    #[must_use]
    pub fn with_transport(
        registry: Arc<Registry>,
        api: Arc<dyn ApiTransport>,
        transport: StdioTransport<R, W>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            state: ServerState::AwaitingInit,
            transport,
            protocol_version: None,
            registry,
            api,
            outbound_tx,
            outbound_rx,
            in_flight: 0,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Consumes the server and returns its transport.
    pub fn into_transport(self) -> StdioTransport<R, W> {
        self.transport
    }

    /// Serves until the input closes and every started call is answered.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> io::Result<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Serves until the input closes or `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve_until<F>(&mut self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut input_open = true;

        loop {
            if !input_open && self.in_flight == 0 {
                return Ok(());
            }

            tokio::select! {
                () = &mut shutdown => {
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                Some(outgoing) = self.outbound_rx.recv(), if self.in_flight > 0 => {
                    self.in_flight -= 1;
                    tracing::debug!(id = ?outgoing.id(), in_flight = self.in_flight, "Call answered");
                    self.transport.write_outgoing(&outgoing).await?;
                }

                line_result = self.transport.read_line(), if input_open => {
                    match line_result? {
                        None => {
                            tracing::debug!(in_flight = self.in_flight, "Input closed");
                            self.state = ServerState::ShuttingDown;
                            input_open = false;
                        }
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => self.handle_line(&line).await?,
                    }
                }
            }
        }
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> io::Result<()> {
        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => self.handle_request(req).await,
            Ok(IncomingMessage::Notification(ref notif)) => {
                self.handle_notification(notif);
                Ok(())
            }
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> io::Result<()> {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => return self.spawn_tool_call(req).await,
            "resources/list" => self.handle_resources_list(&req),
            "resources/templates/list" => self.handle_resource_templates_list(&req),
            "resources/read" => return self.spawn_resource_read(req).await,
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        self.transport.write_outgoing(&response.into()).await
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" if self.state == ServerState::Initialising => {
                tracing::info!("Client initialised");
                self.state = ServerState::Running;
            }
            "notifications/cancelled" => {
                tracing::debug!("Ignoring cancellation; calls run to completion");
            }
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                requested_protocol = %params.protocol_version,
                "Initialising session"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": self.registry.tool_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the resources/list request.
    ///
    /// Remote documents are not enumerated; clients use the templates.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": [] }),
        ))
    }

    /// Handles the resources/templates/list request.
    fn handle_resource_templates_list(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "resourceTemplates": self.registry.resource_templates(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Starts a tools/call request on its own task.
    async fn spawn_tool_call(&mut self, req: JsonRpcRequest) -> io::Result<()> {
        let params = self
            .require_running(&req.id)
            .and_then(|()| parse_params::<ToolCallParams>(&req, "tool call"));
        let params = match params {
            Ok(params) => params,
            Err(error) => return self.transport.write_error(&error).await,
        };

        tracing::info!(tool = %params.name, id = %req.id, "Tool call");
        let registry = Arc::clone(&self.registry);
        let api = Arc::clone(&self.api);
        self.spawn(req.id, async move {
            let result = registry
                .call_tool(api, &params.name, params.arguments)
                .await;
            serde_json::to_value(&result)
        });
        Ok(())
    }

    /// Starts a resources/read request on its own task.
    async fn spawn_resource_read(&mut self, req: JsonRpcRequest) -> io::Result<()> {
        let params = self
            .require_running(&req.id)
            .and_then(|()| parse_params::<ResourceReadParams>(&req, "resource read"));
        let params = match params {
            Ok(params) => params,
            Err(error) => return self.transport.write_error(&error).await,
        };

        tracing::info!(uri = %params.uri, id = %req.id, "Resource read");
        let registry = Arc::clone(&self.registry);
        let api = Arc::clone(&self.api);
        self.spawn(req.id, async move {
            let result = registry.read_resource(api, &params.uri).await;
            Ok(resource_contents(&params.uri, &result))
        });
        Ok(())
    }

    /// Runs `work` on a task and posts exactly one response for `id`.
    fn spawn<F>(&mut self, id: RequestId, work: F)
    where
        F: Future<Output = serde_json::Result<Value>> + Send + 'static,
    {
        let tx = self.outbound_tx.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let outgoing = match tokio::spawn(work).await {
                Ok(Ok(result)) => Outgoing::Response(JsonRpcResponse::success(id, result)),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Failed to serialise call result");
                    Outgoing::Error(JsonRpcError::internal_error(
                        id,
                        "Internal error: failed to serialise result",
                    ))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Handler task failed");
                    Outgoing::Error(JsonRpcError::internal_error(
                        id,
                        "Internal error: handler task failed",
                    ))
                }
            };
            // The receiver lives as long as the server.
            let _ = tx.send(outgoing);
        });
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }
}

/// Deserialises request params, mapping failures to invalid-params errors.
fn parse_params<T>(req: &JsonRpcRequest, what: &str) -> Result<T, JsonRpcError>
where
    T: for<'de> Deserialize<'de>,
{
    let params = req
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))?;
    serde_json::from_value(params).map_err(|e| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
    })
}

/// Shapes a registry result as a resources/read response.
///
/// Failures stay in-band: the error text becomes the content and the
/// result carries `isError: true`.
#[must_use]
pub fn resource_contents(uri: &str, result: &ToolCallResult) -> Value {
    let mime_type = if result.is_error {
        "text/plain"
    } else {
        "application/json"
    };
    let mut value = json!({
        "contents": [{
            "uri": uri,
            "mimeType": mime_type,
            "text": result.joined_text(),
        }]
    });
    if result.is_error {
        value["isError"] = Value::Bool(true);
    }
    value
}
