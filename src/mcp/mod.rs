//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the Onshape REST API to AI assistants as MCP tools
//! and resource templates. The server communicates over stdio transport
//! using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│   Registry   │    │
//! │   │   (stdio)   │◀───│ (lifecycle) │    │ tools + URIs │    │
//! │   └─────────────┘    └─────────────┘    └──────────────┘    │
//! │                             │ spawn             │            │
//! │                             ▼                   ▼            │
//! │                      ┌─────────────┐    ┌──────────────┐    │
//! │                      │ call tasks  │───▶│ ApiTransport │    │
//! │                      └─────────────┘    └──────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod registry;
pub mod resources;
pub mod schema;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::{Registry, RegistryError, ToolCallResult};
pub use server::McpServer;
pub use transport::StdioTransport;
