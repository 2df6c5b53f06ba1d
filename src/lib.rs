//! onshape-mcp: MCP server exposing the Onshape REST API
//!
//! This library lets AI assistants browse and edit Onshape documents through
//! MCP tools and `onshape://` resource URIs.
//!
//! # Architecture
//!
//! - **Addresses**: one value type for document, workspace/version/microversion,
//!   element and part, rendered as a URI or a REST path
//! - **Mutations**: every feature write echoes the version stamps of a fresh
//!   feature-list read, and reports skew or evaluation failures
//! - **Dispatch**: a single registry of tools and resource templates, each
//!   with a JSON Schema that is checked before the handler runs
//!
//! The AI (not this tool) decides what to model; the server only moves
//! validated requests to the API and reports what came back.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation
//! - [`onshape`]: Onshape REST API access

pub mod config;
pub mod error;
pub mod mcp;
pub mod onshape;
