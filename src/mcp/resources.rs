//! Resource templates, one per address shape.
//!
//! `resources/read` parses the URI in the registry and hands these
//! handlers the resulting path parameters. Document and document-state
//! resources read the document API directly; element and part resources
//! read metadata under `/metadata`.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::ToolError;
use crate::mcp::registry::{OperationDescriptor, RegistryBuilder, RegistryError};
use crate::mcp::tools::ID_PATTERN;
use crate::onshape::{Address, AddressShape, ApiRequest, ApiTransport};

/// Registers the four resource templates.
///
/// # Errors
///
/// Returns [`RegistryError`] if a resource name is already taken.
pub fn register(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    for shape in AddressShape::ALL {
        let (name, description) = match shape {
            AddressShape::Document => ("document", "Document metadata"),
            AddressShape::DocumentState => (
                "document-state",
                "Workspace or version metadata, or the element list of a microversion",
            ),
            AddressShape::Element => ("element", "Element metadata"),
            AddressShape::Part => ("part", "Part metadata"),
        };
        builder.register(OperationDescriptor::resource(
            name,
            shape,
            description,
            params_schema(shape),
            read_address,
        ))?;
    }
    Ok(())
}

fn params_schema(shape: AddressShape) -> Value {
    let id = json!({ "type": "string", "pattern": ID_PATTERN });
    let mut required = vec!["documentId"];
    let mut properties = serde_json::Map::new();
    properties.insert("documentId".into(), id.clone());

    if shape != AddressShape::Document {
        required.extend(["state", "stateId"]);
        properties.insert("state".into(), json!({ "type": "string", "enum": ["w", "v", "m"] }));
        properties.insert("stateId".into(), id.clone());
    }
    if matches!(shape, AddressShape::Element | AddressShape::Part) {
        required.push("elementId");
        properties.insert("elementId".into(), id.clone());
    }
    if shape == AddressShape::Part {
        required.push("partId");
        properties.insert("partId".into(), id);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

async fn read_address(api: Arc<dyn ApiTransport>, params: Value) -> Result<String, ToolError> {
    let address = Address::from_params(&params)?;
    let path = match address.shape()? {
        AddressShape::Document | AddressShape::DocumentState => address.rest_path()?,
        AddressShape::Element | AddressShape::Part => format!("/metadata{}", address.rest_path()?),
    };
    let body = api.execute(ApiRequest::get(path)).await?;
    Ok(serde_json::to_string_pretty(&body)?)
}
