//! Resource addressing for Onshape documents.
//!
//! An [`Address`] names a document, optionally a state of that document
//! (workspace, version or microversion), an element within that state and a
//! part within that element. Addresses convert to and from two string forms:
//!
//! | Shape          | URI                                                       |
//! |----------------|-----------------------------------------------------------|
//! | Document       | `onshape://document/{doc}`                                |
//! | DocumentState  | `onshape://document/{doc}/{w,v,m}/{id}`                   |
//! | Element        | `onshape://document/{doc}/{w,v,m}/{id}/element/{el}`      |
//! | Part           | `onshape://document/{doc}/{w,v,m}/{id}/element/{el}/part/{part}` |
//!
//! REST paths for elements and parts share one layout for all three state
//! kinds (`/d/{doc}/{w,v,m}/{id}/e/{el}[/pi/{part}]`); only the bare
//! document-state path differs per kind.

use std::fmt;

use serde_json::{Map, Value};

use super::error::AddressError;

macro_rules! uri_prefix {
    () => {
        "onshape://document/"
    };
}

/// Prefix shared by every resource URI and template.
pub const URI_PREFIX: &str = uri_prefix!();

/// Which temporal snapshot of a document is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateSelector {
    /// A mutable workspace.
    Workspace(String),
    /// An immutable named version.
    Version(String),
    /// An immutable microversion.
    Microversion(String),
}

impl StateSelector {
    /// Builds a selector from its one-letter token.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::UnknownState`] for anything other than `w`,
    /// `v` or `m`, and [`AddressError::InvalidIdentifier`] for a bad id.
    pub fn from_token(token: &str, id: impl Into<String>) -> Result<Self, AddressError> {
        let id = id.into();
        check_identifier("stateId", &id)?;
        match token {
            "w" => Ok(Self::Workspace(id)),
            "v" => Ok(Self::Version(id)),
            "m" => Ok(Self::Microversion(id)),
            other => Err(AddressError::UnknownState {
                token: other.to_string(),
            }),
        }
    }

    /// The one-letter token used in URIs and REST paths.
    #[must_use]
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "w",
            Self::Version(_) => "v",
            Self::Microversion(_) => "m",
        }
    }

    /// The identifier of the workspace, version or microversion.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Workspace(id) | Self::Version(id) | Self::Microversion(id) => id,
        }
    }

    /// Human-readable kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "workspace",
            Self::Version(_) => "version",
            Self::Microversion(_) => "microversion",
        }
    }

    /// Returns `true` for the only mutable state kind.
    #[must_use]
    pub const fn is_workspace(&self) -> bool {
        matches!(self, Self::Workspace(_))
    }
}

impl fmt::Display for StateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// The four nesting levels an address can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressShape {
    /// Document only.
    Document,
    /// Document plus state selector.
    DocumentState,
    /// Element within a document state.
    Element,
    /// Part within an element.
    Part,
}

impl AddressShape {
    /// Every shape, least to most specific.
    pub const ALL: [Self; 4] = [Self::Document, Self::DocumentState, Self::Element, Self::Part];

    /// URI template advertised for this shape.
    #[must_use]
    pub const fn uri_template(self) -> &'static str {
        match self {
            Self::Document => concat!(uri_prefix!(), "{documentId}"),
            Self::DocumentState => concat!(uri_prefix!(), "{documentId}/{state}/{stateId}"),
            Self::Element => {
                concat!(uri_prefix!(), "{documentId}/{state}/{stateId}/element/{elementId}")
            }
            Self::Part => concat!(
                uri_prefix!(),
                "{documentId}/{state}/{stateId}/element/{elementId}/part/{partId}"
            ),
        }
    }
}

/// A structured reference to a document, state, element or part.
///
/// Fields are public so callers can assemble addresses directly; the
/// nesting rules are checked by [`Address::validate`], which every string
/// conversion calls first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Document identifier.
    pub document_id: String,
    /// Addressed state of the document.
    pub state: Option<StateSelector>,
    /// Element within the state.
    pub element_id: Option<String>,
    /// Part within the element.
    pub part_id: Option<String>,
}

impl Address {
    /// Address of a whole document.
    #[must_use]
    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            state: None,
            element_id: None,
            part_id: None,
        }
    }

    /// Narrows the address to a document state.
    #[must_use]
    pub fn with_state(mut self, state: StateSelector) -> Self {
        self.state = Some(state);
        self
    }

    /// Narrows the address to an element.
    #[must_use]
    pub fn with_element(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    /// Narrows the address to a part.
    #[must_use]
    pub fn with_part(mut self, part_id: impl Into<String>) -> Self {
        self.part_id = Some(part_id.into());
        self
    }

    /// Checks the nesting rules and every identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if a component is missing or malformed.
    pub fn validate(&self) -> Result<(), AddressError> {
        check_identifier("documentId", &self.document_id)?;
        if let Some(state) = &self.state {
            check_identifier("stateId", state.id())?;
        }
        if let Some(element_id) = &self.element_id {
            check_identifier("elementId", element_id)?;
            if self.state.is_none() {
                return Err(AddressError::MissingComponent {
                    missing: "state",
                    required_by: "elementId",
                });
            }
        }
        if let Some(part_id) = &self.part_id {
            check_identifier("partId", part_id)?;
            if self.element_id.is_none() {
                return Err(AddressError::MissingComponent {
                    missing: "elementId",
                    required_by: "partId",
                });
            }
        }
        Ok(())
    }

    /// The nesting level of this address.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the address is not valid.
    pub fn shape(&self) -> Result<AddressShape, AddressError> {
        self.validate()?;
        Ok(match (&self.state, &self.element_id, &self.part_id) {
            (None, _, _) => AddressShape::Document,
            (Some(_), None, _) => AddressShape::DocumentState,
            (Some(_), Some(_), None) => AddressShape::Element,
            (Some(_), Some(_), Some(_)) => AddressShape::Part,
        })
    }

    /// Parses a resource URI.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the URI matches none of the templates.
    pub fn parse_uri(uri: &str) -> Result<Self, AddressError> {
        let malformed = |reason: &str| AddressError::Malformed {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let rest = uri
            .strip_prefix(URI_PREFIX)
            .ok_or_else(|| malformed(concat!("expected prefix ", uri_prefix!())))?;
        let segments: Vec<&str> = rest.split('/').collect();

        let address = match segments.as_slice() {
            [doc] => Self::document(*doc),
            [doc, token, state_id] => {
                Self::document(*doc).with_state(StateSelector::from_token(token, *state_id)?)
            }
            [doc, token, state_id, "element", element] => Self::document(*doc)
                .with_state(StateSelector::from_token(token, *state_id)?)
                .with_element(*element),
            [doc, token, state_id, "element", element, "part", part] => Self::document(*doc)
                .with_state(StateSelector::from_token(token, *state_id)?)
                .with_element(*element)
                .with_part(*part),
            [_, _] => return Err(malformed("state token without an id")),
            [_, _, _, "element"] => return Err(malformed("element segment without an id")),
            [_, _, _, _, _, "part"] => return Err(malformed("part segment without an id")),
            _ => return Err(malformed("unexpected path segments")),
        };

        address.validate()?;
        Ok(address)
    }

    /// Builds the resource URI.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the address is not valid.
    pub fn to_uri(&self) -> Result<String, AddressError> {
        self.validate()?;
        let mut uri = format!("{URI_PREFIX}{}", self.document_id);
        if let Some(state) = &self.state {
            uri.push_str(&format!("/{}/{}", state.token(), state.id()));
        }
        if let Some(element_id) = &self.element_id {
            uri.push_str(&format!("/element/{element_id}"));
        }
        if let Some(part_id) = &self.part_id {
            uri.push_str(&format!("/part/{part_id}"));
        }
        Ok(uri)
    }

    /// Builds the REST path for this address, relative to the API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the address is not valid.
    pub fn rest_path(&self) -> Result<String, AddressError> {
        let doc = &self.document_id;
        match (self.shape()?, &self.state) {
            (AddressShape::Element | AddressShape::Part, _) => {
                let mut path = self.element_path()?;
                if let Some(part_id) = &self.part_id {
                    path.push_str(&format!("/pi/{part_id}"));
                }
                Ok(path)
            }
            (_, None) => Ok(format!("/documents/{doc}")),
            (_, Some(StateSelector::Workspace(id))) => {
                Ok(format!("/documents/d/{doc}/workspaces/{id}"))
            }
            (_, Some(StateSelector::Version(id))) => Ok(format!("/documents/d/{doc}/versions/{id}")),
            (_, Some(StateSelector::Microversion(id))) => {
                Ok(format!("/documents/d/{doc}/m/{id}/elements"))
            }
        }
    }

    /// The `/d/{doc}/{w,v,m}/{id}` prefix shared by state-scoped endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the address has no state.
    pub fn state_path(&self) -> Result<String, AddressError> {
        self.validate()?;
        let state = self.state.as_ref().ok_or(AddressError::MissingComponent {
            missing: "state",
            required_by: "this operation",
        })?;
        Ok(format!(
            "/d/{}/{}/{}",
            self.document_id,
            state.token(),
            state.id()
        ))
    }

    /// The `/d/{doc}/{w,v,m}/{id}/e/{el}` path shared by element endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the address has no element.
    pub fn element_path(&self) -> Result<String, AddressError> {
        let element_id = self
            .element_id
            .as_ref()
            .ok_or(AddressError::MissingComponent {
                missing: "elementId",
                required_by: "this operation",
            })?;
        Ok(format!("{}/e/{element_id}", self.state_path()?))
    }

    /// Converts the address to the argument object used by tools and
    /// resource handlers.
    #[must_use]
    pub fn to_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("documentId".into(), Value::String(self.document_id.clone()));
        if let Some(state) = &self.state {
            params.insert("state".into(), Value::String(state.token().to_string()));
            params.insert("stateId".into(), Value::String(state.id().to_string()));
        }
        if let Some(element_id) = &self.element_id {
            params.insert("elementId".into(), Value::String(element_id.clone()));
        }
        if let Some(part_id) = &self.part_id {
            params.insert("partId".into(), Value::String(part_id.clone()));
        }
        Value::Object(params)
    }

    /// Reads an address out of a tool argument object.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the arguments do not form a valid address.
    pub fn from_params(params: &Value) -> Result<Self, AddressError> {
        let field = |name: &str| params.get(name).and_then(Value::as_str);

        let document_id = field("documentId").ok_or(AddressError::MissingComponent {
            missing: "documentId",
            required_by: "every address",
        })?;
        let mut address = Self::document(document_id);

        match (field("state"), field("stateId")) {
            (Some(token), Some(id)) => address.state = Some(StateSelector::from_token(token, id)?),
            (Some(_), None) => {
                return Err(AddressError::MissingComponent {
                    missing: "stateId",
                    required_by: "state",
                })
            }
            (None, Some(_)) => {
                return Err(AddressError::MissingComponent {
                    missing: "state",
                    required_by: "stateId",
                })
            }
            (None, None) => {}
        }
        address.element_id = field("elementId").map(str::to_string);
        address.part_id = field("partId").map(str::to_string);

        address.validate()?;
        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document {}", self.document_id)?;
        if let Some(state) = &self.state {
            write!(f, ", {state}")?;
        }
        if let Some(element_id) = &self.element_id {
            write!(f, ", element {element_id}")?;
        }
        if let Some(part_id) = &self.part_id {
            write!(f, ", part {part_id}")?;
        }
        Ok(())
    }
}

fn check_identifier(component: &'static str, value: &str) -> Result<(), AddressError> {
    if value.is_empty() || value.contains(['/', '?', '#']) || value.chars().any(char::is_whitespace)
    {
        return Err(AddressError::InvalidIdentifier {
            component,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part_address() -> Address {
        Address::document("D1")
            .with_state(StateSelector::Workspace("W1".into()))
            .with_element("E1")
            .with_part("JHD")
    }

    #[test]
    fn templates_and_uris_share_prefix() {
        for shape in AddressShape::ALL {
            assert!(shape.uri_template().starts_with(URI_PREFIX), "{shape:?}");
        }
        assert!(part_address().to_uri().unwrap().starts_with(URI_PREFIX));
        assert_eq!(
            AddressShape::Part.uri_template(),
            "onshape://document/{documentId}/{state}/{stateId}/element/{elementId}/part/{partId}"
        );
    }

    #[test]
    fn parse_part_uri() {
        let address = Address::parse_uri("onshape://document/D1/w/W1/element/E1/part/JHD").unwrap();
        assert_eq!(address, part_address());
        assert_eq!(address.shape().unwrap(), AddressShape::Part);
    }

    #[test]
    fn state_token_round_trip() {
        for token in ["w", "v", "m"] {
            let selector = StateSelector::from_token(token, "abc").unwrap();
            assert_eq!(selector.token(), token);
            assert_eq!(selector.id(), "abc");
        }
    }

    #[test]
    fn reject_unknown_state_token() {
        let err = Address::parse_uri("onshape://document/D1/x/W1").unwrap_err();
        assert_eq!(
            err,
            AddressError::UnknownState {
                token: "x".to_string()
            }
        );
    }

    #[test]
    fn reject_wrong_scheme_and_trailing_segments() {
        assert!(matches!(
            Address::parse_uri("https://document/D1"),
            Err(AddressError::Malformed { .. })
        ));
        assert!(matches!(
            Address::parse_uri("onshape://document/D1/w/W1/element"),
            Err(AddressError::Malformed { .. })
        ));
        assert!(matches!(
            Address::parse_uri("onshape://document/D1/w/W1/element/E1/part/P1/extra"),
            Err(AddressError::Malformed { .. })
        ));
        assert!(matches!(
            Address::parse_uri("onshape://document/D1/w/W1/tab/E1"),
            Err(AddressError::Malformed { .. })
        ));
    }

    #[test]
    fn reject_empty_identifier() {
        assert!(matches!(
            Address::parse_uri("onshape://document/"),
            Err(AddressError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            Address::parse_uri("onshape://document/D1/w//element/E1"),
            Err(AddressError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn rest_paths_per_shape() {
        let doc = Address::document("D1");
        assert_eq!(doc.rest_path().unwrap(), "/documents/D1");

        let ws = doc.clone().with_state(StateSelector::Workspace("W1".into()));
        assert_eq!(ws.rest_path().unwrap(), "/documents/d/D1/workspaces/W1");
        let ver = doc.clone().with_state(StateSelector::Version("V1".into()));
        assert_eq!(ver.rest_path().unwrap(), "/documents/d/D1/versions/V1");
        let mv = doc.with_state(StateSelector::Microversion("M1".into()));
        assert_eq!(mv.rest_path().unwrap(), "/documents/d/D1/m/M1/elements");

        assert_eq!(
            part_address().rest_path().unwrap(),
            "/d/D1/w/W1/e/E1/pi/JHD"
        );
    }

    #[test]
    fn element_paths_identical_across_selectors() {
        for (selector, token) in [
            (StateSelector::Workspace("S".into()), "w"),
            (StateSelector::Version("S".into()), "v"),
            (StateSelector::Microversion("S".into()), "m"),
        ] {
            let address = Address::document("D").with_state(selector).with_element("E");
            assert_eq!(address.rest_path().unwrap(), format!("/d/D/{token}/S/e/E"));
        }
    }

    #[test]
    fn params_round_trip() {
        let address = part_address();
        let params = address.to_params();
        assert_eq!(params["state"], "w");
        assert_eq!(Address::from_params(&params).unwrap(), address);
    }

    #[test]
    fn params_require_state_id() {
        let params = serde_json::json!({"documentId": "D1", "state": "v"});
        assert_eq!(
            Address::from_params(&params).unwrap_err(),
            AddressError::MissingComponent {
                missing: "stateId",
                required_by: "state"
            }
        );
    }

    #[test]
    fn display_lists_components() {
        assert_eq!(
            part_address().to_string(),
            "document D1, workspace W1, element E1, part JHD"
        );
    }
}
