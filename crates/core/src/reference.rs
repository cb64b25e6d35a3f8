//! Reference parsing and the `(resourceType, id)` key used to deduplicate fetches

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value as JsonValue};

use crate::error::MalformedReference;

/// Field holding the `<ResourceType>/<id>` pointer inside a Reference
pub const REFERENCE_FIELD: &str = "reference";

/// Field the resolver attaches the dereferenced resource under
pub const RESOURCE_FIELD: &str = "resource";

/// Identity of a resource within one resolution call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub resource_type: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse a relative reference such as `Patient/42`.
    ///
    /// A version suffix (`Patient/42/_history/3`) is accepted and dropped.
    pub fn parse(reference: &str) -> Result<Self, MalformedReference> {
        let malformed = || reference.to_string();

        if reference.starts_with('#') {
            return Err(MalformedReference::Contained(malformed()));
        }
        if reference.contains("://") || reference.starts_with("urn:") {
            return Err(MalformedReference::Absolute(malformed()));
        }
        if !reference.contains('/') {
            return Err(MalformedReference::MissingSeparator(malformed()));
        }

        let segments: Vec<&str> = reference.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(MalformedReference::EmptySegment(malformed()));
        }
        if segments
            .iter()
            .any(|s| s.chars().any(|c| c.is_whitespace() || c == '?'))
        {
            return Err(MalformedReference::Unrecognized(malformed()));
        }

        match segments.as_slice() {
            [resource_type, id] | [resource_type, id, "_history", _] => {
                Ok(Self::new(*resource_type, *id))
            }
            _ => Err(MalformedReference::Unrecognized(malformed())),
        }
    }

    /// Absolute read URL for this resource on the server at `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.resource_type,
            self.id
        )
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

impl FromStr for ResourceKey {
    type Err = MalformedReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The `reference` string of a reference-shaped mapping
pub fn reference_of(map: &Map<String, JsonValue>) -> Option<&str> {
    map.get(REFERENCE_FIELD).and_then(|v| v.as_str())
}

/// Whether a reference-shaped mapping already carries its target
pub fn is_attached(map: &Map<String, JsonValue>) -> bool {
    map.contains_key(RESOURCE_FIELD)
}
