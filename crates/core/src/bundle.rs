use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::ShapeError;
use crate::resource::resource_type;

/// Relation name of the pagination continuation link
pub const NEXT_RELATION: &str = "next";

/// FHIR Bundle types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Searchset,
    History,
    Collection,
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
}

/// FHIR Bundle resource.
///
/// Only the fields the resolver works with are typed; everything else the
/// server sent (`id`, `meta`, `timestamp`, ...) is kept in `extra` so a bundle
/// round-trips without losing data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,

    #[serde(rename = "type")]
    pub bundle_type: BundleType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Bundle {
    pub fn new(bundle_type: BundleType, entry: Vec<BundleEntry>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type,
            total: None,
            link: Vec::new(),
            entry,
            extra: Map::new(),
        }
    }

    /// Create a `collection` bundle wrapping the given entries
    pub fn collection(entry: Vec<BundleEntry>) -> Self {
        Self::new(BundleType::Collection, entry)
    }

    /// Create a `searchset` bundle with a known total
    pub fn searchset(total: u32, entry: Vec<BundleEntry>) -> Self {
        Self {
            total: Some(total),
            ..Self::new(BundleType::Searchset, entry)
        }
    }

    /// Interpret an arbitrary JSON value as a Bundle.
    ///
    /// Fails when the value is not an object tagged `resourceType: "Bundle"`
    /// or when its structure does not match a Bundle.
    pub fn from_value(value: JsonValue) -> Result<Self, ShapeError> {
        match resource_type(&value) {
            Some("Bundle") => {}
            Some(other) => {
                return Err(ShapeError::UnexpectedResourceType {
                    expected: "Bundle".to_string(),
                    found: other.to_string(),
                });
            }
            None => return Err(ShapeError::MissingResourceType),
        }

        serde_json::from_value(value).map_err(|e| ShapeError::Invalid {
            resource_type: "Bundle".to_string(),
            message: e.to_string(),
        })
    }

    /// URL of the first link with the given relation
    pub fn link_url(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.url.as_str())
    }

    /// Pagination continuation, if the server sent one
    pub fn next_page_url(&self) -> Option<&str> {
        self.link_url(NEXT_RELATION)
    }

    /// Iterate over the resources wrapped by this bundle's entries
    pub fn resources(&self) -> impl Iterator<Item = &JsonValue> {
        self.entry.iter().map(|e| &e.resource)
    }
}

/// Bundle entry wrapping exactly one resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    pub resource: JsonValue,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl BundleEntry {
    pub fn new(full_url: Option<String>, resource: JsonValue) -> Self {
        Self {
            full_url,
            resource,
            extra: Map::new(),
        }
    }
}

/// Bundle link (e.g. `self`, `next`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}
