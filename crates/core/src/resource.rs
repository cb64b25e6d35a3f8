//! Per-`resourceType` behaviour, kept apart from the generic reference walking

use std::fmt;

use serde_json::Value as JsonValue;

/// `resourceType` of a resource body
pub fn resource_type(resource: &JsonValue) -> Option<&str> {
    resource.get("resourceType").and_then(|v| v.as_str())
}

/// `id` of a resource body
pub fn resource_id(resource: &JsonValue) -> Option<&str> {
    resource.get("id").and_then(|v| v.as_str())
}

/// Resource kinds with dedicated handling; anything else is `Other`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Patient,
    Practitioner,
    Organization,
    DiagnosticReport,
    Encounter,
    Observation,
    CareTeam,
    HealthcareService,
    Condition,
    Bundle,
    Other(String),
}

impl ResourceKind {
    /// Kinds the bundle store keeps per-type counts for
    pub const TRACKED: [ResourceKind; 9] = [
        ResourceKind::Patient,
        ResourceKind::Practitioner,
        ResourceKind::Organization,
        ResourceKind::DiagnosticReport,
        ResourceKind::Encounter,
        ResourceKind::Observation,
        ResourceKind::CareTeam,
        ResourceKind::HealthcareService,
        ResourceKind::Condition,
    ];

    pub fn from_resource_type(resource_type: &str) -> Self {
        match resource_type {
            "Patient" => Self::Patient,
            "Practitioner" => Self::Practitioner,
            "Organization" => Self::Organization,
            "DiagnosticReport" => Self::DiagnosticReport,
            "Encounter" => Self::Encounter,
            "Observation" => Self::Observation,
            "CareTeam" => Self::CareTeam,
            "HealthcareService" => Self::HealthcareService,
            "Condition" => Self::Condition,
            "Bundle" => Self::Bundle,
            other => Self::Other(other.to_string()),
        }
    }

    /// Accepts either a `resourceType` (`DiagnosticReport`) or a collection
    /// slug (`reports`, `patients`)
    pub fn parse(name: &str) -> Self {
        let first_is_lower = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        if first_is_lower {
            let tracked = Self::TRACKED
                .into_iter()
                .chain([Self::Bundle])
                .find(|kind| kind.collection_slug() == name);
            if let Some(kind) = tracked {
                return kind;
            }
            // British spelling used by some links
            if name == "organisations" {
                return Self::Organization;
            }
        }
        Self::from_resource_type(name)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Patient => "Patient",
            Self::Practitioner => "Practitioner",
            Self::Organization => "Organization",
            Self::DiagnosticReport => "DiagnosticReport",
            Self::Encounter => "Encounter",
            Self::Observation => "Observation",
            Self::CareTeam => "CareTeam",
            Self::HealthcareService => "HealthcareService",
            Self::Condition => "Condition",
            Self::Bundle => "Bundle",
            Self::Other(name) => name,
        }
    }

    /// Plural path segment used when linking to resources of this kind
    pub fn collection_slug(&self) -> String {
        match self {
            Self::DiagnosticReport => "reports".to_string(),
            other => {
                let name = other.as_str().to_lowercase();
                match name.strip_suffix('y') {
                    Some(stem) => format!("{stem}ies"),
                    None => format!("{name}s"),
                }
            }
        }
    }

    /// Whether a resource body is of this kind
    pub fn matches(&self, resource: &JsonValue) -> bool {
        resource_type(resource) == Some(self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
