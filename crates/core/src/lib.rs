//! fhir-graph-core: FHIR data model shared by the resolver and the server
//!
//! Bundles are typed only as far as reference resolution needs; individual
//! resources stay open-ended JSON objects so any `resourceType` can flow
//! through unchanged.

pub mod bundle;
pub mod error;
pub mod outcome;
pub mod reference;
pub mod resource;

pub use bundle::{Bundle, BundleEntry, BundleLink, BundleType, NEXT_RELATION};
pub use error::{FetchError, FetchFailure, MalformedReference, ResolveError, ShapeError};
pub use outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
pub use reference::{REFERENCE_FIELD, RESOURCE_FIELD, ResourceKey};
pub use resource::{ResourceKind, resource_id, resource_type};
