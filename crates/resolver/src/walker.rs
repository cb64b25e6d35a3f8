//! Depth-first dereferencing of every Reference inside a resource

use fhir_graph_core::reference::{is_attached, reference_of};
use fhir_graph_core::{MalformedReference, RESOURCE_FIELD, ResourceKey};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value as JsonValue};

use crate::fetcher::ResourceFetcher;
use crate::index::ReferenceIndex;

/// Default bound on how many fetched resources deep references are followed
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// How the walker treats a value it meets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Mapping with a string `reference` field
    Reference,
    /// Any other mapping, or a sequence
    Container,
    Scalar,
}

impl FieldKind {
    pub fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Object(map) if reference_of(map).is_some() => Self::Reference,
            JsonValue::Object(_) | JsonValue::Array(_) => Self::Container,
            _ => Self::Scalar,
        }
    }
}

/// Attaches referenced resources in place.
///
/// The walker never fails: malformed references and fetch errors are logged
/// and leave the affected reference without a `resource`, while the rest of
/// the graph keeps resolving. Everything fetched is recorded in the index,
/// which the caller reads back once the walk is done.
pub struct ReferenceWalker<'a> {
    fetcher: &'a dyn ResourceFetcher,
    base_url: &'a str,
    index: &'a mut ReferenceIndex,
    max_depth: usize,
}

impl<'a> ReferenceWalker<'a> {
    pub fn new(
        fetcher: &'a dyn ResourceFetcher,
        base_url: &'a str,
        index: &'a mut ReferenceIndex,
    ) -> Self {
        Self {
            fetcher,
            base_url,
            index,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve every reference reachable from `resource`
    pub async fn resolve_references(&mut self, resource: &mut JsonValue) {
        self.walk(resource, 0).await;
    }

    fn walk<'b>(&'b mut self, value: &'b mut JsonValue, depth: usize) -> BoxFuture<'b, ()> {
        async move {
            let children: Vec<&mut JsonValue> = match value {
                JsonValue::Object(map) => map.values_mut().collect(),
                JsonValue::Array(items) => items.iter_mut().collect(),
                _ => return,
            };

            for child in children {
                match FieldKind::of(child) {
                    FieldKind::Reference => {
                        if let JsonValue::Object(reference) = child {
                            self.resolve_reference(reference, depth).await;
                        }
                    }
                    FieldKind::Container => self.walk(child, depth).await,
                    FieldKind::Scalar => {}
                }
            }
        }
        .boxed()
    }

    async fn resolve_reference(&mut self, reference: &mut Map<String, JsonValue>, depth: usize) {
        // Never overwrite an existing attachment
        if is_attached(reference) {
            return;
        }
        let Some(raw) = reference_of(reference) else {
            return;
        };

        let key = match ResourceKey::parse(raw) {
            Ok(key) => key,
            Err(MalformedReference::Contained(_)) => {
                tracing::debug!(reference = raw, "Skipping contained reference");
                return;
            }
            Err(e) => {
                tracing::warn!(reference = raw, error = %e, "Skipping malformed reference");
                return;
            }
        };

        if let Some(resource) = self.resolve_key(&key, depth).await {
            reference.insert(RESOURCE_FIELD.to_string(), resource);
        }
    }

    async fn resolve_key(&mut self, key: &ResourceKey, depth: usize) -> Option<JsonValue> {
        // A key still being walked (cycle) yields the resource as fetched
        if let Some(cached) = self.index.get(key) {
            return Some(cached.clone());
        }

        let url = key.url(self.base_url);
        if self.index.has_requested(&url) {
            return None;
        }
        if depth >= self.max_depth {
            tracing::warn!(
                reference = %key,
                max_depth = self.max_depth,
                "Reference nesting too deep, leaving unresolved"
            );
            return None;
        }

        self.index.mark_requested(&url);
        let mut fetched = match self.fetcher.fetch(&url).await {
            Ok(resource) => resource,
            Err(e) => {
                metrics::counter!("fhir_reference_fetches_total", "outcome" => "failure")
                    .increment(1);
                tracing::warn!(reference = %key, url = %url, error = %e, "Failed to fetch referenced resource");
                return None;
            }
        };
        metrics::counter!("fhir_reference_fetches_total", "outcome" => "success").increment(1);
        tracing::debug!(reference = %key, depth, "Fetched referenced resource");

        self.index.record(key.clone(), fetched.clone());
        self.walk(&mut fetched, depth + 1).await;
        self.index.settle(key, fetched.clone());

        Some(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BASE, MockFetcher};
    use fhir_graph_core::FetchFailure;
    use serde_json::json;

    async fn walk(fetcher: &MockFetcher, resource: &mut JsonValue) -> ReferenceIndex {
        let mut index = ReferenceIndex::new();
        ReferenceWalker::new(fetcher, BASE, &mut index)
            .resolve_references(resource)
            .await;
        index
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(
            FieldKind::of(&json!({"reference": "Patient/1"})),
            FieldKind::Reference
        );
        assert_eq!(FieldKind::of(&json!({"reference": 1})), FieldKind::Container);
        assert_eq!(FieldKind::of(&json!([{"reference": "Patient/1"}])), FieldKind::Container);
        assert_eq!(FieldKind::of(&json!("Patient/1")), FieldKind::Scalar);
        assert_eq!(FieldKind::of(&JsonValue::Null), FieldKind::Scalar);
    }

    #[tokio::test]
    async fn test_attaches_direct_and_array_references() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42"}))
            .with_resource(json!({"resourceType": "Observation", "id": "o1"}))
            .with_resource(json!({"resourceType": "Observation", "id": "o2"}));

        let mut report = json!({
            "resourceType": "DiagnosticReport",
            "id": "r1",
            "status": "final",
            "subject": {"reference": "Patient/42", "display": "Jane"},
            "result": [
                {"reference": "Observation/o1"},
                {"reference": "Observation/o2"}
            ]
        });
        let index = walk(&fetcher, &mut report).await;

        assert_eq!(report["subject"]["resource"]["id"], "42");
        assert_eq!(report["subject"]["display"], "Jane");
        assert_eq!(report["result"][0]["resource"]["id"], "o1");
        assert_eq!(report["result"][1]["resource"]["id"], "o2");
        assert_eq!(report["status"], "final");
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn test_finds_references_nested_in_containers() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Practitioner", "id": "7"}));

        let mut encounter = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "participant": [{"individual": {"reference": "Practitioner/7"}}]
        });
        walk(&fetcher, &mut encounter).await;

        assert_eq!(
            encounter["participant"][0]["individual"]["resource"]["resourceType"],
            "Practitioner"
        );
    }

    #[tokio::test]
    async fn test_recurses_into_fetched_resources() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({
                "resourceType": "Patient",
                "id": "42",
                "managingOrganization": {"reference": "Organization/org1"}
            }))
            .with_resource(json!({"resourceType": "Organization", "id": "org1", "name": "General"}));

        let mut encounter = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "subject": {"reference": "Patient/42"}
        });
        let index = walk(&fetcher, &mut encounter).await;

        assert_eq!(
            encounter["subject"]["resource"]["managingOrganization"]["resource"]["name"],
            "General"
        );
        // The index holds the dereferenced form of each fetched resource
        let patient = index.get(&ResourceKey::new("Patient", "42")).unwrap();
        assert_eq!(patient["managingOrganization"]["resource"]["id"], "org1");
    }

    #[tokio::test]
    async fn test_fetches_each_key_once() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42"}));

        let mut observation = json!({
            "resourceType": "Observation",
            "id": "o1",
            "subject": {"reference": "Patient/42"},
            "performer": [{"reference": "Patient/42"}, {"reference": "Patient/42/_history/2"}],
            "focus": [{"reference": "Patient/42"}]
        });
        let index = walk(&fetcher, &mut observation).await;

        assert_eq!(fetcher.call_count(&format!("{BASE}/Patient/42")), 1);
        assert_eq!(index.len(), 1);
        assert_eq!(observation["subject"]["resource"]["id"], "42");
        assert_eq!(observation["performer"][0]["resource"]["id"], "42");
        assert_eq!(observation["performer"][1]["resource"]["id"], "42");
        assert_eq!(observation["focus"][0]["resource"]["id"], "42");
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({
                "resourceType": "Patient",
                "id": "a",
                "link": [{"other": {"reference": "Patient/b"}}]
            }))
            .with_resource(json!({
                "resourceType": "Patient",
                "id": "b",
                "link": [{"other": {"reference": "Patient/a"}}]
            }));

        let mut encounter = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "subject": {"reference": "Patient/a"}
        });
        let index = walk(&fetcher, &mut encounter).await;

        assert_eq!(fetcher.calls().len(), 2);
        assert_eq!(index.len(), 2);

        let a = &encounter["subject"]["resource"];
        let b = &a["link"][0]["other"]["resource"];
        assert_eq!(a["id"], "a");
        assert_eq!(b["id"], "b");
        // The back edge carries A as fetched, which ends the chain
        let back = &b["link"][0]["other"];
        assert_eq!(back["resource"]["id"], "a");
        assert!(back["resource"]["link"][0]["other"].get("resource").is_none());
    }

    #[tokio::test]
    async fn test_failed_sibling_does_not_abort_walk() {
        let fetcher = MockFetcher::new()
            .with_failure(&format!("{BASE}/Practitioner/x"), FetchFailure::Status(500))
            .with_resource(json!({"resourceType": "Practitioner", "id": "y"}));

        let mut team = json!({
            "resourceType": "CareTeam",
            "id": "t1",
            "participant": [
                {"member": {"reference": "Practitioner/x"}},
                {"member": {"reference": "Practitioner/y"}}
            ]
        });
        let index = walk(&fetcher, &mut team).await;

        assert!(team["participant"][0]["member"].get("resource").is_none());
        assert_eq!(team["participant"][1]["member"]["resource"]["id"], "y");
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reference_is_not_retried() {
        let url = format!("{BASE}/Patient/gone");
        let fetcher = MockFetcher::new().with_failure(&url, FetchFailure::Status(404));

        let mut observation = json!({
            "resourceType": "Observation",
            "id": "o1",
            "subject": {"reference": "Patient/gone"},
            "focus": [{"reference": "Patient/gone"}]
        });
        walk(&fetcher, &mut observation).await;

        assert_eq!(fetcher.call_count(&url), 1);
    }

    #[tokio::test]
    async fn test_malformed_references_are_left_alone() {
        let fetcher = MockFetcher::new();

        let mut resource = json!({
            "resourceType": "MedicationRequest",
            "id": "m1",
            "medicationReference": {"reference": "#med1"},
            "subject": {"reference": "Patient"},
            "requester": {"reference": "Practitioner/"},
            "note": [{"text": "see Patient/42"}]
        });
        let before = resource.clone();
        let index = walk(&fetcher, &mut resource).await;

        assert!(fetcher.calls().is_empty());
        assert!(index.is_empty());
        assert_eq!(resource, before);
    }

    #[tokio::test]
    async fn test_existing_attachment_is_not_overwritten() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42", "gender": "female"}));

        let mut encounter = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "subject": {
                "reference": "Patient/42",
                "resource": {"resourceType": "Patient", "id": "42", "gender": "unknown"}
            }
        });
        walk(&fetcher, &mut encounter).await;

        assert!(fetcher.calls().is_empty());
        assert_eq!(encounter["subject"]["resource"]["gender"], "unknown");
    }

    #[tokio::test]
    async fn test_same_id_different_types_are_distinct() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "1"}))
            .with_resource(json!({"resourceType": "Practitioner", "id": "1"}));

        let mut encounter = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "subject": {"reference": "Patient/1"},
            "participant": [{"individual": {"reference": "Practitioner/1"}}]
        });
        walk(&fetcher, &mut encounter).await;

        assert_eq!(encounter["subject"]["resource"]["resourceType"], "Patient");
        assert_eq!(
            encounter["participant"][0]["individual"]["resource"]["resourceType"],
            "Practitioner"
        );
    }

    #[tokio::test]
    async fn test_max_depth_bounds_recursion() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({
                "resourceType": "Organization",
                "id": "child",
                "partOf": {"reference": "Organization/parent"}
            }))
            .with_resource(json!({"resourceType": "Organization", "id": "parent"}));

        let mut practitioner_role = json!({
            "resourceType": "PractitionerRole",
            "id": "pr1",
            "organization": {"reference": "Organization/child"}
        });
        let mut index = ReferenceIndex::new();
        ReferenceWalker::new(&fetcher, BASE, &mut index)
            .with_max_depth(1)
            .resolve_references(&mut practitioner_role)
            .await;

        let child = &practitioner_role["organization"]["resource"];
        assert_eq!(child["id"], "child");
        assert!(child["partOf"].get("resource").is_none());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rewalk_with_same_index_fetches_nothing() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42"}));
        let mut index = ReferenceIndex::new();

        let mut first = json!({"resourceType": "Encounter", "id": "e1", "subject": {"reference": "Patient/42"}});
        let mut second = json!({"resourceType": "Encounter", "id": "e2", "subject": {"reference": "Patient/42"}});

        let mut walker = ReferenceWalker::new(&fetcher, BASE, &mut index);
        walker.resolve_references(&mut first).await;
        walker.resolve_references(&mut second).await;

        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(second["subject"]["resource"]["id"], "42");
    }
}
