//! Bundle-level orchestration of the reference walker

use fhir_graph_core::{Bundle, BundleEntry, ShapeError};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::fetcher::ResourceFetcher;
use crate::index::ReferenceIndex;
use crate::walker::{DEFAULT_MAX_DEPTH, ReferenceWalker};

/// Bundles produced so far plus the continuation to load next
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub bundles: Vec<Bundle>,
    pub next_page_url: Option<String>,
}

impl Resolution {
    /// Append a later page. The continuation becomes that page's own.
    pub fn append(&mut self, page: Resolution) {
        self.bundles.extend(page.bundles);
        self.next_page_url = page.next_page_url;
    }

    /// Total number of entries across all bundles
    pub fn entry_count(&self) -> usize {
        self.bundles.iter().map(|b| b.entry.len()).sum()
    }
}

/// Resolves every entry of a bundle against one server
pub struct BundleProcessor<'a> {
    fetcher: &'a dyn ResourceFetcher,
    max_depth: usize,
}

impl<'a> BundleProcessor<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher) -> Self {
        Self {
            fetcher,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Dereference every entry of `bundle`.
    ///
    /// Returns the bundle itself followed, when anything was fetched, by a
    /// `collection` bundle holding each newly fetched resource once. The
    /// ledger is local to this call.
    pub async fn process_bundle(&self, mut bundle: Bundle, base_url: &str) -> Resolution {
        let mut index = ReferenceIndex::new();
        {
            let mut walker = ReferenceWalker::new(self.fetcher, base_url, &mut index)
                .with_max_depth(self.max_depth);
            for entry in bundle.entry.iter_mut() {
                walker.resolve_references(&mut entry.resource).await;
            }
        }

        let next_page_url = bundle.next_page_url().map(str::to_string);
        let referenced: Vec<BundleEntry> = index
            .into_fetched()
            .into_iter()
            .map(|(key, resource)| BundleEntry::new(Some(key.url(base_url)), resource))
            .collect();

        tracing::info!(
            entries = bundle.entry.len(),
            referenced = referenced.len(),
            has_next = next_page_url.is_some(),
            "Processed bundle"
        );

        let mut bundles = vec![bundle];
        if !referenced.is_empty() {
            bundles.push(Bundle::collection(referenced));
        }

        Resolution {
            bundles,
            next_page_url,
        }
    }

    /// Same as [`process_bundle`](Self::process_bundle) for raw JSON
    pub async fn process_value(
        &self,
        value: JsonValue,
        base_url: &str,
    ) -> Result<Resolution, ShapeError> {
        let bundle = Bundle::from_value(value)?;
        Ok(self.process_bundle(bundle, base_url).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BASE, MockFetcher};
    use fhir_graph_core::{BundleType, FetchFailure};
    use serde_json::json;
    use std::collections::HashSet;

    fn bundle(value: JsonValue) -> Bundle {
        Bundle::from_value(value).unwrap()
    }

    fn encounter_bundle() -> Bundle {
        bundle(json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [{
                "resource": {
                    "resourceType": "Encounter",
                    "id": "e1",
                    "subject": {"reference": "Patient/42"},
                    "participant": [{"individual": {"reference": "Practitioner/7"}}]
                }
            }]
        }))
    }

    #[tokio::test]
    async fn test_partial_failure_scenario() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42", "gender": "female"}))
            .with_failure(&format!("{BASE}/Practitioner/7"), FetchFailure::Status(404));

        let result = BundleProcessor::new(&fetcher)
            .process_bundle(encounter_bundle(), BASE)
            .await;

        assert_eq!(result.bundles.len(), 2);
        let encounter = &result.bundles[0].entry[0].resource;
        assert_eq!(encounter["subject"]["resource"]["gender"], "female");
        assert!(encounter["participant"][0]["individual"].get("resource").is_none());

        let referenced = &result.bundles[1];
        assert_eq!(referenced.bundle_type, BundleType::Collection);
        assert_eq!(referenced.entry.len(), 1);
        assert_eq!(referenced.entry[0].resource["id"], "42");
        assert_eq!(
            referenced.entry[0].full_url.as_deref(),
            Some("https://host/fhir/Patient/42")
        );
        assert_eq!(result.next_page_url, None);
    }

    #[tokio::test]
    async fn test_synthetic_bundle_matches_fetched_set() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({
                "resourceType": "Patient",
                "id": "p1",
                "generalPractitioner": [{"reference": "Practitioner/d1"}]
            }))
            .with_resource(json!({"resourceType": "Practitioner", "id": "d1"}))
            .with_resource(json!({"resourceType": "Organization", "id": "o1"}));

        let root = bundle(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                {"resource": {"resourceType": "Encounter", "id": "e1",
                    "subject": {"reference": "Patient/p1"},
                    "serviceProvider": {"reference": "Organization/o1"}}},
                {"resource": {"resourceType": "Encounter", "id": "e2",
                    "subject": {"reference": "Patient/p1"},
                    "participant": [{"individual": {"reference": "Practitioner/d1"}}]}}
            ]
        }));

        let result = BundleProcessor::new(&fetcher).process_bundle(root, BASE).await;

        let referenced = &result.bundles[1];
        let keys: Vec<String> = referenced
            .resources()
            .map(|r| format!("{}/{}", r["resourceType"].as_str().unwrap(), r["id"].as_str().unwrap()))
            .collect();
        let unique: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), unique.len());

        let fetched: HashSet<String> = fetcher
            .calls()
            .into_iter()
            .map(|url| url.trim_start_matches(&format!("{BASE}/")).to_string())
            .collect();
        assert_eq!(unique, fetched);
        assert_eq!(unique.len(), 3);

        // Entries that share a target both get it attached
        let e2 = &result.bundles[0].entry[1].resource;
        assert_eq!(e2["subject"]["resource"]["id"], "p1");
        assert_eq!(e2["participant"][0]["individual"]["resource"]["id"], "d1");
    }

    #[tokio::test]
    async fn test_nothing_fetched_means_single_bundle() {
        let fetcher = MockFetcher::new();
        let root = bundle(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "link": [{"relation": "next", "url": "https://host/fhir/Patient?page=2"}],
            "entry": [{"resource": {"resourceType": "Patient", "id": "p1"}}]
        }));

        let result = BundleProcessor::new(&fetcher).process_bundle(root.clone(), BASE).await;

        assert_eq!(result.bundles, vec![root]);
        assert_eq!(
            result.next_page_url.as_deref(),
            Some("https://host/fhir/Patient?page=2")
        );
    }

    #[tokio::test]
    async fn test_root_fields_are_preserved() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42"}));
        let root = json!({
            "resourceType": "Bundle",
            "id": "b1",
            "type": "searchset",
            "total": 1,
            "entry": [{
                "fullUrl": "https://host/fhir/Observation/o1",
                "resource": {"resourceType": "Observation", "id": "o1",
                    "status": "final",
                    "subject": {"reference": "Patient/42", "display": "Jane"}},
                "search": {"mode": "match"}
            }]
        });

        let result = BundleProcessor::new(&fetcher)
            .process_value(root.clone(), BASE)
            .await
            .unwrap();

        let mut expected = root;
        expected["entry"][0]["resource"]["subject"]["resource"] =
            json!({"resourceType": "Patient", "id": "42"});
        assert_eq!(serde_json::to_value(&result.bundles[0]).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_reprocessing_only_fetches_unresolved_references() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42"}));
        let processor = BundleProcessor::new(&fetcher);

        let first = processor.process_bundle(encounter_bundle(), BASE).await;
        let calls_after_first = fetcher.calls().len();

        let second = processor
            .process_bundle(first.bundles[0].clone(), BASE)
            .await;

        // Only the reference that failed the first time is retried
        let new_calls: Vec<_> = fetcher.calls()[calls_after_first..].to_vec();
        assert_eq!(new_calls, vec![format!("{BASE}/Practitioner/7")]);
        assert_eq!(second.bundles.len(), 1);
        assert_eq!(second.bundles[0], first.bundles[0]);
    }

    #[tokio::test]
    async fn test_each_call_gets_a_fresh_ledger() {
        let fetcher = MockFetcher::new()
            .with_resource(json!({"resourceType": "Patient", "id": "42"}));
        let processor = BundleProcessor::new(&fetcher);

        processor.process_bundle(encounter_bundle(), BASE).await;
        processor.process_bundle(encounter_bundle(), BASE).await;

        assert_eq!(fetcher.call_count(&format!("{BASE}/Patient/42")), 2);
    }

    #[tokio::test]
    async fn test_process_value_rejects_non_bundle() {
        let fetcher = MockFetcher::new();
        let err = BundleProcessor::new(&fetcher)
            .process_value(json!({"resourceType": "Patient", "id": "1"}), BASE)
            .await
            .unwrap_err();
        assert!(matches!(err, ShapeError::UnexpectedResourceType { .. }));
    }

    #[test]
    fn test_resolution_append() {
        let mut acc = Resolution {
            bundles: vec![Bundle::collection(vec![])],
            next_page_url: Some("https://host/fhir/Patient?page=2".into()),
        };
        acc.append(Resolution {
            bundles: vec![Bundle::collection(vec![BundleEntry::new(None, json!({}))])],
            next_page_url: None,
        });

        assert_eq!(acc.bundles.len(), 2);
        assert_eq!(acc.entry_count(), 1);
        assert_eq!(acc.next_page_url, None);
    }
}
