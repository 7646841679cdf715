use std::collections::HashMap;
use std::sync::Arc;

use quill_backend::{DocumentId, Granularity};

/// The key an ingested document is cached under.
///
/// One source can be ingested at both granularities, each yielding its
/// own document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct IngestKey {
    pub source: String,
    pub granularity: Granularity,
}

impl IngestKey {
    /// Returns the file name the source text is submitted under.
    pub fn file_name(&self) -> String {
        format!("{}-{}.txt", self.source, self.granularity)
    }
}

/// Per-key ingestion state.
///
/// A key with no entry has never been requested. The transition into
/// `Ingesting` happens at most once per key while a request is in
/// flight; `Failed` keys may transition into `Ingesting` again on the
/// next selection.
#[derive(Clone, Debug, PartialEq, Eq)]
enum IngestState {
    Ingesting,
    Ready(DocumentId),
    Failed,
}

/// The set of known data sources and the ingestion cache.
///
/// The registry is the single source of truth for ingestion state;
/// conversations only hold source names.
pub(crate) struct DataSourceRegistry {
    sources: Vec<String>,
    states: HashMap<IngestKey, IngestState>,
}

impl DataSourceRegistry {
    /// Creates a registry with a placeholder source list, to be replaced
    /// once by the startup refresh.
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            states: HashMap::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s == name)
    }

    pub fn set_sources(&mut self, sources: Vec<String>) {
        self.sources = sources;
    }

    pub fn snapshot_sources(&self) -> Arc<[String]> {
        self.sources.as_slice().into()
    }

    pub fn document_id(&self, key: &IngestKey) -> Option<&DocumentId> {
        match self.states.get(key)? {
            IngestState::Ready(doc_id) => Some(doc_id),
            _ => None,
        }
    }

    /// Atomically claims a key for ingestion.
    ///
    /// Returns `true` only when the key has never been requested or its
    /// last request failed; callers must not issue a network request
    /// when this returns `false`. Two near-simultaneous selections of
    /// the same fresh key therefore ingest exactly once.
    pub fn begin_ingest(&mut self, key: &IngestKey) -> bool {
        match self.states.get(key) {
            None | Some(IngestState::Failed) => {
                self.states.insert(key.clone(), IngestState::Ingesting);
                true
            }
            Some(IngestState::Ingesting) | Some(IngestState::Ready(_)) => {
                false
            }
        }
    }

    /// Records the document id for a key. Idempotent; a second call for
    /// the same key wins without corrupting state.
    pub fn record_document_id(&mut self, key: &IngestKey, doc_id: DocumentId) {
        self.states.insert(key.clone(), IngestState::Ready(doc_id));
    }

    /// Marks an in-flight ingestion as failed, making the key claimable
    /// again. A key that already holds a document keeps it.
    pub fn mark_failed(&mut self, key: &IngestKey) {
        if let Some(state @ IngestState::Ingesting) = self.states.get_mut(key)
        {
            *state = IngestState::Failed;
        }
    }

    pub fn is_ingesting(&self) -> bool {
        self.states
            .values()
            .any(|state| matches!(state, IngestState::Ingesting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(source: &str, granularity: Granularity) -> IngestKey {
        IngestKey {
            source: source.to_owned(),
            granularity,
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            key("Sales", Granularity::Summary).file_name(),
            "Sales-summary.txt"
        );
        assert_eq!(
            key("Sales", Granularity::Full).file_name(),
            "Sales-full.txt"
        );
    }

    #[test]
    fn test_begin_ingest_claims_once() {
        let mut registry = DataSourceRegistry::new(vec!["Sales".to_owned()]);
        let key = key("Sales", Granularity::Summary);

        assert!(registry.begin_ingest(&key));
        assert!(registry.is_ingesting());
        // A second selection while the first request is in flight must
        // not issue another one.
        assert!(!registry.begin_ingest(&key));

        registry.record_document_id(&key, DocumentId("doc-1".to_owned()));
        assert!(!registry.begin_ingest(&key));
        assert_eq!(
            registry.document_id(&key),
            Some(&DocumentId("doc-1".to_owned()))
        );
        assert!(!registry.is_ingesting());
    }

    #[test]
    fn test_failed_key_is_claimable_again() {
        let mut registry = DataSourceRegistry::new(vec!["Sales".to_owned()]);
        let key = key("Sales", Granularity::Full);

        assert!(registry.begin_ingest(&key));
        registry.mark_failed(&key);
        assert!(!registry.is_ingesting());
        assert_eq!(registry.document_id(&key), None);

        assert!(registry.begin_ingest(&key));
    }

    #[test]
    fn test_late_failure_does_not_clobber_ready() {
        let mut registry = DataSourceRegistry::new(vec!["Sales".to_owned()]);
        let key = key("Sales", Granularity::Summary);

        registry.begin_ingest(&key);
        registry.record_document_id(&key, DocumentId("doc-1".to_owned()));
        registry.mark_failed(&key);
        assert_eq!(
            registry.document_id(&key),
            Some(&DocumentId("doc-1".to_owned()))
        );
    }

    #[test]
    fn test_granularities_are_distinct_keys() {
        let mut registry = DataSourceRegistry::new(vec!["Sales".to_owned()]);
        let summary = key("Sales", Granularity::Summary);
        let full = key("Sales", Granularity::Full);

        assert!(registry.begin_ingest(&summary));
        assert!(registry.begin_ingest(&full));
    }

    #[test]
    fn test_source_refresh_replaces_placeholders() {
        let mut registry =
            DataSourceRegistry::new(vec!["Placeholder".to_owned()]);
        assert!(registry.contains("Placeholder"));

        registry.set_sources(vec!["Sales".to_owned(), "Costs".to_owned()]);
        assert!(!registry.contains("Placeholder"));
        assert!(registry.contains("Sales"));
    }
}
