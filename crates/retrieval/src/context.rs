//! Context assembly.
//!
//! A search hit is one chunk of a larger document. The assembler widens it
//! back into readable context, either a window of neighbouring chunks or the
//! whole source document, using the chunk-id sequence and the
//! `heading_hierarchy` linkage stored in the hit's metadata.

use chatmesh_core::error::RetrievalError;
use chatmesh_core::store::{DocumentStore, SearchHit, SearchRequest};
use chatmesh_core::timeout::search_with_timeout;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chunk::{ChunkId, is_ancestor_id};

/// Upper bound on chunks fetched for one document.
pub const WHOLE_DOCUMENT_PAGE: usize = 100;

/// How much context to build around a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextMode {
    /// Q&A items are atomic
    HitOnly,
    /// Up to `size` chunks on each side of the hit
    Window { size: usize },
    /// Every top-level chunk of the hit's source document
    WholeDocument { allowed_content_types: Vec<String> },
}

/// A hit plus its neighbours. `before` is oldest first, `after` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextWindow {
    pub before: Vec<String>,
    pub center: String,
    pub after: Vec<String>,
}

impl ContextWindow {
    pub fn center_only(center: impl Into<String>) -> Self {
        Self {
            center: center.into(),
            ..Self::default()
        }
    }

    pub fn render(&self) -> String {
        self.before
            .iter()
            .chain(std::iter::once(&self.center))
            .chain(self.after.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

pub struct ContextAssembler {
    store: Arc<dyn DocumentStore>,
    index: String,
    source_field: String,
    timeout: Duration,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>, source_field: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            index: index.into(),
            source_field: source_field.into(),
            timeout,
        }
    }

    /// Build the context string for `hit`.
    pub async fn assemble(&self, hit: &SearchHit, mode: &ContextMode) -> Result<String, RetrievalError> {
        match mode {
            ContextMode::HitOnly => Ok(hit.content.clone()),
            ContextMode::Window { size } => Ok(self.window(hit, *size).await?.render()),
            ContextMode::WholeDocument { allowed_content_types } => self.whole_document(hit, allowed_content_types).await,
        }
    }

    /// Exact-match lookup of one chunk by id.
    async fn lookup(&self, chunk_id: &str) -> Result<Option<SearchHit>, RetrievalError> {
        let request = SearchRequest::lexical(&self.index, "metadata.chunk_id", chunk_id, 1);
        let hits = search_with_timeout(self.store.as_ref(), request, self.timeout).await?;
        Ok(hits.into_iter().next())
    }

    /// The windowed context around `hit`.
    pub async fn window(&self, hit: &SearchHit, size: usize) -> Result<ContextWindow, RetrievalError> {
        let mut window = ContextWindow::center_only(hit.content.clone());
        if size == 0 {
            return Ok(window);
        }

        let Some(raw_id) = hit.chunk_id() else {
            return Ok(window);
        };
        let chunk_id = match raw_id.parse::<ChunkId>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(index = %self.index, error = %e, "Skipping sibling walk");
                None
            }
        };

        if let Some(id) = &chunk_id {
            let (before, after) = futures::try_join!(
                self.sibling_walk(id, Side::Before, size),
                self.sibling_walk(id, Side::After, size),
            )?;
            window.before = before;
            window.after = after;
        }

        if window.before.len() < size {
            let linked = self.linkage_walk(hit.previous_chunk_id(), Side::Before, size).await?;
            if linked.len() > window.before.len() {
                window.before = linked;
            }
        }
        if window.after.len() < size {
            let linked = self.linkage_walk(hit.next_chunk_id(), Side::After, size).await?;
            if linked.len() > window.after.len() {
                window.after = linked;
            }
        }

        debug!(
            index = %self.index,
            chunk_id = raw_id,
            before = window.before.len(),
            after = window.after.len(),
            "Assembled context window"
        );
        Ok(window)
    }

    /// Walk `prefix-(N±k)` until `size` steps or the first gap.
    async fn sibling_walk(&self, id: &ChunkId, side: Side, size: usize) -> Result<Vec<String>, RetrievalError> {
        let mut found = Vec::new();
        for step in 1..=size as u64 {
            let section = match side {
                Side::Before if id.section() <= step => break,
                Side::Before => id.section() - step,
                Side::After => match id.section().checked_add(step) {
                    Some(section) => section,
                    None => break,
                },
            };
            match self.lookup(&id.sibling(section)).await? {
                Some(neighbour) => found.push(neighbour.content),
                None => break,
            }
        }
        if side == Side::Before {
            found.reverse();
        }
        Ok(found)
    }

    /// Follow `heading_hierarchy.previous`/`next` through ancestor chunks.
    async fn linkage_walk(&self, start: Option<&str>, side: Side, size: usize) -> Result<Vec<String>, RetrievalError> {
        let mut found = Vec::new();
        let mut next_id = start.map(str::to_string);
        let mut visited = HashSet::new();

        while let Some(id) = next_id.take() {
            if found.len() >= size || !is_ancestor_id(&id) || !visited.insert(id.clone()) {
                break;
            }
            let Some(linked) = self.lookup(&id).await? else {
                break;
            };
            next_id = match side {
                Side::Before => linked.previous_chunk_id(),
                Side::After => linked.next_chunk_id(),
            }
            .map(str::to_string);
            found.push(linked.content);
        }

        if side == Side::Before {
            found.reverse();
        }
        Ok(found)
    }

    /// Every top-level chunk of the hit's document, in reading order.
    pub async fn whole_document(&self, hit: &SearchHit, allowed_content_types: &[String]) -> Result<String, RetrievalError> {
        let source = hit
            .meta_str(&self.source_field)
            .unwrap_or(hit.source_path.as_str());
        if source.is_empty() {
            return Ok(hit.content.clone());
        }

        let field = format!("metadata.{}", self.source_field);
        let request = SearchRequest::lexical(&self.index, field, source, WHOLE_DOCUMENT_PAGE);
        let hits = search_with_timeout(self.store.as_ref(), request, self.timeout).await?;

        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        for chunk in hits {
            let Some(raw_id) = chunk.chunk_id().filter(|id| is_ancestor_id(id)) else {
                continue;
            };
            let id = match raw_id.parse::<ChunkId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(index = %self.index, source, error = %e, "Skipping chunk");
                    continue;
                }
            };
            let Some(content_type) = chunk.content_type().map(str::to_string) else {
                warn!(index = %self.index, source, chunk_id = raw_id, "Skipping chunk without content_type");
                continue;
            };
            if !allowed_content_types.is_empty() && !allowed_content_types.contains(&content_type) {
                continue;
            }
            if !seen.insert((raw_id.to_string(), content_type.clone())) {
                continue;
            }
            chunks.push((id.group(), content_type, id.section(), chunk.content));
        }

        if chunks.is_empty() {
            return Ok(hit.content.clone());
        }

        chunks.sort_by(|a, b| (a.0, &a.1, a.2).cmp(&(b.0, &b.1, b.2)));
        debug!(index = %self.index, source, chunks = chunks.len(), "Reassembled document");

        Ok(chunks
            .into_iter()
            .map(|(_, _, _, content)| content)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmesh_core::error::StoreError;
    use chatmesh_store::{InMemoryStore, StoredDocument};
    use serde_json::{Value, json};

    const INDEX: &str = "docs";

    async fn store_with(docs: Vec<(&str, Value)>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (text, metadata) in docs {
            store.add(INDEX, StoredDocument::new(text, metadata)).await;
        }
        store
    }

    fn assembler(store: Arc<InMemoryStore>) -> ContextAssembler {
        ContextAssembler::new(store, INDEX, "file_path", Duration::from_secs(5))
    }

    fn hit(content: &str, metadata: Value) -> SearchHit {
        SearchHit::from_wire(&json!({"_score": 0.9, "_source": {"text": content, "metadata": metadata}})).unwrap()
    }

    fn sequence(n: u64) -> Vec<(String, Value)> {
        (1..=n)
            .map(|i| (format!("c{i}"), json!({"chunk_id": format!("$4-{i}"), "file_path": "a.md"})))
            .collect()
    }

    async fn sequence_store(n: u64) -> Arc<InMemoryStore> {
        let docs = sequence(n);
        store_with(docs.iter().map(|(t, m)| (t.as_str(), m.clone())).collect()).await
    }

    #[test]
    fn render_joins_in_order() {
        let w = ContextWindow {
            before: vec!["a".into(), "b".into()],
            center: "c".into(),
            after: vec!["d".into()],
        };
        assert_eq!(w.render(), "a\nb\nc\nd");
        assert_eq!(ContextWindow::center_only("x").render(), "x");
    }

    #[tokio::test]
    async fn sibling_window_is_ordered() {
        let asm = assembler(sequence_store(9).await);
        let w = asm.window(&hit("c5", json!({"chunk_id": "$4-5"})), 2).await.unwrap();
        assert_eq!(w.before, vec!["c3", "c4"]);
        assert_eq!(w.after, vec!["c6", "c7"]);
    }

    #[tokio::test]
    async fn window_stops_at_first_section_and_gaps() {
        let asm = assembler(sequence_store(3).await);
        let w = asm.window(&hit("c2", json!({"chunk_id": "$4-2"})), 3).await.unwrap();
        assert_eq!(w.before, vec!["c1"]);
        assert_eq!(w.after, vec!["c3"]);
    }

    #[tokio::test]
    async fn window_stops_at_last_representable_section() {
        let asm = assembler(sequence_store(3).await);
        let w = asm
            .window(&hit("last", json!({"chunk_id": "$1-18446744073709551615"})), 2)
            .await
            .unwrap();
        assert!(w.after.is_empty());
        assert_eq!(w.center, "last");
    }

    #[tokio::test]
    async fn linkage_fills_short_side() {
        let store = store_with(vec![
            ("intro", json!({"chunk_id": "$1-1", "heading_hierarchy": {"previous": "$0-1"}})),
            ("title", json!({"chunk_id": "$0-1", "heading_hierarchy": {}})),
            ("next section", json!({"chunk_id": "$2-1", "heading_hierarchy": {"next": "leaf-9"}})),
        ])
        .await;
        let asm = assembler(store);
        let target = hit(
            "body",
            json!({"chunk_id": "$7-1", "heading_hierarchy": {"previous": "$1-1", "next": "$2-1"}}),
        );
        let w = asm.window(&target, 3).await.unwrap();
        assert_eq!(w.before, vec!["title", "intro"]);
        // walk stops at the non-ancestor id
        assert_eq!(w.after, vec!["next section"]);
    }

    #[tokio::test]
    async fn no_linkage_metadata_returns_hit_content() {
        let store = sequence_store(3).await;
        let asm = assembler(store.clone());
        let text = asm
            .assemble(&hit("lonely", json!({"file_path": "x.md"})), &ContextMode::Window { size: 2 })
            .await
            .unwrap();
        assert_eq!(text, "lonely");
        assert_eq!(store.search_count(), 0);
    }

    #[tokio::test]
    async fn malformed_id_degrades_to_center() {
        let asm = assembler(sequence_store(3).await);
        let w = asm.window(&hit("odd", json!({"chunk_id": "$abc"})), 2).await.unwrap();
        assert_eq!(w, ContextWindow::center_only("odd"));
    }

    #[tokio::test]
    async fn whole_document_sorted_and_deduped() {
        let store = store_with(vec![
            ("g2s1", json!({"chunk_id": "$2-1", "content_type": "paragraph", "file_path": "a.md"})),
            ("g1s2", json!({"chunk_id": "$1-2", "content_type": "paragraph", "file_path": "a.md"})),
            ("g1s1", json!({"chunk_id": "$1-1", "content_type": "paragraph", "file_path": "a.md"})),
            ("dup", json!({"chunk_id": "$1-1", "content_type": "paragraph", "file_path": "a.md"})),
            ("leaf", json!({"chunk_id": "1-3", "content_type": "paragraph", "file_path": "a.md"})),
            ("bad", json!({"chunk_id": "$x-1", "content_type": "paragraph", "file_path": "a.md"})),
            ("table", json!({"chunk_id": "$1-1", "content_type": "table", "file_path": "a.md"})),
            ("other doc", json!({"chunk_id": "$1-1", "content_type": "paragraph", "file_path": "b.md"})),
        ])
        .await;
        let asm = assembler(store);
        let target = hit("g1s2", json!({"chunk_id": "$1-2", "file_path": "a.md"}));

        let all = asm.whole_document(&target, &[]).await.unwrap();
        assert_eq!(all, "g1s1\ng1s2\ntable\ng2s1");

        let only_paragraphs = asm.whole_document(&target, &["paragraph".to_string()]).await.unwrap();
        assert_eq!(only_paragraphs, "g1s1\ng1s2\ng2s1");
    }

    #[tokio::test]
    async fn whole_document_without_chunks_falls_back() {
        let asm = assembler(store_with(Vec::new()).await);
        let target = hit("solo", json!({"file_path": "missing.md"}));
        assert_eq!(asm.whole_document(&target, &[]).await.unwrap(), "solo");
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl DocumentStore for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn search(&self, _request: SearchRequest) -> Result<Vec<SearchHit>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let asm = ContextAssembler::new(Arc::new(FailingStore), INDEX, "file_path", Duration::from_secs(1));
        let err = asm
            .assemble(&hit("x", json!({"chunk_id": "$1-2"})), &ContextMode::Window { size: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Failed(StoreError::Unavailable(_))));
    }
}
