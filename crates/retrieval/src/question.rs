//! Question retriever: matches the query against curated FAQ questions.
//!
//! Two index layouts are understood:
//! - `metadata.jsonlAnswer = {question, answer, <source_field>?}` on the hit
//! - one document per field (`metadata.field = "question" | "answer"`), the
//!   answer found by looking up its sibling document by source

use async_trait::async_trait;
use chatmesh_config::QuestionRetrieverConfig;
use chatmesh_core::error::RetrievalError;
use chatmesh_core::store::{SearchHit, SearchRequest};
use chatmesh_core::timeout::search_with_timeout;
use tracing::{debug, warn};

use crate::embedding::{EmbeddingPurpose, embed_query};
use crate::result::{RetrievalResult, normalize_scores, sort_by_score};
use crate::{Backends, Retriever};

const ANSWER_LOOKUP_SIZE: usize = 10;

struct FaqEntry {
    question: String,
    answer: String,
    source: String,
}

pub struct QuestionRetriever {
    config: QuestionRetrieverConfig,
    backends: Backends,
}

impl QuestionRetriever {
    pub fn new(config: QuestionRetrieverConfig, backends: Backends) -> Self {
        Self { config, backends }
    }

    fn source_of(&self, hit: &SearchHit) -> String {
        hit.meta_str(&self.config.index.source_field)
            .unwrap_or(&hit.source_path)
            .to_string()
    }

    /// Find the answer document that shares `source` with a question hit.
    async fn lookup_answer(&self, source: &str) -> Result<Option<String>, RetrievalError> {
        let field = format!("metadata.{}", self.config.index.source_field);
        let request = SearchRequest::lexical(&self.config.index.index_name, field, source, ANSWER_LOOKUP_SIZE);
        let hits = search_with_timeout(self.backends.store.as_ref(), request, self.backends.timeouts.store()).await?;

        Ok(hits.into_iter().find_map(|hit| {
            if hit.meta_str("field") == Some("answer") {
                Some(hit.content)
            } else {
                hit.meta_str("jsonlAnswer.answer").map(str::to_string)
            }
        }))
    }

    async fn entry(&self, hit: &SearchHit) -> Result<Option<FaqEntry>, RetrievalError> {
        if hit.meta("field").is_some() {
            let source = self.source_of(hit);
            return Ok(self.lookup_answer(&source).await?.map(|answer| FaqEntry {
                question: hit.content.clone(),
                answer,
                source,
            }));
        }

        let (Some(question), Some(answer)) = (hit.meta_str("jsonlAnswer.question"), hit.meta_str("jsonlAnswer.answer")) else {
            return Ok(None);
        };
        let source = hit
            .meta_str(&format!("jsonlAnswer.{}", self.config.index.source_field))
            .map(str::to_string)
            .unwrap_or_else(|| self.source_of(hit));

        Ok(Some(FaqEntry {
            question: question.to_string(),
            answer: answer.to_string(),
            source,
        }))
    }
}

#[async_trait]
impl Retriever for QuestionRetriever {
    fn name(&self) -> &str {
        &self.config.index.index_name
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let index = &self.config.index;
        let vector = embed_query(&self.backends, index, query, EmbeddingPurpose::Similarity).await?;
        let request = SearchRequest::knn(&index.index_name, &index.vector_field, vector, self.config.top_k);
        let hits = search_with_timeout(self.backends.store.as_ref(), request, self.backends.timeouts.store()).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in &hits {
            let Some(entry) = self.entry(hit).await? else {
                warn!(index = %index.index_name, metadata = %hit.metadata, "FAQ hit without question/answer, skipping");
                continue;
            };
            results.push(
                RetrievalResult::new(entry.question.clone(), entry.source, hit.score)
                    .with_extra("question", entry.question)
                    .with_extra("answer", entry.answer),
            );
        }
        normalize_scores(&mut results);
        sort_by_score(&mut results);

        debug!(index = %index.index_name, hits = hits.len(), results = results.len(), "Question retrieval done");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedEmbedder;
    use chatmesh_config::IndexConfig;
    use chatmesh_store::{InMemoryStore, StoredDocument};
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> QuestionRetrieverConfig {
        QuestionRetrieverConfig {
            index: IndexConfig::new("faq"),
            top_k: 5,
        }
    }

    async fn retriever(docs: Vec<StoredDocument>) -> QuestionRetriever {
        let store = Arc::new(InMemoryStore::new());
        for doc in docs {
            store.add("faq", doc).await;
        }
        let backends = Backends::new(store, Arc::new(FixedEmbedder::new(vec![1.0, 0.0])), "embed");
        QuestionRetriever::new(config(), backends)
    }

    #[tokio::test]
    async fn jsonl_answers() {
        let r = retriever(vec![
            StoredDocument::new(
                "How long do refunds take?",
                json!({"file_path": "faq.jsonl", "jsonlAnswer": {"question": "How long do refunds take?", "answer": "5 days"}}),
            )
            .with_vector("vector_field", vec![1.0, 0.0]),
            StoredDocument::new(
                "Where is my order?",
                json!({"file_path": "faq.jsonl", "jsonlAnswer": {"question": "Where is my order?", "answer": "Check tracking", "file_path": "orders.jsonl"}}),
            )
            .with_vector("vector_field", vec![0.6, 0.8]),
        ])
        .await;

        let results = r.retrieve("refund time").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].extra_str("answer"), Some("5 days"));
        assert_eq!(results[0].content, "How long do refunds take?");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert_eq!(results[1].source_path, "orders.jsonl");
    }

    #[tokio::test]
    async fn field_documents_resolve_answer_by_source() {
        let r = retriever(vec![
            StoredDocument::new("Can I cancel?", json!({"file_path": "q7", "field": "question"}))
                .with_vector("vector_field", vec![1.0, 0.0]),
            StoredDocument::new("Yes, within 24 hours.", json!({"file_path": "q7", "field": "answer"})),
        ])
        .await;

        let results = r.retrieve("cancel").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].extra_str("question"), Some("Can I cancel?"));
        assert_eq!(results[0].extra_str("answer"), Some("Yes, within 24 hours."));
        assert_eq!(results[0].source_path, "q7");
    }

    #[tokio::test]
    async fn hits_without_answer_are_skipped() {
        let r = retriever(vec![
            StoredDocument::new("broken", json!({"file_path": "x"})).with_vector("vector_field", vec![1.0, 0.0]),
            StoredDocument::new("ok", json!({"jsonlAnswer": {"question": "ok?", "answer": "ok"}}))
                .with_vector("vector_field", vec![0.5, 0.5]),
        ])
        .await;

        let results = r.retrieve("anything").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].extra_str("answer"), Some("ok"));
    }
}
