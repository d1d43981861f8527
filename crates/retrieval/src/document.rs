//! Document retriever: k-NN over chunked documents, widened into context.

use async_trait::async_trait;
use chatmesh_config::{DocumentRetrieverConfig, IndexType};
use chatmesh_core::error::RetrievalError;
use chatmesh_core::store::{SearchFilter, SearchHit, SearchRequest};
use chatmesh_core::timeout::search_with_timeout;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::context::{ContextAssembler, ContextMode};
use crate::embedding::{EmbeddingPurpose, embed_query};
use crate::result::{RetrievalResult, dedup_by_content, normalize_scores, sort_by_score};
use crate::{Backends, Retriever};

pub struct DocumentRetriever {
    config: DocumentRetrieverConfig,
    backends: Backends,
    assembler: ContextAssembler,
}

impl DocumentRetriever {
    pub fn new(config: DocumentRetrieverConfig, backends: Backends) -> Self {
        let assembler = ContextAssembler::new(
            backends.store.clone(),
            config.index.index_name.clone(),
            config.index.source_field.clone(),
            backends.timeouts.store(),
        );
        Self {
            config,
            backends,
            assembler,
        }
    }

    pub fn config(&self) -> &DocumentRetrieverConfig {
        &self.config
    }

    pub fn mode(&self) -> ContextMode {
        if self.config.index_type == IndexType::Qq {
            ContextMode::HitOnly
        } else if self.config.using_whole_doc {
            ContextMode::WholeDocument {
                allowed_content_types: self.config.allowed_content_types.clone(),
            }
        } else {
            ContextMode::Window {
                size: self.config.context_num,
            }
        }
    }

    fn filters(&self) -> Vec<SearchFilter> {
        if self.config.api_only {
            vec![SearchFilter::term("metadata.is_api", true)]
        } else {
            Vec::new()
        }
    }

    fn to_result(&self, hit: &SearchHit, content: String) -> RetrievalResult {
        let mut result = RetrievalResult::new(content, hit.source_path.clone(), hit.score)
            .with_extra("index", self.config.index.index_name.clone());
        if let Some(chunk_id) = hit.chunk_id() {
            result = result.with_extra("chunk_id", chunk_id);
        }
        result
    }
}

#[async_trait]
impl Retriever for DocumentRetriever {
    fn name(&self) -> &str {
        &self.config.index.index_name
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>, RetrievalError> {
        let index = &self.config.index;
        let vector = embed_query(&self.backends, index, query, EmbeddingPurpose::Relevance).await?;

        let request = SearchRequest::knn(&index.index_name, &index.vector_field, vector, self.config.top_k)
            .with_filters(self.filters());
        let hits = search_with_timeout(self.backends.store.as_ref(), request, self.backends.timeouts.store()).await?;

        let mode = self.mode();
        let contents = match &mode {
            ContextMode::Window { .. } => {
                try_join_all(hits.iter().map(|hit| self.assembler.assemble(hit, &mode))).await?
            }
            _ => {
                let mut contents = Vec::with_capacity(hits.len());
                for hit in &hits {
                    contents.push(self.assembler.assemble(hit, &mode).await?);
                }
                contents
            }
        };

        let mut results: Vec<RetrievalResult> = hits
            .iter()
            .zip(contents)
            .map(|(hit, content)| self.to_result(hit, content))
            .collect();
        normalize_scores(&mut results);
        sort_by_score(&mut results);
        let mut results = dedup_by_content(results);
        results.truncate(self.config.top_k);

        info!(index = %index.index_name, hits = hits.len(), results = results.len(), ?mode, "Document retrieval done");
        debug!(index = %index.index_name, scores = ?results.iter().map(|r| r.score).collect::<Vec<_>>());
        Ok(results)
    }
}
