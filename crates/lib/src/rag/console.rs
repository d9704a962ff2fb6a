//! Client for `/api/v1/mental-health-rag` and the chunking test endpoint, with a local
//! mirror of the document list.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{
    Chunk, ChunkTestReport, ChunkingParams, Document, DocumentRecord, SearchHit, UploadReport,
};
use crate::api::{self, ApiClient, ApiError};

/// Prompt shown before a document is deleted.
pub const DELETE_DOCUMENT_PROMPT: &str =
    "Are you sure you want to remove this document? This cannot be undone.";

const RAG_PATH: &str = "/mental-health-rag";

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkList {
    #[serde(default)]
    chunks: Vec<Chunk>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// How a document delete ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentDeletion {
    /// Backend confirmed; the list was refreshed.
    Deleted,
    /// Backend did not confirm; the entry was removed locally anyway.
    RemovedLocally,
    Declined,
}

pub struct DocumentConsole {
    api: ApiClient,
    documents: Vec<Document>,
    params: ChunkingParams,
}

impl DocumentConsole {
    pub fn new(api: ApiClient, params: ChunkingParams) -> Self {
        Self {
            api,
            documents: Vec::new(),
            params,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn params(&self) -> &ChunkingParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ChunkingParams {
        &mut self.params
    }

    fn url(&self, path: &str) -> String {
        self.api.v1(&format!("{}{}", RAG_PATH, path))
    }

    /// GET /api/v1/mental-health-rag/documents
    pub async fn refresh(&mut self) -> Result<&[Document], ApiError> {
        let res = self.api.get(&self.url("/documents")).send().await?;
        let list: DocumentList = api::read_json(res).await?;
        self.documents = list
            .documents
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<DocumentRecord>(v) {
                Ok(r) => Some(Document::from(r)),
                Err(e) => {
                    log::warn!("documents: skipping malformed entry: {}", e);
                    None
                }
            })
            .collect();
        log::debug!("documents: listed {}", self.documents.len());
        Ok(&self.documents)
    }

    /// Upload files one at a time with the current chunking parameters. A failed file is
    /// recorded and the rest still go up; every success is followed by a list refresh.
    pub async fn upload(&mut self, files: &[PathBuf]) -> UploadReport {
        let mut report = UploadReport::default();
        for path in files {
            let name = file_name(path);
            match self.upload_one(path, &name).await {
                Ok(()) => {
                    log::info!("documents: uploaded {}", name);
                    report.uploaded.push(name);
                    if let Err(e) = self.refresh().await {
                        log::error!("load documents failed: {}", e);
                    }
                }
                Err(e) => {
                    log::error!("upload of {} failed: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }

    /// POST /api/v1/mental-health-rag/upload (multipart)
    async fn upload_one(&self, path: &Path, name: &str) -> Result<(), ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let p = &self.params;
        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(name.to_string()))
            .text("chunking_strategy", p.strategy.as_str())
            .text("chunk_size", p.chunk_size.to_string())
            .text("overlap", p.overlap.to_string())
            .text("mode", p.mode.as_str());
        if let Some(keywords) = p.keywords() {
            form = form.text("custom_keywords", keywords.to_string());
        }
        let res = self
            .api
            .post(&self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        api::check_status(res).await?;
        Ok(())
    }

    /// DELETE /api/v1/mental-health-rag/documents/{id} after `confirm` agrees. When the
    /// backend does not confirm, the entry is dropped from the local list anyway.
    pub async fn delete(
        &mut self,
        doc_id: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> DocumentDeletion {
        if !confirm(DELETE_DOCUMENT_PROMPT) {
            return DocumentDeletion::Declined;
        }
        let url = self.url(&format!("/documents/{}", doc_id));
        let res = match self.api.delete(&url).send().await {
            Ok(res) => api::check_status(res).await,
            Err(e) => Err(ApiError::from(e)),
        };
        if let Err(e) = res {
            log::error!("delete document {} failed: {}", doc_id, e);
            self.documents.retain(|d| d.id != doc_id);
            return DocumentDeletion::RemovedLocally;
        }
        if let Err(e) = self.refresh().await {
            log::error!("load documents failed: {}", e);
            self.documents.retain(|d| d.id != doc_id);
        }
        DocumentDeletion::Deleted
    }

    /// GET /api/v1/mental-health-rag/documents/{id}
    pub async fn preview(&self, doc_id: &str) -> Result<Vec<Chunk>, ApiError> {
        let url = self.url(&format!("/documents/{}", doc_id));
        let res = self.api.get(&url).send().await?;
        let list: ChunkList = api::read_json(res).await?;
        Ok(list.chunks)
    }

    /// POST /api/test-chunking with the current parameters.
    pub async fn test_chunking(&self, text: &str) -> Result<ChunkTestReport, ApiError> {
        if text.trim().is_empty() {
            return Err(ApiError::Rejected("no text to chunk".to_string()));
        }
        let p = &self.params;
        let body = serde_json::json!({
            "text": text,
            "chunking_strategy": p.strategy.as_str(),
            "chunk_size": p.chunk_size,
            "overlap": p.overlap,
            "mode": p.mode.as_str(),
        });
        let res = self
            .api
            .post(&self.api.root("/api/test-chunking"))
            .json(&body)
            .send()
            .await?;
        let value: serde_json::Value = api::read_json(res).await?;
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            let hint = value
                .get("fallback_message")
                .and_then(|m| m.as_str())
                .unwrap_or_default();
            return Err(ApiError::Rejected(format!("{} {}", err, hint).trim().to_string()));
        }
        serde_json::from_value(value)
            .map_err(|e| ApiError::Rejected(format!("unexpected chunking response: {}", e)))
    }

    /// Search with the backend's default result count. Blank queries return nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        self.search_with(query, None, None).await
    }

    /// GET /api/v1/mental-health-rag/search
    pub async fn search_with(
        &self,
        query: &str,
        top_k: Option<u32>,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = vec![("query", query.to_string())];
        if let Some(k) = top_k {
            params.push(("top_k", k.to_string()));
        }
        if let Some(c) = category.filter(|c| !c.trim().is_empty()) {
            params.push(("category_filter", c.to_string()));
        }
        let res = self
            .api
            .get(&self.url("/search"))
            .query(&params)
            .send()
            .await?;
        let results: SearchResults = api::read_json(res).await?;
        Ok(results.results)
    }

    /// GET /api/v1/mental-health-rag/search-by-category
    pub async fn search_by_category(
        &self,
        category: &str,
        top_k: Option<u32>,
    ) -> Result<Vec<SearchHit>, ApiError> {
        let mut params = vec![("category", category.to_string())];
        if let Some(k) = top_k {
            params.push(("top_k", k.to_string()));
        }
        let res = self
            .api
            .get(&self.url("/search-by-category"))
            .query(&params)
            .send()
            .await?;
        let results: SearchResults = api::read_json(res).await?;
        Ok(results.results)
    }

    /// GET /api/v1/mental-health-rag/categories
    pub async fn categories(&self) -> Result<serde_json::Value, ApiError> {
        self.get_value("/categories").await
    }

    /// GET /api/v1/mental-health-rag/stats
    pub async fn stats(&self) -> Result<serde_json::Value, ApiError> {
        self.get_value("/stats").await
    }

    /// GET /api/v1/mental-health-rag/chunking-strategies
    pub async fn strategy_catalog(&self) -> Result<serde_json::Value, ApiError> {
        self.get_value("/chunking-strategies").await
    }

    async fn get_value(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let res = self.api.get(&self.url(path)).send().await?;
        api::read_json(res).await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
