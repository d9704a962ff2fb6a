//! Document/RAG console: upload documents with chunking parameters, list, delete, preview
//! chunks, test chunking on ad-hoc text, and search the vector store.

mod console;
mod strategy;

pub use console::{DocumentConsole, DocumentDeletion, DELETE_DOCUMENT_PROMPT};
pub use strategy::{ChunkMode, ChunkingParams, ChunkingStrategy};

use serde::{Deserialize, Serialize};

use crate::api;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }
}

/// A document in the backend's store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub doc_type: String,
    pub categories: Vec<String>,
    pub chunking_strategy: String,
    pub chunk_count: u64,
    pub uploaded_at: Option<String>,
    pub status: DocumentStatus,
}

/// Document as the list endpoint returns it.
#[derive(Debug, Deserialize)]
struct DocumentRecord {
    #[serde(deserialize_with = "api::string_or_number")]
    doc_id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    categories: Option<Vec<String>>,
    #[serde(default)]
    chunking_strategy: Option<String>,
    #[serde(default)]
    total_chunks: Option<u64>,
    #[serde(default)]
    created_at: Option<String>,
    /// Listed documents are ready unless the backend says otherwise.
    #[serde(default)]
    status: Option<DocumentStatus>,
}

impl From<DocumentRecord> for Document {
    fn from(r: DocumentRecord) -> Self {
        Self {
            id: r.doc_id,
            name: r.filename,
            doc_type: r.file_type,
            categories: r.categories.unwrap_or_default(),
            chunking_strategy: r
                .chunking_strategy
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| ChunkingStrategy::FixedLength.as_str().to_string()),
            chunk_count: r.total_chunks.unwrap_or(0),
            uploaded_at: r.created_at,
            status: r.status.unwrap_or(DocumentStatus::Ready),
        }
    }
}

/// One stored chunk of a document, for preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(deserialize_with = "api::string_or_number")]
    pub chunk_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub chunk_type: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<u64>,
    #[serde(default)]
    pub overlap: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A chunk produced by a chunking test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestChunk {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub chunk_type: Option<String>,
    #[serde(default)]
    pub start_index: Option<u64>,
    #[serde(default)]
    pub end_index: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStatistics {
    #[serde(default)]
    pub avg_chunk_length: f64,
    #[serde(default)]
    pub min_chunk_length: u64,
    #[serde(default)]
    pub max_chunk_length: u64,
    #[serde(default)]
    pub chunk_types: serde_json::Map<String, serde_json::Value>,
}

/// Result of chunking ad-hoc text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTestReport {
    #[serde(default)]
    pub input_text_length: u64,
    #[serde(default)]
    pub chunking_strategy: String,
    #[serde(default)]
    pub chunk_count: u64,
    #[serde(default)]
    pub chunks: Vec<TestChunk>,
    #[serde(default)]
    pub statistics: ChunkStatistics,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default, deserialize_with = "api::opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
}

/// Outcome of a multi-file upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// File names the backend accepted.
    pub uploaded: Vec<String>,
    /// (file name, error) for every file that failed.
    pub failed: Vec<(String, String)>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
