//! Chunking strategies and the per-strategy parameter defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend text-splitting strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    FixedLength,
    #[default]
    Semantic,
    Session,
    Hierarchical,
    Adaptive,
}

/// Unit the chunk size is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    Chars,
    Words,
    Sentences,
    Paragraphs,
}

impl ChunkingStrategy {
    pub const ALL: [ChunkingStrategy; 5] = [
        ChunkingStrategy::FixedLength,
        ChunkingStrategy::Semantic,
        ChunkingStrategy::Session,
        ChunkingStrategy::Hierarchical,
        ChunkingStrategy::Adaptive,
    ];

    /// Wire value (`fixed_length`, `semantic`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::FixedLength => "fixed_length",
            ChunkingStrategy::Semantic => "semantic",
            ChunkingStrategy::Session => "session",
            ChunkingStrategy::Hierarchical => "hierarchical",
            ChunkingStrategy::Adaptive => "adaptive",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChunkingStrategy::FixedLength => "Fixed-length chunking",
            ChunkingStrategy::Semantic => "Semantic chunking",
            ChunkingStrategy::Session => "Session chunking",
            ChunkingStrategy::Hierarchical => "Hierarchical chunking",
            ChunkingStrategy::Adaptive => "Adaptive chunking",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChunkingStrategy::FixedLength => {
                "Split by fixed number of characters or words; simple and fast"
            }
            ChunkingStrategy::Semantic => {
                "Split by paragraph/sentence boundaries to preserve meaning"
            }
            ChunkingStrategy::Session => "Split by conversation/meeting transcript turns",
            ChunkingStrategy::Hierarchical => "Split by headings/chapters/sections",
            ChunkingStrategy::Adaptive => "Automatically select the best strategy based on text",
        }
    }

    pub fn recommended(&self) -> bool {
        matches!(
            self,
            ChunkingStrategy::Semantic
                | ChunkingStrategy::Hierarchical
                | ChunkingStrategy::Adaptive
        )
    }

    /// Recommended (chunk size, overlap, mode).
    pub fn defaults(&self) -> (u32, u32, ChunkMode) {
        match self {
            ChunkingStrategy::FixedLength => (200, 30, ChunkMode::Chars),
            ChunkingStrategy::Semantic => (520, 60, ChunkMode::Sentences),
            ChunkingStrategy::Hierarchical => (600, 80, ChunkMode::Sentences),
            ChunkingStrategy::Session => (520, 60, ChunkMode::Sentences),
            ChunkingStrategy::Adaptive => (520, 60, ChunkMode::Sentences),
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('-', "_");
        ChunkingStrategy::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown chunking strategy: {}", s))
    }
}

impl ChunkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkMode::Chars => "chars",
            ChunkMode::Words => "words",
            ChunkMode::Sentences => "sentences",
            ChunkMode::Paragraphs => "paragraphs",
        }
    }
}

impl fmt::Display for ChunkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chars" => Ok(ChunkMode::Chars),
            "words" => Ok(ChunkMode::Words),
            "sentences" => Ok(ChunkMode::Sentences),
            "paragraphs" => Ok(ChunkMode::Paragraphs),
            other => Err(format!("unknown chunk mode: {}", other)),
        }
    }
}

/// Parameters sent with uploads and chunking tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingParams {
    pub strategy: ChunkingStrategy,
    pub chunk_size: u32,
    pub overlap: u32,
    pub mode: ChunkMode,
    /// Comma-separated; only sent when non-blank.
    pub custom_keywords: String,
}

impl ChunkingParams {
    pub fn for_strategy(strategy: ChunkingStrategy) -> Self {
        let (chunk_size, overlap, mode) = strategy.defaults();
        Self {
            strategy,
            chunk_size,
            overlap,
            mode,
            custom_keywords: String::new(),
        }
    }

    /// Switch strategy and reset size, overlap, and mode to its defaults. Keywords stay.
    pub fn select_strategy(&mut self, strategy: ChunkingStrategy) {
        let (chunk_size, overlap, mode) = strategy.defaults();
        self.strategy = strategy;
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self.mode = mode;
    }

    pub fn keywords(&self) -> Option<&str> {
        let k = self.custom_keywords.trim();
        (!k.is_empty()).then_some(k)
    }
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self::for_strategy(ChunkingStrategy::default())
    }
}
