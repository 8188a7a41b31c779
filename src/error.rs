//! Degraded-path conditions raised while chunking a document.
//!
//! None of these abort a run. The pipeline records them as values on the
//! per-document report; only [`ChunkError::Document`] means a document
//! produced no chunks at all.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkError {
    /// No article or section markers were found; the text was indexed as one span.
    #[error("no structural markers found in {doc_id}; indexed as a single general span")]
    MalformedStructure { doc_id: String },

    /// A run without any break point exceeded the size bound and was hard-cut.
    #[error("unbroken run of {len} chars at {path} exceeds max {max}; hard-cut")]
    OversizeUnsplittable { path: String, len: usize, max: usize },

    /// A source table had ragged rows and was padded for rendering.
    #[error("table {table_index} on page {page} has ragged rows ({min_cells}..{max_cells} cells); padded")]
    TableRender {
        page: u32,
        table_index: usize,
        min_cells: usize,
        max_cells: usize,
    },

    /// The validator reported violations for the document's chunks.
    #[error("validation reported {count} violation(s) for {doc_id}")]
    ValidationFailure { doc_id: String, count: usize },

    /// The document could not be chunked at all.
    #[error("document {doc_id} could not be chunked: {reason}")]
    Document { doc_id: String, reason: String },
}

impl ChunkError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedStructure { .. } => "malformed_structure",
            Self::OversizeUnsplittable { .. } => "oversize_unsplittable",
            Self::TableRender { .. } => "table_render",
            Self::ValidationFailure { .. } => "validation_failure",
            Self::Document { .. } => "document",
        }
    }

    pub fn doc_id(&self) -> Option<&str> {
        match self {
            Self::MalformedStructure { doc_id }
            | Self::ValidationFailure { doc_id, .. }
            | Self::Document { doc_id, .. } => Some(doc_id),
            Self::OversizeUnsplittable { .. } | Self::TableRender { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_degraded_path() {
        let error = ChunkError::OversizeUnsplittable {
            path: "VII/7.02".to_string(),
            len: 2400,
            max: 1500,
        };
        assert_eq!(
            error.to_string(),
            "unbroken run of 2400 chars at VII/7.02 exceeds max 1500; hard-cut"
        );
        assert_eq!(error.code(), "oversize_unsplittable");
        assert_eq!(error.doc_id(), None);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let error = ChunkError::MalformedStructure {
            doc_id: "doc-1".to_string(),
        };
        let value = serde_json::to_value(&error).expect("condition serializes");
        assert_eq!(value["kind"], "malformed_structure");
        assert_eq!(value["doc_id"], "doc-1");
    }
}
