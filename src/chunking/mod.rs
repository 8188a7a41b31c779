//! Structural chunking of credit documents: normalization, structure
//! indexing, classification, bounded splitting, table rendering, metadata,
//! cross-reference linking and validation.

pub mod classify;
pub mod config;
pub mod enrich;
pub mod link;
pub mod normalize;
pub mod pipeline;
pub mod split;
pub mod structure;
pub mod tables;
pub mod text;
pub mod types;
pub mod validate;

pub use config::ChunkerConfig;
pub use pipeline::{Chunker, CorpusRun, DocumentFailure, DocumentReport};
pub use types::Chunk;
pub use validate::{Violation, count_by_code};
