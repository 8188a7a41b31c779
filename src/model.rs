use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chunking::link::LinkStats;
use crate::chunking::{Chunk, ChunkerConfig, DocumentFailure, DocumentReport, Violation};
use crate::store::{StoreCounts, StoreWriteStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub path: String,
    pub filename: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub document_count: usize,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRunPaths {
    pub cache_root: String,
    pub inventory_manifest_path: String,
    pub export_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRunCounts {
    pub document_count: usize,
    pub chunked_document_count: usize,
    pub failed_document_count: usize,
    pub unreadable_payload_count: usize,
    pub chunks_total: usize,
    pub table_chunks: usize,
    pub hard_cut_chunks: usize,
    pub chunks_by_content_type: BTreeMap<String, usize>,
    pub link: LinkStats,
    pub store: StoreWriteStats,
    pub stored: StoreCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub paths: ChunkRunPaths,
    pub config: ChunkerConfig,
    pub counts: ChunkRunCounts,
    pub violations_by_code: BTreeMap<String, usize>,
    pub reports: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkExport {
    pub export_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub chunk_count: usize,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub db_path: String,
    pub run_id: Option<String>,
    pub chunk_count: usize,
    pub violation_count: usize,
    pub violations_by_code: BTreeMap<String, usize>,
    pub violations: Vec<Violation>,
}
