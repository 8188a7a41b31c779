use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunking::{Chunk, DocumentReport};

const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub docs: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreWriteStats {
    pub docs_replaced: usize,
    pub docs_retained: usize,
    pub docs_removed: usize,
    pub chunks_inserted: usize,
}

/// SQLite handoff to the index layer. A run is written in one transaction,
/// so readers see either the previous chunk set or the new one.
pub struct ChunkStore {
    connection: Connection,
}

impl ChunkStore {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database read-only: {}", path.display()))?;
        Ok(Self { connection })
    }

    /// Replaces the stored chunk set with this run's. Documents listed in
    /// `retained_doc_ids` (those that failed this run) keep their previous
    /// rows; every other stored document not in the run is removed.
    pub fn replace_run(
        &mut self,
        run_id: &str,
        reports: &[DocumentReport],
        chunks: &[Chunk],
        retained_doc_ids: &[String],
    ) -> Result<StoreWriteStats> {
        let retained = retained_doc_ids
            .iter()
            .map(String::as_str)
            .collect::<HashSet<&str>>();
        let mut stats = StoreWriteStats::default();

        let tx = self.connection.transaction()?;
        {
            let existing = {
                let mut statement = tx.prepare("SELECT doc_id FROM docs")?;
                let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<Vec<String>>>()?
            };

            let mut delete_chunks = tx.prepare("DELETE FROM chunks WHERE doc_id = ?1")?;
            let mut delete_doc = tx.prepare("DELETE FROM docs WHERE doc_id = ?1")?;
            for doc_id in &existing {
                if retained.contains(doc_id.as_str()) {
                    stats.docs_retained += 1;
                    continue;
                }
                delete_chunks.execute(params![doc_id])?;
                delete_doc.execute(params![doc_id])?;
                if !reports.iter().any(|report| &report.document.id == doc_id) {
                    stats.docs_removed += 1;
                }
            }

            let mut insert_doc = tx.prepare(
                "
                INSERT INTO docs(doc_id, filename, file_type, sha256, document_type, page_count, ingested_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            for report in reports {
                let document = &report.document;
                insert_doc
                    .execute(params![
                        &document.id,
                        &document.filename,
                        &document.file_type,
                        &document.sha256,
                        document.document_type.as_str(),
                        document.page_count,
                        &document.ingested_at,
                    ])
                    .with_context(|| format!("failed to insert document {}", document.id))?;
                stats.docs_replaced += 1;
            }

            let mut insert_chunk = tx.prepare(
                "
                INSERT INTO chunks(
                  chunk_id, doc_id, chunk_index, total_chunks, content_type, path, page, text,
                  body_start, body_end, source_start, source_end, is_complete_unit, boundary,
                  metadata_json
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ",
            )?;
            for chunk in chunks {
                let metadata_json = serde_json::to_string(chunk)
                    .with_context(|| format!("failed to serialize chunk {}", chunk.chunk_id))?;
                insert_chunk
                    .execute(params![
                        &chunk.chunk_id,
                        &chunk.document_id,
                        chunk.chunk_index,
                        chunk.total_chunks,
                        chunk.content_type.as_str(),
                        chunk.path.key(),
                        chunk.page,
                        &chunk.text,
                        chunk.body_start,
                        chunk.body_end,
                        chunk.source_start,
                        chunk.source_end,
                        chunk.is_complete_unit,
                        chunk.boundary.as_str(),
                        metadata_json,
                    ])
                    .with_context(|| format!("failed to insert chunk {}", chunk.chunk_id))?;
                stats.chunks_inserted += 1;
            }

            let mut set_metadata = tx.prepare(
                "
                INSERT INTO metadata(key, value) VALUES(?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value=excluded.value
                ",
            )?;
            set_metadata.execute(params!["schema_version", SCHEMA_VERSION])?;
            set_metadata.execute(params!["last_run_id", run_id])?;
        }
        tx.commit().context("failed to commit chunk run")?;

        info!(
            run_id,
            docs = stats.docs_replaced,
            retained = stats.docs_retained,
            removed = stats.docs_removed,
            chunks = stats.chunks_inserted,
            "replaced stored chunk set"
        );
        Ok(stats)
    }

    pub fn load_chunks(&self) -> Result<Vec<Chunk>> {
        let mut statement = self
            .connection
            .prepare("SELECT chunk_id, metadata_json FROM chunks ORDER BY rowid")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (chunk_id, metadata_json) = row?;
            let chunk: Chunk = serde_json::from_str(&metadata_json)
                .with_context(|| format!("failed to decode stored chunk {chunk_id}"))?;
            chunks.push(chunk);
        }
        debug!(chunks = chunks.len(), "loaded stored chunks");
        Ok(chunks)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let docs: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM docs", [], |row| row.get(0))?;
        let chunks: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(StoreCounts {
            docs: docs as usize,
            chunks: chunks as usize,
        })
    }

    pub fn last_run_id(&self) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'last_run_id'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read last run id")
    }
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS docs (
              doc_id TEXT PRIMARY KEY,
              filename TEXT NOT NULL,
              file_type TEXT,
              sha256 TEXT NOT NULL,
              document_type TEXT NOT NULL,
              page_count INTEGER,
              ingested_at TEXT
            );

            CREATE TABLE IF NOT EXISTS chunks (
              chunk_id TEXT PRIMARY KEY,
              doc_id TEXT NOT NULL,
              chunk_index INTEGER NOT NULL,
              total_chunks INTEGER NOT NULL,
              content_type TEXT NOT NULL,
              path TEXT,
              page INTEGER,
              text TEXT NOT NULL,
              body_start INTEGER NOT NULL,
              body_end INTEGER NOT NULL,
              source_start INTEGER NOT NULL,
              source_end INTEGER NOT NULL,
              is_complete_unit INTEGER NOT NULL,
              boundary TEXT NOT NULL,
              metadata_json TEXT NOT NULL,
              FOREIGN KEY(doc_id) REFERENCES docs(doc_id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id, chunk_index);
            ",
        )
        .context("failed to create chunk store schema")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::normalize::NormalizationStats;
    use crate::chunking::pipeline::ChunkingStrategy;
    use crate::chunking::types::{HierarchicalPath, sample_chunk};
    use crate::document::{Document, DocumentType};

    fn report(doc_id: &str, chunk_count: usize) -> DocumentReport {
        DocumentReport {
            document: Document {
                id: doc_id.to_string(),
                filename: format!("{doc_id}.pdf"),
                file_type: "pdf".to_string(),
                document_type: DocumentType::CreditAgreement,
                declared_type: false,
                sha256: "ab".repeat(32),
                page_count: 3,
                ingested_at: "2026-01-01T00:00:00Z".to_string(),
            },
            strategy: ChunkingStrategy::CreditAgreement,
            marker_count: 1,
            span_count: 1,
            table_count: 0,
            chunk_count,
            violation_count: 0,
            normalization: NormalizationStats::default(),
            conditions: Vec::new(),
        }
    }

    fn section(number: &str) -> HierarchicalPath {
        HierarchicalPath {
            section: Some(number.to_string()),
            ..HierarchicalPath::default()
        }
    }

    #[test]
    fn stored_chunks_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("index.sqlite");
        let mut chunk = sample_chunk("acme", section("6.12"), "The Borrower shall not permit the ratio to exceed 3.50:1.00.");
        chunk.cross_references = vec!["7.02".to_string()];

        let mut store = ChunkStore::open(&path).expect("open store");
        let stats = store
            .replace_run("run-1", &[report("acme", 1)], &[chunk.clone()], &[])
            .expect("write run");
        assert_eq!(stats.chunks_inserted, 1);

        let reader = ChunkStore::open_read_only(&path).expect("open read-only");
        assert_eq!(reader.load_chunks().expect("load"), vec![chunk]);
        assert_eq!(reader.counts().expect("counts"), StoreCounts { docs: 1, chunks: 1 });
        assert_eq!(reader.last_run_id().expect("run id").as_deref(), Some("run-1"));
    }

    #[test]
    fn failed_documents_keep_their_previous_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("index.sqlite");
        let mut store = ChunkStore::open(&path).expect("open store");

        let first = vec![
            sample_chunk("acme", section("1.01"), "First agreement text."),
            sample_chunk("beta", section("1.01"), "Second agreement text."),
            sample_chunk("gone", section("1.01"), "Removed agreement text."),
        ];
        store
            .replace_run(
                "run-1",
                &[report("acme", 1), report("beta", 1), report("gone", 1)],
                &first,
                &[],
            )
            .expect("first run");

        let refreshed = sample_chunk("acme", section("1.02"), "Refreshed agreement text.");
        let stats = store
            .replace_run("run-2", &[report("acme", 1)], &[refreshed.clone()], &["beta".to_string()])
            .expect("second run");

        assert_eq!(stats.docs_retained, 1);
        assert_eq!(stats.docs_removed, 1);
        let stored = store.load_chunks().expect("load");
        let ids = stored
            .iter()
            .map(|chunk| chunk.document_id.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(ids, vec!["beta", "acme"]);
        assert_eq!(stored[1], refreshed);
        assert_eq!(store.counts().expect("counts"), StoreCounts { docs: 2, chunks: 2 });
    }
}
