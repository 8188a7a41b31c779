use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::chunking::types::Boundary;
use crate::chunking::{Chunk, Chunker, ChunkerConfig, CorpusRun, count_by_code};
use crate::cli::ChunkArgs;
use crate::commands::inventory;
use crate::document::{SourceDocument, load_source_document};
use crate::model::{
    ChunkExport, ChunkRunCounts, ChunkRunManifest, ChunkRunPaths, DocumentInventoryManifest,
};
use crate::store::ChunkStore;
use crate::util::{now_utc_string, read_json, sha256_file, utc_compact_string, write_json_pretty};

pub const DEFAULT_DB_FILENAME: &str = "creditchunk_index.sqlite";

pub fn default_db_path(cache_root: &Path) -> PathBuf {
    cache_root.join(DEFAULT_DB_FILENAME)
}

pub fn run(args: ChunkArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let manifest_dir = args.cache_root.join("manifests");
    let inventory_manifest_path = args
        .inventory_manifest_path
        .clone()
        .unwrap_or_else(|| inventory::default_manifest_path(&args.cache_root));
    let export_path = args
        .cache_root
        .join("exports")
        .join(format!("chunks_{run_id}.json"));
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));
    let run_manifest_path = manifest_dir.join(format!("chunk_run_{run_id}.json"));

    let config = ChunkerConfig::load_or_default(args.config.as_deref())?;
    let chunker = Chunker::new(config)?;

    info!(
        run_id = %run_id,
        cache_root = %args.cache_root.display(),
        db_path = %db_path.display(),
        "chunk run started"
    );

    let source_dir = inventory::source_dir(&args.cache_root, args.source_dir.as_deref());
    let inventory = load_or_refresh_inventory(
        &source_dir,
        &inventory_manifest_path,
        args.refresh_inventory,
    )?;

    let mut warnings = Vec::new();
    let sources = load_payloads(&inventory, &mut warnings);
    let unreadable_payload_count = inventory.documents.len().saturating_sub(sources.len());

    let corpus = chunker.chunk_corpus(&sources);

    write_json_pretty(
        &export_path,
        &ChunkExport {
            export_version: 1,
            run_id: run_id.clone(),
            generated_at: now_utc_string(),
            chunk_count: corpus.chunks.len(),
            chunks: corpus.chunks.clone(),
        },
    )?;
    info!(path = %export_path.display(), chunks = corpus.chunks.len(), "wrote chunk export");

    let retained_doc_ids = corpus
        .failures
        .iter()
        .filter_map(|failure| failure.error.doc_id().map(ToOwned::to_owned))
        .collect::<Vec<String>>();

    let mut store = ChunkStore::open(&db_path)?;
    let store_stats =
        store.replace_run(&run_id, &corpus.reports, &corpus.chunks, &retained_doc_ids)?;
    let stored = store.counts()?;

    let mut counts = summarize(&corpus);
    counts.document_count = inventory.documents.len();
    counts.unreadable_payload_count = unreadable_payload_count;
    counts.store = store_stats;
    counts.stored = stored;

    let violations_by_code = count_by_code(&corpus.violations);
    let status = if corpus.failures.is_empty() && unreadable_payload_count == 0 {
        "completed"
    } else {
        "completed_with_failures"
    };

    let manifest = ChunkRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        paths: ChunkRunPaths {
            cache_root: args.cache_root.display().to_string(),
            inventory_manifest_path: inventory_manifest_path.display().to_string(),
            export_path: export_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        config: chunker.config().clone(),
        counts,
        violations_by_code,
        reports: corpus.reports,
        failures: corpus.failures,
        warnings,
    };

    write_json_pretty(&run_manifest_path, &manifest)?;
    info!(path = %run_manifest_path.display(), "wrote chunk run manifest");

    info!(
        run_id = %run_id,
        documents = manifest.counts.chunked_document_count,
        failed = manifest.counts.failed_document_count,
        chunks = manifest.counts.chunks_total,
        tables = manifest.counts.table_chunks,
        hard_cuts = manifest.counts.hard_cut_chunks,
        violations = corpus.violations.len(),
        "chunk run completed"
    );

    if args.fail_on_violations && !corpus.violations.is_empty() {
        bail!(
            "chunk run {run_id} produced {} validation violation(s); see {}",
            corpus.violations.len(),
            run_manifest_path.display()
        );
    }

    Ok(())
}

fn load_or_refresh_inventory(
    source_dir: &Path,
    inventory_manifest_path: &Path,
    refresh_inventory: bool,
) -> Result<DocumentInventoryManifest> {
    if refresh_inventory || !inventory_manifest_path.exists() {
        let manifest = inventory::build_manifest(source_dir)?;
        write_json_pretty(inventory_manifest_path, &manifest)?;
        info!(
            path = %inventory_manifest_path.display(),
            document_count = manifest.document_count,
            "refreshed inventory manifest"
        );
        return Ok(manifest);
    }

    let manifest: DocumentInventoryManifest = read_json(inventory_manifest_path)?;
    info!(
        path = %inventory_manifest_path.display(),
        document_count = manifest.document_count,
        "loaded existing inventory manifest"
    );

    Ok(manifest)
}

/// Unreadable payloads are skipped with a warning; the rest of the corpus
/// still runs.
fn load_payloads(
    inventory: &DocumentInventoryManifest,
    warnings: &mut Vec<String>,
) -> Vec<SourceDocument> {
    let mut sources = Vec::with_capacity(inventory.documents.len());

    for entry in &inventory.documents {
        let path = Path::new(&entry.path);

        match sha256_file(path) {
            Ok(sha256) if sha256 != entry.sha256 => {
                let message = format!(
                    "{} changed since inventory (expected {}, found {})",
                    entry.filename, entry.sha256, sha256
                );
                warn!(path = %path.display(), "{message}");
                warnings.push(message);
            }
            Ok(_) => {}
            Err(err) => {
                let message = format!("{}: {err:#}", entry.filename);
                warn!(path = %path.display(), "payload unreadable: {err:#}");
                warnings.push(message);
                continue;
            }
        }

        match load_source_document(path) {
            Ok(source) => sources.push(source),
            Err(err) => {
                let message = format!("{}: {err:#}", entry.filename);
                warn!(path = %path.display(), "payload unreadable: {err:#}");
                warnings.push(message);
            }
        }
    }

    sources
}

fn summarize(corpus: &CorpusRun) -> ChunkRunCounts {
    let mut chunks_by_content_type = BTreeMap::new();
    for chunk in &corpus.chunks {
        *chunks_by_content_type
            .entry(chunk.content_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    ChunkRunCounts {
        chunked_document_count: corpus.reports.len(),
        failed_document_count: corpus.failures.len(),
        chunks_total: corpus.chunks.len(),
        table_chunks: corpus.chunks.iter().filter(|chunk| chunk.is_table()).count(),
        hard_cut_chunks: corpus
            .chunks
            .iter()
            .filter(|chunk| is_hard_cut(chunk))
            .count(),
        chunks_by_content_type,
        link: corpus.link_stats,
        ..ChunkRunCounts::default()
    }
}

fn is_hard_cut(chunk: &Chunk) -> bool {
    chunk.boundary == Boundary::HardCut
}
