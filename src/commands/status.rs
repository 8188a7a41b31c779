use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::chunk::default_db_path;
use crate::commands::inventory::default_manifest_path;
use crate::model::{ChunkRunManifest, DocumentInventoryManifest};
use crate::store::ChunkStore;
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let inventory_path = default_manifest_path(&args.cache_root);
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));

    info!(cache_root = %args.cache_root.display(), "status requested");

    match latest_run_manifest(&manifest_dir)? {
        Some(path) => {
            let manifest: ChunkRunManifest = read_json(&path)?;
            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                started_at = %manifest.started_at,
                updated_at = %manifest.updated_at,
                documents = manifest.counts.chunked_document_count,
                failed = manifest.counts.failed_document_count,
                unreadable = manifest.counts.unreadable_payload_count,
                chunks = manifest.counts.chunks_total,
                tables = manifest.counts.table_chunks,
                linked = manifest.counts.link.chunks_linked,
                violations = manifest.violations_by_code.values().sum::<usize>(),
                "loaded latest chunk run manifest"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no chunk run manifest found"),
    }

    if inventory_path.exists() {
        let inventory: DocumentInventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            document_count = inventory.document_count,
            source = %inventory.source_directory,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    if db_path.exists() {
        let store = ChunkStore::open_read_only(&db_path)?;
        let counts = store.counts()?;
        info!(
            path = %db_path.display(),
            docs = counts.docs,
            chunks = counts.chunks,
            last_run_id = %store.last_run_id()?.unwrap_or_default(),
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

/// Run ids embed a compact UTC timestamp, so name order is run order.
fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    for entry in fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?
            .path();
        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("chunk_run_") && name.ends_with(".json"));
        if is_run_manifest && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}
