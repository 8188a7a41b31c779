use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::InventoryArgs;
use crate::model::{DocumentEntry, DocumentInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let source_dir = source_dir(&args.cache_root, args.source_dir.as_deref());
    let manifest = build_manifest(&source_dir)?;

    if args.dry_run {
        info!(
            document_count = manifest.document_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| default_manifest_path(&args.cache_root));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(document_count = manifest.document_count, "inventory completed");

    Ok(())
}

pub fn source_dir(cache_root: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cache_root.join("documents"))
}

pub fn default_manifest_path(cache_root: &Path) -> PathBuf {
    cache_root.join("manifests").join("document_inventory.json")
}

pub fn build_manifest(source_dir: &Path) -> Result<DocumentInventoryManifest> {
    let mut payload_paths = discover_payloads(source_dir)?;
    payload_paths.sort();

    if payload_paths.is_empty() {
        bail!("no loader payloads (*.json) found in {}", source_dir.display());
    }

    let mut documents = Vec::with_capacity(payload_paths.len());
    for path in payload_paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        let bytes = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        let sha256 = sha256_file(&path)?;

        documents.push(DocumentEntry {
            path: path.display().to_string(),
            filename,
            sha256,
            bytes,
        });
    }

    Ok(DocumentInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: source_dir.display().to_string(),
        document_count: documents.len(),
        documents,
    })
}

fn discover_payloads(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut payloads = Vec::new();

    let entries = fs::read_dir(source_dir)
        .with_context(|| format!("failed to read {}", source_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", source_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            payloads.push(path);
        }
    }

    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_lists_json_payloads_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b_agreement.json"), r#"{"filename":"b.pdf","pages":[]}"#)
            .expect("write b");
        fs::write(dir.path().join("a_certificate.JSON"), r#"{"filename":"a.pdf","pages":[]}"#)
            .expect("write a");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write txt");
        fs::create_dir(dir.path().join("nested.json")).expect("mkdir");

        let manifest = build_manifest(dir.path()).expect("manifest");

        assert_eq!(manifest.document_count, 2);
        let names = manifest
            .documents
            .iter()
            .map(|entry| entry.filename.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(names, vec!["a_certificate.JSON", "b_agreement.json"]);
        assert_eq!(manifest.documents[0].sha256.len(), 64);
    }

    #[test]
    fn empty_source_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(build_manifest(dir.path()).is_err());
    }
}
