use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::chunking::validate::ChunkValidator;
use crate::chunking::{ChunkerConfig, count_by_code};
use crate::cli::ValidateArgs;
use crate::commands::chunk::default_db_path;
use crate::model::ValidationReport;
use crate::store::ChunkStore;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: ValidateArgs) -> Result<()> {
    let generated_ts = chrono::Utc::now();
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.cache_root));
    let report_path = args.report_path.clone().unwrap_or_else(|| {
        args.cache_root.join("manifests").join(format!(
            "validation_report_{}.json",
            utc_compact_string(generated_ts)
        ))
    });

    if !db_path.exists() {
        bail!("chunk store missing: {}; run `creditchunk chunk` first", db_path.display());
    }

    let config = ChunkerConfig::load_or_default(args.config.as_deref())?;
    let validator = ChunkValidator::new(&config);

    let store = ChunkStore::open_read_only(&db_path)?;
    let run_id = store.last_run_id()?;
    let chunks = store.load_chunks()?;
    let violations = validator.validate(&chunks);

    for violation in violations.iter().take(20) {
        warn!(
            code = %violation.code,
            chunk_id = %violation.chunk_id,
            "{}",
            violation.message
        );
    }

    let report = ValidationReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        db_path: db_path.display().to_string(),
        run_id,
        chunk_count: chunks.len(),
        violation_count: violations.len(),
        violations_by_code: count_by_code(&violations),
        violations,
    };

    write_json_pretty(&report_path, &report)?;
    info!(
        path = %report_path.display(),
        chunks = report.chunk_count,
        violations = report.violation_count,
        "wrote validation report"
    );

    if args.strict && report.violation_count > 0 {
        bail!(
            "{} validation violation(s) across {} chunk(s); see {}",
            report.violation_count,
            report.chunk_count,
            report_path.display()
        );
    }

    Ok(())
}
