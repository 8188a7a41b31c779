use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "creditchunk",
    version,
    about = "Structural chunking of credit agreements and compliance certificates"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hash loader payloads and write the document inventory.
    Inventory(InventoryArgs),
    /// Chunk every inventoried document, link, validate and store the run.
    Chunk(ChunkArgs),
    /// Re-validate the chunks currently in the store.
    Validate(ValidateArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = ".cache/creditchunk")]
    pub cache_root: PathBuf,

    /// Directory of loader payloads; defaults to `<cache-root>/documents`.
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    #[arg(long, default_value = ".cache/creditchunk")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    #[arg(long)]
    pub inventory_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// JSON chunker configuration; every field is optional.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub refresh_inventory: bool,

    #[arg(long, default_value_t = false)]
    pub fail_on_violations: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long, default_value = ".cache/creditchunk")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/creditchunk")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_flags_parse() {
        let cli = Cli::try_parse_from([
            "creditchunk",
            "chunk",
            "--cache-root",
            "/tmp/cache",
            "--refresh-inventory",
            "--fail-on-violations",
            "--config",
            "chunker.json",
        ])
        .expect("parse chunk args");

        let Commands::Chunk(args) = cli.command else {
            panic!("expected chunk command");
        };
        assert_eq!(args.cache_root, PathBuf::from("/tmp/cache"));
        assert!(args.refresh_inventory);
        assert!(args.fail_on_violations);
        assert_eq!(args.config, Some(PathBuf::from("chunker.json")));
    }

    #[test]
    fn cache_root_defaults() {
        let cli = Cli::try_parse_from(["creditchunk", "status"]).expect("parse status");
        let Commands::Status(args) = cli.command else {
            panic!("expected status command");
        };
        assert_eq!(args.cache_root, PathBuf::from(".cache/creditchunk"));
    }
}
