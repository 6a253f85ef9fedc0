// src/bin/orgmap/cli.rs
use clap::Parser;

/// Builds and persists schema mapping documents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// automap | finalize | report | validate
    #[arg(long)]
    pub operation: Option<String>,

    /// Session configuration (YAML)
    #[arg(long)]
    pub config: String,

    /// Source schema definitions (.yaml, .json or .csv describe export)
    #[arg(long)]
    pub source_schema: String,

    /// Destination schema definitions
    #[arg(long)]
    pub destination_schema: String,

    /// Directory holding mapping documents as JSON files
    #[arg(long, conflicts_with = "mongo_uri")]
    pub store_dir: Option<String>,

    #[arg(long, requires_all = ["db", "collection"])]
    pub mongo_uri: Option<String>,

    #[arg(long)]
    pub db: Option<String>,

    #[arg(long)]
    pub collection: Option<String>,

    /// Directory with `*.j2` report templates
    #[arg(long)]
    pub template_dir: Option<String>,

    /// Destination schema page size
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Run without writing the mapping document
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub debug: bool,
}
