//! streammerge - merge partitioned CSV files into one object

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use streammerge::config::MergeConfig;
use streammerge::io::cloud::Destination;
use streammerge::logging::{LogConfig, LogFormat, LogLevel, init_logging};
use streammerge::{
    DirectorySource, LocalObjectStore, PartitionId, RetryingSource, merge_and_upload,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "streammerge")]
#[command(author, version, about = "Merge partitioned CSV files and upload the result")]
struct Cli {
    /// Partition files relative to --input-root, merged in the order given
    partitions: Vec<String>,

    /// Glob (relative to --input-root) whose sorted matches follow the explicit partitions
    #[arg(short, long)]
    glob: Option<String>,

    /// Destination as scheme://bucket/key
    #[arg(short, long)]
    dest: String,

    /// Directory the partition paths are relative to
    #[arg(long, default_value = ".")]
    input_root: PathBuf,

    /// Directory holding the destination buckets
    #[arg(long, default_value = ".", env = "STREAMMERGE_OUTPUT_ROOT")]
    output_root: PathBuf,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bytes per uploaded chunk (overrides config)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Pipe capacity in bytes (overrides config)
    #[arg(long)]
    channel_capacity: Option<usize>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    if cli.json_logs {
        log_config = log_config.with_format(LogFormat::Json);
    }
    init_logging(&log_config)?;

    let mut config = match &cli.config {
        Some(path) => MergeConfig::from_json_file(path)?,
        None => MergeConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(bytes) = cli.chunk_size {
        config.chunk_size = bytes;
    }
    if let Some(bytes) = cli.channel_capacity {
        config.channel_capacity = bytes;
    }

    let destination =
        Destination::parse(&cli.dest).with_context(|| format!("invalid --dest {}", cli.dest))?;

    let directory = DirectorySource::new(&cli.input_root);
    let mut ids: Vec<PartitionId> = cli.partitions.iter().map(PartitionId::new).collect();
    if let Some(pattern) = &cli.glob {
        ids.extend(directory.discover(pattern)?);
    }
    info!(partitions = ids.len(), %destination, "starting merge");

    let source = RetryingSource::new(directory, config.retry);
    let sink = LocalObjectStore::new(&cli.output_root);
    let report = merge_and_upload(&ids, &destination, &source, &sink, &config)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
