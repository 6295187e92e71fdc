//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// streamrelay - HTTP streaming feed relay
#[derive(Parser, Debug)]
#[command(
    name = "streamrelay",
    author,
    version,
    about = "HTTP streaming feed relay",
    long_about = "Consumes a long-lived chunked HTTP feed into a list store and posts\n\
                  the collected items downstream in batches.\n\n\
                  Filter parameter changes are picked up by a hot restart: the new\n\
                  connection is opened before the old one is dropped."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "STREAMRELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "STREAMRELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the consumer manager against the upstream feed
    Consume(ConsumeArgs),

    /// Run one batch processor
    Process(ProcessArgs),

    /// Run the consumer manager and every configured processor
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Options shared by the long-running commands
#[derive(Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "relay.toml",
        env = "STREAMRELAY_CONFIG"
    )]
    pub config: PathBuf,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "STREAMRELAY_METRICS_PORT")]
    pub metrics_port: u16,

    /// Seconds between list depth samples
    #[arg(long, default_value = "10", env = "STREAMRELAY_SAMPLE_INTERVAL")]
    pub sample_interval: u64,

    /// Validate configuration and exit without connecting
    #[arg(long)]
    pub dry_run: bool,
}

/// Upstream overrides
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Override upstream host from configuration
    #[arg(long, env = "STREAMRELAY_UPSTREAM_HOST")]
    pub host: Option<String>,

    /// Override upstream port from configuration
    #[arg(long, env = "STREAMRELAY_UPSTREAM_PORT")]
    pub port: Option<u16>,

    /// Start the manager without opening a connection
    #[arg(long)]
    pub serve_only: bool,
}

/// Arguments for the `consume` command
#[derive(Parser, Debug, Clone)]
pub struct ConsumeArgs {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

/// Arguments for the `process` command
#[derive(Parser, Debug, Clone)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Ready list of the processor to run (defaults to the only one configured)
    #[arg(long, env = "STREAMRELAY_READY_LIST_ID")]
    pub ready_list_id: Option<String>,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show processor details
    #[arg(long)]
    pub processors: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
