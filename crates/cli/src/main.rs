//! # streamrelay
//!
//! 命令行入口。
//!
//! - 加载并校验配置
//! - 编排 Consumer Manager 与批处理器
//! - Ctrl+C / SIGTERM 优雅退出，SIGHUP 重新加载过滤参数

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_consume, run_info, run_process, run_relay, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(&ObservabilityConfig::from_flags(
        cli.quiet,
        cli.verbose,
        cli.log_format.into(),
    ))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "streamrelay starting"
    );

    // Execute command
    let result = match &cli.command {
        Commands::Consume(args) => run_consume(args).await,
        Commands::Process(args) => run_process(args).await,
        Commands::Run(args) => run_relay(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
