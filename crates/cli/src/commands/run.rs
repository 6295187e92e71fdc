//! `run` command implementation.

use anyhow::Result;
use tracing::{info, warn};

use super::{load_blueprint, print_config_summary};
use crate::cli::RunArgs;
use crate::pipeline::{setup_shutdown_signal, ConsumeMode, Relay, RelayConfig};

/// Execute the `run` command: manager and every processor in one process
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.runtime, Some(&args.upstream))?;

    if args.runtime.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if blueprint.processors.is_empty() {
        warn!("No processors configured - items will accumulate in the store");
    }

    let consume = if args.upstream.serve_only {
        ConsumeMode::ServeOnly
    } else {
        ConsumeMode::Start
    };
    let ready_lists = blueprint
        .processors
        .iter()
        .map(|p| p.ready_list_id.clone())
        .collect();

    let relay = Relay::new(RelayConfig {
        blueprint,
        config_path: args.runtime.config.clone(),
        consume,
        ready_lists,
        metrics_port: super::metrics_port(&args.runtime),
        sample_interval: super::sample_interval(&args.runtime),
    });

    info!("Starting relay...");
    let stats = relay.run(setup_shutdown_signal()).await?;
    stats.print_summary();

    info!("streamrelay finished");
    Ok(())
}
