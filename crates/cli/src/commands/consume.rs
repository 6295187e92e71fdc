//! `consume` command implementation.

use anyhow::Result;
use tracing::info;

use super::{load_blueprint, print_config_summary};
use crate::cli::ConsumeArgs;
use crate::error::CliError;
use crate::pipeline::{setup_shutdown_signal, ConsumeMode, Relay, RelayConfig};

/// Execute the `consume` command
pub async fn run_consume(args: &ConsumeArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.runtime, Some(&args.upstream))?;

    CliError::require_shared_store("consume", blueprint.store.kind)?;

    if args.runtime.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let consume = if args.upstream.serve_only {
        ConsumeMode::ServeOnly
    } else {
        ConsumeMode::Start
    };

    let relay = Relay::new(RelayConfig {
        blueprint,
        config_path: args.runtime.config.clone(),
        consume,
        ready_lists: Vec::new(),
        metrics_port: super::metrics_port(&args.runtime),
        sample_interval: super::sample_interval(&args.runtime),
    });

    let stats = relay.run(setup_shutdown_signal()).await?;
    stats.print_summary();

    info!("streamrelay consumer finished");
    Ok(())
}
