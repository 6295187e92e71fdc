//! Command implementations.

mod consume;
mod info;
mod process;
mod run;
mod validate;

pub use consume::run_consume;
pub use info::run_info;
pub use process::run_process;
pub use run::run_relay;
pub use validate::run_validate;

use anyhow::{Context, Result};
use contracts::RelayBlueprint;
use tracing::info;

use crate::cli::{RuntimeArgs, UpstreamArgs};
use crate::error::CliError;

/// Load the blueprint named by `runtime`, applying upstream overrides
fn load_blueprint(runtime: &RuntimeArgs, upstream: Option<&UpstreamArgs>) -> Result<RelayBlueprint> {
    info!(config = %runtime.config.display(), "Loading configuration");

    if !runtime.config.exists() {
        return Err(CliError::config_not_found(runtime.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&runtime.config)
        .with_context(|| format!("Failed to load config from {}", runtime.config.display()))?;

    if let Some(overrides) = upstream {
        if let Some(ref host) = overrides.host {
            info!(host = %host, "Overriding upstream host from CLI");
            blueprint.upstream.host = host.clone();
        }
        if let Some(port) = overrides.port {
            info!(port = %port, "Overriding upstream port from CLI");
            blueprint.upstream.port = port;
        }
        if overrides.host.is_some() || overrides.port.is_some() {
            config_loader::ConfigLoader::validate(&blueprint)
                .context("Invalid upstream override")?;
        }
    }

    info!(
        host = %blueprint.upstream.host,
        port = blueprint.upstream.port,
        path = %blueprint.upstream.path,
        processors = blueprint.processors.len(),
        store = ?blueprint.store.kind,
        "Configuration loaded"
    );

    Ok(blueprint)
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &RelayBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Upstream:");
    println!(
        "  {}:{}{}",
        blueprint.upstream.host, blueprint.upstream.port, blueprint.upstream.path
    );
    println!("  Parameters: {}", blueprint.manager.parameters.len());
    println!("\nProcessors ({}):", blueprint.processors.len());
    for processor in &blueprint.processors {
        println!(
            "  - {} -> {} (batch of {}, transform {:?})",
            processor.ready_list_id, processor.url, processor.num_items, processor.transform
        );
    }
    println!("\nStore: {:?} ({})", blueprint.store.kind, blueprint.store.namespace);
    println!();
}

fn metrics_port(runtime: &RuntimeArgs) -> Option<u16> {
    (runtime.metrics_port != 0).then_some(runtime.metrics_port)
}

fn sample_interval(runtime: &RuntimeArgs) -> std::time::Duration {
    std::time::Duration::from_secs(runtime.sample_interval.max(1))
}
