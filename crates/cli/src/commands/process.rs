//! `process` command implementation.

use anyhow::Result;
use contracts::RelayBlueprint;
use tracing::info;

use super::{load_blueprint, print_config_summary};
use crate::cli::ProcessArgs;
use crate::error::CliError;
use crate::pipeline::{setup_shutdown_signal, ConsumeMode, Relay, RelayConfig};

/// Execute the `process` command
pub async fn run_process(args: &ProcessArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.runtime, None)?;

    CliError::require_shared_store("process", blueprint.store.kind)?;

    let ready_list_id = select_ready_list(&blueprint, args.ready_list_id.as_deref())?;

    if args.runtime.dry_run {
        info!(ready_list = %ready_list_id, "Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let relay = Relay::new(RelayConfig {
        blueprint,
        config_path: args.runtime.config.clone(),
        consume: ConsumeMode::Off,
        ready_lists: vec![ready_list_id],
        metrics_port: super::metrics_port(&args.runtime),
        sample_interval: super::sample_interval(&args.runtime),
    });

    let stats = relay.run(setup_shutdown_signal()).await?;
    stats.print_summary();

    info!("streamrelay processor finished");
    Ok(())
}

/// The requested processor, or the only configured one
fn select_ready_list(
    blueprint: &RelayBlueprint,
    requested: Option<&str>,
) -> Result<String, CliError> {
    match requested {
        Some(id) if blueprint.processor(id).is_none() => Err(CliError::processor_selection(
            format!("no processor configured for ready list '{id}'"),
        )),
        Some(id) => Ok(id.to_string()),
        None => match blueprint.processors.as_slice() {
            [only] => Ok(only.ready_list_id.clone()),
            [] => Err(CliError::processor_selection("no processors configured")),
            _ => Err(CliError::processor_selection(format!(
                "{} processors configured; pick one with --ready-list-id",
                blueprint.processors.len()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    const TWO_PROCESSORS: &str = r#"
[upstream]
host = "stream.example.com"
path = "/1/statuses/filter.json"

[[processors]]
ready_list_id = "a"
url = "http://sink.example.com/a"

[[processors]]
ready_list_id = "b"
url = "http://sink.example.com/b"
"#;

    #[test]
    fn requested_ready_list_must_exist() {
        let blueprint = ConfigLoader::load_from_str(TWO_PROCESSORS, ConfigFormat::Toml).unwrap();
        assert_eq!(select_ready_list(&blueprint, Some("b")).unwrap(), "b");
        assert!(select_ready_list(&blueprint, Some("c")).is_err());
    }

    #[test]
    fn ambiguous_without_ready_list() {
        let blueprint = ConfigLoader::load_from_str(TWO_PROCESSORS, ConfigFormat::Toml).unwrap();
        let err = select_ready_list(&blueprint, None).unwrap_err();
        assert!(err.to_string().contains("--ready-list-id"));
    }

    #[test]
    fn single_processor_is_default() {
        let mut blueprint =
            ConfigLoader::load_from_str(TWO_PROCESSORS, ConfigFormat::Toml).unwrap();
        blueprint.processors.truncate(1);
        assert_eq!(select_ready_list(&blueprint, None).unwrap(), "a");
    }
}
