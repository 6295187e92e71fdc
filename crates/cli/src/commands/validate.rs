//! `validate` 命令实现

use anyhow::{Context, Result};
use contracts::{RelayBlueprint, StoreKind, TransformKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// JSON 输出用的校验结果
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    upstream: String,
    parameter_count: usize,
    processor_count: usize,
    store: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    upstream: format!(
                        "{}:{}{}",
                        blueprint.upstream.host, blueprint.upstream.port, blueprint.upstream.path
                    ),
                    parameter_count: blueprint.manager.parameters.len(),
                    processor_count: blueprint.processors.len(),
                    store: format!("{:?}", blueprint.store.kind),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// 收集配置警告（非致命问题）
fn collect_warnings(blueprint: &RelayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.processors.is_empty() {
        warnings.push("No processors configured - items will accumulate in the store".to_string());
    }

    if blueprint.manager.parameters.is_empty() {
        warnings.push("manager.parameters is empty - the upstream request has no filter".to_string());
    }

    match blueprint.store.kind {
        StoreKind::Memory => warnings.push(
            "Memory store selected - only `run` can deliver items, and pending batches are lost on exit"
                .to_string(),
        ),
        StoreKind::Sled => warnings.push(
            "Sled store selected - the database is locked by one process, so only `run` can use it"
                .to_string(),
        ),
        StoreKind::Redis => {}
    }

    for processor in &blueprint.processors {
        if processor.url.starts_with("http://") && processor.username.is_some() {
            warnings.push(format!(
                "Processor '{}' sends credentials over plain http",
                processor.ready_list_id
            ));
        }
        if processor.transform == TransformKind::None && processor.num_items == 1 {
            warnings.push(format!(
                "Processor '{}' posts every item on its own",
                processor.ready_list_id
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Upstream: {}", summary.upstream);
            println!("  Parameters: {}", summary.parameter_count);
            println!("  Processors: {}", summary.processor_count);
            println!("  Store: {}", summary.store);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_is_invalid() {
        let result = validate_config(&ValidateArgs {
            config: PathBuf::from("/nonexistent/relay.toml"),
            json: true,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn valid_config_reports_summary_and_warnings() {
        let file = write_config(
            r#"
[upstream]
host = "stream.example.com"
path = "/1/statuses/filter.json"
"#,
        );
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });

        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.upstream, "stream.example.com:80/1/statuses/filter.json");
        assert_eq!(summary.processor_count, 0);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No processors")));
        assert!(warnings.iter().any(|w| w.contains("Memory store")));
    }

    #[test]
    fn invalid_config_carries_error() {
        let file = write_config(
            r#"
[upstream]
host = "stream.example.com"
path = "no-leading-slash"
"#,
        );
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("path"));
    }
}
