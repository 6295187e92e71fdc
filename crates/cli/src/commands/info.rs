//! `info` 命令实现

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::RelayBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// JSON 输出用的配置信息
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    upstream: UpstreamInfo,
    manager: ManagerInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processors: Vec<ProcessorInfo>,
    store: StoreInfo,
}

#[derive(Serialize)]
struct UpstreamInfo {
    host: String,
    port: u16,
    path: String,
    authenticated: bool,
    timeout_secs: f64,
    max_item_bytes: usize,
}

#[derive(Serialize)]
struct ManagerInfo {
    num_workers: usize,
    start_on_launch: bool,
    parameters: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ProcessorInfo {
    ready_list_id: String,
    ready_list_key: String,
    url: String,
    num_items: usize,
    transform: String,
    field_name: String,
}

#[derive(Serialize)]
struct StoreInfo {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    data_key: String,
    notify_key: String,
}

/// 执行 `info` 命令
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &RelayBlueprint, args: &InfoArgs) -> ConfigInfo {
    let keys = blueprint.store_keys();

    let processors = if args.processors {
        blueprint
            .processors
            .iter()
            .map(|p| ProcessorInfo {
                ready_list_id: p.ready_list_id.clone(),
                ready_list_key: keys.ready(&p.ready_list_id),
                url: p.url.clone(),
                num_items: p.num_items,
                transform: format!("{:?}", p.transform),
                field_name: p.field_name.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        upstream: UpstreamInfo {
            host: blueprint.upstream.host.clone(),
            port: blueprint.upstream.port,
            path: blueprint.upstream.path.clone(),
            authenticated: blueprint.upstream.authorization().is_some(),
            timeout_secs: blueprint.upstream.timeout_secs,
            max_item_bytes: blueprint.upstream.max_item_bytes,
        },
        manager: ManagerInfo {
            num_workers: blueprint.manager.num_workers,
            start_on_launch: blueprint.manager.start_on_launch,
            parameters: blueprint.manager.parameters.clone(),
        },
        processors,
        store: StoreInfo {
            kind: format!("{:?}", blueprint.store.kind),
            path: blueprint
                .store
                .path
                .as_ref()
                .map(|p| p.display().to_string()),
            url: blueprint.store.url.clone(),
            data_key: keys.data(),
            notify_key: keys.notify(),
        },
    }
}

fn print_config_info(blueprint: &RelayBlueprint, args: &InfoArgs) {
    let keys = blueprint.store_keys();

    println!("=== streamrelay configuration ===\n");

    println!("Upstream");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Feed: {}:{}{}",
        blueprint.upstream.host, blueprint.upstream.port, blueprint.upstream.path
    );
    println!(
        "   ├─ Credentials: {}",
        if blueprint.upstream.authorization().is_some() {
            "basic"
        } else {
            "none"
        }
    );
    println!("   └─ Read timeout: {}s", blueprint.upstream.timeout_secs);

    println!("\nManager");
    println!("   ├─ Workers: {}", blueprint.manager.num_workers);
    println!("   ├─ Start on launch: {}", blueprint.manager.start_on_launch);
    if blueprint.manager.parameters.is_empty() {
        println!("   └─ Parameters: (none)");
    } else {
        println!("   └─ Parameters ({}):", blueprint.manager.parameters.len());
        for (name, value) in &blueprint.manager.parameters {
            println!("         {} = {}", name, value);
        }
    }

    println!("\nProcessors ({})", blueprint.processors.len());
    for (i, processor) in blueprint.processors.iter().enumerate() {
        let is_last = i == blueprint.processors.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} -> {}", prefix, processor.ready_list_id, processor.url);
        if args.processors {
            println!("   {}  ├─ Ready list: {}", child_prefix, keys.ready(&processor.ready_list_id));
            println!("   {}  ├─ Batch size: {}", child_prefix, processor.num_items);
            println!("   {}  ├─ Field: {}", child_prefix, processor.field_name);
            println!("   {}  └─ Transform: {:?}", child_prefix, processor.transform);
        }
    }

    println!("\nStore");
    println!("   ├─ Kind: {:?}", blueprint.store.kind);
    if let Some(ref path) = blueprint.store.path {
        println!("   ├─ Path: {}", path.display());
    }
    if let Some(ref url) = blueprint.store.url {
        println!("   ├─ Url: {}", url);
    }
    println!("   ├─ Data list: {}", keys.data());
    println!("   └─ Notify list: {}", keys.notify());

    println!();
}
