//! Configuration validation
//!
//! Rules:
//! - upstream port non-zero, path starts with `/`, timeout > 0
//! - every backoff has `0 < min <= max`
//! - at least one manager worker
//! - processors: unique non-empty ready list ids, `num_items >= 1`, http(s) url
//! - sled store needs a path, redis store a `redis://` url
//! - durations stay under a day
//! - username and password come together

use std::collections::HashSet;

use contracts::{BackoffConfig, ContractError, RelayBlueprint, StoreKind};

/// Validate a RelayBlueprint
///
/// Returns the first error found.
pub fn validate(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    validate_upstream(blueprint)?;
    validate_manager(blueprint)?;
    validate_processors(blueprint)?;
    validate_store(blueprint)?;
    Ok(())
}

fn validate_upstream(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let upstream = &blueprint.upstream;
    if upstream.host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "upstream.host",
            "must not be empty",
        ));
    }
    if upstream.port == 0 {
        return Err(ContractError::config_validation(
            "upstream.port",
            "must be non-zero",
        ));
    }
    if !upstream.path.starts_with('/') {
        return Err(ContractError::config_validation(
            "upstream.path",
            format!("must start with '/', got '{}'", upstream.path),
        ));
    }
    validate_positive("upstream.timeout_secs", upstream.timeout_secs)?;
    if upstream.max_item_bytes == 0 {
        return Err(ContractError::config_validation(
            "upstream.max_item_bytes",
            "must be > 0",
        ));
    }
    validate_backoff("upstream.tcp_backoff", &upstream.tcp_backoff)?;
    validate_backoff("upstream.http_backoff", &upstream.http_backoff)?;
    validate_credentials("upstream", &upstream.username, &upstream.password)
}

fn validate_manager(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let manager = &blueprint.manager;
    if manager.num_workers == 0 {
        return Err(ContractError::config_validation(
            "manager.num_workers",
            "must be >= 1",
        ));
    }
    if manager.parameters.keys().any(|name| name.trim().is_empty()) {
        return Err(ContractError::config_validation(
            "manager.parameters",
            "parameter names must not be empty",
        ));
    }
    validate_backoff("manager.exit_backoff", &manager.exit_backoff)
}

fn validate_processors(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (i, processor) in blueprint.processors.iter().enumerate() {
        let field = format!("processors[{i}]");
        if processor.ready_list_id.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("{field}.ready_list_id"),
                "must not be empty",
            ));
        }
        if !seen.insert(&processor.ready_list_id) {
            return Err(ContractError::config_validation(
                format!("processors[ready_list_id={}]", processor.ready_list_id),
                "duplicate ready_list_id",
            ));
        }
        if processor.num_items == 0 {
            return Err(ContractError::config_validation(
                format!("{field}.num_items"),
                "must be >= 1",
            ));
        }
        if !(processor.url.starts_with("http://") || processor.url.starts_with("https://")) {
            return Err(ContractError::config_validation(
                format!("{field}.url"),
                format!("must be an http(s) URL, got '{}'", processor.url),
            ));
        }
        if processor.field_name.is_empty() {
            return Err(ContractError::config_validation(
                format!("{field}.field_name"),
                "must not be empty",
            ));
        }
        validate_positive(&format!("{field}.timeout_secs"), processor.timeout_secs)?;
        validate_backoff(&format!("{field}.backoff"), &processor.backoff)?;
        validate_credentials(&field, &processor.username, &processor.password)?;
    }
    Ok(())
}

fn validate_store(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    if blueprint.store.kind == StoreKind::Sled && blueprint.store.path.is_none() {
        return Err(ContractError::config_validation(
            "store.path",
            "required for the sled store",
        ));
    }
    if blueprint.store.kind == StoreKind::Redis {
        match blueprint.store.url.as_deref() {
            None => {
                return Err(ContractError::config_validation(
                    "store.url",
                    "required for the redis store",
                ))
            }
            Some(url) if !(url.starts_with("redis://") || url.starts_with("rediss://")) => {
                return Err(ContractError::config_validation(
                    "store.url",
                    format!("must be a redis:// or rediss:// URL, got '{url}'"),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Longest timeout or backoff accepted, in seconds
const MAX_DURATION_SECS: f64 = 86_400.0;

fn validate_positive(field: &str, value: f64) -> Result<(), ContractError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ContractError::config_validation(
            field,
            format!("must be > 0, got {value}"),
        ));
    }
    validate_bounded(field, value)
}

fn validate_bounded(field: &str, value: f64) -> Result<(), ContractError> {
    if value > MAX_DURATION_SECS {
        return Err(ContractError::config_validation(
            field,
            format!("must be <= {MAX_DURATION_SECS}, got {value}"),
        ));
    }
    Ok(())
}

fn validate_backoff(field: &str, backoff: &BackoffConfig) -> Result<(), ContractError> {
    validate_positive(&format!("{field}.min_secs"), backoff.min_secs)?;
    if !(backoff.max_secs.is_finite() && backoff.min_secs <= backoff.max_secs) {
        return Err(ContractError::config_validation(
            field,
            format!(
                "min_secs ({}) must be <= max_secs ({})",
                backoff.min_secs, backoff.max_secs
            ),
        ));
    }
    validate_bounded(&format!("{field}.max_secs"), backoff.max_secs)
}

fn validate_credentials(
    field: &str,
    username: &Option<String>,
    password: &Option<String>,
) -> Result<(), ContractError> {
    if username.is_some() != password.is_some() {
        return Err(ContractError::config_validation(
            format!("{field}.username"),
            "username and password must be given together",
        ));
    }
    Ok(())
}
