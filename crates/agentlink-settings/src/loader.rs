//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AgentLinkSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `AGENTLINK_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::AgentLinkSettings;

/// Resolve the path to the settings file (`~/.agentlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".agentlink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AgentLinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<AgentLinkSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<AgentLinkSettings> {
    let defaults = serde_json::to_value(AgentLinkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `AGENTLINK_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut AgentLinkSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (an env-var reader in production).
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Empty strings are treated as unset
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_overrides_from<F>(settings: &mut AgentLinkSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_string("AGENTLINK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_ranged(&lookup, "AGENTLINK_PORT", 0_u16, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = read_string("AGENTLINK_WS_PATH") {
        if v.starts_with('/') {
            settings.server.ws_path = v;
        } else {
            tracing::warn!(key = "AGENTLINK_WS_PATH", value = %v, "path must start with '/', ignoring");
        }
    }
    if let Some(v) = read_ranged(&lookup, "AGENTLINK_MAX_CONNECTIONS", 1_usize, 100_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_ranged(&lookup, "AGENTLINK_HEARTBEAT_INTERVAL_SECS", 1_u64, 3_600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_ranged(&lookup, "AGENTLINK_HEARTBEAT_TIMEOUT_SECS", 1_u64, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }

    // ── Logging settings ────────────────────────────────────────────
    if let Some(v) = read_string("AGENTLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_string("AGENTLINK_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a number within an inclusive range.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_ranged<T, F>(lookup: &F, name: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(name).filter(|v| !v.is_empty())?;
    let result = parse_in_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
