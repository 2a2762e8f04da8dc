//! Process-wide tunables for one `init` call.

use heimdall_extract::ExtractConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Strategies the orchestrator is permitted to run. All enabled by default;
/// disabling one degrades the same way a strategy failure would (a
/// `"extract.<strategy>.error"` property, never a hard failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnabledStrategies {
    pub dwarf: bool,
    pub heuristic: bool,
    pub package_probe: bool,
    pub language_adapters: bool,
}

impl Default for EnabledStrategies {
    fn default() -> Self {
        Self {
            dwarf: true,
            heuristic: true,
            package_probe: true,
            language_adapters: true,
        }
    }
}

/// `serde`-deserializable configuration passed to `init`. No file I/O
/// happens inside this crate; the caller reads a config file (if any) and
/// hands the parsed struct in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Artifacts larger than this are rejected with `TooLarge`.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Wall-clock budget per artifact before `"extract.timeout"` is set.
    #[serde(default = "default_timeout_secs")]
    pub per_artifact_timeout_secs: u64,
    /// Bytes scanned from the front of an artifact by the heuristic scanner.
    #[serde(default = "default_scan_window")]
    pub heuristic_scan_window: usize,
    #[serde(default)]
    pub enabled_strategies: EnabledStrategies,
    /// Extra directories searched before the platform standard set, in
    /// order, for dependency resolution (e.g. a vendored `rpath`-like
    /// override for testing).
    #[serde(default)]
    pub search_path_overrides: Vec<PathBuf>,
    /// Whether the dependency graph walk follows transitive dependencies
    /// or stops at depth 1. Mirrors `set_transitive`, a default that
    /// callers may still override per-session.
    #[serde(default = "default_transitive")]
    pub transitive: bool,
}

fn default_max_file_size() -> u64 {
    heimdall_hash::DEFAULT_MAX_SIZE
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_scan_window() -> usize {
    heimdall_heuristic::DEFAULT_SCAN_WINDOW
}

fn default_transitive() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            per_artifact_timeout_secs: default_timeout_secs(),
            heuristic_scan_window: default_scan_window(),
            enabled_strategies: EnabledStrategies::default(),
            search_path_overrides: Vec::new(),
            transitive: default_transitive(),
        }
    }
}

impl Config {
    pub(crate) fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            max_file_size: self.max_file_size,
            per_artifact_timeout: Duration::from_secs(self.per_artifact_timeout_secs),
            heuristic_scan_window: self.heuristic_scan_window,
            dwarf_enabled: self.enabled_strategies.dwarf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_file_size, config.max_file_size);
        assert_eq!(back.transitive, config.transitive);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: Config = serde_json::from_str(r#"{"transitive": false}"#).unwrap();
        assert!(!config.transitive);
        assert_eq!(config.max_file_size, default_max_file_size());
    }
}
