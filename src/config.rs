//! TOML configuration for execution and scheduling defaults.
//!
//! ```toml
//! [execution]
//! parallel = true
//! max_threads = 4
//!
//! [scheduler]
//! policy = { named = "khronos.c_model" }
//! ```
//!
//! Every key is optional.

use crate::core::error::VxResult;
use crate::execution::engine::ExecutionOptions;
use crate::kernels::target::TargetPolicy;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
}

/// `[execution]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run independent nodes of a level concurrently.
    pub parallel: bool,
    /// Worker threads for parallel mode, 0 for the global pool.
    pub max_threads: usize,
    /// Record per-node performance counters.
    pub collect_perf: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_threads: 0,
            collect_perf: true,
        }
    }
}

/// `[scheduler]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub policy: TargetPolicy,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> VxResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Execution options described by this configuration.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions::new()
            .with_parallel(self.execution.parallel)
            .with_max_threads(self.execution.max_threads)
            .with_perf(self.execution.collect_perf)
    }

    /// Target assignment policy described by this configuration.
    pub fn policy(&self) -> TargetPolicy {
        self.scheduler.policy.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::VxError;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.execution.parallel);
        assert!(config.execution.collect_perf);
        assert_eq!(config.policy(), TargetPolicy::LowestIndex);
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            [execution]
            parallel = true
            max_threads = 4

            [scheduler]
            policy = { named = "example.fast" }
        "#;
        let config = Config::from_toml_str(text).unwrap();
        let options = config.execution_options();
        assert!(options.parallel);
        assert_eq!(options.max_threads, 4);
        assert!(options.collect_perf);
        assert_eq!(config.policy(), TargetPolicy::Named("example.fast".to_string()));
    }

    #[test]
    fn test_parse_lowest_index_policy() {
        let config = Config::from_toml_str("[scheduler]\npolicy = \"lowest_index\"").unwrap();
        assert_eq!(config.policy(), TargetPolicy::LowestIndex);
    }

    #[test]
    fn test_invalid_config() {
        let result = Config::from_toml_str("[execution]\nparallel = \"yes\"");
        assert!(matches!(result, Err(VxError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/vxgraph.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
