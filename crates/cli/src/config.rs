//! Configuration file format for the `foursight` binary.
//!
//! Every field has a default, so an absent file or an empty section is
//! valid. Command-line flags override what the file says.
//!
//! # Example
//!
//! ```toml
//! [foursight]
//! env = "mastertest"
//! stage = "dev"
//! bucket_prefix = "foursight"
//! region = "us-east-1"
//!
//! [storage]
//! root = "./foursight-data"
//!
//! [worker]
//! workers = 2
//! check_timeout_secs = 870
//! poll_interval_secs = 10
//! unit_ttl_secs = 900
//! store_retries = 3
//! schedule_secs = 3600
//! checks = ["access_key_status"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use foursight_core::{RunnerConfig, Stage, CHECK_TIMEOUT, POLL_INTERVAL};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "foursight.toml";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FoursightConfig {
    pub foursight: GeneralSettings,
    pub storage: StorageSettings,
    pub worker: WorkerSettings,
}

/// `[foursight]`: which environment and buckets this process serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub env: String,
    pub stage: Stage,
    pub bucket_prefix: String,
    pub region: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        GeneralSettings {
            env: "mastertest".to_string(),
            stage: Stage::Dev,
            bucket_prefix: "foursight".to_string(),
            region: foursight_core::environment::DEFAULT_REGION.to_string(),
        }
    }
}

/// `[storage]`: each bucket is a directory below `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            root: PathBuf::from("./foursight-data"),
        }
    }
}

/// `[worker]`: pool size, watchdog timings and the checks a long-running
/// worker schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub workers: usize,
    pub check_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub unit_ttl_secs: u64,
    pub store_retries: u32,
    /// How often scheduled checks are resubmitted.
    pub schedule_secs: u64,
    /// Checks submitted on every schedule tick. Empty means every registered
    /// check.
    pub checks: Vec<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            workers: 2,
            check_timeout_secs: CHECK_TIMEOUT.as_secs(),
            poll_interval_secs: POLL_INTERVAL.as_secs(),
            unit_ttl_secs: foursight_core::scheduler::DEFAULT_UNIT_TTL.as_secs(),
            store_retries: 3,
            schedule_secs: 3600,
            checks: Vec::new(),
        }
    }
}

impl WorkerSettings {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            check_timeout: Duration::from_secs(self.check_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            store_retries: self.store_retries,
            ..RunnerConfig::default()
        }
    }

    pub fn unit_ttl(&self) -> Duration {
        Duration::from_secs(self.unit_ttl_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_secs.max(1))
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read and parse a config file from `path`.
pub fn read_config(path: &Path) -> Result<FoursightConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

/// Resolve the config for this invocation: the explicit file if given
/// (which must exist), else `foursight.toml` if present, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<FoursightConfig, String> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.is_file() {
                read_config(fallback)
            } else {
                Ok(FoursightConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: FoursightConfig = toml::from_str("").unwrap();
        assert_eq!(config.foursight.env, "mastertest");
        assert_eq!(config.foursight.stage, Stage::Dev);
        assert_eq!(config.worker.check_timeout_secs, 870);
        assert_eq!(config.worker.unit_ttl_secs, 900);
        assert!(config.worker.checks.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: FoursightConfig = toml::from_str(
            r#"
            [foursight]
            env = "webprod"
            stage = "prod"

            [worker]
            workers = 8
            checks = ["access_key_status"]
            "#,
        )
        .unwrap();
        assert_eq!(config.foursight.env, "webprod");
        assert_eq!(config.foursight.stage, Stage::Prod);
        assert_eq!(config.foursight.bucket_prefix, "foursight");
        assert_eq!(config.worker.workers, 8);
        assert_eq!(config.worker.store_retries, 3);
        assert_eq!(config.worker.checks, vec!["access_key_status"]);
    }

    #[test]
    fn runner_config_follows_worker_settings() {
        let settings = WorkerSettings {
            check_timeout_secs: 30,
            store_retries: 5,
            ..WorkerSettings::default()
        };
        let runner = settings.runner_config();
        assert_eq!(runner.check_timeout, Duration::from_secs(30));
        assert_eq!(runner.store_retries, 5);
        assert_eq!(runner.store_backoff, RunnerConfig::default().store_backoff);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let parsed: Result<FoursightConfig, _> = toml::from_str("[foursight]\nstage = \"qa\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/foursight.toml"))).unwrap_err();
        assert!(err.contains("could not read"));
    }
}
