use crate::PipecheckError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_STEPS: usize = 10_000;
pub const DEFAULT_VERDICT_KEY: &str = "test_passed";

/// Per-pipeline execution settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ceiling on executed nodes per pipeline, counting revisits.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// State entry holding the pass/fail verdict.
    #[serde(default = "default_verdict_key")]
    pub verdict_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            verdict_key: default_verdict_key(),
        }
    }
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_verdict_key() -> String {
    DEFAULT_VERDICT_KEY.to_string()
}

/// Suite runner settings, usually read from a `pipecheck.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Pipelines running at once. 1 runs the suite sequentially.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub pipeline_timeout_secs: Option<u64>,

    /// Stop scheduling new pipelines once one has failed or errored.
    #[serde(default)]
    pub stop_on_first_failure: bool,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pipeline_timeout_secs: None,
            stop_on_first_failure: false,
            engine: EngineConfig::default(),
            remote: None,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

impl SuiteConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, PipecheckError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, PipecheckError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }

    /// Zero is treated as one.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Remote platform execution settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_wait_secs() -> u64 {
    600
}
