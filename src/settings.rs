use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::Result;
use crate::lookup::http::DEFAULT_BASE_URL;

pub const ENV_PREFIX: &str = "DDI";

/// Resolved run configuration: defaults, then `DDI_*` environment
/// variables, then CLI flags applied by the binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    /// 0 means one worker per available CPU.
    pub workers: usize,
    /// Leave transient lookup failures out of the checkpoint so the next
    /// run retries them.
    pub retry_failed: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub progress: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    pub fn from_env(env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .set_default("input", "input.csv")?
            .set_default("output", "output.csv")?
            .set_default("checkpoint", "checkpoint.csv")?
            .set_default("workers", 0i64)?
            .set_default("retry_failed", false)?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("timeout_secs", 30i64)?
            .set_default("user_agent", concat!("ddi_scraper/", env!("CARGO_PKG_VERSION")))?
            .set_default("progress", true)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Worker count with `0` resolved to available parallelism.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn defaults_without_environment() {
        let s = Settings::from_env(env(&[])).unwrap();
        assert_eq!(s.input, PathBuf::from("input.csv"));
        assert_eq!(s.output, PathBuf::from("output.csv"));
        assert_eq!(s.checkpoint, PathBuf::from("checkpoint.csv"));
        assert!(!s.retry_failed);
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.timeout(), Duration::from_secs(30));
        assert!(s.worker_count() >= 1);
    }

    #[test]
    fn environment_overrides_defaults() {
        let s = Settings::from_env(env(&[
            ("DDI_WORKERS", "3"),
            ("DDI_RETRY_FAILED", "true"),
            ("DDI_CHECKPOINT", "state/pairs.sqlite"),
            ("DDI_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(s.worker_count(), 3);
        assert!(s.retry_failed);
        assert_eq!(s.checkpoint, PathBuf::from("state/pairs.sqlite"));
        assert_eq!(s.timeout_secs, 5);
    }
}
