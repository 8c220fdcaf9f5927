//! Configuration file parsing for `retrace.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `~/.config/retrace/retrace.toml` if no project-level file is found.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vm::Verbosity;

const FILE_NAME: &str = "retrace.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid toml in '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RetraceConfig {
    #[serde(default)]
    pub emulation: EmulationSection,
    #[serde(default)]
    pub index: IndexSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmulationSection {
    /// Hard cap on library-recovery restarts per session.
    pub max_restarts: usize,
    /// Delay units added when a child lands in a different shard.
    pub cross_shard_delay: u32,
    pub verbosity: Verbosity,
    /// Verbosity of the diagnostic re-run used to find missing libraries.
    pub recovery_verbosity: Verbosity,
    pub get_method_gas_limit: u64,
}

impl Default for EmulationSection {
    fn default() -> Self {
        Self {
            max_restarts: 16,
            cross_shard_delay: 1,
            verbosity: Verbosity::Full,
            recovery_verbosity: Verbosity::FullLocationStackVerbose,
            get_method_gas_limit: 10_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct IndexSection {
    pub endpoint: String,
    pub testnet_endpoint: String,
    pub testnet: bool,
    pub timeout_ms: u64,
    /// Attempts per trace-index call before giving up.
    pub attempts: u32,
    pub retry_delay_ms: u64,
    /// Environment variable holding the index API key.
    pub api_key_env: Option<String>,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            endpoint: "https://toncenter.com/api/v3".to_string(),
            testnet_endpoint: "https://testnet.toncenter.com/api/v3".to_string(),
            testnet: false,
            timeout_ms: 15_000,
            attempts: 20,
            retry_delay_ms: 100,
            api_key_env: Some("TONCENTER_API_KEY".to_string()),
        }
    }
}

impl IndexSection {
    pub fn active_endpoint(&self) -> &str {
        if self.testnet {
            &self.testnet_endpoint
        } else {
            &self.endpoint
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

impl RetraceConfig {
    /// Load config from `retrace.toml`, searching current dir then parents.
    /// Returns `Default` when no file is found or the file is unreadable.
    pub fn load() -> Self {
        match Self::find() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring config file");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a TOML string directly.
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    fn find() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join(FILE_NAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !dir.pop() {
                break;
            }
        }
        let home = std::env::var("HOME").ok().map(PathBuf::from)?;
        let global = home.join(".config").join("retrace").join(FILE_NAME);
        global.exists().then_some(global)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = RetraceConfig::parse("").unwrap();
        assert_eq!(cfg.emulation, EmulationSection::default());
        assert_eq!(cfg.index.attempts, 20);
        assert_eq!(cfg.index.active_endpoint(), "https://toncenter.com/api/v3");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = RetraceConfig::parse(
            r#"
[emulation]
max_restarts = 3
verbosity = "full_location_gas"

[index]
testnet = true
retry_delay_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(cfg.emulation.max_restarts, 3);
        assert_eq!(cfg.emulation.verbosity, Verbosity::FullLocationGas);
        assert_eq!(cfg.emulation.cross_shard_delay, 1);
        assert_eq!(cfg.index.active_endpoint(), "https://testnet.toncenter.com/api/v3");
        assert_eq!(cfg.index.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_verbosity_is_an_error() {
        assert!(RetraceConfig::parse("[emulation]\nverbosity = \"loud\"").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RetraceConfig::load_from(Path::new("/nonexistent/retrace.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/retrace.toml"));
    }
}
