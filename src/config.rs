use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::prompt::DEFAULT_INSTRUCTION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ollama generate endpoint.
    pub endpoint: String,
    pub model: String,
    pub instruction: String,
    pub request_timeout_secs: u64,
    /// Interpreter used to execute harnesses.
    pub python: String,
    /// Where solution and test files are materialized.
    pub workdir: PathBuf,
    /// Wall-clock limit per harness run; unset waits forever.
    pub test_timeout_secs: Option<u64>,
    /// JSON document holding problems, fixtures and preferences.
    pub store: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data = data_dir();
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            model: "codellama".to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            request_timeout_secs: 300,
            python: "python3".to_string(),
            workdir: data.join("runs"),
            test_timeout_secs: None,
            store: data.join("store.json"),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// A missing file yields defaults; a present but invalid file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        toml::from_str(&raw).map_err(|source| ConfigError::Toml { path, source })
    }

    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout_secs.map(Duration::from_secs)
    }
}

pub fn config_path() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("codepair");
    dir.push("config.toml");
    dir
}

fn data_dir() -> PathBuf {
    let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("codepair");
    dir
}
