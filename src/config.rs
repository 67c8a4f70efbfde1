//! Configuração do pipeline carregada a partir de `chartwright.toml`.
//!
//! A struct [`ChartwrightConfig`] contém todos os parâmetros configuráveis.
//! Todo campo tem valor padrão, então um arquivo ausente ou parcial funciona.
//! A variável `CHARTWRIGHT_API_KEY` tem precedência sobre o arquivo.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::admission::AdmissionConfig;
use crate::segmenter::DEFAULT_DELIMITER;

pub const DEFAULT_CONFIG_FILE: &str = "chartwright.toml";
pub const API_KEY_ENV: &str = "CHARTWRIGHT_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChartwrightConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Generation service endpoint and reply format.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Whole-request deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Token separating preamble, primary and secondary in the reply.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Strip insignificant whitespace from a JSON primary artifact.
    #[serde(default)]
    pub normalize_primary: bool,
}

fn default_endpoint() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "deepseek-v3.2".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            delimiter: default_delimiter(),
            normalize_primary: false,
        }
    }
}

/// What the pool does when every worker is busy and the backlog is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the submission with `Backpressure`.
    #[default]
    Reject,
    /// Run the job on the submitting task instead. The submission then
    /// returns only after the job has reached a terminal state.
    CallerRuns,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Jobs executing in parallel.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Accepted jobs allowed to wait for a worker.
    #[serde(default = "default_backlog")]
    pub backlog: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_workers() -> usize {
    4
}

fn default_backlog() -> usize {
    16
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            backlog: default_backlog(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Broker topology for the queue path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_routing_key")]
    pub routing_key: String,
    /// Consumer tasks draining the queue.
    #[serde(default = "default_consumers")]
    pub consumers: usize,
}

fn default_exchange() -> String {
    "chart_exchange".to_string()
}

fn default_queue() -> String {
    "chart_queue".to_string()
}

fn default_routing_key() -> String {
    "chart_routing_key".to_string()
}

fn default_consumers() -> usize {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            queue: default_queue(),
            routing_key: default_routing_key(),
            consumers: default_consumers(),
        }
    }
}

impl ChartwrightConfig {
    /// Load from `path`, or from `chartwright.toml` in the working directory.
    /// Falls back to defaults when the default file does not exist; an
    /// explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            config.generation.api_key = key;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}
