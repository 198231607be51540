//! Courtside configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model endpoint configuration
    pub llm: LlmConfig,

    /// Worker/critic loop bounds
    pub refinement: RefinementConfig,

    /// External tool servers
    pub backends: Vec<BackendConfig>,

    /// Editorial graph bindings
    pub pipeline: PipelineConfig,

    /// Backoff policy for leaf data fetches
    pub retry: RetryConfig,

    /// JSONL run trace
    pub trace: TraceConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key variable is set and that the pipeline only
    /// references configured backends.
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        for name in self.pipeline.referenced_backends() {
            if self.backend(name).is_none() {
                return Err(eyre::eyre!(
                    "Pipeline references backend '{}' but no backend with that name is configured",
                    name
                ));
            }
        }
        Ok(())
    }

    /// Look up a backend by name
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .courtside.yml
        let local_config = PathBuf::from(".courtside.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/courtside/courtside.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("courtside").join("courtside.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openrouter" or "openai")
    pub provider: String,

    /// Default (fast) model identifier
    pub model: String,

    /// Model used by synthesis-heavy tasks
    #[serde(rename = "pro-model")]
    pub pro_model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries on transient HTTP failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First retry delay; doubles on each attempt
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(api_key_env = %self.api_key_env, "LlmConfig::get_api_key: called");
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("Environment variable {} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            model: "google/gemini-2.5-flash".to_string(),
            pro_model: "google/gemini-2.5-pro".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            base_url: "https://openrouter.ai/api".to_string(),
            max_tokens: 16384,
            timeout_ms: 90_000,
            max_retries: 3,
            initial_backoff_ms: 1000,
        }
    }
}

/// Worker/critic loop bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Worker invocations before a candidate is force-accepted
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Model turns per conversation before a tool-less final answer is forced
    #[serde(rename = "max-turns")]
    pub max_turns: u32,

    /// Token cap per model response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_turns: 50,
            max_tokens: 8192,
        }
    }
}

/// An MCP server spoken to over stdio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend name used for routing and pipeline bindings
    pub name: String,

    /// Executable to spawn
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the child process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Every tool of this backend is visible on every turn
    #[serde(rename = "always-visible", default)]
    pub always_visible: bool,

    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms", default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend_timeout_ms() -> u64 {
    60_000
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Editorial graph bindings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Backend serving the statistics catalog
    #[serde(rename = "stats-backend")]
    pub stats_backend: String,

    /// Backend serving web search
    #[serde(rename = "search-backend")]
    pub search_backend: String,

    /// Leaf task name -> statistics tool it calls
    #[serde(rename = "leaf-tools")]
    pub leaf_tools: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Tool bound to a leaf, falling back to `get_<leaf>`
    pub fn leaf_tool(&self, leaf: &str) -> String {
        self.leaf_tools
            .get(leaf)
            .cloned()
            .unwrap_or_else(|| format!("get_{}", leaf))
    }

    fn referenced_backends(&self) -> [&str; 2] {
        [self.stats_backend.as_str(), self.search_backend.as_str()]
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let leaf_tools = [
            ("team_performance", "get_team_performance"),
            ("player_performance", "get_player_performance"),
            ("matchup_history", "get_matchup_history"),
            ("team_schedule", "get_team_schedule"),
        ]
        .into_iter()
        .map(|(leaf, tool)| (leaf.to_string(), tool.to_string()))
        .collect();

        Self {
            stats_backend: "nba".to_string(),
            search_backend: "search".to_string(),
            leaf_tools,
        }
    }
}

/// Exponential backoff for leaf data fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    pub multiplier: u32,

    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            multiplier: 2,
            min_delay_ms: 4_000,
            max_delay_ms: 30_000,
        }
    }
}

/// JSONL run trace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("logs"),
        }
    }
}
