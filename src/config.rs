use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::traversal::TraversalMode;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trace: TraceConfig,
    pub centrala: CentralaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// Engine selection and local storage
#[derive(Debug, Clone, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub mode: TraversalMode,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            mode: TraversalMode::default(),
            db_path: default_db_path(),
            log_level: default_log_level(),
        }
    }
}

/// Grading service: oracle, relational source, and report endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct CentralaConfig {
    pub base_url: String,
    #[serde(default = "default_centrala_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Seed extraction model
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            max_retries: default_max_retries(),
        }
    }
}

/// Frontier mode settings
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierConfig {
    #[serde(default = "default_note_path")]
    pub note_path: String,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_frontier_task")]
    pub task: String,
    /// Scan order for the last-sighting heuristic; empty means expansion order.
    #[serde(default)]
    pub candidate_places: Vec<String>,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            note_path: default_note_path(),
            target: default_target(),
            task: default_frontier_task(),
            candidate_places: Vec::new(),
        }
    }
}

/// Materialized mode settings
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default = "default_graph_task")]
    pub task: String,
    #[serde(default = "default_neighbor_depth")]
    pub neighbor_depth: usize,
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            start: String::new(),
            end: String::new(),
            task: default_graph_task(),
            neighbor_depth: default_neighbor_depth(),
            persist: default_persist(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./entitytrace.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_centrala_key_env() -> String {
    "PERSONAL_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_note_path() -> String {
    "dane/barbara.txt".to_string()
}

fn default_target() -> String {
    "BARBARA".to_string()
}

fn default_frontier_task() -> String {
    "loop".to_string()
}

fn default_graph_task() -> String {
    "connections".to_string()
}

fn default_neighbor_depth() -> usize {
    2
}

fn default_persist() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    ///
    /// Reads `.env` first (optional), then the TOML file named by
    /// `ENTITYTRACE_CONFIG`, falling back to `./config.toml`.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("ENTITYTRACE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validation
    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Settings every binary needs, independent of the traversal mode
    fn validate(&self) -> Result<()> {
        let url = self.centrala_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("centrala.base_url must be http(s), got {}", url.scheme());
        }

        std::env::var(&self.centrala.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                self.centrala.api_key_env
            )
        })?;

        if self.centrala.timeout_secs == 0 {
            anyhow::bail!("centrala.timeout_secs must be greater than 0");
        }

        if self.graph.neighbor_depth == 0 {
            anyhow::bail!("graph.neighbor_depth must be at least 1");
        }

        Ok(())
    }

    /// Mode-specific checks. Call after command-line overrides are applied.
    pub fn validate_for(&self, mode: TraversalMode) -> Result<()> {
        match mode {
            TraversalMode::Frontier => {
                std::env::var(&self.llm.api_key_env).with_context(|| {
                    format!(
                        "Environment variable {} not set; frontier mode needs it for seed extraction.",
                        self.llm.api_key_env
                    )
                })?;
                if self.frontier.target.trim().is_empty() {
                    anyhow::bail!("frontier.target must not be empty");
                }
            }
            TraversalMode::Materialized => {
                if self.graph.start.trim().is_empty() || self.graph.end.trim().is_empty() {
                    anyhow::bail!("graph.start and graph.end must be set in materialized mode");
                }
            }
        }
        Ok(())
    }

    pub fn centrala_url(&self) -> Result<Url> {
        Url::parse(&self.centrala.base_url).with_context(|| {
            format!("centrala.base_url is not a valid URL: {}", self.centrala.base_url)
        })
    }

    pub fn centrala_timeout(&self) -> Duration {
        Duration::from_secs(self.centrala.timeout_secs)
    }

    pub fn db_path(&self) -> &Path {
        &self.trace.db_path
    }
}
