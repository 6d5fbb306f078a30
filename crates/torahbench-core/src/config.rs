use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_DESCRIPTOR_FILES;

pub const DEFAULT_CONFIG_FILE: &str = "torahbench.yaml";

/// Settings shared by the CLI, the loader and the bundled packages.
///
/// Loaded from YAML; every field has a default so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorahBenchConfig {
    pub packages_root: PathBuf,
    pub descriptor_files: Vec<String>,
    pub targets: TargetsConfig,
    pub anthropic: AnthropicConfig,
    pub judge: JudgeConfig,
    pub run: RunConfig,
}

impl Default for TorahBenchConfig {
    fn default() -> Self {
        Self {
            packages_root: PathBuf::from("packages"),
            descriptor_files: DEFAULT_DESCRIPTOR_FILES.iter().map(|s| s.to_string()).collect(),
            targets: TargetsConfig::default(),
            anthropic: AnthropicConfig::default(),
            judge: JudgeConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl TorahBenchConfig {
    /// Load `path` if given (it must exist), else `torahbench.yaml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub anthropic_api: HttpTargetConfig,
    pub ituria_api: HttpTargetConfig,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            anthropic_api: HttpTargetConfig {
                url: "http://localhost:8334/chat".to_string(),
                timeout_secs: 300,
            },
            ituria_api: HttpTargetConfig {
                url: "http://localhost:8333/chat".to_string(),
                timeout_secs: 1200,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTargetConfig {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl HttpTargetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub const SONNET_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const HAIKU_MODEL: &str = "claude-3-haiku-20240307";

/// Settings for the `anthropic` implementation, which calls the Messages API
/// without going through an answer server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// `sonnet`, `haiku` or a full model id
    pub model: String,
    pub max_tokens: u32,
    pub api_key_env: String,
    pub base_url: Option<String>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: "sonnet".to_string(),
            max_tokens: 1000,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
        }
    }
}

impl AnthropicConfig {
    /// Resolve the `sonnet` / `haiku` shorthands to model ids.
    pub fn model_id(&self) -> &str {
        match self.model.as_str() {
            "sonnet" => SONNET_MODEL,
            "haiku" => HAIKU_MODEL,
            other => other,
        }
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

/// LLM-as-judge scorer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Environment variable holding the Anthropic API key
    pub api_key_env: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

impl JudgeConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub concurrency: usize,
    pub scorers: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            scorers: vec!["levenshtein".to_string()],
        }
    }
}
