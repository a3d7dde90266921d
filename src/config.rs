use crate::contexts::{PipelineSettings, Role};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the application config
pub const DEFAULT_CONFIG_PATH: &str = "ava.yml";

/// Errors that can occur while loading `ava.yml`
#[derive(Debug)]
pub enum ConfigError {
    Read(PathBuf, std::io::Error),
    Parse(PathBuf, serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Read(path, e) => write!(f, "Failed to read {}: {}", path.display(), e),
            ConfigError::Parse(path, e) => write!(f, "Invalid config {}: {}", path.display(), e),
            ConfigError::Invalid(details) => write!(f, "Invalid config: {}", details),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Connection details for one OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Environment variable holding the API key; local servers need none
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    fn new(base_url: &str, api_key_env: Option<&str>) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key_env: api_key_env.map(str::to_string),
        }
    }

    /// Reads the API key from the environment, if one is configured and set
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|key| !key.trim().is_empty())
    }
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    BTreeMap::from([
        (
            "openai".to_string(),
            ProviderConfig::new("https://api.openai.com/v1", Some("OPENAI_API_KEY")),
        ),
        (
            "deepseek".to_string(),
            ProviderConfig::new("https://api.deepseek.com/v1", Some("DEEPSEEK_API_KEY")),
        ),
        (
            "ollama".to_string(),
            ProviderConfig::new("http://localhost:11434/v1", None),
        ),
    ])
}

/// Application settings, all optional in the file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub max_attempts: usize,
    pub escalation_role: Role,
    pub inter_file_delay_ms: u64,
    pub roles_path: PathBuf,
    pub prompts_dir: PathBuf,
    pub cache_dir: Option<String>,
    /// Merged over the built-in providers, so listing one does not drop the others
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            escalation_role: Role::Reviewer,
            inter_file_delay_ms: 0,
            roles_path: PathBuf::from("agents/role_model_registry.yml"),
            prompts_dir: PathBuf::from("prompts"),
            cache_dir: None,
            providers: default_providers(),
        }
    }
}

impl AppConfig {
    /// Loads the config at `path`.
    ///
    /// A missing file yields the defaults unless the path was given
    /// explicitly, in which case it must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !explicit && !path.exists() {
            tracing::debug!("No {} found, using default configuration", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path, inner),
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;

        let mut providers = default_providers();
        providers.append(&mut config.providers);
        config.providers = providers;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        if self.escalation_role == Role::Coder {
            return Err(ConfigError::Invalid(
                "escalation_role must differ from the coder role".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_attempts: self.max_attempts,
            escalation_role: self.escalation_role,
            inter_file_delay: Duration::from_millis(self.inter_file_delay_ms),
        }
    }
}
