//! Process configuration.
//!
//! Settings come from an optional YAML file with environment variables
//! layered on top:
//!
//! - `CHAT_MODEL` - Azure deployment name
//! - `AZURE_OPENAI_KEY` - API key
//! - `AZURE_OPENAI_ENDPOINT` - resource endpoint, e.g. `https://x.openai.azure.com`
//! - `AZURE_OPENAI_API_VERSION` - REST API version
//! - `CHAT_CONFIG` - path of the YAML file (read by the binary)
//!
//! Everything else (`system_prompt`, `exit_sentinel`, `max_call_rounds`, ...)
//! is file-only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::LoopSettings;
use crate::llms::{ExecutionSettings, FunctionChoiceBehavior};

pub const ENV_DEPLOYMENT: &str = "CHAT_MODEL";
pub const ENV_API_KEY: &str = "AZURE_OPENAI_KEY";
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const ENV_CONFIG_PATH: &str = "CHAT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid setting '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// All process-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub deployment: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub api_version: String,
    pub system_prompt: Option<String>,
    /// Input line that ends the session.
    pub exit_sentinel: String,
    /// Maximum consecutive tool-call rounds per user turn.
    pub max_call_rounds: usize,
    pub completion_timeout_secs: Option<u64>,
    pub max_retries: u32,
    pub temperature: Option<f64>,
    pub function_choice: FunctionChoiceBehavior,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deployment: None,
            api_key: None,
            endpoint: None,
            api_version: crate::llms::providers::azure::DEFAULT_API_VERSION.to_string(),
            system_prompt: None,
            exit_sentinel: "exit".to_string(),
            max_call_rounds: 8,
            completion_timeout_secs: None,
            max_retries: 2,
            temperature: None,
            function_choice: FunctionChoiceBehavior::Auto,
        }
    }
}

impl Settings {
    /// Settings from the process environment only.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env(|name| std::env::var(name).ok());
        settings
    }

    /// Settings from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// File settings (if a path is given) with the environment layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                log::info!("Loading settings from {}", path.display());
                Self::from_yaml_file(path)?
            }
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Overlay values from an environment lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_DEPLOYMENT) {
            self.deployment = Some(v);
        }
        if let Some(v) = get(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = get(ENV_ENDPOINT) {
            self.endpoint = Some(v);
        }
        if let Some(v) = get(ENV_API_VERSION) {
            self.api_version = v;
        }
    }

    /// Check that everything needed to reach the service is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().map_or(false, |v| !v.trim().is_empty())
        }
        if !present(&self.deployment) {
            return Err(ConfigError::Missing(ENV_DEPLOYMENT));
        }
        if !present(&self.api_key) {
            return Err(ConfigError::Missing(ENV_API_KEY));
        }
        if !present(&self.endpoint) {
            return Err(ConfigError::Missing(ENV_ENDPOINT));
        }
        if self.max_call_rounds == 0 {
            return Err(ConfigError::Invalid {
                name: "max_call_rounds",
                reason: "must be at least 1".into(),
            });
        }
        if self.exit_sentinel.is_empty() {
            return Err(ConfigError::Invalid {
                name: "exit_sentinel",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Per-request settings handed to the completion client.
    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            function_choice: self.function_choice,
            temperature: self.temperature,
            max_tokens: None,
        }
    }

    /// Settings for the chat loop.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            exit_sentinel: self.exit_sentinel.clone(),
            max_call_rounds: self.max_call_rounds,
            completion_timeout: self.completion_timeout_secs.map(Duration::from_secs),
            execution: self.execution_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.exit_sentinel, "exit");
        assert_eq!(s.max_call_rounds, 8);
        assert_eq!(s.api_version, "2024-02-01");
        assert_eq!(s.function_choice, FunctionChoiceBehavior::Auto);
    }

    #[test]
    fn test_apply_env() {
        let mut s = Settings::default();
        s.apply_env(env(&[
            (ENV_DEPLOYMENT, "gpt-4o-mini"),
            (ENV_API_KEY, "secret"),
            (ENV_ENDPOINT, "https://x.openai.azure.com"),
            (ENV_API_VERSION, " "),
        ]));
        assert_eq!(s.deployment.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(s.api_key.as_deref(), Some("secret"));
        assert_eq!(s.api_version, "2024-02-01");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing() {
        let mut s = Settings::default();
        assert!(matches!(s.validate(), Err(ConfigError::Missing(ENV_DEPLOYMENT))));
        s.deployment = Some("d".into());
        assert!(matches!(s.validate(), Err(ConfigError::Missing(ENV_API_KEY))));
        s.api_key = Some("k".into());
        assert!(matches!(s.validate(), Err(ConfigError::Missing(ENV_ENDPOINT))));
        s.endpoint = Some("e".into());
        s.max_call_rounds = 0;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "deployment: gpt-4o\nsystem_prompt: You control the lights.\nmax_call_rounds: 3\ncompletion_timeout_secs: 30\nfunction_choice: required"
        )
        .unwrap();

        let s = Settings::from_yaml_file(file.path()).unwrap();
        assert_eq!(s.deployment.as_deref(), Some("gpt-4o"));
        assert_eq!(s.max_call_rounds, 3);
        assert_eq!(s.exit_sentinel, "exit");

        let loop_settings = s.loop_settings();
        assert_eq!(loop_settings.max_call_rounds, 3);
        assert_eq!(loop_settings.completion_timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            loop_settings.execution.function_choice,
            FunctionChoiceBehavior::Required
        );
    }

    #[test]
    fn test_yaml_errors() {
        let missing = Settings::from_yaml_file(Path::new("/nonexistent/chat.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_call_rounds: [not a number").unwrap();
        let malformed = Settings::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(malformed, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Settings::from_yaml_str("  \n").unwrap(), Settings::default());
    }
}
