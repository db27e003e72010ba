//! Rhai-driven kernel configuration.
//!
//! Evaluates a `branchchat.rhai` script and reads top-level variables out of
//! the resulting scope:
//!
//! ```rhai
//! let endpoint = "http://127.0.0.1:3000/api/claude";
//! let max_tokens = 2000;
//! let tooltip_max_tokens = 150;
//! let root_label = "Start your learning journey";
//! let api_key_env = "ANTHROPIC_API_KEY";
//! ```
//!
//! Every variable is optional. A variable that is present but has the wrong
//! type is an error rather than a silent fallback.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::llm::{DEFAULT_MAX_TOKENS, DEFAULT_TOOLTIP_MAX_TOKENS};

/// Completion endpoint used when the script doesn't name one.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/claude";

/// Placeholder label of the root node before its first exchange.
pub const DEFAULT_ROOT_LABEL: &str = "Start your learning journey";

/// File name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "branchchat.rhai";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config evaluation error: {0}")]
    Eval(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Kernel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Completion service URL.
    pub endpoint: String,
    /// Token budget for conversation replies.
    pub max_tokens: u32,
    /// Token budget for tooltip explanations.
    pub tooltip_max_tokens: u32,
    /// Label the root node starts with.
    pub root_label: String,
    /// Environment variable holding the service API key, if any.
    pub api_key_env: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            tooltip_max_tokens: DEFAULT_TOOLTIP_MAX_TOKENS,
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            api_key_env: None,
        }
    }
}

impl KernelConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Read the API key from `api_key_env`. Unset or empty yields `None`.
    pub fn resolve_api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                tracing::warn!(env = var, "API key variable is unset or empty");
                None
            }
        }
    }
}

/// Parse a `branchchat.rhai` script.
pub fn load_config(script: &str) -> Result<KernelConfig, ConfigError> {
    let engine = rhai::Engine::new();
    let ast = engine
        .compile(script)
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut scope = rhai::Scope::new();
    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| ConfigError::Eval(e.to_string()))?;

    let defaults = KernelConfig::default();
    let config = KernelConfig {
        endpoint: get_string(&scope, "endpoint")?.unwrap_or(defaults.endpoint),
        max_tokens: get_u32(&scope, "max_tokens")?.unwrap_or(defaults.max_tokens),
        tooltip_max_tokens: get_u32(&scope, "tooltip_max_tokens")?
            .unwrap_or(defaults.tooltip_max_tokens),
        root_label: get_string(&scope, "root_label")?.unwrap_or(defaults.root_label),
        api_key_env: get_string(&scope, "api_key_env")?,
    };

    if config.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("endpoint is empty".into()));
    }
    Ok(config)
}

/// Read and parse a config file.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<KernelConfig, ConfigError> {
    let path = path.as_ref();
    let script = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "loading config");
    load_config(&script)
}

fn get_string(scope: &rhai::Scope, name: &str) -> Result<Option<String>, ConfigError> {
    let Some(value) = scope.get(name) else {
        return Ok(None);
    };
    value
        .clone()
        .into_string()
        .map(Some)
        .map_err(|actual| ConfigError::Invalid(format!("`{name}` must be a string, got {actual}")))
}

fn get_u32(scope: &rhai::Scope, name: &str) -> Result<Option<u32>, ConfigError> {
    let Some(value) = scope.get(name) else {
        return Ok(None);
    };
    let n = value
        .as_int()
        .map_err(|actual| ConfigError::Invalid(format!("`{name}` must be an integer, got {actual}")))?;
    match u32::try_from(n) {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::Invalid(format!("`{name}` out of range: {n}"))),
    }
}
