//! Configuration management for consilium
//!
//! Settings are loaded from environment variables with defaults; the CLI
//! layers its flags on top.
//!
//! # Environment Variables
//!
//! - `CONSILIUM_PROVIDER`: ollama|openai|claude|gemini|grok|groq|http - default: "ollama"
//! - `CONSILIUM_MODEL`: model name - default: per-provider
//! - `CONSILIUM_API_URL`: endpoint of the `http` provider
//! - `CONSILIUM_API_TOKEN`: bearer token of the `http` provider
//! - `CONSILIUM_REQUEST_TIMEOUT`: seconds - default: "120"
//! - `CONSILIUM_STEPS_FILE`: step universe YAML - default: built-in
//! - `CONSILIUM_LOG_LEVEL`: trace|debug|info|warn|error - default: "info"
//! - `CONSILIUM_AGGREGATE_ON_CANCEL`: true|false - default: "false"
//!
//! Provider credentials (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `OLLAMA_HOST`,
//! ...) are read directly by the genai library.

use crate::llm::BackendError;
use crate::workflow::{StepRegistry, WorkflowError};
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, claude, gemini, grok, groq, http")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Step universe error: {0}")]
    StepUniverse(#[from] WorkflowError),

    #[error("Backend initialization failed: {0}")]
    BackendInitError(#[from] BackendError),
}

/// Which generation backend serves the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GenAI(AdapterKind),
    /// NDJSON streaming endpoint at `CONSILIUM_API_URL`
    Http,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::GenAI(AdapterKind::Ollama)),
            "openai" => Ok(Provider::GenAI(AdapterKind::OpenAI)),
            "claude" | "anthropic" => Ok(Provider::GenAI(AdapterKind::Anthropic)),
            "gemini" => Ok(Provider::GenAI(AdapterKind::Gemini)),
            "grok" | "xai" => Ok(Provider::GenAI(AdapterKind::Xai)),
            "groq" => Ok(Provider::GenAI(AdapterKind::Groq)),
            "http" => Ok(Provider::Http),
            other => Err(ConfigError::InvalidProvider(other.to_string())),
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::GenAI(AdapterKind::Ollama) => "llama3.2-vision",
            Provider::GenAI(AdapterKind::OpenAI) => "gpt-4o-mini",
            Provider::GenAI(AdapterKind::Anthropic) => "claude-3-5-sonnet-latest",
            Provider::GenAI(AdapterKind::Gemini) => "gemini-2.0-flash",
            Provider::GenAI(AdapterKind::Xai) => "grok-2-vision-latest",
            Provider::GenAI(AdapterKind::Groq) => "llama-3.3-70b-versatile",
            Provider::GenAI(_) => "default-model",
            Provider::Http => "remote",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::GenAI(kind) => write!(f, "{}", kind.as_str()),
            Provider::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsiliumConfig {
    pub provider: Provider,
    pub model: String,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub steps_file: Option<PathBuf>,
    pub log_level: String,
    pub aggregate_on_cancel: bool,
}

impl Default for ConsiliumConfig {
    fn default() -> Self {
        let provider = env::var("CONSILIUM_PROVIDER")
            .ok()
            .and_then(|s| Provider::parse(&s).ok())
            .unwrap_or(Provider::GenAI(AdapterKind::Ollama));

        let model = env::var("CONSILIUM_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());

        let request_timeout_secs = env::var("CONSILIUM_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let log_level = env::var("CONSILIUM_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let aggregate_on_cancel = env::var("CONSILIUM_AGGREGATE_ON_CANCEL")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            provider,
            model,
            api_url: env::var("CONSILIUM_API_URL").ok(),
            api_token: env::var("CONSILIUM_API_TOKEN").ok(),
            request_timeout_secs,
            steps_file: env::var("CONSILIUM_STEPS_FILE").ok().map(PathBuf::from),
            log_level,
            aggregate_on_cancel,
        }
    }
}

impl ConsiliumConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 1 hour".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if self.provider == Provider::Http
            && self.api_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(ConfigError::ValidationFailed(
                "The http provider requires CONSILIUM_API_URL".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Model name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Step universe from `steps_file`, or the built-in one
    pub fn load_registry(&self) -> Result<StepRegistry, ConfigError> {
        let registry = match &self.steps_file {
            Some(path) => StepRegistry::from_file(path)?,
            None => StepRegistry::builtin()?,
        };
        Ok(registry)
    }

    pub fn to_display_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();

        map.insert("provider".to_string(), self.provider.to_string());
        map.insert("model".to_string(), self.model.clone());
        if let Some(ref url) = self.api_url {
            map.insert("api_url".to_string(), url.clone());
        }
        map.insert(
            "api_token".to_string(),
            if self.api_token.is_some() { "set" } else { "unset" }.to_string(),
        );
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        if let Some(ref path) = self.steps_file {
            map.insert("steps_file".to_string(), path.display().to_string());
        }
        map.insert("log_level".to_string(), self.log_level.clone());
        map.insert(
            "aggregate_on_cancel".to_string(),
            self.aggregate_on_cancel.to_string(),
        );

        map
    }
}

impl fmt::Display for ConsiliumConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Consilium Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider)?;
        writeln!(f, "  Model: {}", self.model)?;
        if let Some(ref url) = self.api_url {
            writeln!(f, "  API URL: {}", url)?;
        }
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        match self.steps_file {
            Some(ref path) => writeln!(f, "  Steps File: {}", path.display())?,
            None => writeln!(f, "  Steps File: (built-in)")?,
        }
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Aggregate On Cancel: {}", self.aggregate_on_cancel)?;
        Ok(())
    }
}
