//! Configuration for the workflow manager
//!
//! Loaded from a TOML file. Every section has defaults, so an empty file (or no file at
//! all) yields the stock four-stage workflow with the default client settings.

use crate::protocol::{AgentRegistration, AgentType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    /// Agents registered at startup
    #[serde(default)]
    pub agents: Vec<AgentRegistration>,
}

/// Front door listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

/// Remote call client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// Timeout for calls whose stage does not override it
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Total attempts per service call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Environment variable holding the bearer credential sent to agents
    pub api_key_env: Option<String>,
    /// Model label placed in every service request
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            api_key_env: None,
            model: default_model(),
        }
    }
}

impl ClientSection {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_model() -> String {
    "workflow-1.0".to_string()
}

/// Workflow stage list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSection {
    #[serde(default = "default_stages")]
    pub stages: Vec<StageDefinition>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            stages: default_stages(),
        }
    }
}

/// One stage of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageDefinition {
    pub agent_type: AgentType,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Per-call timeout; the client default applies when unset
    pub timeout_secs: Option<u64>,
    /// Agent set chosen at runtime from the MISSION reply
    #[serde(default)]
    pub dynamic_routing: bool,
    /// This stage's reply becomes the final output
    #[serde(default)]
    pub is_final: bool,
}

impl StageDefinition {
    pub fn new(agent_type: AgentType, timeout_secs: u64) -> Self {
        Self {
            agent_type,
            required: true,
            timeout_secs: Some(timeout_secs),
            dynamic_routing: agent_type == AgentType::Function,
            is_final: agent_type == AgentType::Checker,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_required() -> bool {
    true
}

/// SESSION 5s, MISSION 10s, FUNCTION 15s (dynamic), CHECKER 5s (final)
pub fn default_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(AgentType::Session, 5),
        StageDefinition::new(AgentType::Mission, 10),
        StageDefinition::new(AgentType::Function, 15),
        StageDefinition::new(AgentType::Checker, 5),
    ]
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WorkflowConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.client.max_retries == 0 {
            return Err(ConfigError::InvalidConfig(
                "client.max_retries must be at least 1".to_string(),
            ));
        }
        if self.client.default_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "client.default_timeout_secs must be non-zero".to_string(),
            ));
        }
        validate_stages(&self.workflow.stages)
    }

    /// Get the agent bearer credential from the configured environment variable
    ///
    /// Returns `Ok(None)` when no variable is configured.
    pub fn get_agent_api_key(&self) -> Result<Option<String>, ConfigError> {
        match &self.client.api_key_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }

    /// Look up the stage bound to an agent type
    pub fn stage(&self, agent_type: AgentType) -> Option<&StageDefinition> {
        self.workflow
            .stages
            .iter()
            .find(|stage| stage.agent_type == agent_type)
    }
}

/// Stages must be SESSION, MISSION, FUNCTION, CHECKER in that order
pub fn validate_stages(stages: &[StageDefinition]) -> Result<(), ConfigError> {
    let types: Vec<AgentType> = stages.iter().map(|stage| stage.agent_type).collect();
    if types != AgentType::ALL {
        return Err(ConfigError::InvalidWorkflow(format!(
            "stages must be SESSION, MISSION, FUNCTION, CHECKER in order, got {}",
            types
                .iter()
                .map(AgentType::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    for stage in stages {
        if stage.dynamic_routing && stage.agent_type != AgentType::Function {
            return Err(ConfigError::InvalidWorkflow(format!(
                "only the FUNCTION stage may use dynamic routing, not {}",
                stage.agent_type
            )));
        }
        if stage.is_final && stage.agent_type != AgentType::Checker {
            return Err(ConfigError::InvalidWorkflow(format!(
                "only the CHECKER stage may be final, not {}",
                stage.agent_type
            )));
        }
        if stage.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidWorkflow(format!(
                "{} stage timeout must be non-zero",
                stage.agent_type
            )));
        }
    }

    Ok(())
}
