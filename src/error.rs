//! Error types for the workflow manager
//!
//! Every failure the core can produce is a variant of [`WorkflowError`]. The front door
//! maps variants to HTTP statuses through [`WorkflowError::to_error_response`].

use crate::config::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret|bearer)([=:]\s*|\s+)\S+")
        .expect("secret pattern is a valid regex")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is a valid regex")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Main error type for registry, agent calls and workflow runs
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Agent not found: {name}")]
    NotFound { name: String },

    #[error("Agent already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Invalid agent descriptor: {message}")]
    InvalidDescriptor { message: String },

    #[error("Agent call failed{}: {message}", describe_target(.agent, .endpoint))]
    AgentCall {
        agent: Option<String>,
        endpoint: Option<String>,
        message: String,
    },

    #[error("Malformed agent reply: {message}")]
    MalformedReply { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn describe_target(agent: &Option<String>, endpoint: &Option<String>) -> String {
    match (agent, endpoint) {
        (Some(agent), Some(endpoint)) => format!(" [agent: {agent}, endpoint: {endpoint}]"),
        (Some(agent), None) => format!(" [agent: {agent}]"),
        (None, Some(endpoint)) => format!(" [endpoint: {endpoint}]"),
        (None, None) => String::new(),
    }
}

/// Error body returned to front-door clients
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: u16,
    /// Always `"error"`; serialized as `status`
    #[serde(rename = "status")]
    pub status_text: &'static str,
    pub message: String,
}

impl WorkflowError {
    /// Map this error to an HTTP status and a sanitized message
    pub fn to_error_response(&self) -> ErrorResponse {
        let status = match self {
            WorkflowError::NotFound { .. } => 404,
            WorkflowError::AlreadyExists { .. } => 409,
            WorkflowError::InvalidDescriptor { .. } | WorkflowError::InvalidInput { .. } => 400,
            WorkflowError::AgentCall { .. } | WorkflowError::MalformedReply { .. } => 502,
            WorkflowError::Config(_) => 500,
        };

        ErrorResponse {
            status,
            status_text: "error",
            message: sanitize_error_message(&self.to_string()),
        }
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create already exists error
    pub fn already_exists<S: Into<String>>(name: S) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Create invalid descriptor error
    pub fn invalid_descriptor<S: Into<String>>(message: S) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Create an agent call error that is not tied to a specific agent
    pub fn agent_call<S: Into<String>>(message: S) -> Self {
        Self::AgentCall {
            agent: None,
            endpoint: None,
            message: message.into(),
        }
    }

    /// Create an agent call error annotated with the agent and endpoint
    pub fn agent_call_to<A, E, S>(agent: A, endpoint: E, message: S) -> Self
    where
        A: Into<String>,
        E: Into<String>,
        S: Into<String>,
    {
        Self::AgentCall {
            agent: Some(agent.into()),
            endpoint: Some(endpoint.into()),
            message: message.into(),
        }
    }

    /// Create malformed reply error
    pub fn malformed_reply<S: Into<String>>(message: S) -> Self {
        Self::MalformedReply {
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Redact credentials and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_produce_expected_variants() {
        assert!(matches!(
            WorkflowError::not_found("x"),
            WorkflowError::NotFound { .. }
        ));
        assert!(matches!(
            WorkflowError::already_exists("x"),
            WorkflowError::AlreadyExists { .. }
        ));
        assert!(matches!(
            WorkflowError::malformed_reply("x"),
            WorkflowError::MalformedReply { .. }
        ));
        assert!(matches!(
            WorkflowError::invalid_input("x"),
            WorkflowError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_agent_call_display_includes_target() {
        let error = WorkflowError::agent_call_to(
            "calculator",
            "http://localhost:8003/service",
            "status 500",
        );
        assert_eq!(
            error.to_string(),
            "Agent call failed [agent: calculator, endpoint: http://localhost:8003/service]: status 500"
        );

        let error = WorkflowError::agent_call("no SESSION agent");
        assert_eq!(error.to_string(), "Agent call failed: no SESSION agent");
    }

    #[test]
    fn test_error_response_status_mapping() {
        assert_eq!(WorkflowError::not_found("a").to_error_response().status, 404);
        assert_eq!(
            WorkflowError::already_exists("a").to_error_response().status,
            409
        );
        assert_eq!(
            WorkflowError::invalid_descriptor("a")
                .to_error_response()
                .status,
            400
        );
        assert_eq!(
            WorkflowError::agent_call("a").to_error_response().status,
            502
        );
        assert_eq!(
            WorkflowError::malformed_reply("a").to_error_response().status,
            502
        );
    }

    #[test]
    fn test_error_response_is_sanitized() {
        let error = WorkflowError::agent_call("auth rejected: token=abc123 password: hunter2");
        let response = error.to_error_response();

        assert!(!response.message.contains("abc123"));
        assert!(!response.message.contains("hunter2"));
        assert!(response.message.contains("token=***"));
    }

    #[test]
    fn test_error_response_body_shape() {
        let response = WorkflowError::not_found("ghost").to_error_response();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "Agent not found: ghost");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_sanitize_bearer_credentials() {
        let sanitized = sanitize_error_message("header was Bearer sk-live-123");
        assert!(!sanitized.contains("sk-live-123"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized =
            sanitize_error_message("Failed to read /home/user/.ssh/id_rsa and /etc/secrets/api");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("/home/user/.ssh/id_rsa"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));

        let multibyte = "智".repeat(300);
        let sanitized = sanitize_error_message(&multibyte);
        assert!(sanitized.len() <= 500);
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let message = "x".repeat(500);
        assert_eq!(sanitize_error_message(&message), message);
    }
}
