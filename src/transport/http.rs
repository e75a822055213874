//! HTTP agent client
//!
//! Calls an agent's service endpoint with a bearer credential, a per-attempt timeout
//! and a bounded number of attempts separated by a fixed delay. A reply only counts
//! as a success once it passes [`AgentReply::parse`].

use crate::agent_call_span;
use crate::config::{ConfigError, WorkflowConfig};
use crate::error::{WorkflowError, WorkflowResult};
use crate::protocol::{AgentDescriptor, AgentReply, ServiceRequest};
use crate::transport::AgentTransport;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};

/// Longest error body kept in a failure message
const MAX_ERROR_BODY_LEN: usize = 256;

/// Remote call client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentClientConfig {
    /// Bearer credential; no `Authorization` header is sent when unset
    pub api_key: Option<String>,
    pub default_timeout: Duration,
    /// Total attempts per service call
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl AgentClientConfig {
    /// Build client settings from the `[client]` section, resolving the credential
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: config.get_agent_api_key()?,
            default_timeout: config.client.default_timeout(),
            max_retries: config.client.max_retries,
            retry_delay: config.client.retry_delay(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Why a single attempt failed
#[derive(Debug, Error)]
enum CallFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid reply: {0}")]
    Malformed(String),
}

/// HTTP implementation of [`AgentTransport`]
///
/// The underlying connection pool is created on first use and dropped by
/// [`AgentTransport::close`]; the next call after a close builds a fresh one.
pub struct HttpAgentClient {
    config: AgentClientConfig,
    session: Mutex<Option<Client>>,
}

impl HttpAgentClient {
    pub fn new(config: AgentClientConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AgentClientConfig {
        &self.config
    }

    /// Whether a connection pool is currently held
    pub async fn is_open(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn session(&self) -> WorkflowResult<Client> {
        let mut session = self.session.lock().await;
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder().build().map_err(|e| {
            WorkflowError::agent_call(format!("failed to create HTTP session: {e}"))
        })?;
        debug!("Created agent HTTP session");
        *session = Some(client.clone());
        Ok(client)
    }

    /// One POST to the service endpoint (impure I/O)
    async fn attempt(
        &self,
        client: &Client,
        agent: &AgentDescriptor,
        request: &ServiceRequest,
        timeout: Duration,
    ) -> Result<AgentReply, CallFailure> {
        let mut builder = client
            .post(agent.service_endpoint())
            .header("OpenAI-Beta", "workflow-v1")
            .json(request)
            .timeout(timeout);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            CallFailure::Transport(format!(
                "{e} (is_connect: {}, is_timeout: {})",
                e.is_connect(),
                e.is_timeout()
            ))
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), "Received agent response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallFailure::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_LEN),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CallFailure::Malformed(format!("body is not JSON: {e}")))?;

        AgentReply::parse(body).map_err(|e| CallFailure::Malformed(e.to_string()))
    }
}

#[async_trait]
impl AgentTransport for HttpAgentClient {
    async fn check_health(&self, agent: &AgentDescriptor) -> bool {
        let client = match self.session().await {
            Ok(client) => client,
            Err(e) => {
                warn!(agent = %agent.name(), error = %e, "Health check skipped");
                return false;
            }
        };

        let healthy = match client
            .get(agent.health_endpoint())
            .timeout(self.config.default_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(agent = %agent.name(), error = %e, "Health check request failed");
                false
            }
        };

        debug!(agent = %agent.name(), healthy, "Health check completed");
        healthy
    }

    async fn call_service(
        &self,
        agent: &AgentDescriptor,
        request: &ServiceRequest,
        timeout: Option<Duration>,
    ) -> WorkflowResult<AgentReply> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let max_attempts = self.config.max_retries.max(1);
        let span = agent_call_span!(
            agent = %agent.name(),
            agent_type = %agent.agent_type(),
            endpoint = %agent.service_endpoint()
        );

        async move {
            let client = self.session().await?;
            debug!(
                user_id = %request.user_id,
                current_step = request.current_step,
                messages = request.messages.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Calling agent service"
            );

            let mut last_failure = None;
            for attempt in 1..=max_attempts {
                debug!(attempt, max_attempts, "Agent call attempt");

                match self.attempt(&client, agent, request, timeout).await {
                    Ok(reply) => {
                        if attempt > 1 {
                            info!(attempt, "Agent call succeeded after retry");
                        } else {
                            debug!(attempt, "Agent call succeeded");
                        }
                        return Ok(reply);
                    }
                    Err(failure) => {
                        warn!(attempt, max_attempts, error = %failure, "Agent call attempt failed");
                        last_failure = Some(failure);
                        if attempt < max_attempts {
                            tokio::time::sleep(self.config.retry_delay).await;
                        }
                    }
                }
            }

            let last = last_failure
                .map(|failure| failure.to_string())
                .unwrap_or_else(|| "no attempt was made".to_string());
            error!(max_attempts, error = %last, "All agent call attempts exhausted");
            Err(WorkflowError::agent_call_to(
                agent.name(),
                agent.service_endpoint(),
                format!("all {max_attempts} attempts failed; last error: {last}"),
            ))
        }
        .instrument(span)
        .await
    }

    async fn close(&self) {
        if self.session.lock().await.take().is_some() {
            debug!("Agent HTTP session closed");
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}
