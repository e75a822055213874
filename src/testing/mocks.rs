//! Mock implementations for testing
//!
//! [`MockAgentTransport`] answers service calls from a per-agent script and records
//! every request, so the workflow driver can be exercised without any HTTP server.

use crate::error::{WorkflowError, WorkflowResult};
use crate::protocol::{AgentDescriptor, AgentReply, ServiceRequest};
use crate::transport::AgentTransport;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded service call: agent name, payload and the timeout it was given
pub type RecordedCall = (String, ServiceRequest, Option<Duration>);

#[derive(Debug, Clone)]
enum Scripted {
    Reply(AgentReply),
    Fail(String),
}

/// Scripted in-process transport
#[derive(Debug, Default)]
pub struct MockAgentTransport {
    scripts: HashMap<String, Scripted>,
    unhealthy: Vec<String>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    should_fail: bool,
    closed: AtomicBool,
}

impl MockAgentTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every service call fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Answer calls to `agent` with `reply`
    pub fn with_reply(mut self, agent: impl Into<String>, reply: AgentReply) -> Self {
        self.scripts.insert(agent.into(), Scripted::Reply(reply));
        self
    }

    /// Answer calls to `agent` with a single assistant choice
    pub fn with_content(self, agent: impl Into<String>, content: impl Into<String>) -> Self {
        self.with_reply(agent, AgentReply::assistant(content))
    }

    /// Answer calls to a MISSION agent with a `target_agents` list
    pub fn with_targets(self, agent: impl Into<String>, targets: &[&str]) -> Self {
        self.with_content(agent, json!({ "target_agents": targets }).to_string())
    }

    /// Fail calls to `agent` as if retries were exhausted
    pub fn with_failing_agent(
        mut self,
        agent: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.scripts.insert(agent.into(), Scripted::Fail(message.into()));
        self
    }

    /// Report `agent` as unhealthy
    pub fn with_unhealthy(mut self, agent: impl Into<String>) -> Self {
        self.unhealthy.push(agent.into());
        self
    }

    pub async fn get_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Names of the agents called, in call order
    pub async fn called_agents(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    /// Payload of the first call made to `agent`
    pub async fn request_for(&self, agent: &str) -> Option<ServiceRequest> {
        self.calls
            .lock()
            .await
            .iter()
            .find(|(name, _, _)| name == agent)
            .map(|(_, request, _)| request.clone())
    }

    pub async fn clear_history(&self) {
        self.calls.lock().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AgentTransport for MockAgentTransport {
    async fn check_health(&self, agent: &AgentDescriptor) -> bool {
        !self.should_fail && !self.unhealthy.iter().any(|name| name == agent.name())
    }

    async fn call_service(
        &self,
        agent: &AgentDescriptor,
        request: &ServiceRequest,
        timeout: Option<Duration>,
    ) -> WorkflowResult<AgentReply> {
        self.calls
            .lock()
            .await
            .push((agent.name().to_string(), request.clone(), timeout));

        if self.should_fail {
            return Err(WorkflowError::agent_call_to(
                agent.name(),
                agent.service_endpoint(),
                "mock transport failure",
            ));
        }

        match self.scripts.get(agent.name()) {
            Some(Scripted::Reply(reply)) => Ok(reply.clone()),
            Some(Scripted::Fail(message)) => Err(WorkflowError::agent_call_to(
                agent.name(),
                agent.service_endpoint(),
                message.clone(),
            )),
            None => Err(WorkflowError::agent_call_to(
                agent.name(),
                agent.service_endpoint(),
                "no scripted reply",
            )),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
