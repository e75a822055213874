//! Transport layer for calling remote agents
//!
//! The workflow driver depends on [`AgentTransport`] rather than on a concrete HTTP
//! client, so scripted transports can stand in for real agents in tests.

use crate::error::WorkflowResult;
use crate::protocol::{AgentDescriptor, AgentReply, ServiceRequest};
use std::time::Duration;

pub mod http;

pub use http::{AgentClientConfig, HttpAgentClient};

/// Remote call abstraction over an agent's `health` and `service` endpoints
#[async_trait::async_trait]
pub trait AgentTransport: Send + Sync {
    /// Probe the agent's health endpoint; any failure reads as unhealthy
    async fn check_health(&self, agent: &AgentDescriptor) -> bool;

    /// Invoke the agent's service endpoint and return a validated reply
    ///
    /// `timeout` applies to each attempt; `None` selects the transport default.
    async fn call_service(
        &self,
        agent: &AgentDescriptor,
        request: &ServiceRequest,
        timeout: Option<Duration>,
    ) -> WorkflowResult<AgentReply>;

    /// Release any pooled connection state
    async fn close(&self);
}
