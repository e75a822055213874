//! Workflow Manager
//!
//! Routes one incoming user message through a fixed chain of remote agents and
//! aggregates their replies into a single result.
//!
//! # Overview
//!
//! - [`agent::AgentRegistry`]: thread-safe registry of SESSION, MISSION, FUNCTION and
//!   CHECKER agents
//! - [`transport::HttpAgentClient`]: service calls with bounded retries and per-call
//!   timeouts behind the [`transport::AgentTransport`] trait
//! - [`workflow::WorkflowService`]: the pipeline driver, including the dynamic fan-out
//!   to the FUNCTION agents chosen by MISSION
//! - [`server`]: warp front door for message intake and agent administration
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use workflow_manager::agent::AgentRegistry;
//! use workflow_manager::protocol::{AgentDescriptor, AgentType};
//! use workflow_manager::transport::{AgentClientConfig, HttpAgentClient};
//! use workflow_manager::workflow::WorkflowService;
//!
//! let registry = Arc::new(AgentRegistry::new());
//! registry
//!     .register(
//!         AgentDescriptor::from_urls(
//!             "session",
//!             AgentType::Session,
//!             "http://127.0.0.1:8001/health",
//!             "http://127.0.0.1:8001/service",
//!         )
//!         .unwrap(),
//!     )
//!     .unwrap();
//!
//! let client = HttpAgentClient::new(AgentClientConfig::default());
//! let service = WorkflowService::new(registry, Arc::new(client));
//! assert_eq!(service.stages().len(), 4);
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod testing;
pub mod transport;
pub mod workflow;

pub use agent::AgentRegistry;
pub use config::{ConfigError, StageDefinition, WorkflowConfig};
pub use error::{WorkflowError, WorkflowResult};
pub use protocol::*;
pub use transport::{AgentClientConfig, AgentTransport, HttpAgentClient};
pub use workflow::{WorkflowContext, WorkflowService};
