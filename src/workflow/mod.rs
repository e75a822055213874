//! Workflow pipeline
//!
//! [`WorkflowService`] sequences the SESSION, MISSION, FUNCTION and CHECKER stages;
//! [`WorkflowContext`] carries the state of a single run between them.

pub mod context;
pub mod service;

pub use context::WorkflowContext;
pub use service::{
    build_dynamic_prompt, parse_target_agents, WorkflowService, DEFAULT_MODEL,
    NO_FUNCTION_AGENT_MESSAGE,
};
