//! Agent bookkeeping
//!
//! The registry of remote agents known to the workflow manager.

pub mod registry;

pub use registry::AgentRegistry;
