//! Observability for the workflow manager
//!
//! Structured logging setup, span macros and the run metrics collector.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{MetricsSnapshot, RunMetrics, StageCallSnapshot, WorkflowMetrics};

// Span macros for structured logging
pub use logging::{agent_call_span, workflow_span};
