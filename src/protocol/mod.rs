//! Message types exchanged with remote agents and with the front door
//!
//! Agents speak a chat-completion shaped contract: a request carrying the running
//! conversation and workflow data, and a reply carrying choices and usage counters.

pub mod messages;

pub use messages::*;
