//! Testing utilities and mock implementations
//!
//! Lets the workflow driver and the front door run against scripted agents instead of
//! live HTTP services.

pub mod mocks;

pub use mocks::*;
