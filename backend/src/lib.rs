//! zeekagent host process library
//!
//! Exposes the agent modules for integration testing.

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod schedule_sink;
