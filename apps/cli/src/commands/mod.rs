//! Command implementations for the Relay CLI.

pub mod tasks;
pub mod workflow;
