//! pbench-tools: command-line interface for tool-group orchestration
//!
//! Provides the `pbench-tools` CLI that drives registered benchmark tools
//! on this host and on remote hosts.

pub mod commands;
pub mod output;
