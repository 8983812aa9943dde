//! pb-core: Core abstractions and configuration for pbench tool groups
//!
//! This crate provides the shared domain types, the on-disk tool registry,
//! and the configuration structures used by the orchestrator and the CLI.

pub mod config;
pub mod error;
pub mod host;
pub mod registry;
pub mod types;

pub use error::PbError;
pub use registry::{RegistryWarning, ToolGroup, ToolRegistry};
pub use types::{Action, Locality, ToolEntry, DEFAULT_GROUP};
