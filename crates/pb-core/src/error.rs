//! Core error types for pbench tool orchestration

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for tool-group orchestration
#[derive(Error, Debug)]
pub enum PbError {
    /// A required input is missing or unusable; nothing was run
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Tool sub-task error
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Remote transfer error
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors detected before any sub-task is started
#[derive(Error, Debug)]
pub enum PreconditionError {
    /// No output directory given
    #[error("Missing required output directory")]
    MissingDirectory,

    /// Output directory is absent and could not be created
    #[error("Cannot create output directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Tool group has no registry directory
    #[error("Tool group not found: {0}")]
    GroupNotFound(String),

    /// Group name is empty or contains a path separator
    #[error("Invalid group name: {0:?}")]
    InvalidGroup(String),
}

/// Errors raised while reading or changing the tool registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Tool name is not usable as a registry entry
    #[error("Invalid tool name: {0:?}")]
    InvalidToolName(String),

    /// Tool is reserved metadata, not a tool
    #[error("{0:?} is a reserved name")]
    Reserved(String),

    /// Tool is not registered in the group
    #[error("Tool {tool} is not registered in group {group}")]
    NotRegistered { group: String, tool: String },

    /// I/O failure on the registry directory
    #[error("Registry I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from a single local or remote tool sub-task
#[derive(Error, Debug)]
pub enum ToolError {
    /// Session directory or log file could not be created
    #[error("Failed to prepare session for {tool}: {source}")]
    SessionSetup {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Process could not be spawned
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully
    #[error("{command} exited with status {status}")]
    Exited { command: String, status: i32 },

    /// Process was terminated by a signal
    #[error("{command} was terminated by a signal")]
    Signalled { command: String },

    /// Signalling a session failed
    #[error("Failed to signal session {name} (pid {pid}): {source}")]
    Signal {
        name: String,
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Errors pulling remote tool data back to the local host
#[derive(Error, Debug)]
pub enum TransferError {
    /// Archive stream failed
    #[error("Archive transfer from {host} failed: {reason}")]
    Archive { host: String, reason: String },

    /// Remote copy could not be removed after a successful transfer
    #[error("Failed to remove remote data on {host}: {reason}")]
    RemoteCleanup { host: String, reason: String },

    /// Local directory bookkeeping failed
    #[error("Local I/O on {path:?} failed: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
