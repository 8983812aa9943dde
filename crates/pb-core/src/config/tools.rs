//! Tool orchestration configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::option_duration_secs;
use crate::types::DEFAULT_GROUP;

/// What to do when a pulled remote directory lands on a name that already
/// exists locally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Replace the existing directory with the incoming one
    #[default]
    PreferIncoming,
    /// Keep the existing directory and discard incoming data
    PreferExisting,
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::PreferIncoming => write!(f, "prefer-incoming"),
            CollisionPolicy::PreferExisting => write!(f, "prefer-existing"),
        }
    }
}

/// Configuration shared by every orchestration component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory holding one executable script per tool
    pub tools_dir: PathBuf,

    /// Directory holding the `tools-<group>` registry directories
    pub registry_dir: PathBuf,

    /// Directory where local session records are kept
    pub session_dir: PathBuf,

    /// Group used when none is given
    pub default_group: String,

    /// Override for the local hostname
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// SSH client binary
    pub ssh_command: String,

    /// Extra options passed to every ssh invocation
    pub ssh_opts: Vec<String>,

    /// SSH connect timeout
    #[serde(
        default,
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub connect_timeout: Option<Duration>,

    /// Orchestration entry point run on remote hosts
    pub remote_command: String,

    /// Maximum number of concurrently running sub-tasks (0 = unbounded)
    pub max_parallel: usize,

    /// Short/full hostname collision handling during remote pulls
    pub collision_policy: CollisionPolicy,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let run_dir = PathBuf::from("/var/lib/pbench-agent");

        Self {
            tools_dir: PathBuf::from("/opt/pbench-agent/tool-scripts"),
            registry_dir: run_dir.clone(),
            session_dir: run_dir.join("sessions"),
            default_group: DEFAULT_GROUP.to_string(),
            hostname: None,
            ssh_command: "ssh".to_string(),
            ssh_opts: vec![
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
            ],
            connect_timeout: None,
            remote_command: "pbench-tools".to_string(),
            max_parallel: 0,
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl ToolsConfig {
    /// Hostname used for local result directories and session keys
    pub fn local_hostname(&self) -> String {
        self.hostname
            .clone()
            .unwrap_or_else(crate::host::local_hostname)
    }

    /// Group name to use, falling back to the configured default
    pub fn group_or_default(&self, group: Option<&str>) -> String {
        match group {
            Some(g) if !g.is_empty() => g.to_string(),
            _ => self.default_group.clone(),
        }
    }
}
