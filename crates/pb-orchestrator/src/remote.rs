//! Remote dispatch over ssh
//!
//! Every remote operation is a single non-interactive ssh command
//! (`BatchMode=yes`, no tty). The remote side runs its own copy of the
//! orchestration entry point against its own registry, so tool options are
//! never sent over the wire.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use pb_core::config::ToolsConfig;
use pb_core::error::ToolError;
use pb_core::types::Action;

use crate::exec::{check_status, shell_join};

/// Runs commands on remote hosts
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    ssh_command: String,
    ssh_opts: Vec<String>,
    connect_timeout: Option<Duration>,
    remote_command: String,
}

impl RemoteDispatcher {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            ssh_command: config.ssh_command.clone(),
            ssh_opts: config.ssh_opts.clone(),
            connect_timeout: config.connect_timeout,
            remote_command: config.remote_command.clone(),
        }
    }

    /// Build the ssh command for `argv` on `host`
    fn ssh(&self, host: &str, argv: &[String]) -> (Command, String) {
        let remote_line = shell_join(argv);
        let mut cmd = Command::new(&self.ssh_command);
        cmd.args(&self.ssh_opts).args(["-o", "BatchMode=yes"]);
        if let Some(timeout) = self.connect_timeout {
            cmd.arg("-o")
                .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }
        cmd.arg("-T").arg(host).arg(&remote_line).stdin(Stdio::null());

        let description = format!("{} {} {}", self.ssh_command, host, remote_line);
        (cmd, description)
    }

    /// Run the orchestration `action` for `group`/`dir` on `host`
    pub async fn invoke(
        &self,
        host: &str,
        group: &str,
        dir: &Path,
        action: Action,
    ) -> Result<(), ToolError> {
        let argv = vec![
            self.remote_command.clone(),
            action.to_string(),
            format!("--group={}", group),
            format!("--dir={}", dir.display()),
        ];
        tracing::info!("Running {} for group {} on {}", action, group, host);
        self.run_remote(host, &argv).await
    }

    /// Run `argv` on `host` and wait for it
    pub async fn run_remote(&self, host: &str, argv: &[String]) -> Result<(), ToolError> {
        let (mut cmd, description) = self.ssh(host, argv);
        tracing::debug!("{}", description);

        let status = cmd.status().await.map_err(|source| ToolError::Spawn {
            command: description.clone(),
            source,
        })?;
        check_status(&description, status)
    }

    /// Run `argv` on `host` and return its standard output
    pub async fn capture_remote(&self, host: &str, argv: &[String]) -> Result<String, ToolError> {
        let (mut cmd, description) = self.ssh(host, argv);
        tracing::debug!("{}", description);

        let output = cmd
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                command: description.clone(),
                source,
            })?;
        check_status(&description, output.status)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Start `argv` on `host` with its standard output piped back to us
    pub fn spawn_remote(&self, host: &str, argv: &[String]) -> Result<(Child, String), ToolError> {
        let (mut cmd, description) = self.ssh(host, argv);
        tracing::debug!("{}", description);

        let child = cmd
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                command: description.clone(),
                source,
            })?;
        Ok((child, description))
    }
}
