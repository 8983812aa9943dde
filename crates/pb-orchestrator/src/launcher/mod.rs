//! Local tool launcher
//!
//! Starts each local tool as a detached session: a new process session (and
//! so a new process group) with no controlling terminal, stdin from
//! `/dev/null` and output appended to `<output_dir>/<tool>.log`. The session
//! outlives the invoking process and is tracked in the [`SessionStore`].
//! Launching needs a tokio runtime, which reaps sessions that exit while the
//! launcher's process is still running.

mod session;

#[cfg(unix)]
pub use session::{is_process_alive, signal_group};
pub use session::{SessionHandle, SessionKey, SessionStore};

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use pb_core::error::ToolError;
use pb_core::types::{Action, ToolEntry};

use crate::exec::check_status;

/// How long a terminated session gets before it is killed outright
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting for a session to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Launches and signals local tool sessions
pub struct LocalLauncher {
    tools_dir: PathBuf,
    host: String,
    sessions: SessionStore,
}

impl LocalLauncher {
    /// Create a launcher for tool scripts in `tools_dir`, recording sessions in `session_dir`
    pub fn new(
        tools_dir: impl Into<PathBuf>,
        session_dir: impl Into<PathBuf>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            host: host.into(),
            sessions: SessionStore::new(session_dir),
        }
    }

    /// The session registry
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Session key for a tool of a group on this host
    pub fn key(&self, group: &str, tool: &str) -> SessionKey {
        SessionKey::new(group, tool, self.host.clone())
    }

    fn command_line(&self, group: &str, tool: &ToolEntry, output_dir: &Path, action: Action) -> Vec<String> {
        let mut argv = vec![
            self.tools_dir.join(&tool.name).to_string_lossy().into_owned(),
            action.tool_flag(),
            format!("--group={}", group),
            format!("--dir={}", output_dir.display()),
        ];
        argv.extend(tool.options.iter().cloned());
        argv
    }

    /// Start `tool` as a detached session writing under `output_dir`.
    ///
    /// Returns once the session process exists; it does not wait for the
    /// tool itself.
    pub fn launch(
        &self,
        group: &str,
        tool: &ToolEntry,
        output_dir: &Path,
    ) -> Result<SessionHandle, ToolError> {
        let key = self.key(group, &tool.name);
        let setup_err = |source| ToolError::SessionSetup {
            tool: tool.name.clone(),
            source,
        };

        self.sessions.prepare(group).map_err(setup_err)?;
        fs::create_dir_all(output_dir).map_err(setup_err)?;
        let log_path = output_dir.join(format!("{}.log", tool.name));
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(setup_err)?;
        let log_err = log.try_clone().map_err(setup_err)?;

        let argv = self.command_line(group, tool, output_dir, Action::Start);
        let command = argv.join(" ");
        tracing::debug!("Launching session {}: {}", key, command);

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        detach(&mut cmd);

        let child = cmd.spawn().map_err(|source| ToolError::Spawn {
            command: command.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| ToolError::Spawn {
            command,
            source: io::Error::new(io::ErrorKind::Other, "session exited before it was recorded"),
        })?;
        // The session outlives this handle; the runtime reaps it on exit
        drop(child);

        let handle = self.sessions.insert(key, pid).map_err(setup_err)?;
        tracing::info!(
            "Started {} (pid {}), logging to {:?}",
            handle.key.session_name(),
            pid,
            log_path
        );
        Ok(handle)
    }

    /// Run a tool's stop or postprocess step and wait for it.
    ///
    /// A stop also reaps the tool's start session once the tool has been
    /// told to stop.
    pub async fn run(
        &self,
        group: &str,
        tool: &ToolEntry,
        output_dir: &Path,
        action: Action,
    ) -> Result<(), ToolError> {
        let argv = self.command_line(group, tool, output_dir, action);
        let command = argv.join(" ");
        tracing::debug!("Running {}", command);

        let status = tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| ToolError::Spawn {
                command: command.clone(),
                source,
            })?;
        let result = check_status(&command, status);

        if action == Action::Stop {
            let key = self.key(group, &tool.name);
            match self.sessions.get(&key) {
                Ok(Some(handle)) => {
                    self.terminate(&handle).await?;
                }
                Ok(None) => {
                    tracing::debug!("No session recorded for {}", key);
                }
                Err(e) => {
                    tracing::warn!("Cannot read session record for {}: {}", key, e);
                }
            }
        }

        result
    }

    /// All recorded sessions of a group on this host
    pub fn group_sessions(&self, group: &str) -> Vec<SessionHandle> {
        self.sessions.list(group, &self.host).unwrap_or_else(|e| {
            tracing::warn!("Cannot list sessions for group {}: {}", group, e);
            Vec::new()
        })
    }

    /// Terminate a session's process group and forget it.
    ///
    /// Returns whether a live session was found.
    pub async fn terminate(&self, handle: &SessionHandle) -> Result<bool, ToolError> {
        let name = handle.key.session_name();
        let was_alive = terminate_group(handle.pid)
            .await
            .map_err(|source| ToolError::Signal {
                name: name.clone(),
                pid: handle.pid,
                source,
            })?;

        if was_alive {
            tracing::info!("Terminated session {} (pid {})", name, handle.pid);
        } else {
            tracing::debug!("Session {} (pid {}) was already gone", name, handle.pid);
        }

        if let Err(e) = self.sessions.remove(&handle.key) {
            tracing::warn!("Failed to remove session record for {}: {}", name, e);
        }
        Ok(was_alive)
    }
}

/// Put the child in a new session with no controlling terminal
#[cfg(unix)]
fn detach(cmd: &mut tokio::process::Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// SIGTERM the group, escalate to SIGKILL after a grace period
#[cfg(unix)]
async fn terminate_group(pid: u32) -> std::io::Result<bool> {
    if !signal_group(pid, libc::SIGTERM)? {
        return Ok(false);
    }

    let deadline = Instant::now() + TERMINATE_GRACE;
    while is_process_alive(pid) {
        if Instant::now() >= deadline {
            tracing::warn!("Session pid {} ignored SIGTERM, sending SIGKILL", pid);
            signal_group(pid, libc::SIGKILL)?;
            break;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
    Ok(true)
}

#[cfg(not(unix))]
fn detach(_cmd: &mut tokio::process::Command) {}

#[cfg(not(unix))]
async fn terminate_group(_pid: u32) -> std::io::Result<bool> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process groups are only supported on unix",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    async fn wait_for_exit(pid: u32) -> bool {
        for _ in 0..100 {
            if !is_process_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_launch_records_detached_session() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "sleeper", "exec sleep 30");
        let out = dir.path().join("out");
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");

        let tool = ToolEntry::local("sleeper", vec![]);
        let handle = launcher.launch("default", &tool, &out).unwrap();
        assert!(is_process_alive(handle.pid));
        assert!(out.join("sleeper.log").exists());

        // The session leads its own process group
        let pgid = unsafe { libc::getpgid(handle.pid as libc::pid_t) };
        assert_eq!(pgid, handle.pid as libc::pid_t);

        assert!(launcher.terminate(&handle).await.unwrap());
        assert!(wait_for_exit(handle.pid).await);
        assert!(launcher.group_sessions("default").is_empty());
    }

    #[tokio::test]
    async fn test_session_that_exits_on_its_own_is_reaped() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "oneshot", "exit 0");
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");

        let handle = launcher
            .launch("default", &ToolEntry::local("oneshot", vec![]), &dir.path().join("out"))
            .unwrap();
        // A zombie would still answer kill(pid, 0)
        assert!(wait_for_exit(handle.pid).await);
        assert!(!launcher.terminate(&handle).await.unwrap());
    }

    #[tokio::test]
    async fn test_launch_missing_script_fails() {
        let dir = TempDir::new().unwrap();
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");
        let tool = ToolEntry::local("missing", vec![]);

        let err = launcher
            .launch("default", &tool, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        assert!(launcher.group_sessions("default").is_empty());
    }

    #[tokio::test]
    async fn test_run_passes_action_and_options() {
        let dir = TempDir::new().unwrap();
        write_script(
            dir.path(),
            "echoer",
            r#"for a in "$@"; do case $a in --dir=*) d=${a#--dir=};; esac; done
echo "$@" > "$d/args""#,
        );
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");

        let tool = ToolEntry::local("echoer", vec!["--interval=5".into()]);
        launcher
            .run("grp", &tool, &out, Action::Postprocess)
            .await
            .unwrap();

        let args = fs::read_to_string(out.join("args")).unwrap();
        assert_eq!(
            args.trim(),
            format!("--postprocess --group=grp --dir={} --interval=5", out.display())
        );
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_error() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "failer", "exit 4");
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");

        let err = launcher
            .run("default", &ToolEntry::local("failer", vec![]), dir.path(), Action::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Exited { status: 4, .. }));
    }

    #[tokio::test]
    async fn test_stop_reaps_start_session() {
        let dir = TempDir::new().unwrap();
        write_script(
            dir.path(),
            "collector",
            r#"case $1 in --start) exec sleep 30;; *) exit 0;; esac"#,
        );
        let out = dir.path().join("out");
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");
        let tool = ToolEntry::local("collector", vec![]);

        let handle = launcher.launch("default", &tool, &out).unwrap();
        launcher
            .run("default", &tool, &out, Action::Stop)
            .await
            .unwrap();

        assert!(wait_for_exit(handle.pid).await);
        assert!(launcher.sessions().get(&handle.key).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminate_stale_record() {
        let dir = TempDir::new().unwrap();
        let launcher = LocalLauncher::new(dir.path(), dir.path().join("sessions"), "bench01");
        let handle = launcher
            .sessions()
            .insert(launcher.key("default", "gone"), 999_999_999)
            .unwrap();

        assert!(!launcher.terminate(&handle).await.unwrap());
        assert!(launcher.group_sessions("default").is_empty());
    }
}
