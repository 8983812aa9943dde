//! Action coordinator
//!
//! The [`ActionCoordinator`] applies one action to every tool of a group:
//!
//! - **start**: kill stale local sessions, then launch each local tool as a
//!   detached session and tell each remote host to start its tools.
//! - **stop** / **postprocess**: run each local tool's step and each remote
//!   host's action, then join them all.
//! - **kill**: terminate every recorded local session of the group and tell
//!   each remote host to do the same.
//!
//! Sub-tasks are independent. A failure is logged and counted but never
//! cancels its siblings; the caller only sees the total. After a postprocess
//! has joined, results are relocated locally and then pulled from remote
//! hosts.

use std::path::Path;
use std::sync::Arc;

use pb_core::config::ToolsConfig;
use pb_core::error::PreconditionError;
use pb_core::registry::{ToolGroup, ToolRegistry};
use pb_core::types::Action;
use pb_core::PbError;

use crate::collector::ResultCollector;
use crate::context::{RunContext, Target};
use crate::launcher::LocalLauncher;
use crate::remote::RemoteDispatcher;

/// Drives start, stop, postprocess and kill across a tool group
pub struct ActionCoordinator {
    config: Arc<ToolsConfig>,
    registry: ToolRegistry,
    launcher: Arc<LocalLauncher>,
    remote: Arc<RemoteDispatcher>,
    collector: ResultCollector,
}

impl ActionCoordinator {
    /// Build every component from one configuration
    pub fn new(config: ToolsConfig) -> Self {
        let hostname = config.local_hostname();
        let registry = ToolRegistry::new(&config.registry_dir, &config.tools_dir);
        let launcher = Arc::new(LocalLauncher::new(
            &config.tools_dir,
            &config.session_dir,
            hostname.clone(),
        ));
        let remote = Arc::new(RemoteDispatcher::new(&config));
        let collector = ResultCollector::new(remote.clone(), hostname, config.collision_policy);

        Self {
            config: Arc::new(config),
            registry,
            launcher,
            remote,
            collector,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn launcher(&self) -> &LocalLauncher {
        &self.launcher
    }

    /// Apply `action` to `group` writing under `dir`.
    ///
    /// Returns the number of failed sub-tasks. Precondition failures (no
    /// `dir`, a `dir` that is not a directory, unknown group) are returned as
    /// errors before anything runs. An absent `dir` is created.
    pub async fn execute(
        &self,
        group: Option<&str>,
        dir: Option<&Path>,
        action: Action,
    ) -> Result<usize, PbError> {
        let dir = prepare_dir(dir)?;
        let group = self.config.group_or_default(group);
        let tool_group = self.registry.load(&group)?;

        let mut ctx = RunContext::new(&group, dir, action, self.config.max_parallel);
        tracing::info!(
            "{} tool group {} ({} tools) in {:?}",
            action,
            group,
            tool_group.tools.len(),
            ctx.tools_dir
        );

        if !tool_group.is_empty() && action != Action::Kill {
            if let Err(e) = std::fs::create_dir_all(&ctx.tools_dir) {
                tracing::error!("Cannot create {:?}: {}", ctx.tools_dir, e);
                return Ok(1);
            }
        }

        let errors = match action {
            Action::Start => {
                let killed = self.kill_local(&mut ctx).await;
                killed + self.start(&mut ctx, &tool_group).await
            }
            Action::Stop => self.run(&mut ctx, &tool_group).await,
            Action::Postprocess => {
                let mut errors = self.run(&mut ctx, &tool_group).await;
                errors += self.collector.relocate(&tool_group, &ctx.tools_dir);
                errors += self.collector.pull(&tool_group, &ctx.tools_dir).await;
                errors
            }
            Action::Kill => {
                self.dispatch_remote(&mut ctx, &tool_group);
                self.kill_local(&mut ctx).await
            }
        };

        if errors > 0 {
            tracing::warn!("{} of tool group {} finished with {} error(s)", action, group, errors);
        } else {
            tracing::info!("{} of tool group {} finished", action, group);
        }
        Ok(errors)
    }

    /// Terminate every recorded local session of the group
    async fn kill_local(&self, ctx: &mut RunContext) -> usize {
        let sessions = self.launcher.group_sessions(&ctx.group);
        if sessions.is_empty() {
            tracing::debug!("No sessions to kill for group {}", ctx.group);
        }

        for handle in sessions {
            let launcher = self.launcher.clone();
            let target = Target::Session {
                name: handle.key.session_name(),
            };
            ctx.spawn(target, async move {
                launcher
                    .terminate(&handle)
                    .await
                    .map(drop)
                    .map_err(PbError::from)
            });
        }
        ctx.join().await
    }

    async fn start(&self, ctx: &mut RunContext, group: &ToolGroup) -> usize {
        for tool in group.local_tools().cloned() {
            let launcher = self.launcher.clone();
            let group_name = ctx.group.clone();
            let tools_dir = ctx.tools_dir.clone();
            ctx.spawn(
                Target::Local {
                    tool: tool.name.clone(),
                },
                async move {
                    launcher
                        .launch(&group_name, &tool, &tools_dir)
                        .map(drop)
                        .map_err(PbError::from)
                },
            );
        }
        self.dispatch_remote(ctx, group);
        ctx.join().await
    }

    /// Stop or postprocess every tool
    async fn run(&self, ctx: &mut RunContext, group: &ToolGroup) -> usize {
        for tool in group.local_tools().cloned() {
            let launcher = self.launcher.clone();
            let group_name = ctx.group.clone();
            let tools_dir = ctx.tools_dir.clone();
            let action = ctx.action;
            ctx.spawn(
                Target::Local {
                    tool: tool.name.clone(),
                },
                async move {
                    launcher
                        .run(&group_name, &tool, &tools_dir, action)
                        .await
                        .map_err(PbError::from)
                },
            );
        }
        self.dispatch_remote(ctx, group);
        ctx.join().await
    }

    /// Queue the action once for each distinct remote host
    fn dispatch_remote(&self, ctx: &mut RunContext, group: &ToolGroup) {
        for host in group.remote_hosts() {
            let remote = self.remote.clone();
            let group_name = ctx.group.clone();
            let dir = ctx.dir.clone();
            let action = ctx.action;
            ctx.spawn(
                Target::Remote {
                    host: host.host.clone(),
                },
                async move {
                    remote
                        .invoke(&host.host, &group_name, &dir, action)
                        .await
                        .map_err(PbError::from)
                },
            );
        }
    }
}

/// Validate the output directory, creating it (and its parents) if absent.
///
/// Remote hosts receive the controller's path and usually do not have it yet.
fn prepare_dir(dir: Option<&Path>) -> Result<&Path, PreconditionError> {
    let dir = match dir {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => return Err(PreconditionError::MissingDirectory),
    };
    if dir.exists() && !dir.is_dir() {
        return Err(PreconditionError::NotADirectory(dir.to_path_buf()));
    }
    std::fs::create_dir_all(dir).map_err(|source| PreconditionError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(root: &Path) -> ToolsConfig {
        ToolsConfig {
            tools_dir: root.join("tool-scripts"),
            registry_dir: root.join("registry"),
            session_dir: root.join("sessions"),
            hostname: Some("bench01".into()),
            ..ToolsConfig::default()
        }
    }

    #[test]
    fn test_prepare_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(prepare_dir(None), Err(PreconditionError::MissingDirectory)));
        assert!(matches!(
            prepare_dir(Some(Path::new(""))),
            Err(PreconditionError::MissingDirectory)
        ));
        let file = dir.path().join("file");
        std::fs::write(&file, "").unwrap();
        assert!(matches!(
            prepare_dir(Some(&file)),
            Err(PreconditionError::NotADirectory(_))
        ));
        assert!(prepare_dir(Some(dir.path())).is_ok());
    }

    #[test]
    fn test_prepare_dir_creates_absent_path() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().join("remote").join("run");
        assert_eq!(prepare_dir(Some(&run)).unwrap(), run.as_path());
        assert!(run.is_dir());
    }

    #[tokio::test]
    async fn test_kill_on_absent_dir_is_a_no_op() {
        let root = TempDir::new().unwrap();
        let cfg = config(root.path());
        std::fs::create_dir_all(cfg.registry_dir.join("tools-default")).unwrap();
        let coordinator = ActionCoordinator::new(cfg);

        let run = root.path().join("not-yet");
        let errors = coordinator
            .execute(None, Some(&run), Action::Kill)
            .await
            .unwrap();
        assert_eq!(errors, 0);
        assert!(run.is_dir());
    }

    #[tokio::test]
    async fn test_unusable_tools_dir_is_counted() {
        let root = TempDir::new().unwrap();
        let cfg = config(root.path());
        let registry = ToolRegistry::new(&cfg.registry_dir, &cfg.tools_dir);
        registry
            .register("default", &pb_core::ToolEntry::remote("foo", "host1", None, vec![]))
            .unwrap();
        let coordinator = ActionCoordinator::new(cfg);

        let run = root.path().join("run");
        std::fs::create_dir_all(&run).unwrap();
        std::fs::write(run.join("tools-default"), "in the way").unwrap();

        let errors = coordinator
            .execute(None, Some(&run), Action::Stop)
            .await
            .unwrap();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_missing_dir_is_fatal() {
        let root = TempDir::new().unwrap();
        let coordinator = ActionCoordinator::new(config(root.path()));
        let err = coordinator.execute(None, None, Action::Start).await.unwrap_err();
        assert!(matches!(
            err,
            PbError::Precondition(PreconditionError::MissingDirectory)
        ));
    }

    #[tokio::test]
    async fn test_unknown_group_is_fatal() {
        let root = TempDir::new().unwrap();
        let coordinator = ActionCoordinator::new(config(root.path()));
        let err = coordinator
            .execute(Some("nope"), Some(root.path()), Action::Stop)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PbError::Precondition(PreconditionError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_group_defaults_from_config() {
        let root = TempDir::new().unwrap();
        let mut cfg = config(root.path());
        cfg.default_group = "net".into();
        std::fs::create_dir_all(cfg.registry_dir.join("tools-net")).unwrap();
        let coordinator = ActionCoordinator::new(cfg);

        let errors = coordinator
            .execute(None, Some(root.path()), Action::Kill)
            .await
            .unwrap();
        assert_eq!(errors, 0);
    }
}
