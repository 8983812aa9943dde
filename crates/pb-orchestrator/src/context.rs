//! Per-action run state and the fork-join of its sub-tasks

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use pb_core::types::Action;
use pb_core::PbError;

/// What a sub-task operated on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A local tool
    Local { tool: String },
    /// A remote host's orchestration
    Remote { host: String },
    /// A recorded local session
    Session { name: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local { tool } => write!(f, "local tool {}", tool),
            Target::Remote { host } => write!(f, "remote host {}", host),
            Target::Session { name } => write!(f, "session {}", name),
        }
    }
}

/// Result of one sub-task
#[derive(Debug)]
pub struct SubTaskOutcome {
    pub target: Target,
    pub result: Result<(), PbError>,
}

impl SubTaskOutcome {
    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }
}

/// State of one orchestration action
pub struct RunContext {
    /// Group being driven
    pub group: String,
    /// Caller-supplied output root
    pub dir: PathBuf,
    /// Action being applied
    pub action: Action,
    /// `dir/tools-<group>`
    pub tools_dir: PathBuf,
    tasks: JoinSet<SubTaskOutcome>,
    limiter: Option<Arc<Semaphore>>,
}

impl RunContext {
    /// Create a context; `max_parallel == 0` means no limit on running sub-tasks
    pub fn new(group: impl Into<String>, dir: impl Into<PathBuf>, action: Action, max_parallel: usize) -> Self {
        let group = group.into();
        let dir = dir.into();
        let tools_dir = dir.join(format!("tools-{}", group));
        let limiter = (max_parallel > 0).then(|| Arc::new(Semaphore::new(max_parallel)));
        Self {
            group,
            dir,
            action,
            tools_dir,
            tasks: JoinSet::new(),
            limiter,
        }
    }

    /// Start a sub-task in the background
    pub fn spawn<F>(&mut self, target: Target, task: F)
    where
        F: Future<Output = Result<(), PbError>> + Send + 'static,
    {
        let limiter = self.limiter.clone();
        self.tasks.spawn(async move {
            let _permit = match limiter {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            let result = task.await;
            SubTaskOutcome { target, result }
        });
    }

    /// Number of sub-tasks not yet joined
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every sub-task and return the number that failed
    pub async fn join(&mut self) -> usize {
        let mut errors = 0;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(SubTaskOutcome {
                    target,
                    result: Ok(()),
                }) => {
                    tracing::debug!("{} {}: ok", self.action, target);
                }
                Ok(SubTaskOutcome {
                    target,
                    result: Err(e),
                }) => {
                    tracing::error!("{} {} failed: {}", self.action, target, e);
                    errors += 1;
                }
                Err(e) => {
                    tracing::error!("{} sub-task did not complete: {}", self.action, e);
                    errors += 1;
                }
            }
        }
        errors
    }
}
