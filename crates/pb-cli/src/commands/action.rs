//! Orchestration actions

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::print_error;
use pb_core::config::ToolsConfig;
use pb_core::types::Action;
use pb_orchestrator::ActionCoordinator;

/// Apply `action` to a tool group and return the number of failed sub-tasks
pub async fn action_command(
    config: ToolsConfig,
    action: Action,
    group: Option<&str>,
    dir: Option<&Path>,
) -> Result<usize> {
    let coordinator = ActionCoordinator::new(config);
    let errors = coordinator
        .execute(group, dir, action)
        .await
        .with_context(|| format!("Cannot {} tools", action))?;

    if errors > 0 {
        print_error(&format!("{} finished with {} error(s)", action, errors));
    }
    Ok(errors)
}

/// Process exit code for an error count
pub fn exit_code(errors: usize) -> i32 {
    errors.min(255) as i32
}
