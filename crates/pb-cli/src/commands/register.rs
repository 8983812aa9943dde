//! Registry management commands

use anyhow::{Context, Result};

use crate::output::{print_info, print_success, print_warning};
use pb_core::config::ToolsConfig;
use pb_core::registry::ToolRegistry;
use pb_core::types::ToolEntry;

fn registry(config: &ToolsConfig) -> ToolRegistry {
    ToolRegistry::new(&config.registry_dir, &config.tools_dir)
}

/// Register a tool, replacing any earlier registration with the same name
pub fn register_command(
    config: &ToolsConfig,
    group: Option<&str>,
    tool: &str,
    remote: Option<&str>,
    label: Option<&str>,
    options: Vec<String>,
) -> Result<()> {
    let group = config.group_or_default(group);
    let registry = registry(config);

    let entry = match remote {
        Some(host) => ToolEntry::remote(tool, host, label.map(str::to_string), options),
        None => {
            if !registry.is_known_tool(tool) {
                print_warning(&format!(
                    "No tool script {:?}; it will be skipped until one is installed",
                    registry.tool_script(tool)
                ));
            }
            ToolEntry::local(tool, options)
        }
    };

    registry
        .register(&group, &entry)
        .with_context(|| format!("Failed to register {} in group {}", tool, group))?;
    print_success(&format!(
        "Registered {} ({}) in group {}",
        tool, entry.locality, group
    ));
    Ok(())
}

/// Remove one tool, or with `all` the whole group
pub fn unregister_command(
    config: &ToolsConfig,
    group: Option<&str>,
    tool: Option<&str>,
    remote: Option<&str>,
    all: bool,
) -> Result<()> {
    let group = config.group_or_default(group);
    let registry = registry(config);

    if all {
        registry
            .clear(&group)
            .with_context(|| format!("Failed to remove group {}", group))?;
        print_success(&format!("Removed tool group {}", group));
        return Ok(());
    }

    let tool = tool.ok_or_else(|| anyhow::anyhow!("Specify a tool or --all"))?;
    let removed = registry
        .unregister(&group, tool, remote)
        .with_context(|| format!("Failed to unregister {} from group {}", tool, group))?;
    print_success(&format!(
        "Unregistered {} ({} entr{}) from group {}",
        tool,
        removed,
        if removed == 1 { "y" } else { "ies" },
        group
    ));
    Ok(())
}

/// Set or clear the label used for this host's results
pub fn label_command(config: &ToolsConfig, group: Option<&str>, label: Option<&str>) -> Result<()> {
    let group = config.group_or_default(group);
    registry(config)
        .set_label(&group, label)
        .with_context(|| format!("Failed to update label of group {}", group))?;

    match label {
        Some(label) => print_success(&format!("Group {} labelled {}", group, label)),
        None => print_info(&format!("Removed label of group {}", group)),
    }
    Ok(())
}
