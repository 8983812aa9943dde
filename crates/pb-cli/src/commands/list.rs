//! List command implementation

use anyhow::{Context, Result};

use crate::output::{format_group, print_info, print_warning};
use pb_core::config::ToolsConfig;
use pb_core::registry::ToolRegistry;

/// Show one group, or every group, with its tools
pub fn list_command(config: &ToolsConfig, group: Option<&str>, json: bool) -> Result<()> {
    let registry = ToolRegistry::new(&config.registry_dir, &config.tools_dir);

    let names = match group {
        Some(g) => vec![g.to_string()],
        None => registry
            .groups()
            .with_context(|| format!("Failed to read registry {:?}", config.registry_dir))?,
    };

    let mut groups = Vec::with_capacity(names.len());
    for name in &names {
        let group = registry
            .load(name)
            .with_context(|| format!("Failed to load tool group {}", name))?;
        groups.push(group);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    if groups.is_empty() {
        print_info("No tool groups registered");
        return Ok(());
    }

    for group in &groups {
        match &group.label {
            Some(label) => println!("Tool group {} (label {}):", group.name, label),
            None => println!("Tool group {}:", group.name),
        }
        println!("{}", format_group(group));
        for warning in &group.warnings {
            print_warning(&warning.to_string());
        }
        println!();
    }
    Ok(())
}
