//! On-disk tool registry
//!
//! Each tool group is a directory `<registry_dir>/tools-<group>` holding one
//! file per registered tool. The file name encodes where the tool runs
//! (`tool`, `tool@host` or `tool@label@host`) and the file content is the
//! tool's option list, one option per line. The reserved names `label` and
//! `external-data-source` carry group metadata and are never run.
//!
//! Problems with individual entries are collected as [`RegistryWarning`]s so
//! the remaining tools can still be run.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PbError, PreconditionError, RegistryError};
use crate::types::{
    is_reserved, is_valid_name, Locality, ToolEntry, EXTERNAL_DATA_SOURCE_MARKER, LABEL_MARKER,
};

/// Prefix of every group directory
const GROUP_DIR_PREFIX: &str = "tools-";

/// Non-fatal problem found while loading a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegistryWarning {
    /// No executable script for a local tool
    UnknownTool(String),
    /// A directory where a tool file was expected
    UnexpectedDirectory(String),
    /// File name is not `tool`, `tool@host` or `tool@label@host`
    MalformedEntry(String),
    /// Entry could not be read
    Unreadable { entry: String, reason: String },
}

impl fmt::Display for RegistryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryWarning::UnknownTool(name) => write!(f, "unknown tool {:?}, skipping", name),
            RegistryWarning::UnexpectedDirectory(name) => {
                write!(f, "unexpected directory {:?} in tool group, skipping", name)
            }
            RegistryWarning::MalformedEntry(name) => {
                write!(f, "malformed registry entry {:?}, skipping", name)
            }
            RegistryWarning::Unreadable { entry, reason } => {
                write!(f, "cannot read registry entry {:?}: {}", entry, reason)
            }
        }
    }
}

/// A distinct remote host referenced by a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteHost {
    pub host: String,
    pub label: Option<String>,
}

/// A loaded tool group
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolGroup {
    /// Group name
    pub name: String,
    /// Label for the local host, from the `label` file
    pub label: Option<String>,
    /// Content of the `external-data-source` file, if present
    pub external_data_source: Option<String>,
    /// Runnable tools, sorted by registry file name
    pub tools: Vec<ToolEntry>,
    /// Entries that were skipped
    pub warnings: Vec<RegistryWarning>,
}

impl ToolGroup {
    /// Tools that run on this host
    pub fn local_tools(&self) -> impl Iterator<Item = &ToolEntry> {
        self.tools.iter().filter(|t| !t.locality.is_remote())
    }

    /// Tools that run on remote hosts
    pub fn remote_tools(&self) -> impl Iterator<Item = &ToolEntry> {
        self.tools.iter().filter(|t| t.locality.is_remote())
    }

    /// Distinct remote hosts, in registry order
    pub fn remote_hosts(&self) -> Vec<RemoteHost> {
        let mut hosts: Vec<RemoteHost> = Vec::new();
        for tool in self.remote_tools() {
            if let Locality::Remote { host, label } = &tool.locality {
                if !hosts.iter().any(|h| &h.host == host) {
                    hosts.push(RemoteHost {
                        host: host.clone(),
                        label: label.clone(),
                    });
                }
            }
        }
        hosts
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Reads and edits tool groups on disk
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    registry_dir: PathBuf,
    tools_dir: PathBuf,
}

impl ToolRegistry {
    /// Create a registry rooted at `registry_dir`, resolving tool scripts in `tools_dir`
    pub fn new(registry_dir: impl Into<PathBuf>, tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: registry_dir.into(),
            tools_dir: tools_dir.into(),
        }
    }

    /// Directory holding a group's registry files
    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.registry_dir.join(format!("{}{}", GROUP_DIR_PREFIX, group))
    }

    /// Path of the script implementing a tool
    pub fn tool_script(&self, tool: &str) -> PathBuf {
        self.tools_dir.join(tool)
    }

    /// Check whether a tool script exists
    pub fn is_known_tool(&self, tool: &str) -> bool {
        self.tool_script(tool).is_file()
    }

    /// Names of all groups, sorted
    pub fn groups(&self) -> Result<Vec<String>, RegistryError> {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(&self.registry_dir, e)),
        };

        let mut groups: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix(GROUP_DIR_PREFIX))
                    .map(str::to_string)
            })
            .collect();
        groups.sort();
        Ok(groups)
    }

    /// Ordered runnable tools of a group
    pub fn list(&self, group: &str) -> Result<Vec<ToolEntry>, PbError> {
        Ok(self.load(group)?.tools)
    }

    /// Load a group, collecting warnings for entries that cannot be run
    pub fn load(&self, group: &str) -> Result<ToolGroup, PbError> {
        if !is_valid_name(group) {
            return Err(PreconditionError::InvalidGroup(group.to_string()).into());
        }
        let dir = self.group_dir(group);
        if !dir.is_dir() {
            return Err(PreconditionError::GroupNotFound(group.to_string()).into());
        }

        let mut names: Vec<(String, PathBuf)> = fs::read_dir(&dir)
            .map_err(|e| self.io_error(&dir, e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(|n| (n.to_string(), e.path())))
            .collect();
        names.sort();

        let mut group_info = ToolGroup {
            name: group.to_string(),
            ..ToolGroup::default()
        };

        for (name, path) in names {
            if path.is_dir() {
                group_info
                    .warnings
                    .push(RegistryWarning::UnexpectedDirectory(name));
                continue;
            }

            if is_reserved(&name) {
                match read_lines(&path) {
                    Ok(lines) if name == LABEL_MARKER => {
                        group_info.label = lines.into_iter().next();
                    }
                    Ok(lines) if name == EXTERNAL_DATA_SOURCE_MARKER => {
                        group_info.external_data_source = Some(lines.join("\n"));
                    }
                    Ok(_) => {}
                    Err(e) => group_info.warnings.push(RegistryWarning::Unreadable {
                        entry: name,
                        reason: e.to_string(),
                    }),
                }
                continue;
            }

            let Some((tool, locality)) = ToolEntry::parse_file_name(&name) else {
                group_info
                    .warnings
                    .push(RegistryWarning::MalformedEntry(name));
                continue;
            };

            // Remote scripts are checked by the remote host against its own install
            if !locality.is_remote() && !self.is_known_tool(&tool) {
                group_info.warnings.push(RegistryWarning::UnknownTool(tool));
                continue;
            }

            match read_lines(&path) {
                Ok(options) => group_info.tools.push(ToolEntry {
                    name: tool,
                    options,
                    locality,
                }),
                Err(e) => group_info.warnings.push(RegistryWarning::Unreadable {
                    entry: name,
                    reason: e.to_string(),
                }),
            }
        }

        for warning in &group_info.warnings {
            tracing::warn!("Tool group {}: {}", group, warning);
        }

        Ok(group_info)
    }

    /// Register (or re-register) a tool with its options
    pub fn register(&self, group: &str, entry: &ToolEntry) -> Result<PathBuf, RegistryError> {
        if !is_valid_name(group) {
            return Err(RegistryError::InvalidToolName(group.to_string()));
        }
        if is_reserved(&entry.name) {
            return Err(RegistryError::Reserved(entry.name.clone()));
        }
        if !is_valid_name(&entry.name) {
            return Err(RegistryError::InvalidToolName(entry.name.clone()));
        }
        if let Locality::Remote { host, label } = &entry.locality {
            let label_ok = label.as_deref().map_or(true, is_valid_name);
            if !is_valid_name(host) || !label_ok {
                return Err(RegistryError::InvalidToolName(entry.file_name()));
            }
        }

        let dir = self.group_dir(group);
        fs::create_dir_all(&dir).map_err(|e| self.io_error(&dir, e))?;

        let path = dir.join(entry.file_name());
        write_lines(&path, &entry.options).map_err(|e| self.io_error(&path, e))?;

        tracing::info!(
            "Registered {} ({}) in group {}",
            entry.name,
            entry.locality,
            group
        );
        Ok(path)
    }

    /// Remove a tool from a group.
    ///
    /// With `host` set only that host's registration is removed; otherwise
    /// every registration of the tool (local and remote) is removed.
    /// Returns the number of entries removed.
    pub fn unregister(
        &self,
        group: &str,
        tool: &str,
        host: Option<&str>,
    ) -> Result<usize, RegistryError> {
        let dir = self.group_dir(group);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::NotRegistered {
                    group: group.to_string(),
                    tool: tool.to_string(),
                })
            }
            Err(e) => return Err(self.io_error(&dir, e)),
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some((name, locality)) = ToolEntry::parse_file_name(&file_name) else {
                continue;
            };
            if name != tool || is_reserved(&name) {
                continue;
            }
            let matches = match host {
                None => true,
                Some(h) => locality.host() == Some(h),
            };
            if matches {
                let path = entry.path();
                fs::remove_file(&path).map_err(|e| self.io_error(&path, e))?;
                removed += 1;
            }
        }

        if removed == 0 {
            return Err(RegistryError::NotRegistered {
                group: group.to_string(),
                tool: tool.to_string(),
            });
        }
        tracing::info!("Unregistered {} entries of {} from group {}", removed, tool, group);
        Ok(removed)
    }

    /// Remove a whole group, including its metadata
    pub fn clear(&self, group: &str) -> Result<(), RegistryError> {
        let dir = self.group_dir(group);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!("Cleared tool group {}", group);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(&dir, e)),
        }
    }

    /// Set or remove the local host label of a group
    pub fn set_label(&self, group: &str, label: Option<&str>) -> Result<(), RegistryError> {
        let dir = self.group_dir(group);
        let path = dir.join(LABEL_MARKER);
        match label {
            Some(label) => {
                if !is_valid_name(label) {
                    return Err(RegistryError::InvalidToolName(label.to_string()));
                }
                fs::create_dir_all(&dir).map_err(|e| self.io_error(&dir, e))?;
                write_lines(&path, &[label.to_string()]).map_err(|e| self.io_error(&path, e))
            }
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_error(&path, e)),
            },
        }
    }

    fn io_error(&self, path: &Path, source: io::Error) -> RegistryError {
        RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read non-empty, trimmed lines
fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content)
}
