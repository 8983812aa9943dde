//! Result collection after postprocess
//!
//! Local tool output is moved from `tools-<group>/` into
//! `tools-<group>/<label:>hostname/`. Each remote host's `tools-<group>`
//! tree is then streamed back as a tar archive over ssh straight into a local
//! `tar -x`, after which the remote copy is removed.
//!
//! A remote host lays out its own results under the name it knows itself by,
//! normally its short hostname. When the tool was registered under a longer
//! name the pulled directory is renamed to the registered one.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use futures::future::join_all;
use tokio::process::Command;

use pb_core::config::CollisionPolicy;
use pb_core::error::TransferError;
use pb_core::host::{host_dir_name, short_hostname};
use pb_core::registry::{RemoteHost, ToolGroup};
use pb_core::PbError;

use crate::remote::RemoteDispatcher;

/// Gathers tool output into the per-host directory layout
pub struct ResultCollector {
    remote: Arc<RemoteDispatcher>,
    hostname: String,
    policy: CollisionPolicy,
}

impl ResultCollector {
    pub fn new(remote: Arc<RemoteDispatcher>, hostname: impl Into<String>, policy: CollisionPolicy) -> Self {
        Self {
            remote,
            hostname: hostname.into(),
            policy,
        }
    }

    /// Directory that local results are moved into
    pub fn local_host_dir(&self, group: &ToolGroup, tools_dir: &Path) -> PathBuf {
        tools_dir.join(host_dir_name(group.label.as_deref(), &self.hostname))
    }

    /// Move each local tool's output under the host directory.
    ///
    /// Host directories (this host's and every remote host's, short and full
    /// names) are never taken as tool output, even when a host name starts
    /// with a tool name.
    ///
    /// Returns the number of tools whose output could not be moved.
    pub fn relocate(&self, group: &ToolGroup, tools_dir: &Path) -> usize {
        let dest = self.local_host_dir(group, tools_dir);
        let mut host_dirs: HashSet<OsString> = group
            .remote_hosts()
            .iter()
            .flat_map(|h| {
                let label = h.label.as_deref();
                [
                    host_dir_name(label, &h.host),
                    host_dir_name(label, short_hostname(&h.host)),
                ]
            })
            .map(OsString::from)
            .collect();
        host_dirs.extend(dest.file_name().map(|n| n.to_os_string()));
        let mut errors = 0;

        for tool in group.local_tools() {
            let items = match tool_output_items(tools_dir, &tool.name) {
                Ok(items) => items,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(e) => {
                    tracing::error!("Cannot scan {:?} for {} output: {}", tools_dir, tool.name, e);
                    errors += 1;
                    continue;
                }
            };
            let items: Vec<PathBuf> = items
                .into_iter()
                .filter(|p| p.file_name().map_or(true, |n| !host_dirs.contains(n)))
                .collect();
            if items.is_empty() {
                tracing::debug!("No output to relocate for {}", tool.name);
                continue;
            }

            if let Err(e) = move_items(&items, &dest) {
                tracing::error!("Failed to relocate {} output into {:?}: {}", tool.name, dest, e);
                errors += 1;
            } else {
                tracing::info!("Relocated {} item(s) of {} output into {:?}", items.len(), tool.name, dest);
            }
        }
        errors
    }

    /// Pull every remote host's results, in parallel.
    ///
    /// Returns the number of hosts whose pull failed.
    pub async fn pull(&self, group: &ToolGroup, tools_dir: &Path) -> usize {
        let hosts = group.remote_hosts();
        if hosts.is_empty() {
            return 0;
        }

        let pulls = hosts.iter().map(|host| async move {
            let result = self.pull_host(host, tools_dir).await;
            if let Err(e) = &result {
                tracing::error!("Pull from {} failed: {}", host.host, e);
            }
            result
        });
        join_all(pulls).await.iter().filter(|r| r.is_err()).count()
    }

    /// Pull one host's results and remove the remote copy
    pub async fn pull_host(&self, host: &RemoteHost, tools_dir: &Path) -> Result<(), PbError> {
        let remote_path = tools_dir.to_string_lossy().into_owned();

        match self
            .remote
            .capture_remote(&host.host, &["du".into(), "-sh".into(), remote_path.clone()])
            .await
        {
            Ok(out) => {
                let size = out.split_whitespace().next().unwrap_or("?");
                tracing::info!("Collecting {} of tool data from {}", size, host.host);
            }
            Err(e) => tracing::warn!("Cannot size tool data on {}: {}", host.host, e),
        }

        fs::create_dir_all(tools_dir).map_err(|source| TransferError::Local {
            path: tools_dir.to_path_buf(),
            source,
        })?;

        let label = host.label.as_deref();
        let short = short_hostname(&host.host);
        let renames = short != host.host;
        let short_dir = tools_dir.join(host_dir_name(label, short));
        let full_dir = tools_dir.join(host_dir_name(label, &host.host));

        // Keep a short-named directory from an earlier run out of the way
        let stash = if renames && short_dir.exists() {
            let stash = free_stash_path(tools_dir, &host_dir_name(label, short));
            rename_dir(&short_dir, &stash)?;
            Some(stash)
        } else {
            None
        };

        let transfer = self.transfer(&host.host, &remote_path, tools_dir).await;

        let placed = match &transfer {
            Ok(()) if renames && short_dir.exists() => self.settle(&short_dir, &full_dir),
            _ => Ok(()),
        };

        if let Some(stash) = stash {
            if short_dir.exists() {
                tracing::warn!(
                    "Leaving earlier results from {} at {:?}; {:?} is occupied",
                    host.host,
                    stash,
                    short_dir
                );
            } else {
                rename_dir(&stash, &short_dir)?;
            }
        }

        transfer?;
        placed?;

        self.remote
            .run_remote(&host.host, &["rm".into(), "-rf".into(), remote_path])
            .await
            .map_err(|e| TransferError::RemoteCleanup {
                host: host.host.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Collected tool data from {}", host.host);
        Ok(())
    }

    /// Stream the remote tree into `tools_dir` through a pipe
    async fn transfer(&self, host: &str, remote_path: &str, tools_dir: &Path) -> Result<(), PbError> {
        let archive_err = |reason: String| TransferError::Archive {
            host: host.to_string(),
            reason,
        };

        let argv = vec![
            "tar".to_string(),
            "-C".to_string(),
            remote_path.to_string(),
            "-cf".to_string(),
            "-".to_string(),
            ".".to_string(),
        ];
        let (mut sender, description) = self
            .remote
            .spawn_remote(host, &argv)
            .map_err(|e| archive_err(e.to_string()))?;

        let stdout = sender
            .stdout
            .take()
            .ok_or_else(|| archive_err("no archive stream".to_string()))?;
        let stdin: Stdio = stdout
            .try_into()
            .map_err(|e: io::Error| archive_err(e.to_string()))?;

        let receiver = Command::new("tar")
            .arg("-C")
            .arg(tools_dir)
            .args(["-xf", "-"])
            .stdin(stdin)
            .status();

        let (sent, received) = tokio::join!(sender.wait(), receiver);
        let sent = sent.map_err(|e| archive_err(format!("{}: {}", description, e)))?;
        let received = received.map_err(|e| archive_err(format!("local tar: {}", e)))?;

        if !sent.success() {
            return Err(archive_err(format!("{} exited with {}", description, sent)).into());
        }
        if !received.success() {
            return Err(archive_err(format!("local tar exited with {}", received)).into());
        }
        Ok(())
    }

    /// Rename a pulled short-named directory to the registered name
    fn settle(&self, short_dir: &Path, full_dir: &Path) -> Result<(), PbError> {
        if full_dir.exists() {
            match self.policy {
                CollisionPolicy::PreferIncoming => {
                    tracing::info!("Replacing {:?} with newly pulled data", full_dir);
                    remove_path(full_dir).map_err(|source| TransferError::Local {
                        path: full_dir.to_path_buf(),
                        source,
                    })?;
                }
                CollisionPolicy::PreferExisting => {
                    tracing::info!("Keeping existing {:?}, discarding pulled {:?}", full_dir, short_dir);
                    return remove_path(short_dir).map_err(|source| {
                        TransferError::Local {
                            path: short_dir.to_path_buf(),
                            source,
                        }
                        .into()
                    });
                }
            }
        }
        rename_dir(short_dir, full_dir)
    }
}

/// Top-level items in `tools_dir` that belong to `tool`:
/// `<tool>` itself and anything named `<tool>-*` or `<tool>.*`
fn tool_output_items(tools_dir: &Path, tool: &str) -> io::Result<Vec<PathBuf>> {
    let dash = format!("{}-", tool);
    let dot = format!("{}.", tool);
    let mut items: Vec<PathBuf> = fs::read_dir(tools_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n == tool || n.starts_with(&dash) || n.starts_with(&dot))
                .unwrap_or(false)
        })
        .map(|e| e.path())
        .collect();
    items.sort();
    Ok(items)
}

/// First unused `.<name>.prior[.N]` path; earlier stashes are left untouched
fn free_stash_path(tools_dir: &Path, name: &str) -> PathBuf {
    let base = tools_dir.join(format!(".{}.prior", name));
    let mut candidate = base.clone();
    let mut n = 0;
    while candidate.symlink_metadata().is_ok() {
        n += 1;
        candidate = PathBuf::from(format!("{}.{}", base.display(), n));
    }
    candidate
}

fn move_items(items: &[PathBuf], dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for item in items {
        let Some(name) = item.file_name() else {
            continue;
        };
        let target = dest.join(name);
        if target.exists() {
            remove_path(&target)?;
        }
        fs::rename(item, &target)?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn rename_dir(from: &Path, to: &Path) -> Result<(), PbError> {
    fs::rename(from, to).map_err(|source| {
        TransferError::Local {
            path: from.to_path_buf(),
            source,
        }
        .into()
    })
}
