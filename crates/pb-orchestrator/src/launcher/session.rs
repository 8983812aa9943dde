//! Session records for detached local tools
//!
//! A session is a detached process group running one tool's `--start`. Its
//! leader pid is kept in a small record file so that a later invocation
//! (stop or kill, usually from another process) can find and signal it.
//! Records live at `<session_dir>/<group>/<tool>@<host>.pid`.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;

/// Record file suffix
const RECORD_SUFFIX: &str = ".pid";

/// Identity of a local tool session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub group: String,
    pub tool: String,
    pub host: String,
}

impl SessionKey {
    pub fn new(group: impl Into<String>, tool: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            tool: tool.into(),
            host: host.into(),
        }
    }

    /// Human-readable session name
    pub fn session_name(&self) -> String {
        format!("pbench-tool-{}-{}", self.group, self.tool)
    }

    fn record_file_name(&self) -> String {
        format!("{}@{}{}", self.tool, self.host, RECORD_SUFFIX)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.session_name(), self.host)
    }
}

/// A recorded session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub key: SessionKey,
    /// Pid of the process group leader
    pub pid: u32,
}

/// Typed registry of live sessions, persisted to disk
pub struct SessionStore {
    dir: PathBuf,
    live: DashMap<SessionKey, u32>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            live: DashMap::new(),
        }
    }

    fn group_dir(&self, group: &str) -> PathBuf {
        self.dir.join(group)
    }

    fn record_path(&self, key: &SessionKey) -> PathBuf {
        self.group_dir(&key.group).join(key.record_file_name())
    }

    /// Create the directory that will hold a group's records
    pub fn prepare(&self, group: &str) -> io::Result<PathBuf> {
        let dir = self.group_dir(group);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Record a newly started session
    pub fn insert(&self, key: SessionKey, pid: u32) -> io::Result<SessionHandle> {
        write_record(&self.record_path(&key), pid)?;
        self.live.insert(key.clone(), pid);
        Ok(SessionHandle { key, pid })
    }

    /// Look up a session by key
    pub fn get(&self, key: &SessionKey) -> io::Result<Option<SessionHandle>> {
        if let Some(pid) = self.live.get(key) {
            return Ok(Some(SessionHandle {
                key: key.clone(),
                pid: *pid,
            }));
        }
        Ok(read_record(&self.record_path(key))?.map(|pid| SessionHandle {
            key: key.clone(),
            pid,
        }))
    }

    /// Forget a session. Missing records are not an error.
    pub fn remove(&self, key: &SessionKey) -> io::Result<()> {
        self.live.remove(key);
        remove_record(&self.record_path(key))
    }

    /// Every recorded session of a group on `host`
    pub fn list(&self, group: &str, host: &str) -> io::Result<Vec<SessionHandle>> {
        let dir = self.group_dir(group);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut sessions = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some((tool, record_host)) = name
                .strip_suffix(RECORD_SUFFIX)
                .and_then(|stem| stem.split_once('@'))
            else {
                continue;
            };
            if record_host != host {
                continue;
            }
            let key = SessionKey::new(group, tool, host);
            match read_record(&entry.path()) {
                Ok(Some(pid)) => sessions.push(SessionHandle { key, pid }),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Discarding unreadable session record {:?}: {}", entry.path(), e);
                    self.remove(&key)?;
                }
            }
        }
        sessions.sort_by(|a, b| a.key.tool.cmp(&b.key.tool));
        Ok(sessions)
    }

    /// Number of sessions started by this process
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Read a pid record. `Ok(None)` if it does not exist.
fn read_record(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_record(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", pid)?;
    Ok(())
}

fn remove_record(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given pid is still alive
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0): 0 if it exists, EPERM if it exists but belongs to someone else
    unsafe {
        let result = libc::kill(pid as libc::pid_t, 0);
        if result == 0 {
            return true;
        }
        let err = io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

/// Send `signal` to the process group led by `pid`.
///
/// Returns `Ok(false)` if the group no longer exists.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<bool> {
    unsafe {
        if libc::killpg(pid as libc::pid_t, signal) == 0 {
            return Ok(true);
        }
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}
