//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Group used when none is given
pub const DEFAULT_GROUP: &str = "default";

/// Registry file holding the local host label
pub const LABEL_MARKER: &str = "label";

/// Registry file describing an external data source
pub const EXTERNAL_DATA_SOURCE_MARKER: &str = "external-data-source";

/// Registry names that are metadata rather than tools
pub const RESERVED_NAMES: &[&str] = &[LABEL_MARKER, EXTERNAL_DATA_SOURCE_MARKER];

/// Check whether a registry file name is reserved metadata
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Orchestration action applied to a tool group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Launch every tool in the group
    Start,
    /// Ask every tool to stop collecting
    Stop,
    /// Let every tool postprocess its data, then collect results
    Postprocess,
    /// Terminate any running tool sessions
    Kill,
}

impl Action {
    /// All actions, in lifecycle order
    pub const ALL: [Action; 4] = [Action::Start, Action::Stop, Action::Postprocess, Action::Kill];

    /// Lowercase action word
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Postprocess => "postprocess",
            Action::Kill => "kill",
        }
    }

    /// Flag passed to a tool script for this action
    pub fn tool_flag(&self) -> String {
        format!("--{}", self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

/// Where a tool runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Locality {
    /// On the orchestrating host
    Local,
    /// On a named remote host, optionally labelled
    Remote { host: String, label: Option<String> },
}

impl Locality {
    /// Remote host name, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            Locality::Local => None,
            Locality::Remote { host, .. } => Some(host),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Locality::Remote { .. })
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locality::Local => write!(f, "local"),
            Locality::Remote { host, label: None } => write!(f, "{}", host),
            Locality::Remote {
                host,
                label: Some(label),
            } => write!(f, "{}:{}", label, host),
        }
    }
}

/// A registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Tool name (also the script name)
    pub name: String,
    /// Options passed positionally to the tool
    pub options: Vec<String>,
    /// Where the tool runs
    pub locality: Locality,
}

impl ToolEntry {
    /// Create a local tool entry
    pub fn local(name: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            name: name.into(),
            options,
            locality: Locality::Local,
        }
    }

    /// Create a remote tool entry
    pub fn remote(
        name: impl Into<String>,
        host: impl Into<String>,
        label: Option<String>,
        options: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            options,
            locality: Locality::Remote {
                host: host.into(),
                label,
            },
        }
    }

    /// Parse a registry file name into a tool name and locality.
    ///
    /// Accepted forms are `tool`, `tool@host` and `tool@label@host`.
    /// Returns `None` for anything else.
    pub fn parse_file_name(file_name: &str) -> Option<(String, Locality)> {
        let parts: Vec<&str> = file_name.split('@').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [name] => Some((name.to_string(), Locality::Local)),
            [name, host] => Some((
                name.to_string(),
                Locality::Remote {
                    host: host.to_string(),
                    label: None,
                },
            )),
            [name, label, host] => Some((
                name.to_string(),
                Locality::Remote {
                    host: host.to_string(),
                    label: Some(label.to_string()),
                },
            )),
            _ => None,
        }
    }

    /// Registry file name for this entry
    pub fn file_name(&self) -> String {
        match &self.locality {
            Locality::Local => self.name.clone(),
            Locality::Remote { host, label: None } => format!("{}@{}", self.name, host),
            Locality::Remote {
                host,
                label: Some(label),
            } => format!("{}@{}@{}", self.name, label, host),
        }
    }
}

/// Validate a group or tool name used as a path component
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('@')
        && !name.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip_words() {
        assert_eq!("postprocess".parse::<Action>().unwrap(), Action::Postprocess);
        assert_eq!("KILL".parse::<Action>().unwrap(), Action::Kill);
        assert!("restart".parse::<Action>().is_err());
        assert_eq!(Action::Start.tool_flag(), "--start");
    }

    #[test]
    fn test_parse_local_file_name() {
        let (name, loc) = ToolEntry::parse_file_name("sar").unwrap();
        assert_eq!(name, "sar");
        assert_eq!(loc, Locality::Local);
    }

    #[test]
    fn test_parse_remote_file_names() {
        let (name, loc) = ToolEntry::parse_file_name("iostat@host1.example.com").unwrap();
        assert_eq!(name, "iostat");
        assert_eq!(loc.host(), Some("host1.example.com"));

        let (_, loc) = ToolEntry::parse_file_name("iostat@server@host1").unwrap();
        assert_eq!(
            loc,
            Locality::Remote {
                host: "host1".to_string(),
                label: Some("server".to_string())
            }
        );
    }

    #[test]
    fn test_parse_malformed_file_names() {
        assert!(ToolEntry::parse_file_name("a@b@c@d").is_none());
        assert!(ToolEntry::parse_file_name("sar@").is_none());
        assert!(ToolEntry::parse_file_name("@host").is_none());
    }

    #[test]
    fn test_file_name_matches_parse() {
        let entry = ToolEntry::remote("perf", "h2", Some("client".into()), vec![]);
        assert_eq!(entry.file_name(), "perf@client@h2");
        let (name, loc) = ToolEntry::parse_file_name(&entry.file_name()).unwrap();
        assert_eq!(name, entry.name);
        assert_eq!(loc, entry.locality);
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("label"));
        assert!(is_reserved("external-data-source"));
        assert!(!is_reserved("sar"));
    }

    #[test]
    fn test_locality_display() {
        assert_eq!(Locality::Local.to_string(), "local");
        let remote = Locality::Remote {
            host: "h1".into(),
            label: Some("srv".into()),
        };
        assert_eq!(remote.to_string(), "srv:h1");
    }
}
