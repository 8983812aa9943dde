//! Host naming helpers used to lay out per-host result directories

/// Hostname of the machine we are running on
pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// First DNS component of a hostname (`host1.example.com` -> `host1`)
pub fn short_hostname(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

/// Name of a per-host result directory, `label:host` when labelled
pub fn host_dir_name(label: Option<&str>, host: &str) -> String {
    match label {
        Some(label) if !label.is_empty() => format!("{}:{}", label, host),
        _ => host.to_string(),
    }
}
