//! CLI integration tests
//!
//! Tests the pbench-tools CLI using assert_cmd against a private registry.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use pb_core::config::{save_config, ToolsConfig};

fn pbench_tools() -> Command {
    Command::cargo_bin("pbench-tools")
        .expect("Failed to locate pbench-tools binary - ensure it's built before running tests")
}

/// A scratch installation: tool scripts, registry, run directory and config
struct Install {
    root: TempDir,
    config: PathBuf,
}

impl Install {
    fn new() -> Self {
        Self::with_config("bench01", |_, _| {})
    }

    /// Build an installation whose config is adjusted before it is saved
    fn with_config(hostname: &str, edit: impl FnOnce(&Path, &mut ToolsConfig)) -> Self {
        let root = TempDir::new().unwrap();
        for sub in ["tool-scripts", "registry", "run"] {
            fs::create_dir_all(root.path().join(sub)).unwrap();
        }
        let mut tools_config = ToolsConfig {
            tools_dir: root.path().join("tool-scripts"),
            registry_dir: root.path().join("registry"),
            session_dir: root.path().join("sessions"),
            hostname: Some(hostname.into()),
            ..ToolsConfig::default()
        };
        edit(root.path(), &mut tools_config);
        let config = root.path().join("config.toml");
        save_config(&config, &tools_config).unwrap();
        Self { root, config }
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn run_dir(&self) -> PathBuf {
        self.path().join("run")
    }

    fn cmd(&self) -> Command {
        let mut cmd = pbench_tools();
        cmd.arg("--config").arg(&self.config);
        cmd
    }

    #[cfg(unix)]
    fn tool_script(&self, name: &str, body: &str) {
        write_script(&self.path().join("tool-scripts").join(name), body);
    }
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_cli_help() {
    pbench_tools()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pbench-tools"))
        .stdout(predicate::str::contains("postprocess"));
}

#[test]
fn test_cli_version() {
    pbench_tools()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pbench-tools"));
}

#[test]
fn test_cli_start_help() {
    pbench_tools()
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dir"))
        .stdout(predicate::str::contains("--group"));
}

#[test]
fn test_cli_invalid_command() {
    pbench_tools().arg("invalid-command").assert().failure();
}

#[test]
fn test_action_without_dir_fails() {
    let install = Install::new();
    install
        .cmd()
        .arg("stop")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required output directory"));
}

#[test]
fn test_action_creates_missing_dir() {
    let install = Install::new();
    fs::create_dir_all(install.path().join("registry/tools-default")).unwrap();
    let dir = install.path().join("fresh/run");

    install.cmd().args(["kill", "--dir"]).arg(&dir).assert().code(0);
    assert!(dir.is_dir());
}

#[test]
fn test_action_with_file_as_dir_fails() {
    let install = Install::new();
    let file = install.path().join("not-a-dir");
    fs::write(&file, "").unwrap();
    install
        .cmd()
        .args(["start", "--dir"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a directory"));
}

#[test]
fn test_action_on_unknown_group_fails() {
    let install = Install::new();
    install
        .cmd()
        .args(["kill", "--group", "nope", "--dir"])
        .arg(install.run_dir())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Tool group not found: nope"));
}

#[test]
fn test_action_on_empty_group_succeeds() {
    let install = Install::new();
    fs::create_dir_all(install.path().join("registry/tools-default")).unwrap();

    install
        .cmd()
        .arg("stop")
        .arg(format!("--dir={}", install.run_dir().display()))
        .assert()
        .code(0);
    assert_eq!(fs::read_dir(install.run_dir()).unwrap().count(), 0);
}

#[test]
fn test_register_list_unregister() {
    let install = Install::new();

    install
        .cmd()
        .args(["register", "sar", "--", "--interval=3"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No tool script"));
    install
        .cmd()
        .args(["register", "iostat", "--remote", "db1.example.com", "--label", "db"])
        .assert()
        .success();

    install
        .cmd()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"default\""))
        .stdout(predicate::str::contains("\"db1.example.com\""))
        .stdout(predicate::str::contains("\"UnknownTool\": \"sar\""));

    install
        .cmd()
        .args(["unregister", "iostat"])
        .assert()
        .success();
    assert!(!install
        .path()
        .join("registry/tools-default/iostat@db@db1.example.com")
        .exists());

    install
        .cmd()
        .args(["unregister", "iostat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));

    install
        .cmd()
        .args(["unregister", "--all"])
        .assert()
        .success();
    assert!(!install.path().join("registry/tools-default").exists());
}

#[test]
fn test_register_reserved_name_fails() {
    let install = Install::new();
    install
        .cmd()
        .args(["register", "label"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reserved"));
}

#[test]
fn test_label_and_clear() {
    let install = Install::new();
    install.cmd().args(["label", "web"]).assert().success();
    let label_file = install.path().join("registry/tools-default/label");
    assert_eq!(fs::read_to_string(&label_file).unwrap().trim(), "web");

    install.cmd().args(["label", "--clear"]).assert().success();
    assert!(!label_file.exists());
}

#[test]
fn test_list_without_groups() {
    let install = Install::new();
    install
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tool groups registered"));
}

#[test]
fn test_config_path_and_show() {
    let install = Install::new();
    install
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    install
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hostname = \"bench01\""))
        .stdout(predicate::str::contains("collision_policy = \"prefer-incoming\""));
}

#[test]
fn test_missing_config_file_fails() {
    let install = Install::new();
    pbench_tools()
        .arg("--config")
        .arg(install.path().join("missing.toml"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[cfg(unix)]
#[test]
fn test_exit_code_counts_failed_tools() {
    let install = Install::new();
    install.tool_script("good", "exit 0\n");
    install.tool_script("bad1", "exit 1\n");
    install.tool_script("bad2", "exit 7\n");
    for tool in ["good", "bad1", "bad2"] {
        install.cmd().args(["register", tool]).assert().success();
    }

    install
        .cmd()
        .args(["stop", "--dir"])
        .arg(install.run_dir())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("2 error(s)"));
}

#[cfg(unix)]
#[test]
fn test_postprocess_places_output_under_hostname() {
    let install = Install::new();
    install.tool_script(
        "sar",
        "for a in \"$@\"; do case \"$a\" in --dir=*) dir=${a#--dir=};; esac; done\n\
         [ \"$1\" = --postprocess ] && echo summary > \"$dir/sar.csv\"\n\
         exit 0\n",
    );
    install.cmd().args(["register", "sar"]).assert().success();

    install
        .cmd()
        .args(["postprocess", "--dir"])
        .arg(install.run_dir())
        .assert()
        .code(0);

    let csv = install.run_dir().join("tools-default/bench01/sar.csv");
    assert_eq!(fs::read_to_string(csv).unwrap().trim(), "summary");
}

/// The controller reaches "host1" through an ssh stand-in that runs the real
/// binary against a second installation, whose copy of the run directory
/// does not exist until the first action arrives.
#[cfg(unix)]
#[test]
fn test_remote_host_runs_real_binary_on_absent_dir() {
    let remote = Install::with_config("host1", |_, _| {});
    remote.tool_script(
        "foo",
        "for a in \"$@\"; do case \"$a\" in --dir=*) dir=${a#--dir=};; esac; done\n\
         [ \"$1\" = --postprocess ] && echo from-host1 > \"$dir/foo-output\"\n\
         exit 0\n",
    );
    remote
        .cmd()
        .args(["register", "foo"])
        .assert()
        .success();

    let bin = assert_cmd::cargo::cargo_bin("pbench-tools");
    let remote_root = remote.path().to_path_buf();
    let remote_config = remote.config.clone();
    let controller = Install::with_config("bench01", |root, config| {
        // Skip options and the host, then run the command with this
        // installation's run directory mapped onto the remote one
        write_script(
            &root.join("bin/ssh"),
            &format!(
                "while [ $# -gt 0 ]; do case \"$1\" in -o) shift 2;; -*) shift;; *) break;; esac; done\n\
                 shift\n\
                 exec sh -c \"$(printf '%s' \"$*\" | sed 's#{}#{}#g')\"\n",
                root.join("run").display(),
                remote_root.join("run").display(),
            ),
        );
        write_script(
            &root.join("bin/remote"),
            &format!(
                "exec '{}' --config '{}' \"$@\"\n",
                bin.display(),
                remote_config.display()
            ),
        );
        config.ssh_command = root.join("bin/ssh").to_string_lossy().into_owned();
        config.ssh_opts = vec![];
        config.remote_command = root.join("bin/remote").to_string_lossy().into_owned();
    });
    controller
        .cmd()
        .args(["register", "foo", "--remote", "host1"])
        .assert()
        .success();

    let remote_run = remote.run_dir();
    fs::remove_dir(&remote_run).unwrap();

    for action in ["start", "stop", "postprocess", "kill"] {
        controller
            .cmd()
            .arg(action)
            .arg(format!("--dir={}", controller.run_dir().display()))
            .assert()
            .code(0);
        assert!(remote_run.is_dir());
    }

    let pulled = controller.run_dir().join("tools-default/host1/foo-output");
    assert_eq!(fs::read_to_string(pulled).unwrap().trim(), "from-host1");
    assert!(!remote_run.join("tools-default/host1").exists());
}
