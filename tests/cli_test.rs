//! End-to-end tests driving the binary against the local backend

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    _temp: TempDir,
    state: PathBuf,
    store: PathBuf,
    data_root: PathBuf,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let data_root = root.join("home").join(".openclaw");
        fs::create_dir_all(data_root.join("agents/main")).unwrap();
        fs::create_dir_all(data_root.join("workspace/memory")).unwrap();
        fs::write(data_root.join("openclaw.json"), r#"{"gateway":{"port":18789}}"#).unwrap();
        fs::write(data_root.join("agents/main/agent.json"), r#"{"model":"a"}"#).unwrap();
        fs::write(data_root.join("workspace/AGENTS.md"), "# Agents\n").unwrap();
        fs::write(data_root.join("workspace/memory/today.md"), "notes\n").unwrap();

        Self {
            state: root.join("state"),
            store: root.join("store"),
            data_root,
            _temp: temp,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("openclaw-backup").unwrap();
        cmd.env("OPENCLAW_BACKUP_HOME", &self.state)
            .env_remove("RUST_LOG");
        cmd
    }

    fn init(&self, extra: &[&str]) {
        self.cmd()
            .args(["config", "init", "--instance-id", "i-test", "--region", "us-west-2"])
            .arg("--local-path")
            .arg(&self.store)
            .arg("--data-root")
            .arg(&self.data_root)
            .args(extra)
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration written"));
    }

    fn create(&self) -> String {
        let output = self.cmd().arg("create").output().unwrap();
        assert!(output.status.success(), "{:?}", output);
        let stdout = String::from_utf8(output.stdout).unwrap();
        backup_name(&stdout)
    }
}

fn backup_name(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Backup created: "))
        .map(|name| name.trim().to_string())
        .unwrap()
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_missing_config_points_to_init() {
    let env = Env::new();
    env.cmd()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn test_config_show() {
    let env = Env::new();
    env.init(&["--keep", "5"]);
    env.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keep 5"))
        .stdout(predicate::str::contains("openclaw-aws-backups/instance-i-test"));
}

#[test]
fn test_create_list_show() {
    let env = Env::new();
    env.init(&[]);

    let name = env.create();
    assert!(name.starts_with("openclaw-aws-backup-"));

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(name.as_str()))
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    env.cmd()
        .args(["show", name.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Instance:   i-test"));
}

#[test]
fn test_restore_requires_force() {
    let env = Env::new();
    env.init(&[]);
    env.create();

    let agent = env.data_root.join("agents/main/agent.json");
    fs::write(&agent, r#"{"model":"b"}"#).unwrap();

    env.cmd()
        .args(["restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("WARNING: This will overwrite"))
        .stdout(predicate::str::contains("--force"));
    assert_eq!(read(&agent), r#"{"model":"b"}"#);

    env.cmd()
        .args(["restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete!"));
    assert_eq!(read(&agent), r#"{"model":"a"}"#);
    assert_eq!(read(&env.data_root.join("workspace/memory/today.md")), "notes\n");
}

#[test]
fn test_restore_unknown_backup_fails() {
    let env = Env::new();
    env.init(&[]);
    env.create();

    env.cmd()
        .args(["restore", "openclaw-aws-backup-1999-01-01T00-00-00", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_prune_keeps_newest() {
    let env = Env::new();
    env.init(&["--keep", "1", "--no-auto-clean"]);
    env.create();
    let newest = env.create();

    env.cmd()
        .arg("prune")
        .assert()
        .success()
        .stdout(predicate::str::contains("To delete: 1"));

    env.cmd()
        .args(["prune", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 1 backup(s)"));

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(newest.as_str()))
        .stdout(predicate::str::contains("Total: 1 backup(s)"));
}

#[test]
fn test_selftest_passes() {
    let env = Env::new();
    env.init(&[]);
    env.cmd()
        .arg("test")
        .assert()
        .success()
        .stdout(predicate::str::contains("All checks passed."));
}
