mod common;

use assert_cmd::Command;
use assert_fs::prelude::*;
use common::{create_temp_directory, png_bytes, write_png};
use predicates::prelude::*;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("img-squeeze-vault").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("sweep"));
}

#[test]
fn test_serve_help_lists_env_vars() {
    cmd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SQUEEZE_JOB_TTL_SECS"));
}

#[test]
fn test_batch_missing_args() {
    cmd().arg("batch").assert().failure();
}

#[test]
fn test_batch_nonexistent_input() {
    let temp_dir = create_temp_directory();
    cmd()
        .args(["batch", "definitely/not/here/*.png", "--workspace-root"])
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No image files found"));
}

#[test]
fn test_batch_compresses_directory() {
    let input = create_temp_directory();
    write_png(input.path(), "a.png", 32, 32);
    write_png(input.path(), "b.png", 24, 16);
    let workspace = create_temp_directory();

    cmd()
        .arg("batch")
        .arg(input.path())
        .args(["-f", "webp", "-q", "80", "--workspace-root"])
        .arg(workspace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 of 2 files written"));

    let jobs: Vec<_> = std::fs::read_dir(workspace.path()).unwrap().collect();
    assert_eq!(jobs.len(), 1);
    let job_dir = jobs[0].as_ref().unwrap().path();
    assert_eq!(std::fs::read_dir(job_dir).unwrap().count(), 2);
}

#[test]
fn test_batch_reports_bad_files_without_failing() {
    let input = assert_fs::TempDir::new().unwrap();
    input.child("good.png").write_binary(&png_bytes(16, 16)).unwrap();
    input.child("bad.jpg").write_str("just text").unwrap();
    let workspace = assert_fs::TempDir::new().unwrap();

    cmd()
        .arg("batch")
        .arg(input.path())
        .arg("--workspace-root")
        .arg(workspace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("bad.jpg"))
        .stdout(predicate::str::contains("1 of 2 files written"));
}

#[test]
fn test_batch_rejects_unknown_format() {
    let input = create_temp_directory();
    write_png(input.path(), "a.png", 8, 8);
    let workspace = create_temp_directory();

    cmd()
        .arg("batch")
        .arg(input.path())
        .args(["-f", "bmp", "--workspace-root"])
        .arg(workspace.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported format"));
}

#[test]
fn test_sweep_removes_orphans() {
    let workspace = assert_fs::TempDir::new().unwrap();
    workspace.child("stale-job").create_dir_all().unwrap();
    workspace.child("stale-job/a.webp").write_str("x").unwrap();
    workspace.child("loose-file.txt").write_str("x").unwrap();

    cmd()
        .arg("sweep")
        .arg("--workspace-root")
        .arg(workspace.path())
        .args(["--orphan-grace-secs", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 orphaned"));

    workspace.child("stale-job").assert(predicate::path::missing());
    workspace.child("loose-file.txt").assert(predicate::path::exists());
}

#[test]
fn test_sweep_keeps_recent_dirs_by_default() {
    let workspace = assert_fs::TempDir::new().unwrap();
    workspace.child("fresh-job").create_dir_all().unwrap();

    cmd()
        .arg("sweep")
        .arg("--workspace-root")
        .arg(workspace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 orphaned"));

    workspace.child("fresh-job").assert(predicate::path::is_dir());
}
