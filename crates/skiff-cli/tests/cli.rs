//! Command-line surface checks that need no engine.

use assert_cmd::Command;
use predicates::prelude::*;

fn skiff() -> Command {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.env_remove("SKIFF_DOCKER_HOST").env_remove("DOCKER_HOST");
    cmd
}

#[test]
fn help_lists_commands() {
    skiff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("purge"))
        .stdout(predicate::str::contains("rm"))
        .stdout(predicate::str::contains("ps"));
}

#[test]
fn rm_rejects_malformed_ids() {
    skiff()
        .args(["rm", "not/an/id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid container ID"));
}

#[test]
fn unknown_endpoint_scheme_is_rejected() {
    skiff()
        .args(["--host", "ssh://box", "ps"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid engine endpoint"));
}

#[test]
fn unreachable_engine_fails_cleanly() {
    skiff()
        .args(["--host", "unix:///nonexistent/skiff.sock", "ps"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));
}
