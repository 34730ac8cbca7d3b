// SPDX-License-Identifier: Apache-2.0
//! Black-box tests of the `leech` binary: a full commit → diff → patch
//! cycle between two working directories, plus the error exits.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const GENESIS: &str = "0000000000000000000000000000000000000000";

struct Host {
    dir: TempDir,
    work_dir: PathBuf,
    csv: PathBuf,
}

impl Host {
    fn new() -> Host {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join(".leech");
        let csv = dir.path().join("beatles.csv");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::write(
            work_dir.join("leech.json"),
            format!(
                r#"{{"tables": [{{
                    "id": "beatles",
                    "primary_fields": ["firstname", "lastname"],
                    "subsidiary_fields": ["born"],
                    "read_locator": "{csv}"
                }}]}}"#,
                csv = csv.display()
            ),
        )
        .unwrap();
        Host { dir, work_dir, csv }
    }

    fn leech(&self) -> Command {
        let mut cmd = Command::cargo_bin("leech").unwrap();
        cmd.current_dir(self.dir.path())
            .arg("--workdir")
            .arg(&self.work_dir);
        cmd
    }

    fn head(&self) -> String {
        std::fs::read_to_string(self.work_dir.join("HEAD"))
            .unwrap()
            .trim()
            .to_owned()
    }
}

fn patch_path(dir: &Path) -> PathBuf {
    dir.join("patch.json")
}

#[test]
fn version_and_help_exit_zero() {
    Command::cargo_bin("leech")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("leech"));
    Command::cargo_bin("leech")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("commit"));
}

#[test]
fn missing_configuration_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("leech")
        .unwrap()
        .arg("--workdir")
        .arg(dir.path().join("nowhere"))
        .arg("commit")
        .assert()
        .failure();
}

#[test]
fn commit_advances_head() {
    let host = Host::new();
    std::fs::write(&host.csv, "Paul,McCartney,1942\r\nRingo,Starr,1940\r\n").unwrap();
    host.leech().arg("commit").assert().success();

    let head = host.head();
    assert_eq!(head.len(), 40);
    assert_ne!(head, GENESIS);
    assert!(host.work_dir.join("blocks").join(&head).is_file());
    assert!(host.work_dir.join("snapshots").join("beatles").is_file());
}

#[test]
fn diff_writes_a_patch_to_stdout_or_file() {
    let host = Host::new();
    std::fs::write(&host.csv, "Paul,McCartney,1942\r\n").unwrap();
    host.leech().arg("commit").assert().success();

    host.leech()
        .args(["diff", GENESIS])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"lastknown\""));

    let patch = patch_path(host.dir.path());
    host.leech()
        .args(["diff", GENESIS, "--file"])
        .arg(&patch)
        .assert()
        .success();
    let content = std::fs::read_to_string(&patch).unwrap();
    assert!(content.contains("\"version\":1"));
    assert!(content.contains(&host.head()));
}

#[test]
fn diff_accepts_a_unique_prefix_and_rejects_garbage() {
    let host = Host::new();
    std::fs::write(&host.csv, "Paul,McCartney,1942\r\n").unwrap();
    host.leech().arg("commit").assert().success();

    let head = host.head();
    host.leech()
        .args(["diff", &head[..12]])
        .assert()
        .success();

    host.leech()
        .args(["diff", "ffff"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no unique block"));
}

#[test]
fn patch_replicates_between_hosts() {
    let producer = Host::new();
    std::fs::write(
        &producer.csv,
        "Paul,McCartney,1942\r\nRingo,Starr,1940\r\n",
    )
    .unwrap();
    producer.leech().arg("commit").assert().success();
    std::fs::write(
        &producer.csv,
        "Paul,McCartney,1942\r\nRingo,Starr,1941\r\nGeorge,Harrison,1943\r\n",
    )
    .unwrap();
    producer.leech().arg("commit").assert().success();

    let patch = patch_path(producer.dir.path());
    producer
        .leech()
        .args(["diff", GENESIS, "--file"])
        .arg(&patch)
        .assert()
        .success();

    let consumer = Host::new();
    consumer
        .leech()
        .arg("patch")
        .arg("--file")
        .arg(&patch)
        .args(["--field", "hostkey", "--value", "producer-a"])
        .assert()
        .success();

    let rows = std::fs::read_to_string(&consumer.csv).unwrap();
    assert_eq!(
        rows,
        "George,Harrison,1943\r\nPaul,McCartney,1942\r\nRingo,Starr,1941\r\n"
    );
    let lastseen = std::fs::read_to_string(
        consumer.work_dir.join("lastseen").join("producer-a"),
    )
    .unwrap();
    assert_eq!(lastseen.trim(), producer.head());
}

#[test]
fn rebase_emits_a_full_state_patch() {
    let host = Host::new();
    std::fs::write(&host.csv, "Paul,McCartney,1942\r\nRingo,Starr,1940\r\n").unwrap();
    host.leech().arg("commit").assert().success();

    let patch = patch_path(host.dir.path());
    host.leech()
        .arg("rebase")
        .arg("--file")
        .arg(&patch)
        .assert()
        .success();
    let content = std::fs::read_to_string(&patch).unwrap();
    assert!(content.contains("\"type\":\"rebase\""));
    assert!(content.contains("Paul,McCartney"));
    assert!(content.contains("Ringo,Starr"));
}

#[test]
fn inform_flag_surfaces_the_commit_summary() {
    let host = Host::new();
    std::fs::write(&host.csv, "Paul,McCartney,1942\r\n").unwrap();
    host.leech()
        .arg("--inform")
        .arg("commit")
        .assert()
        .success()
        .stderr(predicate::str::contains("created commit"));
}

#[test]
fn history_writes_a_report() {
    let host = Host::new();
    std::fs::write(&host.csv, "Paul,McCartney,1942\r\n").unwrap();
    host.leech().arg("commit").assert().success();

    let report = host.dir.path().join("history.csv");
    host.leech()
        .args(["history", "--table", "beatles", "--primary", "Paul,McCartney"])
        .arg("--file")
        .arg(&report)
        .assert()
        .success();
    let content = std::fs::read_to_string(&report).unwrap();
    assert!(content.contains("insert"));
    assert!(content.contains("1942"));
}

#[test]
fn purge_trims_the_chain() {
    let host = Host::new();
    for born in ["1940", "1941", "1942"] {
        std::fs::write(&host.csv, format!("Ringo,Starr,{born}\r\n")).unwrap();
        host.leech().arg("commit").assert().success();
    }
    // Retention is far above three blocks by default, so purge keeps all.
    host.leech().arg("purge").assert().success();
    let blocks = std::fs::read_dir(host.work_dir.join("blocks"))
        .unwrap()
        .count();
    assert_eq!(blocks, 3);
}
