//! Black-box checks of the `labflow` binary: `compile` exits 0 on a valid
//! protocol and nonzero with diagnostics on an invalid one, and `run`
//! drives a valid protocol to completion and exits 0.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn protocol_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create scratch protocol file");
    file.write_all(contents.as_bytes()).expect("write scratch protocol file");
    file
}

#[test]
fn compile_exits_zero_and_prints_a_valid_result_for_a_well_formed_protocol() {
    let file = protocol_file("name: Test\nsteps:\n  actions:\n    - wait: 1 sec\n");

    Command::cargo_bin("labflow")
        .unwrap()
        .arg("compile")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"));
}

#[test]
fn compile_exits_nonzero_and_reports_diagnostics_for_an_empty_steps_block() {
    let file = protocol_file("name: Test\nsteps:\n");

    Command::cargo_bin("labflow")
        .unwrap()
        .arg("compile")
        .arg(file.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"valid\": false"));
}

#[test]
fn run_drives_a_short_protocol_to_completion_and_exits_zero() {
    let file = protocol_file("name: Test\nsteps:\n  actions:\n    - wait: 0.01 sec\n");

    Command::cargo_bin("labflow")
        .unwrap()
        .arg("run")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"terminated\":true"));
}
