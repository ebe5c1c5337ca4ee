use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_prints_descriptors_and_scopes() {
    let mut cmd = Command::cargo_bin("cffi-decl").unwrap();
    cmd.args(["--abi", "lp64_sysv", "tests/fixtures/point.h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("typedef struct { int x; char y; } Point;\n  size 8, align 4"))
        .stdout(predicate::str::contains("  y: offset 4, size 1"))
        .stdout(predicate::str::contains(
            "scope geometry: shared lib #0 libgeometry.so, 1 variables, 1 functions, 1 types, env offset 0",
        ));
}

#[test]
fn test_packed_flag() {
    let mut cmd = Command::cargo_bin("cffi-decl").unwrap();
    cmd.args(["--abi", "ilp32_cdecl", "--packed", "tests/fixtures/point.h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("size 5, align 1"));
}

#[test]
fn test_conflict_is_reported_with_both_positions() {
    let mut cmd = Command::cargo_bin("cffi-decl").unwrap();
    cmd.args(["--abi", "lp64_sysv", "tests/fixtures/conflict.h"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Id"))
        .stderr(predicate::str::contains("conflict.h:2"))
        .stderr(predicate::str::contains("1 of the input files failed"));
}

#[test]
fn test_unknown_abi_preset() {
    let mut cmd = Command::cargo_bin("cffi-decl").unwrap();
    cmd.args(["--abi", "pdp11", "tests/fixtures/point.h"])
        .assert()
        .failure();
}

#[test]
fn test_missing_input_file() {
    let mut cmd = Command::cargo_bin("cffi-decl").unwrap();
    cmd.arg("tests/fixtures/does_not_exist.h")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does_not_exist.h"));
}
