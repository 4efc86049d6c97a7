use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{tempdir, TempDir};

const TWO_MOVES: &str = ";_FIRST_LINE_PLACEHOLDER_\nG1 X10 F600\nG1 X20 F600\n;_LAST_LINE_PLACEHOLDER_\n";

fn write_config(dir: &TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_gcode(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("print.gcode");
    fs::write(&path, TWO_MOVES).unwrap();
    path
}

#[test]
fn prints_summary_without_touching_the_file() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir, "# defaults\n");
    let gcode = write_gcode(&dir);

    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg(&gcode)
        .arg("--config")
        .arg(&config)
        .arg("--no-post-process");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Estimated printing time (normal mode): ",
        ))
        .stdout(predicate::str::contains("Filament changes: 0"));

    assert_eq!(fs::read_to_string(&gcode).unwrap(), TWO_MOVES);
}

#[test]
fn rewrites_placeholders_by_default() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir, "# defaults\n");
    let gcode = write_gcode(&dir);

    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg(&gcode).arg("--config").arg(&config);
    cmd.assert().success();

    let text = fs::read_to_string(&gcode).unwrap();
    assert!(text.starts_with("M73 P0 R0\n"));
    assert!(text.ends_with("M73 P100 R0\n"));
}

#[test]
fn json_statistics_with_stealth() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir, "# defaults\n");
    let gcode = write_gcode(&dir);

    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg(&gcode)
        .arg("--config")
        .arg(&config)
        .arg("--stealth")
        .arg("--json")
        .arg("--no-post-process");
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stdout(predicate::str::contains("\"normal\""))
        .stdout(predicate::str::contains("\"stealth\": {"));
}

#[test]
fn stealth_can_come_from_config() {
    let dir = tempdir().unwrap();
    let config = write_config(
        &dir,
        "[estimator]\nenable_stealth = true\nenable_pre_heating = false\ninject_time_threshold = 30.0\n",
    );
    let gcode = write_gcode(&dir);

    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg(&gcode)
        .arg("--config")
        .arg(&config)
        .arg("--no-post-process");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("(stealth mode)"));
}

#[test]
fn missing_input_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir, "# defaults\n");

    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg(dir.path().join("missing.gcode"))
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to process"));
}

#[test]
fn invalid_config_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir, "filaments = []\n");
    let gcode = write_gcode(&dir);

    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg(&gcode).arg("--config").arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));

    assert_eq!(fs::read_to_string(&gcode).unwrap(), TWO_MOVES);
}

#[test]
fn version_includes_build_date() {
    let mut cmd = Command::cargo_bin("gcodeplan").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
