// Copyright 2025 Chisomo Makombo Sakala
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use assert_cmd::Command;
use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use tempfile::tempdir;

/// Writes an executable `apt` stand-in that runs `body` under /bin/sh.
fn fake_apt(dir: &Path, body: &str) -> PathBuf {
  let path = dir.join("apt");
  fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// The binary with a clean `SIMPLE_APT_UPDATE_*` environment.
fn bin() -> Command {
  let mut cmd = Command::new(cargo::cargo_bin!("simple-apt-update"));
  cmd
    .env_remove("SIMPLE_APT_UPDATE_CONFIG")
    .env_remove("SIMPLE_APT_UPDATE_STARTUP")
    .env_remove("SIMPLE_APT_UPDATE_APT_PATH")
    .env_remove("SIMPLE_APT_UPDATE_POLL_INTERVAL_MS")
    .env_remove("SIMPLE_APT_UPDATE_CHUNKS_PER_TICK")
    .env_remove("SIMPLE_APT_UPDATE_COLOR")
    .env_remove("SIMPLE_APT_UPDATE_FORMAT")
    .env_remove("SIMPLE_APT_UPDATE_LOG_FILE");
  cmd
}

fn sau(apt: &Path) -> Command {
  let mut cmd = bin();
  cmd
    .arg("--apt-path")
    .arg(apt)
    .arg("--color")
    .arg("never")
    .arg("--poll-interval-ms")
    .arg("10");
  cmd
}

#[test]
fn test_list_without_upgrades() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "exit 0");

  let expected = format!(
    "INFO: Running command \"{} -qq list --upgradable\" ...\nINFO: No upgrades found.\n",
    apt.display()
  );
  sau(&apt).arg("list").assert().success().stdout(predicate::str::diff(expected));
}

#[test]
fn test_list_with_upgrades() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(
    temp.path(),
    "echo 'Listing...' >&2; echo 'bash/stable 5.2 amd64 [upgradable from: 5.1]'",
  );

  let expected = format!(
    "INFO: Running command \"{} -qq list --upgradable\" ...\n\
     STDOUT: bash/stable 5.2 amd64 [upgradable from: 5.1]\n\
     INFO: No upgrades found.\n",
    apt.display()
  );
  sau(&apt).arg("list").assert().success().stdout(predicate::str::diff(expected));
}

#[test]
fn test_update_streams_stdout() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "echo 'Fetched 3 lists'");

  let expected = format!(
    "INFO: Running command \"{} -y update\" ...\nSTDOUT: Fetched 3 lists\n",
    apt.display()
  );
  sau(&apt).arg("update").assert().success().stdout(predicate::str::diff(expected));
}

#[test]
fn test_upgrade_locked() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "echo 'E: locked' >&2; exit 1");

  sau(&apt)
    .arg("upgrade")
    .assert()
    .success()
    .stdout(predicate::str::contains("-yqq full-upgrade\" ..."))
    .stdout(predicate::str::contains("ERROR: Command exited with code 1"))
    .stdout(predicate::str::contains("STDERR: E: locked"))
    .stdout(predicate::str::contains("No package upgrades were performed").not());
}

#[test]
fn test_update_is_noninteractive() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "echo \"frontend=$DEBIAN_FRONTEND\"");

  sau(&apt)
    .arg("update")
    .env_remove("DEBIAN_FRONTEND")
    .assert()
    .success()
    .stdout(predicate::str::contains("STDOUT: frontend=noninteractive"));
}

#[test]
fn test_missing_apt_still_finishes() {
  let temp = tempdir().unwrap();
  let apt = temp.path().join("no-such-apt");

  sau(&apt)
    .arg("update")
    .assert()
    .success()
    .stdout(predicate::str::contains("ERROR: Failed to run command"));
}

#[test]
fn test_relative_apt_path_is_rejected() {
  let mut cmd = bin();
  cmd.arg("--apt-path").arg("apt").arg("update");

  cmd
    .assert()
    .failure()
    .stdout(predicate::str::is_empty())
    .stderr(predicate::str::contains("apt path must be absolute"));
}

#[test]
fn test_json_format() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "printf 'Inst \\033[31mbash\\n'");

  sau(&apt)
    .arg("--format")
    .arg("json")
    .arg("update")
    .assert()
    .success()
    .stdout(predicate::str::contains(
      r#"{"level":"STDOUT","text":"Inst \u001b[31mbash"}"#,
    ));
}

#[test]
fn test_text_output_escapes_control_characters() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "printf 'Inst \\033[31mbash\\n'");

  sau(&apt)
    .arg("update")
    .assert()
    .success()
    .stdout(predicate::str::contains("STDOUT: Inst \\u{001b}[31mbash"));
}

#[test]
fn test_config_layers() {
  let temp = tempdir().unwrap();
  let config_path = temp.path().join("simple-apt-update.toml");
  fs::write(
    &config_path,
    "apt_path = \"/opt/apt/bin/apt\"\nchunks_per_tick = 8\nstartup = []\n",
  )
  .unwrap();

  let mut cmd = bin();
  cmd
    .arg("--config")
    .arg(&config_path)
    .arg("--format")
    .arg("json")
    .arg("config")
    .env("SIMPLE_APT_UPDATE_POLL_INTERVAL_MS", "250");

  cmd
    .assert()
    .success()
    .stdout(predicate::str::contains("apt_path = \"/opt/apt/bin/apt\""))
    .stdout(predicate::str::contains("poll_interval_ms = 250"))
    .stdout(predicate::str::contains("chunks_per_tick = 8"))
    .stdout(predicate::str::contains("format = \"json\""))
    .stdout(predicate::str::contains("startup = []"));
}

#[test]
fn test_interactive_startup_then_eof() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "case \"$*\" in *update*) echo 'Hit:1 stable InRelease';; esac");

  let assert = sau(&apt).write_stdin("").assert().success();
  let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

  let update = stdout.find("-y update\" ...").unwrap();
  let hit = stdout.find("STDOUT: Hit:1 stable InRelease").unwrap();
  let list = stdout.find("-qq list --upgradable\" ...").unwrap();
  let none = stdout.find("INFO: No upgrades found.").unwrap();
  assert!(update < hit && hit < list && list < none);
}

#[test]
fn test_interactive_actions_from_stdin() {
  let temp = tempdir().unwrap();
  let apt = fake_apt(temp.path(), "exit 0");
  let config_path = temp.path().join("simple-apt-update.toml");
  fs::write(&config_path, "startup = []\n").unwrap();

  sau(&apt)
    .arg("--config")
    .arg(&config_path)
    .write_stdin("bogus\n^g\nq\n")
    .assert()
    .success()
    .stdout(predicate::str::contains("ERROR: Unknown input \"bogus\""))
    .stdout(predicate::str::contains("-yqq full-upgrade\" ..."))
    .stdout(predicate::str::contains("INFO: No package upgrades were performed."))
    .stdout(predicate::str::contains("update (u), list (l), upgrade (g), quit (q, w)"));
}
