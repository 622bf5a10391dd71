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
use crate::error::CommandError;
use std::collections::BTreeMap;
use std::path::Path;

/// Environment overlay applied to the non-interactive apt invocations.
const NONINTERACTIVE: (&str, &str) = ("DEBIAN_FRONTEND", "noninteractive");

/// Shown when `apt list --upgradable` prints nothing.
pub const NO_UPGRADES_MESSAGE: &str = "No upgrades found.";

/// Configured for `apt list --upgradable` when it prints something.
///
/// A successful run with output renders the empty-output text instead; see
/// `sink::render_termination`.
pub const FOUND_UPGRADES_MESSAGE: &str = "Found the following package upgrades:";

/// Shown when `apt full-upgrade` prints nothing.
pub const NO_UPGRADES_PERFORMED_MESSAGE: &str = "No package upgrades were performed.";

/// Everything the runner and the sink need to know about one invocation.
///
/// The argument vector is validated on construction: it is never empty and
/// its first element is an absolute path. A spec is immutable afterwards;
/// build a fresh one for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
  argv: Vec<String>,
  env: BTreeMap<String, String>,
  suppress_stderr: bool,
  empty_output_message: Option<String>,
  non_empty_output_message: Option<String>,
}

impl CommandSpec {
  pub fn new<I, S>(argv: I) -> Result<Self, CommandError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
    let Some(program) = argv.first() else {
      return Err(CommandError::EmptyArgv);
    };
    if !Path::new(program).is_absolute() {
      return Err(CommandError::RelativeProgram(program.clone()));
    }

    Ok(CommandSpec {
      argv,
      env: BTreeMap::new(),
      suppress_stderr: false,
      empty_output_message: None,
      non_empty_output_message: None,
    })
  }

  /// Adds a variable merged over the inherited environment.
  pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn suppress_stderr(mut self, suppress: bool) -> Self {
    self.suppress_stderr = suppress;
    self
  }

  pub fn with_empty_output_message(mut self, message: impl Into<String>) -> Self {
    self.empty_output_message = Some(message.into());
    self
  }

  pub fn with_non_empty_output_message(mut self, message: impl Into<String>) -> Self {
    self.non_empty_output_message = Some(message.into());
    self
  }

  /// `apt -y update`
  pub fn update(apt: &Path) -> Result<Self, CommandError> {
    Ok(
      Self::new([apt_arg(apt), "-y".into(), "update".into()])?
        .with_env(NONINTERACTIVE.0, NONINTERACTIVE.1),
    )
  }

  /// `apt -qq list --upgradable`
  ///
  /// apt prints a "Listing..." banner on stderr even with `-qq`, so stderr
  /// is collected but not rendered.
  pub fn list_upgradable(apt: &Path) -> Result<Self, CommandError> {
    Ok(
      Self::new([apt_arg(apt), "-qq".into(), "list".into(), "--upgradable".into()])?
        .suppress_stderr(true)
        .with_empty_output_message(NO_UPGRADES_MESSAGE)
        .with_non_empty_output_message(FOUND_UPGRADES_MESSAGE),
    )
  }

  /// `apt -yqq full-upgrade`
  pub fn full_upgrade(apt: &Path) -> Result<Self, CommandError> {
    Ok(
      Self::new([apt_arg(apt), "-yqq".into(), "full-upgrade".into()])?
        .with_env(NONINTERACTIVE.0, NONINTERACTIVE.1)
        .with_empty_output_message(NO_UPGRADES_PERFORMED_MESSAGE),
    )
  }

  pub fn program(&self) -> &str {
    &self.argv[0]
  }

  pub fn args(&self) -> &[String] {
    &self.argv[1..]
  }

  pub fn argv(&self) -> &[String] {
    &self.argv
  }

  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.env
  }

  pub fn suppresses_stderr(&self) -> bool {
    self.suppress_stderr
  }

  pub fn empty_output_message(&self) -> Option<&str> {
    self.empty_output_message.as_deref()
  }

  pub fn non_empty_output_message(&self) -> Option<&str> {
    self.non_empty_output_message.as_deref()
  }

  /// The argument vector joined by spaces, as shown in the log.
  pub fn display_line(&self) -> String {
    self.argv.join(" ")
  }
}

fn apt_arg(apt: &Path) -> String {
  apt.to_string_lossy().into_owned()
}
