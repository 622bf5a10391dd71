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
use crate::config::ColorChoice;
use crate::config::OutputFormat;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
  version,
  about = "Runs apt update, list and full-upgrade and streams their output"
)]
pub struct Cli {
  #[command(flatten)]
  pub global: GlobalArgs,

  #[command(subcommand)]
  pub command: Option<Commands>,
}

/// Options shared by every subcommand. Unset values fall back to the
/// configuration file, then `SIMPLE_APT_UPDATE_*` variables, then defaults.
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
  /// TOML configuration file.
  #[arg(long, global = true, env = "SIMPLE_APT_UPDATE_CONFIG")]
  pub config: Option<PathBuf>,

  /// Absolute path of the apt executable.
  #[arg(long, global = true)]
  pub apt_path: Option<PathBuf>,

  /// How often the log view drains command output, in milliseconds.
  #[arg(long, global = true)]
  pub poll_interval_ms: Option<u64>,

  #[arg(long, global = true, value_enum)]
  pub color: Option<ColorChoice>,

  #[arg(long, global = true, value_enum)]
  pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
  /// Run the startup commands, then read actions from stdin (the default).
  Interactive,

  /// Refresh the package lists (`apt -y update`).
  Update,

  /// List upgradable packages (`apt -qq list --upgradable`).
  List,

  /// Install all available upgrades (`apt -yqq full-upgrade`).
  Upgrade,

  /// Print the effective configuration as TOML.
  Config,
}
