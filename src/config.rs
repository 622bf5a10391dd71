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
use crate::app::Action;
use crate::cli::GlobalArgs;
use crate::error::ConfigError;
use clap::ValueEnum;
use figment::Figment;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Serialized;
use figment::providers::Toml;
use serde::Deserialize;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of the environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "SIMPLE_APT_UPDATE_";

// --- Default Values ---
fn default_apt_path() -> PathBuf {
  PathBuf::from("/usr/bin/apt")
}

fn default_startup() -> Vec<Action> {
  vec![Action::Update, Action::List]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
  #[default]
  Auto,
  Always,
  Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// `LEVEL: text` lines, colored on a terminal.
  #[default]
  Text,
  /// One JSON object per line.
  Json,
}

/// Fully validated and resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
  pub apt_path: PathBuf,
  pub poll_interval_ms: u64,
  pub chunks_per_tick: usize,
  pub color: ColorChoice,
  pub format: OutputFormat,
  pub startup: Vec<Action>,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      apt_path: default_apt_path(),
      poll_interval_ms: 100,
      chunks_per_tick: 1,
      color: ColorChoice::Auto,
      format: OutputFormat::Text,
      startup: default_startup(),
    }
  }
}

impl Config {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  /// Whether the terminal view should emit ANSI colors.
  pub fn use_color(&self) -> bool {
    match self.color {
      ColorChoice::Always => true,
      ColorChoice::Never => false,
      ColorChoice::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
    }
  }

  pub fn to_toml(&self) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(self)?)
  }

  fn validate(self) -> Result<Self, ConfigError> {
    if !self.apt_path.is_absolute() {
      return Err(ConfigError::RelativeAptPath(self.apt_path));
    }
    if self.poll_interval_ms == 0 {
      return Err(ConfigError::ZeroPollInterval);
    }
    if self.chunks_per_tick == 0 {
      return Err(ConfigError::ZeroChunksPerTick);
    }
    Ok(self)
  }
}

/// Layers defaults, the optional TOML file, `SIMPLE_APT_UPDATE_*` variables
/// and finally explicit command-line values.
impl TryFrom<&GlobalArgs> for Config {
  type Error = ConfigError;

  fn try_from(args: &GlobalArgs) -> Result<Self, Self::Error> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(path) = &args.config {
      if !path.is_file() {
        return Err(ConfigError::MissingFile(path.clone()));
      }
      figment = figment.merge(Toml::file(path));
    }

    let mut config: Config = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;

    if let Some(apt_path) = &args.apt_path {
      config.apt_path = apt_path.clone();
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
      config.poll_interval_ms = poll_interval_ms;
    }
    if let Some(color) = args.color {
      config.color = color;
    }
    if let Some(format) = args.format {
      config.format = format;
    }

    tracing::debug!(?config, "Resolved configuration");
    config.validate()
  }
}
