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
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a window action (src/app.rs).
#[derive(Error, Debug)]
pub enum AppError {
  #[error(transparent)]
  Command(#[from] CommandError),

  #[error(transparent)]
  Run(#[from] RunError),
}

/// Errors related to configuration resolution (src/config.rs).
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to load configuration: {0}")]
  Load(#[from] Box<figment::Error>),

  #[error("Configuration file not found: {0}")]
  MissingFile(PathBuf),

  #[error("apt path must be absolute, got: {0}")]
  RelativeAptPath(PathBuf),

  #[error("poll interval must be greater than zero")]
  ZeroPollInterval,

  #[error("chunks per tick must be greater than zero")]
  ZeroChunksPerTick,

  #[error("Failed to render configuration as TOML: {0}")]
  Render(#[from] toml::ser::Error),
}

impl From<figment::Error> for ConfigError {
  fn from(err: figment::Error) -> Self {
    ConfigError::Load(Box::new(err))
  }
}

/// Errors raised while building a `CommandSpec` (src/command.rs).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
  #[error("argument vector must not be empty")]
  EmptyArgv,

  #[error("program must be an absolute path, got: {0}")]
  RelativeProgram(String),
}

/// Errors raised when a run is requested (src/runner.rs).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunError {
  #[error("Another command is already running")]
  Busy,
}
