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
//! # simple-apt-update
//!
//! Runs `apt update`, `apt list --upgradable` and `apt full-upgrade` and
//! streams their stdout and stderr into a color-coded log view, one command
//! at a time.
//!
//! ## Core Modules
//!
//! * [`command`]: `CommandSpec` and the three apt invocations with their
//!   display policy.
//! * [`runner`]: Spawns the child, multiplexes its two pipes and sends text
//!   chunks followed by exactly one exit chunk. Holds the single run slot.
//! * [`sink`]: Drains those chunks on every UI tick and applies the display
//!   policy when the run ends.
//! * [`view`]: Level prefixes, colors, escaping and the render targets.
//! * [`app`]: The window, its action dispatch table, the keymap and the UI
//!   loop.
//! * [`cli`]: Defines the `clap`-based command-line interface.
//! * [`config`]: Layers defaults, a TOML file, environment and flags into a
//!   `Config`.
//! * [`error`]: Defines the custom error types for the library.
//! * [`logging`]: Provides the `setup_tracing` utility.

pub mod app;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;
pub mod sink;
pub mod view;
