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
//! The window: controls, the action dispatch table, the accelerator keymap
//! and the fixed-interval UI loop.
//!
//! Everything here runs on the UI task. Commands run on worker tasks
//! started by the [`Runner`]; their output reaches the view only through
//! [`Window::tick`].

use crate::command::CommandSpec;
use crate::config::Config;
use crate::error::AppError;
use crate::error::CommandError;
use crate::error::RunError;
use crate::runner::RunSlot;
use crate::runner::Runner;
use crate::sink::Sink;
use crate::sink::Tick;
use crate::view::Level;
use crate::view::View;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  Update,
  List,
  Upgrade,
  Quit,
}

impl Action {
  pub const ALL: [Action; 4] = [Action::Update, Action::List, Action::Upgrade, Action::Quit];

  pub fn name(&self) -> &'static str {
    match self {
      Action::Update => "update",
      Action::List => "list",
      Action::Upgrade => "upgrade",
      Action::Quit => "quit",
    }
  }

  pub fn from_name(name: &str) -> Option<Action> {
    Action::ALL.into_iter().find(|a| a.name() == name)
  }

  /// Whether the action starts a command, i.e. is a control that gets
  /// disabled while a command runs.
  pub fn starts_command(&self) -> bool {
    !matches!(self, Action::Quit)
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// One request to perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
  pub action: Action,
  /// Clear the log before running.
  pub clear: bool,
}

impl Invocation {
  pub fn new(action: Action) -> Self {
    Invocation {
      action,
      clear: true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Quit,
}

/// UI-side state: the log view, the controls and the active run.
pub struct Window<V: View> {
  apt: PathBuf,
  runner: Runner,
  sink: Sink,
  view: V,
  controls_enabled: bool,
  quit_requested: bool,
}

impl<V: View> Window<V> {
  pub fn new(config: &Config, view: V) -> Self {
    Window {
      apt: config.apt_path.clone(),
      runner: Runner::new(RunSlot::default()),
      sink: Sink::new(config.chunks_per_tick),
      view,
      controls_enabled: true,
      quit_requested: false,
    }
  }

  pub fn view(&self) -> &V {
    &self.view
  }

  pub fn view_mut(&mut self) -> &mut V {
    &mut self.view
  }

  pub fn into_view(self) -> V {
    self.view
  }

  pub fn is_idle(&self) -> bool {
    self.sink.is_idle()
  }

  pub fn controls_enabled(&self) -> bool {
    self.controls_enabled
  }

  pub fn quit_requested(&self) -> bool {
    self.quit_requested
  }

  pub fn request_quit(&mut self) {
    self.quit_requested = true;
  }

  /// Starts `spec` unless another command holds the run slot.
  ///
  /// On success the controls are disabled, the busy indicator starts and
  /// a `Running command` line is appended (after clearing, if asked).
  pub fn execute(&mut self, spec: CommandSpec, clear: bool) -> Result<(), RunError> {
    let announce = format!("Running command \"{}\" ...", spec.display_line());
    let handle = self.runner.execute(spec)?;

    self.lock();
    if clear {
      self.view.clear();
    }
    self.view.append(Level::Info, &announce);
    self.sink.attach(handle);
    Ok(())
  }

  pub fn update(&mut self, clear: bool) -> Result<(), AppError> {
    self.execute_facade(CommandSpec::update, clear)
  }

  pub fn list(&mut self, clear: bool) -> Result<(), AppError> {
    self.execute_facade(CommandSpec::list_upgradable, clear)
  }

  pub fn upgrade(&mut self, clear: bool) -> Result<(), AppError> {
    self.execute_facade(CommandSpec::full_upgrade, clear)
  }

  fn execute_facade(
    &mut self,
    build: fn(&Path) -> Result<CommandSpec, CommandError>,
    clear: bool,
  ) -> Result<(), AppError> {
    let spec = build(&self.apt)?;
    self.execute(spec, clear)?;
    Ok(())
  }

  /// Drains queued output into the view; re-enables the controls once the
  /// run has finished.
  pub fn tick(&mut self) -> Tick {
    let tick = self.sink.tick(&mut self.view);
    if let Tick::Finished(termination) = tick {
      tracing::debug!(?termination, "Run released");
      self.unlock();
    }
    tick
  }

  fn report(&mut self, result: Result<(), AppError>) {
    if let Err(e) = result {
      self.view.append(Level::Error, &e.to_string());
    }
  }

  fn lock(&mut self) {
    self.controls_enabled = false;
    self.view.set_busy(true);
  }

  fn unlock(&mut self) {
    self.controls_enabled = true;
    self.view.set_busy(false);
  }
}

type Handler<V> = fn(&mut Window<V>, &Invocation) -> Flow;

/// Maps each action to its handler.
pub struct Dispatcher<V: View> {
  handlers: HashMap<Action, Handler<V>>,
}

impl<V: View> Default for Dispatcher<V> {
  fn default() -> Self {
    let mut handlers: HashMap<Action, Handler<V>> = HashMap::new();
    handlers.insert(Action::Update, on_update);
    handlers.insert(Action::List, on_list);
    handlers.insert(Action::Upgrade, on_upgrade);
    handlers.insert(Action::Quit, on_quit);
    Dispatcher { handlers }
  }
}

impl<V: View> Dispatcher<V> {
  pub fn dispatch(&self, window: &mut Window<V>, invocation: &Invocation) -> Flow {
    let action = invocation.action;
    if action.starts_command() && !window.controls_enabled() {
      tracing::info!(%action, "Ignoring action while a command is running");
      window
        .view_mut()
        .append(Level::Error, &format!("{}, {} ignored", RunError::Busy, action));
      return Flow::Continue;
    }

    match self.handlers.get(&action) {
      Some(handler) => {
        tracing::debug!(%action, clear = invocation.clear, "Dispatching action");
        handler(window, invocation)
      }
      None => Flow::Continue,
    }
  }
}

fn on_update<V: View>(window: &mut Window<V>, invocation: &Invocation) -> Flow {
  let result = window.update(invocation.clear);
  window.report(result);
  Flow::Continue
}

fn on_list<V: View>(window: &mut Window<V>, invocation: &Invocation) -> Flow {
  let result = window.list(invocation.clear);
  window.report(result);
  Flow::Continue
}

fn on_upgrade<V: View>(window: &mut Window<V>, invocation: &Invocation) -> Flow {
  let result = window.upgrade(invocation.clear);
  window.report(result);
  Flow::Continue
}

/// Quitting while a command runs waits for it; apt is never cut off.
fn on_quit<V: View>(window: &mut Window<V>, _invocation: &Invocation) -> Flow {
  if window.is_idle() {
    return Flow::Quit;
  }
  if !window.quit_requested() {
    window.request_quit();
    window.view_mut().append(
      Level::Info,
      "Waiting for the running command to finish before quitting ...",
    );
  }
  Flow::Continue
}

/// Accelerators, in the `<Primary>x` notation.
const ACCELERATORS: [(Action, &[&str]); 4] = [
  (Action::Update, &["<Primary>u"]),
  (Action::List, &["<Primary>l"]),
  (Action::Upgrade, &["<Primary>g"]),
  (Action::Quit, &["<Primary>q", "<Primary>w"]),
];

/// Resolves typed input to an action.
///
/// Accepts action names (`update`), accelerators (`<Primary>u`, `ctrl+u`,
/// `ctrl-u`, `^u`), the raw control character and the bare key (`u`).
#[derive(Debug, Clone)]
pub struct Keymap {
  keys: HashMap<char, Action>,
}

impl Default for Keymap {
  fn default() -> Self {
    let mut keys = HashMap::new();
    for (action, accels) in ACCELERATORS {
      for accel in accels {
        if let Some(key) = accel_key(accel) {
          keys.insert(key, action);
        }
      }
    }
    Keymap { keys }
  }
}

impl Keymap {
  pub fn resolve(&self, input: &str) -> Option<Action> {
    let input = input.trim().to_ascii_lowercase();
    if let Some(action) = Action::from_name(&input) {
      return Some(action);
    }
    self.keys.get(&accel_key(&input)?).copied()
  }

  /// Keys bound to `action`, sorted.
  pub fn keys_for(&self, action: Action) -> Vec<char> {
    let mut keys: Vec<char> = self
      .keys
      .iter()
      .filter(|(_, a)| **a == action)
      .map(|(k, _)| *k)
      .collect();
    keys.sort_unstable();
    keys
  }

  /// e.g. `update (u), list (l), upgrade (g), quit (q, w)`
  pub fn help(&self) -> String {
    Action::ALL
      .iter()
      .map(|action| {
        let keys: Vec<String> = self
          .keys_for(*action)
          .into_iter()
          .map(String::from)
          .collect();
        format!("{} ({})", action, keys.join(", "))
      })
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// Extracts the key letter from an accelerator spelling.
fn accel_key(accel: &str) -> Option<char> {
  let lower = accel.to_ascii_lowercase();
  let key = ["<primary>", "ctrl+", "ctrl-", "^"]
    .iter()
    .find_map(|prefix| lower.strip_prefix(*prefix))
    .unwrap_or(lower.as_str());

  let mut chars = key.chars();
  let c = chars.next()?;
  if chars.next().is_some() {
    return None;
  }
  match c {
    // Raw control character, e.g. 0x15 for Ctrl+U.
    '\u{1}'..='\u{1a}' => char::from_u32(c as u32 + 0x60),
    c if c.is_ascii_alphabetic() => Some(c),
    _ => None,
  }
}

/// Forwards `reader`'s lines from a detached thread; the receiver closes at
/// EOF.
///
/// A plain thread rather than a runtime task: a blocking stdin read cannot
/// be cancelled and would hold up runtime shutdown after a quit.
pub fn read_lines<R>(reader: R) -> UnboundedReceiver<String>
where
  R: BufRead + Send + 'static,
{
  let (tx, rx) = mpsc::unbounded_channel();
  thread::spawn(move || {
    for line in reader.lines() {
      match line {
        Ok(line) => {
          if tx.send(line).is_err() {
            break;
          }
        }
        Err(e) => {
          tracing::warn!(error = %e, "Failed to read input, closing it");
          break;
        }
      }
    }
  });
  rx
}

/// The UI loop.
pub struct App<V: View> {
  window: Window<V>,
  dispatcher: Dispatcher<V>,
  keymap: Keymap,
  poll_interval: Duration,
  startup: VecDeque<Action>,
}

impl<V: View> App<V> {
  pub fn new(config: &Config, view: V) -> Self {
    App {
      window: Window::new(config, view),
      dispatcher: Dispatcher::default(),
      keymap: Keymap::default(),
      poll_interval: config.poll_interval(),
      startup: VecDeque::new(),
    }
  }

  /// Actions issued one after another, each once the window is idle. Only
  /// the first one clears the log.
  pub fn with_startup(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
    self.startup = actions.into_iter().collect();
    self
  }

  pub fn window(&self) -> &Window<V> {
    &self.window
  }

  /// Runs until quit, or until `input` is closed and there is nothing left
  /// to do. Returns the view.
  ///
  /// Pass a receiver whose sender is already dropped to just run the
  /// startup actions.
  pub async fn run(mut self, mut input: UnboundedReceiver<String>) -> V {
    let mut ticker = tokio::time::interval(self.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut input_open = true;
    let mut first_startup = true;

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          self.window.tick();
          if !self.window.is_idle() {
            continue;
          }
          if self.window.quit_requested() {
            break;
          }
          if let Some(action) = self.startup.pop_front() {
            let invocation = Invocation {
              action,
              clear: first_startup,
            };
            first_startup = false;
            if self.dispatcher.dispatch(&mut self.window, &invocation) == Flow::Quit {
              break;
            }
          } else if !input_open {
            break;
          }
        }
        line = input.recv(), if input_open => match line {
          Some(line) => {
            if self.handle_line(&line) == Flow::Quit {
              break;
            }
          }
          None => {
            tracing::debug!("Input closed, quitting once idle");
            input_open = false;
          }
        }
      }
    }

    tracing::info!("Quitting");
    self.window.into_view()
  }

  fn handle_line(&mut self, line: &str) -> Flow {
    if line.trim().is_empty() {
      return Flow::Continue;
    }
    match self.keymap.resolve(line) {
      Some(action) => self
        .dispatcher
        .dispatch(&mut self.window, &Invocation::new(action)),
      None => {
        let message = format!(
          "Unknown input \"{}\", expected one of: {}",
          line.trim(),
          self.keymap.help()
        );
        self.window.view_mut().append(Level::Error, &message);
        Flow::Continue
      }
    }
  }
}
