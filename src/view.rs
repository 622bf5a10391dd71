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
use serde::Deserialize;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::io::Write;

/// Level prefix of a rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
  Info,
  Error,
  Stdout,
  Stderr,
}

impl Level {
  pub fn as_str(&self) -> &'static str {
    match self {
      Level::Info => "INFO",
      Level::Error => "ERROR",
      Level::Stdout => "STDOUT",
      Level::Stderr => "STDERR",
    }
  }

  pub fn color(&self) -> Color {
    match self {
      Level::Info => Color::Green,
      Level::Error => Color::Red,
      _ => Color::Grey,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
  Green,
  Red,
  Grey,
}

impl Color {
  fn ansi(&self) -> &'static str {
    match self {
      Color::Green => "\x1b[32m",
      Color::Red => "\x1b[31m",
      Color::Grey => "\x1b[90m",
    }
  }
}

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_CLEAR: &str = "\x1b[2J\x1b[H";
const ANSI_DIM: &str = "\x1b[2m";

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
  pub level: Level,
  pub text: String,
}

/// Render target of the log.
pub trait View {
  fn append(&mut self, level: Level, text: &str);

  fn clear(&mut self);

  /// Busy indicator; on while a command runs.
  fn set_busy(&mut self, busy: bool);
}

/// Escapes control characters (other than newline and tab) so command output
/// cannot drive the terminal.
pub fn escape_control(text: &str) -> Cow<'_, str> {
  if !text.chars().any(needs_escape) {
    return Cow::Borrowed(text);
  }
  let mut out = String::with_capacity(text.len() + 8);
  for c in text.chars() {
    if needs_escape(c) {
      out.push_str(&format!("\\u{{{:04x}}}", c as u32));
    } else {
      out.push(c);
    }
  }
  Cow::Owned(out)
}

fn needs_escape(c: char) -> bool {
  c.is_control() && c != '\n' && c != '\t'
}

/// Writes colored `LEVEL: text` lines to a terminal.
pub struct TerminalView<W: Write> {
  out: W,
  color: bool,
}

impl TerminalView<io::Stdout> {
  pub fn stdout(color: bool) -> Self {
    TerminalView::new(io::stdout(), color)
  }
}

impl<W: Write> TerminalView<W> {
  pub fn new(out: W, color: bool) -> Self {
    TerminalView { out, color }
  }

  pub fn into_inner(self) -> W {
    self.out
  }

  fn write(&mut self, args: fmt::Arguments<'_>) {
    if let Err(e) = self.out.write_fmt(args).and_then(|_| self.out.flush()) {
      tracing::warn!(error = %e, "Failed to write to the log view");
    }
  }
}

impl<W: Write> View for TerminalView<W> {
  fn append(&mut self, level: Level, text: &str) {
    let text = escape_control(text);
    if self.color {
      let color = level.color().ansi();
      self.write(format_args!("{color}{level}: {ANSI_RESET}{text}\n"));
    } else {
      self.write(format_args!("{level}: {text}\n"));
    }
  }

  fn clear(&mut self) {
    if self.color {
      self.write(format_args!("{ANSI_CLEAR}"));
    }
  }

  fn set_busy(&mut self, busy: bool) {
    if self.color {
      let state = if busy { "working" } else { "idle" };
      self.write(format_args!("{ANSI_DIM}… {state}{ANSI_RESET}\n"));
    }
  }
}

/// Writes one JSON object per line.
pub struct JsonView<W: Write> {
  out: W,
}

impl JsonView<io::Stdout> {
  pub fn stdout() -> Self {
    JsonView::new(io::stdout())
  }
}

impl<W: Write> JsonView<W> {
  pub fn new(out: W) -> Self {
    JsonView { out }
  }

  pub fn into_inner(self) -> W {
    self.out
  }
}

impl<W: Write> View for JsonView<W> {
  fn append(&mut self, level: Level, text: &str) {
    let line = LogLine {
      level,
      text: text.to_string(),
    };
    let res = serde_json::to_writer(&mut self.out, &line)
      .map_err(io::Error::from)
      .and_then(|_| self.out.write_all(b"\n"))
      .and_then(|_| self.out.flush());
    if let Err(e) = res {
      tracing::warn!(error = %e, "Failed to write to the log view");
    }
  }

  fn clear(&mut self) {}

  fn set_busy(&mut self, _busy: bool) {}
}

/// In-memory log, used by tests and embedders.
#[derive(Debug, Default)]
pub struct Transcript {
  pub lines: Vec<LogLine>,
  pub busy: bool,
  pub clears: usize,
}

impl Transcript {
  pub fn count(&self, level: Level) -> usize {
    self.lines.iter().filter(|l| l.level == level).count()
  }

  pub fn texts(&self, level: Level) -> Vec<&str> {
    self
      .lines
      .iter()
      .filter(|l| l.level == level)
      .map(|l| l.text.as_str())
      .collect()
  }
}

impl View for Transcript {
  fn append(&mut self, level: Level, text: &str) {
    self.lines.push(LogLine {
      level,
      text: text.to_string(),
    });
  }

  fn clear(&mut self) {
    self.lines.clear();
    self.clears += 1;
  }

  fn set_busy(&mut self, busy: bool) {
    self.busy = busy;
  }
}

impl<V: View + ?Sized> View for Box<V> {
  fn append(&mut self, level: Level, text: &str) {
    (**self).append(level, text)
  }

  fn clear(&mut self) {
    (**self).clear()
  }

  fn set_busy(&mut self, busy: bool) {
    (**self).set_busy(busy)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_colors() {
    assert_eq!(Level::Info.color(), Color::Green);
    assert_eq!(Level::Error.color(), Color::Red);
    assert_eq!(Level::Stdout.color(), Color::Grey);
    assert_eq!(Level::Stderr.color(), Color::Grey);
  }

  #[test]
  fn escape_control_leaves_plain_text_borrowed() {
    assert!(matches!(escape_control("Fetched 3 lists\n\tok"), Cow::Borrowed(_)));
  }

  #[test]
  fn escape_control_neutralizes_ansi_sequences() {
    assert_eq!(escape_control("\x1b[31mred\r"), "\\u{001b}[31mred\\u{000d}");
  }

  #[test]
  fn plain_terminal_view_prefixes_level() {
    let mut view = TerminalView::new(Vec::new(), false);
    view.set_busy(true);
    view.append(Level::Stdout, "Fetched 3 lists");
    view.clear();
    view.append(Level::Error, "Command exited with code 1");

    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(out, "STDOUT: Fetched 3 lists\nERROR: Command exited with code 1\n");
  }

  #[test]
  fn colored_terminal_view_colors_prefix_only() {
    let mut view = TerminalView::new(Vec::new(), true);
    view.append(Level::Info, "<b>not markup</b>");

    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(out, "\x1b[32mINFO: \x1b[0m<b>not markup</b>\n");
  }

  #[test]
  fn json_view_writes_one_object_per_line() {
    let mut view = JsonView::new(Vec::new());
    view.append(Level::Stderr, "E: \"locked\"");

    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(out, "{\"level\":\"STDERR\",\"text\":\"E: \\\"locked\\\"\"}\n");
    let line: LogLine = serde_json::from_str(out.trim_end()).unwrap();
    assert_eq!(line.level, Level::Stderr);
  }
}
