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
//! UI-side consumer of a run's output.
//!
//! [`Sink::tick`] is called at a fixed interval from the UI loop. It only
//! ever uses `try_recv`, so a tick never waits on the worker.

use crate::runner::OutputChunk;
use crate::runner::RunHandle;
use crate::runner::Termination;
use crate::view::Level;
use crate::view::View;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  /// No run is attached.
  Idle,
  /// The run is still going.
  Running,
  /// The exit chunk was rendered and the run released.
  Finished(Termination),
}

#[derive(Debug)]
pub struct Sink {
  active: Option<RunHandle>,
  chunks_per_tick: usize,
}

impl Default for Sink {
  fn default() -> Self {
    Sink::new(1)
  }
}

impl Sink {
  /// `chunks_per_tick` caps the dequeues per channel on each tick.
  pub fn new(chunks_per_tick: usize) -> Self {
    Sink {
      active: None,
      chunks_per_tick: chunks_per_tick.max(1),
    }
  }

  /// Attaches a freshly started run.
  ///
  /// Runs are exclusive through the run slot, so a sink never sees two
  /// handles at once; if it did, the old one is finished by dropping it.
  pub fn attach(&mut self, handle: RunHandle) {
    if let Some(old) = self.active.replace(handle) {
      tracing::warn!(cmd = %old.spec.display_line(), "Dropping an unfinished run");
    }
  }

  pub fn is_idle(&self) -> bool {
    self.active.is_none()
  }

  pub fn active(&self) -> Option<&RunHandle> {
    self.active.as_ref()
  }

  pub fn tick(&mut self, view: &mut impl View) -> Tick {
    let Some(run) = self.active.as_mut() else {
      return Tick::Idle;
    };

    for _ in 0..self.chunks_per_tick {
      match run.stdout_rx.try_recv() {
        Ok(OutputChunk::Exit(termination)) => {
          drain_stderr(run, view, usize::MAX);
          render_termination(run, termination, view);
          self.active = None;
          return Tick::Finished(termination);
        }
        Ok(chunk) => render_chunk(run, chunk, view),
        Err(_) => break,
      }
    }

    drain_stderr(run, view, self.chunks_per_tick);
    Tick::Running
  }
}

fn drain_stderr(run: &mut RunHandle, view: &mut impl View, limit: usize) {
  for _ in 0..limit {
    match run.stderr_rx.try_recv() {
      Ok(chunk) => render_chunk(run, chunk, view),
      Err(_) => break,
    }
  }
}

fn render_chunk(run: &mut RunHandle, chunk: OutputChunk, view: &mut impl View) {
  match chunk {
    OutputChunk::Stdout(text) => {
      run.stdout.push_str(&text);
      view.append(Level::Stdout, &text);
    }
    OutputChunk::Stderr(text) => {
      run.stderr.push_str(&text);
      if !run.spec.suppresses_stderr() {
        view.append(Level::Stderr, &text);
      }
    }
    OutputChunk::Failed(message) => view.append(Level::Error, &message),
    OutputChunk::Exit(_) => {}
  }
}

/// Applies the display policy of the finished command.
///
/// With a non-empty-output message configured, non-empty output still shows
/// the *empty*-output message. Kept as is; see the regression test.
fn render_termination(run: &RunHandle, termination: Termination, view: &mut impl View) {
  match termination {
    Termination::Code(0) => {
      let spec = &run.spec;
      let message = if run.stdout.is_empty() {
        spec.empty_output_message()
      } else if spec.non_empty_output_message().is_some() {
        spec.empty_output_message()
      } else {
        None
      };
      if let Some(message) = message {
        view.append(Level::Info, message);
      }
    }
    Termination::Code(code) => {
      view.append(Level::Error, &format!("Command exited with code {code}"));
    }
    Termination::Signal(signal) => {
      view.append(Level::Error, &format!("Command terminated by signal {signal}"));
    }
    Termination::Failed => {}
  }
}
