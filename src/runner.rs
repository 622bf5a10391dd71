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
//! Spawns one child process and streams its output.
//!
//! The worker task owns the child and both pipes. It multiplexes the two
//! pipes with `tokio::select!`, so whichever stream is ready gets read
//! without a thread per stream. Text goes out over two unbounded channels
//! (one per stream). The terminal [`OutputChunk::Exit`] is sent on the
//! stdout channel only after both pipes have reached end-of-file and the
//! child has been reaped.

use crate::command::CommandSpec;
use crate::error::RunError;
use std::io;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

const READ_BUF_SIZE: usize = 4096;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
  /// The child exited on its own with this code.
  Code(i32),
  /// The child was killed by this signal.
  Signal(i32),
  /// The child could not be spawned or reaped. A `Failed` chunk precedes it.
  Failed,
}

impl Termination {
  pub fn success(&self) -> bool {
    matches!(self, Termination::Code(0))
  }
}

impl From<ExitStatus> for Termination {
  fn from(status: ExitStatus) -> Self {
    if let Some(code) = status.code() {
      return Termination::Code(code);
    }
    #[cfg(unix)]
    {
      use std::os::unix::process::ExitStatusExt;
      if let Some(signal) = status.signal() {
        return Termination::Signal(signal);
      }
    }
    Termination::Failed
  }
}

/// One unit of streamed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
  Stdout(String),
  Stderr(String),
  /// Runner-side failure, e.g. the executable could not be spawned.
  Failed(String),
  /// Always the last chunk on the stdout channel.
  Exit(Termination),
}

/// Guards the single active run.
///
/// Clones share one slot. Whoever holds the permit from
/// [`RunSlot::try_acquire`] is the active run; the slot frees up when the
/// permit is dropped.
#[derive(Debug, Clone)]
pub struct RunSlot {
  semaphore: Arc<Semaphore>,
}

impl Default for RunSlot {
  fn default() -> Self {
    RunSlot {
      semaphore: Arc::new(Semaphore::new(1)),
    }
  }
}

impl RunSlot {
  pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, RunError> {
    Arc::clone(&self.semaphore)
      .try_acquire_owned()
      .map_err(|_| RunError::Busy)
  }

  pub fn is_free(&self) -> bool {
    self.semaphore.available_permits() > 0
  }
}

/// Consumer half of an in-flight run.
///
/// Owned by the sink. It keeps the run permit until it is dropped, which
/// happens after the exit chunk has been rendered.
#[derive(Debug)]
pub struct RunHandle {
  pub(crate) spec: CommandSpec,
  pub(crate) stdout_rx: UnboundedReceiver<OutputChunk>,
  pub(crate) stderr_rx: UnboundedReceiver<OutputChunk>,
  pub(crate) stdout: String,
  pub(crate) stderr: String,
  _permit: OwnedSemaphorePermit,
}

impl RunHandle {
  pub fn spec(&self) -> &CommandSpec {
    &self.spec
  }

  /// All stdout text seen so far.
  pub fn stdout(&self) -> &str {
    &self.stdout
  }

  /// All stderr text seen so far, including suppressed text.
  pub fn stderr(&self) -> &str {
    &self.stderr
  }
}

/// Starts commands on the tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct Runner {
  slot: RunSlot,
}

impl Runner {
  pub fn new(slot: RunSlot) -> Self {
    Runner { slot }
  }

  pub fn slot(&self) -> &RunSlot {
    &self.slot
  }

  /// Starts `spec` on a worker task and returns straight away.
  ///
  /// Fails with [`RunError::Busy`] while another run holds the slot.
  /// Must be called from within a tokio runtime.
  pub fn execute(&self, spec: CommandSpec) -> Result<RunHandle, RunError> {
    let permit = self.slot.try_acquire().inspect_err(|_| {
      tracing::warn!(cmd = %spec.display_line(), "Rejected start request, a command is already running");
    })?;

    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
    let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();

    let span = tracing::info_span!("run", cmd = %spec.display_line());
    tokio::spawn(run_to_completion(spec.clone(), stdout_tx, stderr_tx).instrument(span));

    Ok(RunHandle {
      spec,
      stdout_rx,
      stderr_rx,
      stdout: String::new(),
      stderr: String::new(),
      _permit: permit,
    })
  }
}

/// Worker body. Always ends by sending exactly one `Exit` chunk.
async fn run_to_completion(
  spec: CommandSpec,
  stdout_tx: UnboundedSender<OutputChunk>,
  stderr_tx: UnboundedSender<OutputChunk>,
) {
  let termination = match drive(&spec, &stdout_tx, &stderr_tx).await {
    Ok(termination) => termination,
    Err(message) => {
      tracing::error!(%message, "Run failed");
      let _ = stdout_tx.send(OutputChunk::Failed(message));
      Termination::Failed
    }
  };

  tracing::info!(?termination, "Command finished");
  let _ = stdout_tx.send(OutputChunk::Exit(termination));
}

async fn drive(
  spec: &CommandSpec,
  stdout_tx: &UnboundedSender<OutputChunk>,
  stderr_tx: &UnboundedSender<OutputChunk>,
) -> Result<Termination, String> {
  let mut cmd = Command::new(spec.program());
  cmd
    .args(spec.args())
    .envs(spec.env())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(false);

  tracing::debug!(cmd = ?cmd, "Spawning command");
  let mut child = cmd
    .spawn()
    .map_err(|e| format!("Failed to run command \"{}\": {}", spec.display_line(), e))?;
  tracing::debug!(pid = ?child.id(), "Spawned command");

  let mut stdout = child.stdout.take();
  let mut stderr = child.stderr.take();
  let mut stdout_pump = Pump::new(Stream::Stdout, stdout_tx);
  let mut stderr_pump = Pump::new(Stream::Stderr, stderr_tx);
  let mut stdout_buf = [0u8; READ_BUF_SIZE];
  let mut stderr_buf = [0u8; READ_BUF_SIZE];

  while stdout.is_some() || stderr.is_some() {
    tokio::select! {
      res = read_some(&mut stdout, &mut stdout_buf) => {
        if !stdout_pump.feed(res, &stdout_buf) {
          stdout = None;
        }
      }
      res = read_some(&mut stderr, &mut stderr_buf) => {
        if !stderr_pump.feed(res, &stderr_buf) {
          stderr = None;
        }
      }
    }
  }

  let status = child
    .wait()
    .await
    .map_err(|e| format!("Failed to wait for command \"{}\": {}", spec.display_line(), e))?;

  Ok(Termination::from(status))
}

/// Reads from the stream if it is still open; a closed stream never resolves.
async fn read_some<R: AsyncRead + Unpin>(stream: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize> {
  match stream {
    Some(stream) => stream.read(buf).await,
    None => std::future::pending().await,
  }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
  Stdout,
  Stderr,
}

impl Stream {
  fn name(self) -> &'static str {
    match self {
      Stream::Stdout => "stdout",
      Stream::Stderr => "stderr",
    }
  }

  fn chunk(self, text: String) -> OutputChunk {
    match self {
      Stream::Stdout => OutputChunk::Stdout(text),
      Stream::Stderr => OutputChunk::Stderr(text),
    }
  }
}

/// Turns raw reads from one pipe into chunks on that pipe's channel.
struct Pump<'a> {
  stream: Stream,
  tx: &'a UnboundedSender<OutputChunk>,
  decoder: Utf8Carry,
}

impl<'a> Pump<'a> {
  fn new(stream: Stream, tx: &'a UnboundedSender<OutputChunk>) -> Self {
    Pump {
      stream,
      tx,
      decoder: Utf8Carry::default(),
    }
  }

  /// Handles one read result. Returns `false` once the stream is done.
  fn feed(&mut self, res: io::Result<usize>, buf: &[u8]) -> bool {
    match res {
      Ok(0) => {
        tracing::debug!(stream = self.stream.name(), "End of stream");
        let rest = self.decoder.finish();
        self.emit(rest);
        false
      }
      Ok(n) => {
        let text = self.decoder.decode(&buf[..n]);
        self.emit(text);
        true
      }
      Err(e) if e.kind() == io::ErrorKind::Interrupted => true,
      Err(e) => {
        tracing::debug!(stream = self.stream.name(), error = %e, "Read failed, treating as end of stream");
        let rest = self.decoder.finish();
        self.emit(rest);
        false
      }
    }
  }

  fn emit(&self, text: String) {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
      return;
    }
    let _ = self.tx.send(self.stream.chunk(trimmed.to_string()));
  }
}

/// UTF-8 decoder that holds back a multibyte sequence split across reads.
#[derive(Debug, Default)]
struct Utf8Carry {
  pending: Vec<u8>,
}

impl Utf8Carry {
  fn decode(&mut self, bytes: &[u8]) -> String {
    self.pending.extend_from_slice(bytes);
    let complete = match std::str::from_utf8(&self.pending) {
      Ok(_) => self.pending.len(),
      Err(e) if e.error_len().is_none() => e.valid_up_to(),
      Err(_) => self.pending.len(),
    };
    let rest = self.pending.split_off(complete);
    let text = String::from_utf8_lossy(&self.pending).into_owned();
    self.pending = rest;
    text
  }

  fn finish(&mut self) -> String {
    let text = String::from_utf8_lossy(&self.pending).into_owned();
    self.pending.clear();
    text
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::time::timeout;

  fn sh(script: &str) -> CommandSpec {
    CommandSpec::new(["/bin/sh", "-c", script]).unwrap()
  }

  /// Drains both channels until the exit chunk arrives.
  async fn collect(handle: &mut RunHandle) -> (Vec<OutputChunk>, Vec<OutputChunk>) {
    let mut out = Vec::new();
    loop {
      let chunk = timeout(Duration::from_secs(10), handle.stdout_rx.recv())
        .await
        .expect("run timed out")
        .expect("stdout channel closed before exit");
      let is_exit = matches!(chunk, OutputChunk::Exit(_));
      out.push(chunk);
      if is_exit {
        break;
      }
    }
    let mut err = Vec::new();
    while let Ok(chunk) = handle.stderr_rx.try_recv() {
      err.push(chunk);
    }
    (out, err)
  }

  #[test]
  fn carry_holds_back_split_multibyte_sequence() {
    let mut carry = Utf8Carry::default();
    let bytes = "Atualização".as_bytes();
    let split = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;

    let first = carry.decode(&bytes[..split]);
    let second = carry.decode(&bytes[split..]);

    assert_eq!(first, "Atualiza");
    assert_eq!(second, "ção");
    assert_eq!(carry.finish(), "");
  }

  #[test]
  fn carry_decodes_invalid_bytes_lossily() {
    let mut carry = Utf8Carry::default();
    assert_eq!(carry.decode(b"ok\xffok"), "ok\u{fffd}ok");
  }

  #[test]
  fn termination_from_exit_code() {
    let status = std::process::Command::new("/bin/sh")
      .args(["-c", "exit 3"])
      .status()
      .unwrap();
    assert_eq!(Termination::from(status), Termination::Code(3));
    assert!(!Termination::Code(3).success());
    assert!(Termination::Code(0).success());
  }

  #[tokio::test]
  async fn streams_both_pipes_then_exits_last() {
    let runner = Runner::default();
    let mut handle = runner
      .execute(sh("echo one; echo two >&2; echo three; exit 4"))
      .unwrap();

    let (out, err) = collect(&mut handle).await;

    let text: String = out
      .iter()
      .filter_map(|c| match c {
        OutputChunk::Stdout(t) => Some(t.as_str()),
        _ => None,
      })
      .collect::<Vec<_>>()
      .join("\n");
    assert!(text.contains("one"));
    assert!(text.contains("three"));
    assert!(text.find("one") < text.find("three"));
    assert_eq!(out.last(), Some(&OutputChunk::Exit(Termination::Code(4))));
    assert_eq!(out.iter().filter(|c| matches!(c, OutputChunk::Exit(_))).count(), 1);
    assert_eq!(err, vec![OutputChunk::Stderr("two".to_string())]);
  }

  #[tokio::test]
  async fn trailing_output_is_not_lost() {
    let runner = Runner::default();
    let mut handle = runner
      .execute(sh("sleep 0.1; printf 'late-out\\n'; printf 'late-err\\n' >&2"))
      .unwrap();

    let (out, err) = collect(&mut handle).await;

    assert!(out.contains(&OutputChunk::Stdout("late-out".to_string())));
    assert_eq!(err, vec![OutputChunk::Stderr("late-err".to_string())]);
  }

  #[tokio::test]
  async fn spawn_failure_still_ends_with_exit() {
    let runner = Runner::default();
    let spec = CommandSpec::new(["/nonexistent/definitely-not-apt", "update"]).unwrap();
    let mut handle = runner.execute(spec).unwrap();

    let (out, err) = collect(&mut handle).await;

    assert_eq!(out.len(), 2);
    assert!(matches!(&out[0], OutputChunk::Failed(m) if m.contains("definitely-not-apt")));
    assert_eq!(out[1], OutputChunk::Exit(Termination::Failed));
    assert!(err.is_empty());
  }

  #[tokio::test]
  async fn env_overlay_reaches_child() {
    let runner = Runner::default();
    let spec = sh("echo \"$SIMPLE_APT_UPDATE_TEST_VAR\"").with_env("SIMPLE_APT_UPDATE_TEST_VAR", "overlay");
    let mut handle = runner.execute(spec).unwrap();

    let (out, _) = collect(&mut handle).await;

    assert_eq!(out[0], OutputChunk::Stdout("overlay".to_string()));
  }

  #[tokio::test]
  async fn second_run_is_rejected_while_first_is_held() {
    let runner = Runner::default();
    let mut first = runner.execute(sh("exit 0")).unwrap();

    assert_eq!(runner.execute(sh("exit 0")).unwrap_err(), RunError::Busy);

    collect(&mut first).await;
    assert!(!runner.slot().is_free());
    drop(first);
    assert!(runner.slot().is_free());
    assert!(runner.execute(sh("exit 0")).is_ok());
  }
}
