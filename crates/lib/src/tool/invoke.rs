//! Converter process launching.
//!
//! The converter is started directly (no shell) with stdin closed and both
//! output streams piped back to the caller. A launch that fails because the
//! executable does not exist gets exactly one interactive correction: the user
//! is asked for a replacement path through the [`RecoveryClient`], the answer is
//! persisted to the override file, and the launch is retried once. A retry that
//! still fails, for any reason, is reported as [`ToolError::ToolNotFound`].
//! Once the user declines, workers that failed on the same path do not ask again.
//! Every other launch failure is final.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{RecoveryClient, RecoveryResponse, ToolError, ToolLocator};

/// Captured output of a converter run that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
  pub stdout: String,
  pub stderr: String,
}

/// The executable launches go to, and whether the user gave up on it.
#[derive(Debug)]
struct LaunchTarget {
  path: PathBuf,
  declined: bool,
}

/// Launches the converter on behalf of build workers.
#[derive(Debug)]
pub struct ToolInvoker {
  locator: ToolLocator,
  /// Held across recovery so only one prompt is open.
  target: Mutex<LaunchTarget>,
  recovery: Option<RecoveryClient>,
}

impl ToolInvoker {
  /// Resolve the converter with `locator` and prepare to launch it.
  pub fn new(locator: ToolLocator) -> Self {
    let resolution = locator.resolve();
    Self::with_path(locator, resolution.path)
  }

  /// Use `exe` instead of resolving. Recovery still writes through `locator`.
  pub fn with_path(locator: ToolLocator, exe: PathBuf) -> Self {
    Self {
      locator,
      target: Mutex::new(LaunchTarget {
        path: exe,
        declined: false,
      }),
      recovery: None,
    }
  }

  /// Enable interactive recovery through `client`.
  pub fn with_recovery(mut self, client: RecoveryClient) -> Self {
    self.recovery = Some(client);
    self
  }

  pub fn tool_name(&self) -> &str {
    &self.locator.spec().name
  }

  /// The executable path the next launch will use.
  pub async fn exe_path(&self) -> PathBuf {
    self.target.lock().await.path.clone()
  }

  /// Start the converter with `arguments`.
  ///
  /// With `escalate` set, a missing executable fails immediately instead of
  /// asking for a replacement.
  pub async fn run(&self, arguments: &str, escalate: bool) -> Result<Child, ToolError> {
    let exe = self.exe_path().await;

    match spawn(&exe, arguments) {
      Ok(child) => Ok(child),
      Err(e) if e.kind() == io::ErrorKind::NotFound && !escalate => {
        warn!(tool = %self.tool_name(), path = ?exe, "converter not found, asking for a replacement");
        let replacement = self.recover(&exe).await?;
        spawn(&replacement, arguments).map_err(|e| {
          warn!(tool = %self.tool_name(), path = ?replacement, error = %e, "replacement converter failed to start");
          ToolError::ToolNotFound {
            tool: self.tool_name().to_string(),
            path: replacement.clone(),
          }
        })
      }
      Err(e) => Err(self.launch_error(&exe, e)),
    }
  }

  /// Start the converter and wait for it to exit.
  ///
  /// A non-zero exit status is reported as [`ToolError::ConversionFailed`].
  pub async fn run_to_completion(&self, arguments: &str) -> Result<ToolOutput, ToolError> {
    let child = self.run(arguments, false).await?;
    let output = child.wait_with_output().await.map_err(|source| ToolError::Wait {
      tool: self.tool_name().to_string(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "converter stdout");
      }
      return Err(ToolError::ConversionFailed {
        tool: self.tool_name().to_string(),
        code: output.status.code(),
        stderr: last_lines(&stderr, 20),
      });
    }

    if !stderr.is_empty() {
      debug!(stderr = %stderr, "converter output");
    }
    Ok(ToolOutput { stdout, stderr })
  }

  /// Ask for a replacement executable after `attempted` was not found.
  async fn recover(&self, attempted: &Path) -> Result<PathBuf, ToolError> {
    let not_found = || ToolError::ToolNotFound {
      tool: self.tool_name().to_string(),
      path: attempted.to_path_buf(),
    };

    let Some(client) = &self.recovery else {
      return Err(not_found());
    };

    let mut target = self.target.lock().await;
    if target.path != attempted {
      debug!(path = ?target.path, "converter path was corrected while waiting");
      return Ok(target.path.clone());
    }
    if target.declined {
      debug!(path = ?attempted, "converter recovery already declined");
      return Err(not_found());
    }

    match client.request(self.tool_name(), attempted).await {
      RecoveryResponse::Selected(path) => {
        if let Err(e) = self.locator.override_file().save(&path) {
          warn!(error = %e, "could not persist converter path");
        }
        info!(tool = %self.tool_name(), path = ?path, "using replacement converter");
        target.path = path.clone();
        Ok(path)
      }
      RecoveryResponse::Cancelled => {
        info!(tool = %self.tool_name(), "converter recovery cancelled");
        target.declined = true;
        Err(not_found())
      }
    }
  }

  fn launch_error(&self, path: &Path, error: io::Error) -> ToolError {
    if error.kind() == io::ErrorKind::NotFound {
      ToolError::ToolNotFound {
        tool: self.tool_name().to_string(),
        path: path.to_path_buf(),
      }
    } else {
      ToolError::ProcessLaunch {
        path: path.to_path_buf(),
        source: error,
      }
    }
  }
}

fn spawn(exe: &Path, arguments: &str) -> io::Result<Child> {
  let mut command = Command::new(exe);
  command
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  #[cfg(windows)]
  {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.raw_arg(arguments).creation_flags(CREATE_NO_WINDOW);
  }

  #[cfg(not(windows))]
  command.args(super::args::split_arguments(arguments));

  debug!(exe = ?exe, arguments = %arguments, "spawning converter");
  command.spawn()
}

fn last_lines(text: &str, count: usize) -> String {
  let lines: Vec<&str> = text.lines().collect();
  lines[lines.len().saturating_sub(count)..].join("\n")
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::platform::Os;
  use crate::tool::{OverrideFile, RecoveryServer, ToolSource, ToolSpec, recovery};
  use crate::util::testutil::{fake_tool, write_file};
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;

  fn locator(temp: &TempDir) -> ToolLocator {
    let work = temp.path().join("work");
    let program = temp.path().join("program");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(&program).unwrap();
    ToolLocator::new(ToolSpec::default())
      .with_os(Os::Linux)
      .with_working_dir(work)
      .with_program_dir(program)
      .with_install_dirs(vec![])
  }

  /// Answer every recovery request with `answer` on a UI thread, counting requests.
  fn ui_thread(
    server: RecoveryServer,
    answer: RecoveryResponse,
  ) -> (Arc<AtomicUsize>, std::thread::JoinHandle<()>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let handle = std::thread::spawn(move || {
      server.serve_blocking(|_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        answer.clone()
      });
    });
    (count, handle)
  }

  #[tokio::test]
  async fn runs_tool_with_split_arguments() {
    let temp = TempDir::new().unwrap();
    let tool = fake_tool(temp.path(), "echo-args", r#"for a in "$@"; do echo "[$a]"; done"#);
    let invoker = ToolInvoker::with_path(locator(&temp), tool);

    let output = invoker.run_to_completion(r#"-i "my file.wav" out.ogg"#).await.unwrap();
    assert_eq!(output.stdout, "[-i]\n[my file.wav]\n[out.ogg]");
  }

  #[tokio::test]
  async fn output_streams_are_captured() {
    let temp = TempDir::new().unwrap();
    let tool = fake_tool(temp.path(), "noisy", "echo out; echo err 1>&2");
    let invoker = ToolInvoker::with_path(locator(&temp), tool);

    let output = invoker.run_to_completion("").await.unwrap();
    assert_eq!(output.stdout, "out");
    assert_eq!(output.stderr, "err");
  }

  #[tokio::test]
  async fn failing_tool_is_conversion_failure() {
    let temp = TempDir::new().unwrap();
    let tool = fake_tool(temp.path(), "broken", "echo 'bad input' 1>&2; exit 3");
    let invoker = ToolInvoker::with_path(locator(&temp), tool);

    let err = invoker.run_to_completion("x").await.unwrap_err();
    match err {
      ToolError::ConversionFailed { code, stderr, .. } => {
        assert_eq!(code, Some(3));
        assert_eq!(stderr, "bad input");
      }
      other => panic!("expected conversion failure, got {other}"),
    }
  }

  #[tokio::test]
  async fn missing_tool_without_recovery_is_not_found() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("no-such-ffmpeg");
    let invoker = ToolInvoker::with_path(locator(&temp), missing.clone());

    let err = invoker.run("-version", false).await.unwrap_err();
    assert!(matches!(err, ToolError::ToolNotFound { ref path, .. } if *path == missing));
  }

  #[tokio::test]
  async fn recovery_round_trip_persists_path() {
    let temp = TempDir::new().unwrap();
    let locator = locator(&temp);
    let z = fake_tool(temp.path(), "ffmpeg-z", "echo converted");
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Selected(z.clone()));

    let invoker = ToolInvoker::with_path(locator.clone(), temp.path().join("missing-ffmpeg")).with_recovery(client);
    let output = invoker.run_to_completion("").await.unwrap();
    assert_eq!(output.stdout, "converted");
    assert_eq!(invoker.exe_path().await, z);

    // Later launches reuse the correction without asking again.
    invoker.run_to_completion("").await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    drop(invoker);
    ui.join().unwrap();

    // A fresh process reads the override file from disk.
    let override_file = OverrideFile::in_dir(&temp.path().join("work"), "ffmpeg");
    assert_eq!(override_file.reload(), Some(z.clone()));
    let resolution = locator.resolve();
    assert_eq!(resolution.path, z);
    assert_eq!(resolution.source, ToolSource::WorkingDirOverride);
  }

  #[tokio::test]
  async fn cancelled_recovery_is_not_found() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing-ffmpeg");
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Cancelled);

    let invoker = ToolInvoker::with_path(locator(&temp), missing.clone()).with_recovery(client);
    let err = invoker.run("", false).await.unwrap_err();
    assert!(matches!(err, ToolError::ToolNotFound { ref path, .. } if *path == missing));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    drop(invoker);
    ui.join().unwrap();
    assert!(!temp.path().join("work/.ffmpeg").exists());
  }

  #[tokio::test]
  async fn bad_replacement_fails_after_single_retry() {
    let temp = TempDir::new().unwrap();
    let still_missing = temp.path().join("also-missing");
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Selected(still_missing.clone()));

    let invoker = ToolInvoker::with_path(locator(&temp), temp.path().join("missing")).with_recovery(client);
    let err = invoker.run("", false).await.unwrap_err();
    assert!(matches!(err, ToolError::ToolNotFound { ref path, .. } if *path == still_missing));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    drop(invoker);
    ui.join().unwrap();
  }

  #[tokio::test]
  async fn unlaunchable_replacement_is_not_found() {
    let temp = TempDir::new().unwrap();
    let not_executable = temp.path().join("not-exec.txt");
    write_file(&not_executable, "just text");
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Selected(not_executable.clone()));

    let invoker = ToolInvoker::with_path(locator(&temp), temp.path().join("missing")).with_recovery(client);
    let err = invoker.run("", false).await.unwrap_err();
    assert!(matches!(err, ToolError::ToolNotFound { ref path, .. } if *path == not_executable));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    drop(invoker);
    ui.join().unwrap();
  }

  #[tokio::test]
  async fn declined_recovery_is_not_asked_again() {
    let temp = TempDir::new().unwrap();
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Cancelled);

    let invoker = ToolInvoker::with_path(locator(&temp), temp.path().join("missing")).with_recovery(client);
    let results = tokio::join!(
      invoker.run("", false),
      invoker.run("", false),
      invoker.run("", false),
      invoker.run("", false),
    );
    for result in [results.0, results.1, results.2, results.3] {
      assert!(matches!(result, Err(ToolError::ToolNotFound { .. })));
    }
    assert!(matches!(
      invoker.run("", false).await,
      Err(ToolError::ToolNotFound { .. })
    ));
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    drop(invoker);
    ui.join().unwrap();
  }

  #[tokio::test]
  async fn escalated_run_never_prompts() {
    let temp = TempDir::new().unwrap();
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Cancelled);

    let invoker = ToolInvoker::with_path(locator(&temp), temp.path().join("missing")).with_recovery(client);
    assert!(matches!(
      invoker.run("", true).await,
      Err(ToolError::ToolNotFound { .. })
    ));
    assert_eq!(requests.load(Ordering::SeqCst), 0);

    drop(invoker);
    ui.join().unwrap();
  }

  #[tokio::test]
  async fn other_launch_errors_are_not_retried() {
    let temp = TempDir::new().unwrap();
    let not_executable = temp.path().join("plain.txt");
    write_file(&not_executable, "just text");
    let (client, server) = recovery::channel();
    let (requests, ui) = ui_thread(server, RecoveryResponse::Cancelled);

    let invoker = ToolInvoker::with_path(locator(&temp), not_executable).with_recovery(client);
    let err = invoker.run("", false).await.unwrap_err();
    assert!(matches!(err, ToolError::ProcessLaunch { .. }));
    assert_eq!(requests.load(Ordering::SeqCst), 0);

    drop(invoker);
    ui.join().unwrap();
  }

  #[test]
  fn last_lines_keeps_tail() {
    assert_eq!(last_lines("a\nb\nc", 2), "b\nc");
    assert_eq!(last_lines("a", 5), "a");
    assert_eq!(last_lines("", 5), "");
  }
}
