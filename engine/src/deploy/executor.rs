//! Action executor
//!
//! Runs one external action as a child process and folds every result,
//! including spawn errors, into an [`ActionOutcome`]. The executor never
//! returns an error and never retries.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::args::{audit_line, command_argv};
use crate::models::component::{ActionSpec, Category};
use crate::models::outcome::{ActionOutcome, ActionStatus};
use crate::models::run::Phase;
use crate::resolver::has_placeholders;

/// How long to wait for output readers once the process is gone.
///
/// Background processes started by a script keep its pipes open; their
/// output after this point is not captured and they are left running.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// One fully resolved action to execute
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub component: String,
    pub category: Category,
    pub phase: Phase,
    pub server: Option<String>,

    /// Working directory; relative script paths are taken from here
    pub workspace: PathBuf,

    pub spec: ActionSpec,
    pub timeout: Duration,
    pub dry_run: bool,
}

/// Executes actions
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Run one action to completion, timeout or cancellation
    async fn run(&self, request: ActionRequest, cancel: &CancellationToken) -> ActionOutcome;
}

/// Runs actions as child processes
#[derive(Debug, Default)]
pub struct ProcessExecutor {
    spawned: AtomicUsize,
}

enum Exit {
    Finished(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processes spawned so far
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    async fn execute(
        &self,
        argv: &[String],
        workspace: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(Exit, String, String), String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| "empty command line".to_string())?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", program, e))?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        debug!("Spawned {} (pid {:?})", program, child.id());

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let exit = tokio::select! {
            status = child.wait() => Exit::Finished(status),
            _ = tokio::time::sleep(timeout) => {
                terminate(&mut child).await;
                Exit::TimedOut
            }
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                Exit::Cancelled
            }
        };

        let deadline = tokio::time::Instant::now() + OUTPUT_GRACE;
        let (stdout, stderr) = tokio::join!(stdout.finish(deadline), stderr.finish(deadline));
        Ok((exit, stdout, stderr))
    }
}

#[async_trait]
impl ActionRunner for ProcessExecutor {
    async fn run(&self, request: ActionRequest, cancel: &CancellationToken) -> ActionOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();

        let script = script_path(&request.workspace, &request.spec.script_path);
        let argv = command_argv(&request.spec, &script);
        let mut outcome = base_outcome(&request, &script, audit_line(&argv), started_at);

        if request.spec.is_empty() {
            outcome.status = ActionStatus::Skipped;
            outcome.error = Some(format!("no {} script configured", request.phase));
            return outcome;
        }

        if request.dry_run {
            info!("[dry-run] {}", outcome.command_line);
            outcome.status = ActionStatus::DryRun;
            outcome.exit_code = Some(0);
            return outcome;
        }

        if cancel.is_cancelled() {
            outcome.status = ActionStatus::Cancelled;
            outcome.error = Some("cancelled".to_string());
            return outcome;
        }

        if has_placeholders(&request.spec.script_path) {
            outcome.status = ActionStatus::Failed;
            outcome.error = Some(format!(
                "script path has unresolved placeholders: {}",
                request.spec.script_path
            ));
            return outcome;
        }
        if !script.is_file() {
            outcome.status = ActionStatus::Failed;
            outcome.error = Some(format!("script not found: {}", script.display()));
            return outcome;
        }

        info!(
            "Running {} for {}{}",
            request.phase,
            request.component,
            request.server.as_deref().map(|s| format!(" on {}", s)).unwrap_or_default()
        );

        match self.execute(&argv, &request.workspace, request.timeout, cancel).await {
            Ok((exit, stdout, stderr)) => {
                outcome.stdout = stdout;
                outcome.stderr = stderr;
                match exit {
                    Exit::Finished(Ok(status)) => {
                        outcome.exit_code = status.code();
                        outcome.status = if status.success() {
                            ActionStatus::Success
                        } else {
                            ActionStatus::Failed
                        };
                    }
                    Exit::Finished(Err(e)) => {
                        outcome.status = ActionStatus::Failed;
                        outcome.error = Some(format!("failed waiting for process: {}", e));
                    }
                    Exit::TimedOut => {
                        warn!(
                            "{} for {} timed out after {:?}",
                            request.phase, request.component, request.timeout
                        );
                        outcome.status = ActionStatus::TimedOut;
                        outcome.error = Some(format!("timed out after {}s", request.timeout.as_secs()));
                    }
                    Exit::Cancelled => {
                        outcome.status = ActionStatus::Cancelled;
                        outcome.error = Some("cancelled".to_string());
                    }
                }
            }
            Err(message) => {
                outcome.status = ActionStatus::Failed;
                outcome.stderr = message.clone();
                outcome.error = Some(message);
            }
        }

        outcome.duration_ms = clock.elapsed().as_millis() as u64;
        debug!(
            "{} for {} finished: {:?} (exit {:?}, {} ms)",
            request.phase, request.component, outcome.status, outcome.exit_code, outcome.duration_ms
        );
        outcome
    }
}

fn script_path(workspace: &Path, script: &str) -> PathBuf {
    let path = Path::new(script);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

fn base_outcome(
    request: &ActionRequest,
    script: &Path,
    command_line: String,
    started_at: DateTime<Utc>,
) -> ActionOutcome {
    ActionOutcome {
        component_name: request.component.clone(),
        category: request.category,
        phase: request.phase,
        server: request.server.clone(),
        script: script.to_string_lossy().into_owned(),
        command_line,
        resolved_parameters: request.spec.parameters.clone(),
        status: ActionStatus::Failed,
        exit_code: None,
        started_at,
        duration_ms: 0,
        stdout: String::new(),
        stderr: String::new(),
        error: None,
        health_check: None,
    }
}

/// Kill the whole process group, then reap the child
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("killpg({}) failed: {}", pid, e);
        }
    }

    if let Err(e) = child.start_kill() {
        debug!("kill failed: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap terminated process: {}", e);
    }
}

/// One output stream being read in the background
struct Capture {
    /// Everything read so far; kept when the reader is cut off
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

fn capture<R>(reader: Option<R>) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();
    let reader = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!("Output capture ended early: {}", e);
                    break;
                }
            }
        }
    });
    Capture { buffer, reader }
}

impl Capture {
    /// Wait for the stream to close until `deadline`, then return what was read
    async fn finish(mut self, deadline: tokio::time::Instant) -> String {
        match tokio::time::timeout_at(deadline, &mut self.reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Output reader failed: {}", e),
            Err(_) => {
                debug!("Output still open after the process ended, keeping what was read");
                self.reader.abort();
            }
        }
        let buffer = self.buffer.lock().await;
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::component::ParamValue;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        name.to_string()
    }

    fn request(dir: &Path, spec: ActionSpec) -> ActionRequest {
        ActionRequest {
            component: "orders-api".into(),
            category: Category::Apis,
            phase: Phase::Deploy,
            server: Some("web01".into()),
            workspace: dir.to_path_buf(),
            spec,
            timeout: Duration::from_secs(10),
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_success_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let name = script(dir.path(), "ok.sh", "echo \"args: $*\"; echo oops >&2");
        let executor = ProcessExecutor::new();
        let spec = ActionSpec::new(name)
            .with_param("Server", ParamValue::Text("web 01".into()))
            .with_param("Force", ParamValue::Flag(true));

        let outcome = executor.run(request(dir.path(), spec), &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "args: -Server web 01 -Force");
        assert_eq!(outcome.stderr.trim(), "oops");
        assert!(outcome.command_line.ends_with("-Server \"web 01\" -Force"));
        assert_eq!(executor.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let name = script(dir.path(), "fail.sh", "exit 3");
        let executor = ProcessExecutor::new();

        let outcome = executor.run(request(dir.path(), ActionSpec::new(name)), &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_dry_run_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new();
        let mut req = request(dir.path(), ActionSpec::new("missing.sh"));
        req.dry_run = true;

        let outcome = executor.run(req, &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::DryRun);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.command_line.contains("missing.sh"));
        assert_eq!(executor.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_script_fails_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new();

        let outcome = executor.run(request(dir.path(), ActionSpec::new("nope.sh")), &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert!(outcome.error.unwrap().contains("script not found"));
        assert_eq!(executor.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_script_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProcessExecutor::new();

        let outcome = executor.run(request(dir.path(), ActionSpec::default()), &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let name = script(dir.path(), "hang.sh", "echo started; sleep 30");
        let executor = ProcessExecutor::new();
        let mut req = request(dir.path(), ActionSpec::new(name));
        req.timeout = Duration::from_millis(300);

        let clock = Instant::now();
        let outcome = executor.run(req, &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::TimedOut);
        assert!(clock.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.stdout.trim(), "started");
    }

    #[tokio::test]
    async fn test_output_kept_when_background_child_holds_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let name = script(dir.path(), "detach.sh", "echo deployed-ok; echo warn >&2; sleep 5 & exit 0");
        let executor = ProcessExecutor::new();

        let clock = Instant::now();
        let outcome = executor.run(request(dir.path(), ActionSpec::new(name)), &CancellationToken::new()).await;
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.stdout.trim(), "deployed-ok");
        assert_eq!(outcome.stderr.trim(), "warn");
        // Both streams share one grace period
        assert!(clock.elapsed() < OUTPUT_GRACE + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancellation_stops_process() {
        let dir = tempfile::tempdir().unwrap();
        let name = script(dir.path(), "hang.sh", "sleep 30");
        let executor = ProcessExecutor::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let outcome = executor.run(request(dir.path(), ActionSpec::new(name)), &cancel).await;
        assert_eq!(outcome.status, ActionStatus::Cancelled);
    }
}
