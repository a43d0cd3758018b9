//! Execution of one render as an external engine process.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use renderfarm_core::types::JobUid;
use renderfarm_db::models::render_job::RenderJob;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineTemplate;

/// Stderr lines kept for the crash diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for output readers once the engine has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a render ended, as far as the worker can observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Exit code 0. Whether the engine reported its own result is only
    /// known to the store.
    Exited,
    /// Exit code 0 but the job was still `in_progress` afterwards.
    ExitedWithoutReport,
    /// Non-zero exit code or killed by a signal.
    Crashed {
        code: Option<i32>,
        signal: Option<i32>,
        stderr_tail: String,
    },
    /// The render exceeded its time budget and was terminated.
    TimedOut { after: Duration },
    /// The engine was terminated because the worker is shutting down.
    Stopped,
    /// The engine could not be started.
    SpawnFailed { reason: String },
}

impl TaskOutcome {
    /// Error message recorded on the job, or `None` for a clean exit.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            TaskOutcome::Exited => None,
            TaskOutcome::ExitedWithoutReport => {
                Some("engine exited cleanly without reporting a result".to_string())
            }
            TaskOutcome::Crashed {
                code,
                signal,
                stderr_tail,
            } => {
                let cause = match (code, signal) {
                    (Some(code), _) => format!("engine exited with code {code}"),
                    (None, Some(signal)) => format!("engine killed by signal {signal}"),
                    (None, None) => "engine terminated abnormally".to_string(),
                };
                if stderr_tail.is_empty() {
                    Some(cause)
                } else {
                    Some(format!("{cause}: {stderr_tail}"))
                }
            }
            TaskOutcome::TimedOut { after } => {
                Some(format!("render timed out after {after:?}"))
            }
            TaskOutcome::Stopped => Some("worker shut down during render".to_string()),
            TaskOutcome::SpawnFailed { reason } => {
                Some(format!("engine could not be started: {reason}"))
            }
        }
    }
}

/// Runs the render for a claimed job.
///
/// `run` returns once the task has ended. When `stop` fires the runner
/// terminates the task and returns [`TaskOutcome::Stopped`].
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, job: &RenderJob, stop: CancellationToken) -> TaskOutcome;
}

/// [`TaskRunner`] spawning the configured engine program.
pub struct EngineRunner {
    template: EngineTemplate,
    worker: String,
    store_url: String,
    kill_grace: Duration,
}

impl EngineRunner {
    pub fn new(
        template: EngineTemplate,
        worker: impl Into<String>,
        store_url: impl Into<String>,
        kill_grace: Duration,
    ) -> Self {
        Self {
            template,
            worker: worker.into(),
            store_url: store_url.into(),
            kill_grace,
        }
    }
}

#[async_trait]
impl TaskRunner for EngineRunner {
    async fn run(&self, job: &RenderJob, stop: CancellationToken) -> TaskOutcome {
        let command = match self.template.render(job, &self.worker, &self.store_url) {
            Ok(command) => command,
            Err(e) => {
                return TaskOutcome::SpawnFailed {
                    reason: e.to_string(),
                }
            }
        };

        let spawned = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    uid = %job.uid,
                    program = %command.program,
                    error = %e,
                    "Failed to spawn engine",
                );
                return TaskOutcome::SpawnFailed {
                    reason: format!("{}: {e}", command.program),
                };
            }
        };

        tracing::info!(
            uid = %job.uid,
            pid = child.id().unwrap_or_default(),
            program = %command.program,
            "Engine started",
        );

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(job.uid, "stdout", stdout, None));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(
                job.uid,
                "stderr",
                stderr,
                Some(Arc::clone(&tail)),
            ));
        }

        let status = tokio::select! {
            status = child.wait() => status,
            () = stop.cancelled() => {
                terminate(&mut child, job.uid, self.kill_grace).await;
                drain(readers).await;
                return TaskOutcome::Stopped;
            }
        };
        drain(readers).await;

        match status {
            Ok(status) => {
                let outcome = classify_exit(status, take_tail(&tail));
                tracing::info!(uid = %job.uid, status = %status, "Engine exited");
                outcome
            }
            Err(e) => {
                tracing::error!(uid = %job.uid, error = %e, "Failed to wait for engine");
                TaskOutcome::Crashed {
                    code: None,
                    signal: None,
                    stderr_tail: e.to_string(),
                }
            }
        }
    }
}

fn classify_exit(status: ExitStatus, stderr_tail: String) -> TaskOutcome {
    if status.success() {
        return TaskOutcome::Exited;
    }

    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;

    TaskOutcome::Crashed {
        code: status.code(),
        signal,
        stderr_tail,
    }
}

/// Forward each output line to tracing, optionally keeping the last lines.
fn forward_lines<R>(
    uid: JobUid,
    stream: &'static str,
    reader: R,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(uid = %uid, stream, "{line}");
                    if let Some(tail) = &tail {
                        let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(uid = %uid, stream, error = %e, "Engine output closed");
                    break;
                }
            }
        }
    })
}

/// Wait briefly for the output readers. Grandchildren holding the pipes
/// open must not keep the worker waiting.
async fn drain(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            reader.abort();
        }
    }
}

fn take_tail(tail: &Mutex<VecDeque<String>>) -> String {
    let lines = tail.lock().unwrap_or_else(|e| e.into_inner());
    lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

/// Ask the engine to exit, then kill it after `grace`.
async fn terminate(child: &mut Child, uid: JobUid, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Safety: kill(2) with a pid we spawned and have not yet reaped.
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret == 0 {
            tracing::info!(uid = %uid, pid, "Sent SIGTERM to engine");
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            tracing::warn!(
                uid = %uid,
                grace_secs = grace.as_secs(),
                "Engine ignored SIGTERM, killing",
            );
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        tracing::error!(uid = %uid, error = %e, "Failed to kill engine");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use renderfarm_core::render_request::RenderRequest;
    use renderfarm_core::types::new_job_uid;
    use renderfarm_db::models::render_job::NewRenderJob;
    use tempfile::TempDir;

    use super::*;

    fn job() -> RenderJob {
        let request = RenderRequest {
            uid: None,
            name: "render01".into(),
            owner: "A".into(),
            map_ref: "/Game/Maps/Main".into(),
            sequence_ref: "/Game/Cinematics/Shot010".into(),
            config_ref: "/Game/Configs/HighQuality".into(),
            worker: Some("W1".into()),
        };
        RenderJob::submitted(NewRenderJob::from_request(new_job_uid(), &request), Utc::now())
    }

    /// Write a shell script and a runner invoking it through `/bin/sh`.
    fn script_runner(dir: &TempDir, body: &str, args: &str, grace: Duration) -> EngineRunner {
        let path = dir.path().join("engine.sh");
        std::fs::write(&path, body).unwrap();

        let template =
            EngineTemplate::parse("/bin/sh", &format!("{} {args}", path.display())).unwrap();
        EngineRunner::new(template, "W1", "http://127.0.0.1:9", grace)
    }

    #[tokio::test]
    async fn clean_exit_is_exited() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(&dir, "echo rendering \"$1\"; exit 0", "{map}", Duration::from_secs(1));

        assert_eq!(
            runner.run(&job(), CancellationToken::new()).await,
            TaskOutcome::Exited
        );
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr_tail() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            "echo \"job $RENDERFARM_JOB_UID on $RENDERFARM_WORKER\" >&2; echo 'shader compile failed' >&2; exit 3",
            "",
            Duration::from_secs(1),
        );
        let job = job();

        let outcome = runner.run(&job, CancellationToken::new()).await;

        assert_matches!(
            &outcome,
            TaskOutcome::Crashed { code: Some(3), signal: None, stderr_tail }
                if stderr_tail.ends_with("shader compile failed")
                    && stderr_tail.contains(&format!("job {} on W1", job.uid))
        );
        assert!(outcome
            .diagnostic()
            .unwrap()
            .starts_with("engine exited with code 3: "));
    }

    #[tokio::test]
    async fn stderr_tail_is_bounded() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            "i=0; while [ $i -lt 50 ]; do echo \"line $i\" >&2; i=$((i+1)); done; exit 1",
            "",
            Duration::from_secs(1),
        );

        let outcome = runner.run(&job(), CancellationToken::new()).await;
        let TaskOutcome::Crashed { stderr_tail, .. } = &outcome else {
            panic!("expected crash, got {outcome:?}");
        };
        let lines: Vec<&str> = stderr_tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"line 49"));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failure() {
        let template = EngineTemplate::parse("/nonexistent/engine-binary", "{map}").unwrap();
        let runner = EngineRunner::new(template, "W1", "http://127.0.0.1:9", Duration::from_secs(1));

        assert_matches!(
            runner.run(&job(), CancellationToken::new()).await,
            TaskOutcome::SpawnFailed { reason } if reason.contains("/nonexistent/engine-binary")
        );
    }

    #[tokio::test]
    async fn unrenderable_command_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(&dir, "exit 0", "{sequence}", Duration::from_secs(1));
        let mut job = job();
        job.sequence_ref = String::new();

        assert_matches!(
            runner.run(&job, CancellationToken::new()).await,
            TaskOutcome::SpawnFailed { .. }
        );
    }

    #[tokio::test]
    async fn stop_terminates_with_sigterm() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(&dir, "exec sleep 30", "", Duration::from_secs(5));
        let stop = CancellationToken::new();

        let canceller = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        assert_eq!(runner.run(&job(), stop).await, TaskOutcome::Stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn stop_kills_engine_ignoring_sigterm() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(
            &dir,
            "trap '' TERM; while true; do sleep 1; done",
            "",
            Duration::from_millis(300),
        );
        let stop = CancellationToken::new();

        let canceller = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        assert_eq!(runner.run(&job(), stop).await, TaskOutcome::Stopped);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn diagnostics_describe_outcome() {
        assert_eq!(TaskOutcome::Exited.diagnostic(), None);
        assert_eq!(
            TaskOutcome::TimedOut {
                after: Duration::from_secs(60)
            }
            .diagnostic()
            .as_deref(),
            Some("render timed out after 60s")
        );
        assert_eq!(
            TaskOutcome::Crashed {
                code: None,
                signal: Some(9),
                stderr_tail: String::new(),
            }
            .diagnostic()
            .as_deref(),
            Some("engine killed by signal 9")
        );
    }
}
