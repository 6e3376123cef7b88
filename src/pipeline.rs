//! Process pipeline runner.
//!
//! Drives one submission through its compile and run phases and exposes the
//! subprocess to the session as an asynchronous event stream plus an input
//! sink. One task reads each subprocess stream; the driver task owns the
//! child and forwards stdin writes, so cancelling the driver (on session
//! teardown) kills the process via `kill_on_drop`.
//!
//! Event ordering contract: compile diagnostics fully resolve before any
//! run-phase event; stdout/stderr chunks are delivered in the order the OS
//! hands them over; `Finished` is emitted exactly once and is always last.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::toolchains::{CompileOutcome, ToolchainAdapter};

/// Capacity of the event and input channels.
const CHANNEL_CAPACITY: usize = 256;

/// Read buffer size for each subprocess stream.
const READ_CHUNK: usize = 4096;

/// How a run phase ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitStatus {
    /// Program exited normally with given exit code.
    Exited(i32),
    /// Killed by signal.
    Signaled(i32),
    /// Forcibly terminated after the run time limit.
    TimedOut,
}

impl ExitStatus {
    /// Human-readable summary embedded in the terminal `closed` frame.
    pub fn summary(&self) -> String {
        match self {
            ExitStatus::Exited(code) => {
                format!("\nProcess completed with exit code: {}", code)
            }
            ExitStatus::Signaled(signal) => {
                format!("\nProcess terminated by signal: {}", signal)
            }
            ExitStatus::TimedOut => "\nProcess terminated: time limit exceeded".to_string(),
        }
    }
}

/// Event emitted by a pipeline.
#[derive(Debug, PartialEq)]
pub enum PipelineEvent {
    /// Chunk from the subprocess's standard output.
    Output(String),
    /// Compile diagnostic or chunk from standard error.
    Error(String),
    /// Terminal event, emitted exactly once. `None` when the run phase never
    /// started (compile rejection or toolchain failure).
    Finished(Option<ExitStatus>),
}

/// Timeouts applied to the two phases.
#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    pub compile_timeout: Duration,
    pub run_timeout: Duration,
}

/// Handle to one running compile-then-run pipeline.
pub struct Pipeline {
    events: mpsc::Receiver<PipelineEvent>,
    input_tx: mpsc::Sender<String>,
    driver: JoinHandle<()>,
}

impl Pipeline {
    /// Start a pipeline for one submission. The workspace directory is
    /// created on demand and owned by the caller.
    pub fn spawn(
        adapter: Box<dyn ToolchainAdapter>,
        source: String,
        workspace: PathBuf,
        limits: PipelineLimits,
    ) -> Pipeline {
        let (event_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let driver = tokio::spawn(async move {
            drive(adapter, source, workspace, limits, event_tx, input_rx).await;
        });

        Pipeline {
            events,
            input_tx,
            driver,
        }
    }

    /// Next pipeline event; `None` after `Finished` has been delivered.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Forward one line of input to the running process. Input racing ahead
    /// of the run phase, or arriving after exit, is silently dropped.
    pub fn write_input(&self, input: &str) {
        let _ = self.input_tx.try_send(input.to_string());
    }

    /// Stop the driver, killing any live subprocess.
    pub fn abort(&self) {
        self.driver.abort();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive(
    adapter: Box<dyn ToolchainAdapter>,
    source: String,
    workspace: PathBuf,
    limits: PipelineLimits,
    events: mpsc::Sender<PipelineEvent>,
    mut input_rx: mpsc::Receiver<String>,
) {
    let terminal = match run_pipeline(
        adapter.as_ref(),
        &source,
        &workspace,
        limits,
        &events,
        &mut input_rx,
    )
    .await
    {
        Ok(status) => status,
        Err(e) => {
            warn!("Pipeline failed: {:#}", e);
            let _ = events
                .send(PipelineEvent::Error(format!(
                    "Failed to run program: {:#}",
                    e
                )))
                .await;
            None
        }
    };

    let _ = events.send(PipelineEvent::Finished(terminal)).await;
}

async fn run_pipeline(
    adapter: &dyn ToolchainAdapter,
    source: &str,
    workspace: &Path,
    limits: PipelineLimits,
    events: &mpsc::Sender<PipelineEvent>,
    input_rx: &mut mpsc::Receiver<String>,
) -> Result<Option<ExitStatus>> {
    tokio::fs::create_dir_all(workspace)
        .await
        .context("Failed to create session workspace")?;

    // Compile phase. Input frames racing ahead of the run phase are drained
    // and dropped, per the input contract.
    let compile = adapter.compile(source, workspace, limits.compile_timeout);
    tokio::pin!(compile);
    let outcome = loop {
        tokio::select! {
            result = &mut compile => break result?,
            Some(_) = input_rx.recv() => {}
        }
    };

    if let CompileOutcome::Rejected(diagnostic) = outcome {
        debug!("Compilation failed");
        let _ = events.send(PipelineEvent::Error(diagnostic)).await;
        return Ok(None);
    }

    // Run phase.
    let mut cmd = adapter.launch(source, workspace);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("Failed to spawn program")?;
    let mut stdin = child.stdin.take();
    let stdout_task = child
        .stdout
        .take()
        .map(|stream| spawn_stream_reader(stream, events.clone(), PipelineEvent::Output));
    let stderr_task = child
        .stderr
        .take()
        .map(|stream| spawn_stream_reader(stream, events.clone(), PipelineEvent::Error));

    let deadline = tokio::time::sleep(limits.run_timeout);
    tokio::pin!(deadline);
    let mut input_open = true;

    let status = loop {
        tokio::select! {
            exit = child.wait() => {
                let exit = exit.context("Failed to wait for program")?;
                break match exit.code() {
                    Some(code) => ExitStatus::Exited(code),
                    None => ExitStatus::Signaled(exit.signal().unwrap_or(-1)),
                };
            }
            _ = &mut deadline => {
                warn!("Run time limit exceeded, killing process");
                let _ = child.start_kill();
                let _ = child.wait().await;
                break ExitStatus::TimedOut;
            }
            line = input_rx.recv(), if input_open => {
                match line {
                    Some(line) => forward_input(&mut stdin, &line).await,
                    None => input_open = false,
                }
            }
        }
    };

    // Close our end of the pipe, then drain both readers so every chunk is
    // delivered before the terminal event.
    drop(stdin);
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    Ok(Some(status))
}

/// Write `line + '\n'` to the child's stdin. A closed pipe means the process
/// stopped reading; further input is dropped.
async fn forward_input(stdin: &mut Option<ChildStdin>, line: &str) {
    if let Some(sink) = stdin.as_mut() {
        let payload = format!("{}\n", line);
        if sink.write_all(payload.as_bytes()).await.is_err() {
            *stdin = None;
        }
    }
}

/// One task per subprocess stream: read chunks as the OS delivers them and
/// emit them as events until EOF.
fn spawn_stream_reader<R>(
    mut stream: R,
    events: mpsc::Sender<PipelineEvent>,
    wrap: fn(String) -> PipelineEvent,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if events.send(wrap(chunk)).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Language;
    use async_trait::async_trait;
    use tokio::process::Command;

    /// Adapter backed by `sh -c`, with a scriptable compile phase.
    struct ShellAdapter {
        script: &'static str,
        /// `Some(diagnostic)` makes the compile phase reject.
        reject_with: Option<&'static str>,
        /// Delay before the compile phase resolves.
        compile_delay: Duration,
    }

    impl ShellAdapter {
        fn new(script: &'static str) -> Self {
            Self {
                script,
                reject_with: None,
                compile_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ToolchainAdapter for ShellAdapter {
        fn language(&self) -> Language {
            Language::C
        }

        async fn compile(
            &self,
            _source: &str,
            _workspace: &Path,
            _timeout: Duration,
        ) -> Result<CompileOutcome> {
            if !self.compile_delay.is_zero() {
                tokio::time::sleep(self.compile_delay).await;
            }
            match self.reject_with {
                Some(diagnostic) => Ok(CompileOutcome::Rejected(diagnostic.to_string())),
                None => Ok(CompileOutcome::Skipped),
            }
        }

        fn launch(&self, _source: &str, _workspace: &Path) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(self.script);
            cmd
        }
    }

    fn limits() -> PipelineLimits {
        PipelineLimits {
            compile_timeout: Duration::from_secs(10),
            run_timeout: Duration::from_secs(10),
        }
    }

    fn spawn_shell(adapter: ShellAdapter, limits: PipelineLimits) -> (Pipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        let pipeline = Pipeline::spawn(Box::new(adapter), String::new(), workspace, limits);
        (pipeline, dir)
    }

    async fn collect(mut pipeline: Pipeline) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = pipeline.next_event().await {
            events.push(event);
        }
        events
    }

    fn concat_output(events: &[PipelineEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Output(chunk) => Some(chunk.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_output_then_single_terminal_event() {
        let (pipeline, _dir) = spawn_shell(ShellAdapter::new("printf hello"), limits());
        let events = collect(pipeline).await;

        assert_eq!(concat_output(&events), "hello");
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished(Some(ExitStatus::Exited(0))))
        );
        let terminal_count = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::Finished(_)))
            .count();
        assert_eq!(terminal_count, 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_is_reported() {
        let (pipeline, _dir) = spawn_shell(ShellAdapter::new("exit 3"), limits());
        let events = collect(pipeline).await;

        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished(Some(ExitStatus::Exited(3))))
        );
    }

    #[tokio::test]
    async fn test_stderr_becomes_error_events() {
        let (pipeline, _dir) = spawn_shell(ShellAdapter::new("echo oops 1>&2"), limits());
        let events = collect(pipeline).await;

        assert!(events
            .iter()
            .any(|event| matches!(event, PipelineEvent::Error(text) if text.contains("oops"))));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished(Some(ExitStatus::Exited(0))))
        );
    }

    #[tokio::test]
    async fn test_compile_rejection_skips_run_phase() {
        let adapter = ShellAdapter {
            script: "echo never-runs",
            reject_with: Some("main.c:1: error: expected ';'"),
            compile_delay: Duration::ZERO,
        };
        let (pipeline, _dir) = spawn_shell(adapter, limits());
        let events = collect(pipeline).await;

        assert_eq!(
            events,
            vec![
                PipelineEvent::Error("main.c:1: error: expected ';'".to_string()),
                PipelineEvent::Finished(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_input_is_forwarded_to_stdin() {
        let adapter = ShellAdapter::new("echo ready && read line && echo \"got $line\"");
        let (mut pipeline, _dir) = spawn_shell(adapter, limits());

        let mut events = Vec::new();
        while let Some(event) = pipeline.next_event().await {
            if matches!(&event, PipelineEvent::Output(chunk) if chunk.contains("ready")) {
                pipeline.write_input("hello");
            }
            events.push(event);
        }

        assert!(concat_output(&events).contains("got hello"));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished(Some(ExitStatus::Exited(0))))
        );
    }

    #[tokio::test]
    async fn test_run_timeout_kills_process() {
        let mut limits = limits();
        limits.run_timeout = Duration::from_millis(200);
        let (pipeline, _dir) = spawn_shell(ShellAdapter::new("sleep 30"), limits);
        let events = collect(pipeline).await;

        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished(Some(ExitStatus::TimedOut)))
        );
    }

    #[tokio::test]
    async fn test_input_before_run_phase_is_dropped() {
        // `cat` would echo any stdin it received; input sent while the
        // compile phase is still pending must never reach it.
        let adapter = ShellAdapter {
            script: "cat",
            reject_with: None,
            compile_delay: Duration::from_millis(200),
        };
        let mut limits = limits();
        limits.run_timeout = Duration::from_millis(600);
        let (pipeline, _dir) = spawn_shell(adapter, limits);

        pipeline.write_input("early");
        let events = collect(pipeline).await;

        assert_eq!(concat_output(&events), "");
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Finished(Some(ExitStatus::TimedOut)))
        );
    }

    #[tokio::test]
    async fn test_abort_kills_driver() {
        let (mut pipeline, _dir) = spawn_shell(ShellAdapter::new("sleep 30"), limits());
        // Let the run phase start before tearing down.
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipeline.abort();

        // The event channel closes without a terminal event.
        assert_eq!(pipeline.next_event().await, None);
    }

    #[test]
    fn test_exit_summaries() {
        assert_eq!(
            ExitStatus::Exited(0).summary(),
            "\nProcess completed with exit code: 0"
        );
        assert_eq!(
            ExitStatus::Signaled(9).summary(),
            "\nProcess terminated by signal: 9"
        );
        assert!(ExitStatus::TimedOut.summary().contains("time limit"));
    }
}
