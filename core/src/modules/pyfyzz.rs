use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::error::ScanError;
use crate::utils::{self, validate_package_name, validate_record_id};
use crate::{OutputStream, ScanBridgeConfig, SinkRef};

/// Per-stream capture limit for tool output.
pub const MAX_CAPTURED_OUTPUT: usize = 256 * 1024;

pub const TRUNCATED_MARKER: &str = "[earlier output truncated]\n";

/// One invocation of the external fuzzer. Constructors validate their
/// inputs so every value that reaches the argument vector is well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCommand {
    /// `<tool> -p <package> -o json -i`
    Scan { package: String },
    /// `<tool> github_pull_request -p <package> -r <record_id>`
    PullRequest { package: String, record_id: String },
}

impl ScanCommand {
    pub fn scan(package: &str) -> Result<Self, ScanError> {
        let package = validate_package_name(package.trim())?;
        Ok(ScanCommand::Scan { package: package.to_string() })
    }

    pub fn pull_request(package: &str, record_id: &str) -> Result<Self, ScanError> {
        let package = validate_package_name(package.trim())?;
        let record_id = validate_record_id(record_id.trim())?;
        Ok(ScanCommand::PullRequest {
            package: package.to_string(),
            record_id: record_id.to_string(),
        })
    }

    pub fn package(&self) -> &str {
        match self {
            ScanCommand::Scan { package } | ScanCommand::PullRequest { package, .. } => package,
        }
    }

    /// Discrete arguments; never joined into a shell string for execution.
    pub fn args(&self) -> Vec<&str> {
        match self {
            ScanCommand::Scan { package } => vec!["-p", package, "-o", "json", "-i"],
            ScanCommand::PullRequest { package, record_id } => {
                vec!["github_pull_request", "-p", package, "-r", record_id]
            }
        }
    }

    /// Human-readable command line, for display only.
    pub fn command_line(&self, program: &str) -> String {
        let mut line = program.to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Lifecycle of a single scan: Spawned, then Streaming, then Completed or
/// Failed. A spawn failure goes straight to Failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Spawned,
    Streaming,
    /// Exit code; `None` when the process was ended by a signal.
    Completed(Option<i32>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Success,
    Danger,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Danger => "danger",
        }
    }
}

/// Terminal result of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub command_line: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u128,
}

impl ScanOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status(&self) -> ScanStatus {
        if self.succeeded() { ScanStatus::Success } else { ScanStatus::Danger }
    }

    /// The fuzzer logs progress to stderr, so stderr is the message in both
    /// outcomes. A successful run with a silent stderr shows stdout instead.
    pub fn message(&self) -> &str {
        if !self.succeeded() || !self.stderr.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Runs the external fuzzer as a child process, at most `max_concurrent`
/// at a time. Further callers wait for a free slot.
pub struct ScanBridge {
    program: PathBuf,
    display_name: String,
    timeout: Duration,
    output_limit: usize,
    permits: Arc<Semaphore>,
    sink: SinkRef,
}

impl ScanBridge {
    pub fn new(config: &ScanBridgeConfig, sink: SinkRef) -> Self {
        let program = match utils::get_binary_path(&config.tool) {
            Some(path) => path,
            None => {
                log::warn!(
                    "'{}' not found in ./tools, ./ or PATH; scans will fail until it is installed",
                    config.tool
                );
                PathBuf::from(&config.tool)
            }
        };
        Self {
            program,
            display_name: config.tool.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            output_limit: MAX_CAPTURED_OUTPUT,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            sink,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bytes kept per stream. Older output is dropped once exceeded; the
    /// sink still sees every line.
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawns the tool, streams both pipes until the process exits and
    /// returns the captured output. Spawn failures and timeouts are errors;
    /// a non-zero exit code is a normal outcome.
    pub async fn run(&self, command: &ScanCommand) -> Result<ScanOutcome, ScanError> {
        let _permit = self.permits.acquire().await.map_err(|_| ScanError::QueueClosed)?;

        let command_line = command.command_line(&self.display_name);
        log::info!("Executing: {}", command_line);
        let started = Instant::now();

        let mut child = match Command::new(&self.program)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(source) => {
                return Err(self.fail(
                    command,
                    ScanError::Spawn { program: self.program.display().to_string(), source },
                ));
            }
        };
        self.sink.on_phase(command, &ScanPhase::Spawned);

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                let _ = child.kill().await;
                let missing = std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "child output pipes were not captured",
                );
                return Err(self.fail(command, ScanError::Io(missing)));
            }
        };
        self.sink.on_phase(command, &ScanPhase::Streaming);

        let collected = tokio::time::timeout(self.timeout, async {
            let (out, err) = tokio::join!(
                drain(stdout, OutputStream::Stdout, command, &self.sink, self.output_limit),
                drain(stderr, OutputStream::Stderr, command, &self.sink, self.output_limit),
            );
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out?, err?))
        })
        .await;

        match collected {
            Err(_) => {
                let _ = child.kill().await;
                Err(self.fail(command, ScanError::TimedOut(self.timeout)))
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(self.fail(command, ScanError::Io(e)))
            }
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = status.code();
                self.sink.on_phase(command, &ScanPhase::Completed(exit_code));
                Ok(ScanOutcome {
                    command_line,
                    exit_code,
                    stdout,
                    stderr,
                    elapsed_ms: started.elapsed().as_millis(),
                })
            }
        }
    }

    fn fail(&self, command: &ScanCommand, err: ScanError) -> ScanError {
        self.sink.on_phase(command, &ScanPhase::Failed(err.to_string()));
        err
    }
}

/// Reads a pipe to EOF, forwarding each line to the sink as it arrives.
/// Only the last `limit` bytes are kept; a truncated capture starts with
/// `TRUNCATED_MARKER`. A line longer than `limit` arrives in pieces.
async fn drain<R: AsyncRead + Unpin>(
    reader: R,
    stream: OutputStream,
    command: &ScanCommand,
    sink: &SinkRef,
    limit: usize,
) -> std::io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut truncated = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut chunk = (&mut reader).take(limit.max(1) as u64);
        if chunk.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        sink.on_output(command, stream, text.trim_end_matches(&['\r', '\n'][..]));
        collected.push_str(&text);
        if collected.len() > limit {
            let mut cut = collected.len() - limit;
            while !collected.is_char_boundary(cut) {
                cut += 1;
            }
            collected.drain(..cut);
            truncated = true;
        }
    }
    if truncated {
        collected.insert_str(0, TRUNCATED_MARKER);
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScanEventSink;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        phases: Mutex<Vec<ScanPhase>>,
        lines: Mutex<Vec<(OutputStream, String)>>,
    }

    impl ScanEventSink for RecordingSink {
        fn on_phase(&self, _command: &ScanCommand, phase: &ScanPhase) {
            self.phases.lock().unwrap().push(phase.clone());
        }

        fn on_output(&self, _command: &ScanCommand, stream: OutputStream, line: &str) {
            self.lines.lock().unwrap().push((stream, line.to_string()));
        }
    }

    #[test]
    fn test_scan_args_are_discrete() {
        let cmd = ScanCommand::scan("numpy").unwrap();
        assert_eq!(cmd.args(), vec!["-p", "numpy", "-o", "json", "-i"]);
        assert_eq!(cmd.command_line("pyfyzz"), "pyfyzz -p numpy -o json -i");
    }

    #[test]
    fn test_pull_request_args() {
        let cmd = ScanCommand::pull_request("requests", "0b9e-11").unwrap();
        assert_eq!(cmd.args(), vec!["github_pull_request", "-p", "requests", "-r", "0b9e-11"]);
        assert_eq!(cmd.package(), "requests");
    }

    #[test]
    fn test_option_like_package_rejected() {
        assert!(ScanCommand::scan("--help").is_err());
        assert!(ScanCommand::scan("numpy && reboot").is_err());
        assert!(ScanCommand::pull_request("numpy", "").is_err());
    }

    #[test]
    fn test_message_selection() {
        let mut outcome = ScanOutcome {
            command_line: String::new(),
            exit_code: Some(1),
            stdout: "out".into(),
            stderr: "err".into(),
            elapsed_ms: 0,
        };
        assert_eq!(outcome.status(), ScanStatus::Danger);
        assert_eq!(outcome.message(), "err");

        outcome.exit_code = Some(0);
        assert_eq!(outcome.status(), ScanStatus::Success);
        assert_eq!(outcome.message(), "err");

        outcome.stderr.clear();
        assert_eq!(outcome.message(), "out");

        outcome.exit_code = None;
        assert_eq!(outcome.status(), ScanStatus::Danger);
        assert_eq!(outcome.message(), "");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn write_tool(dir: &TempDir, body: &str) -> String {
            let path = dir.path().join("fake-pyfyzz");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        fn bridge(tool: String, max_concurrent: usize, sink: Arc<RecordingSink>) -> ScanBridge {
            let config = ScanBridgeConfig { tool, timeout_secs: 30, max_concurrent };
            ScanBridge::new(&config, sink)
        }

        #[tokio::test]
        async fn test_failure_surfaces_stderr() {
            let dir = TempDir::new().unwrap();
            let tool = write_tool(&dir, "echo 'scanning'\necho 'boom: no such package' >&2\nexit 1");
            let sink = Arc::new(RecordingSink::default());
            let bridge = bridge(tool, 2, sink.clone());

            let outcome = bridge.run(&ScanCommand::scan("numpy").unwrap()).await.unwrap();
            assert_eq!(outcome.exit_code, Some(1));
            assert_eq!(outcome.status(), ScanStatus::Danger);
            assert_eq!(outcome.message(), "boom: no such package\n");
            assert_eq!(outcome.stdout, "scanning\n");

            let phases = sink.phases.lock().unwrap().clone();
            assert_eq!(
                phases,
                vec![ScanPhase::Spawned, ScanPhase::Streaming, ScanPhase::Completed(Some(1))]
            );
            let lines = sink.lines.lock().unwrap().clone();
            assert!(lines.contains(&(OutputStream::Stderr, "boom: no such package".to_string())));
        }

        #[tokio::test]
        async fn test_arguments_arrive_unsplit() {
            let dir = TempDir::new().unwrap();
            let tool = write_tool(&dir, "for a in \"$@\"; do echo \"[$a]\"; done");
            let bridge = bridge(tool, 1, Arc::new(RecordingSink::default()));

            let outcome = bridge
                .run(&ScanCommand::pull_request("zope.interface", "abc-123").unwrap())
                .await
                .unwrap();
            assert!(outcome.succeeded());
            assert_eq!(
                outcome.stdout,
                "[github_pull_request]\n[-p]\n[zope.interface]\n[-r]\n[abc-123]\n"
            );
        }

        #[tokio::test]
        async fn test_spawn_failure_never_streams() {
            let sink = Arc::new(RecordingSink::default());
            let bridge = bridge("/nonexistent/dir/pyfyzz".to_string(), 1, sink.clone());

            let err = bridge.run(&ScanCommand::scan("numpy").unwrap()).await.unwrap_err();
            assert!(matches!(err, ScanError::Spawn { .. }));

            let phases = sink.phases.lock().unwrap().clone();
            assert_eq!(phases.len(), 1);
            assert!(matches!(phases[0], ScanPhase::Failed(_)));
            assert_eq!(bridge.available_slots(), 1);
        }

        #[tokio::test]
        async fn test_timeout_is_failed_state() {
            let dir = TempDir::new().unwrap();
            let tool = write_tool(&dir, "echo started\nexec sleep 10");
            let sink = Arc::new(RecordingSink::default());
            let bridge = bridge(tool, 1, sink.clone()).with_timeout(Duration::from_millis(300));

            let started = Instant::now();
            let err = bridge.run(&ScanCommand::scan("numpy").unwrap()).await.unwrap_err();
            assert!(matches!(err, ScanError::TimedOut(_)));
            assert!(started.elapsed() < Duration::from_secs(5));

            let phases = sink.phases.lock().unwrap().clone();
            assert!(matches!(phases.last(), Some(ScanPhase::Failed(_))));
        }

        #[tokio::test]
        async fn test_captured_output_keeps_the_tail() {
            let dir = TempDir::new().unwrap();
            let tool = write_tool(
                &dir,
                "i=0; while [ $i -lt 100 ]; do echo \"line-$i\"; i=$((i+1)); done",
            );
            let sink = Arc::new(RecordingSink::default());
            let bridge = bridge(tool, 1, sink.clone()).with_output_limit(64);

            let outcome = bridge.run(&ScanCommand::scan("numpy").unwrap()).await.unwrap();
            assert!(outcome.stdout.starts_with(TRUNCATED_MARKER));
            assert!(outcome.stdout.ends_with("line-99\n"));
            assert!(outcome.stdout.len() <= 64 + TRUNCATED_MARKER.len());
            assert!(!outcome.stdout.contains("line-0\n"));
            assert_eq!(sink.lines.lock().unwrap().len(), 100);
        }

        #[tokio::test]
        async fn test_unterminated_output_is_bounded() {
            let dir = TempDir::new().unwrap();
            let tool = write_tool(&dir, "printf '%0200d' 0");
            let sink = Arc::new(RecordingSink::default());
            let bridge = bridge(tool, 1, sink.clone()).with_output_limit(64);

            let outcome = bridge.run(&ScanCommand::scan("numpy").unwrap()).await.unwrap();
            assert_eq!(outcome.stdout, format!("{}{}", TRUNCATED_MARKER, "0".repeat(64)));
            let pieces = sink.lines.lock().unwrap().len();
            assert_eq!(pieces, 4);
        }

        #[tokio::test]
        async fn test_concurrency_is_bounded() {
            let dir = TempDir::new().unwrap();
            let tool = write_tool(&dir, "sleep 0.3");
            let bridge = Arc::new(bridge(tool, 1, Arc::new(RecordingSink::default())));
            let cmd = ScanCommand::scan("numpy").unwrap();

            let started = Instant::now();
            let (a, b) = tokio::join!(bridge.run(&cmd), bridge.run(&cmd));
            assert!(a.unwrap().succeeded());
            assert!(b.unwrap().succeeded());
            assert!(started.elapsed() >= Duration::from_millis(550));
        }
    }
}
