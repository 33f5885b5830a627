//! ffmpeg command building and managed subprocess execution.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use reelsmith_common::{ReelError, ReelResult};

/// Lines of stderr kept for error messages and diagnostics.
pub const STDERR_TAIL_LINES: usize = 40;

/// How often [`ManagedChild::wait`] checks for exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One input of an ffmpeg invocation.
#[derive(Debug, Clone)]
struct InputSpec {
    /// Arguments placed before `-i`.
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for ffmpeg argument lists.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<InputSpec>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
    progress: bool,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
            progress: false,
        }
    }

    /// Add a plain input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with(Vec::<String>::new(), path)
    }

    /// Add an input preceded by input options (`-ss`, `-loop`, ...).
    pub fn input_with<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(InputSpec {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(graph)
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn threads(self, threads: usize) -> Self {
        self.output_arg("-threads").output_arg(threads.max(1).to_string())
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Emit `key=value` progress blocks on stdout.
    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());
        if self.progress {
            args.push("-progress".to_string());
            args.push("pipe:1".to_string());
            args.push("-nostats".to_string());
        }

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Tracks the subprocesses spawned for one job so they can be reaped as a group.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: Mutex<Vec<Weak<Mutex<Child>>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, child: &Arc<Mutex<Child>>) {
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(child));
    }

    /// Children still owned by a [`ManagedChild`].
    pub fn live_count(&self) -> usize {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Kill and reap every child that is still running. Returns how many were killed.
    pub fn kill_all(&self) -> usize {
        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut killed = 0;
        for child in children.iter().filter_map(Weak::upgrade) {
            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
            if kill_and_reap(&mut child) {
                killed += 1;
            }
        }
        killed
    }
}

/// Returns true when the child was still running.
fn kill_and_reap(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(_)) => false,
        _ => {
            if let Err(e) = child.kill() {
                tracing::debug!(pid = child.id(), error = %e, "Kill failed");
            }
            let _ = child.wait();
            true
        }
    }
}

/// A child process that is killed and reaped when dropped.
#[derive(Debug)]
pub struct ManagedChild {
    child: Arc<Mutex<Child>>,
    pid: u32,
    reaped: bool,
}

impl ManagedChild {
    pub fn spawn(command: &mut Command, registry: &ProcessRegistry) -> std::io::Result<Self> {
        let child = command.spawn()?;
        let pid = child.id();
        let child = Arc::new(Mutex::new(child));
        registry.register(&child);
        Ok(Self {
            child,
            pid,
            reaped: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.lock().stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.lock().stderr.take()
    }

    /// Wait for the child to exit.
    ///
    /// Polls instead of blocking in `Child::wait` so the lock is free between
    /// polls and [`ProcessRegistry::kill_all`] can reach the child.
    pub fn wait(&mut self) -> std::io::Result<ExitStatus> {
        loop {
            let status = self.lock().try_wait()?;
            if let Some(status) = status {
                self.reaped = true;
                return Ok(status);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        if !self.reaped && kill_and_reap(&mut self.lock()) {
            tracing::warn!(pid = self.pid, "Killed orphaned subprocess");
        }
    }
}

/// Captured result of a finished tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last [`STDERR_TAIL_LINES`] non-empty stderr lines.
    pub fn stderr_tail(&self) -> String {
        tail_lines(&self.stderr, STDERR_TAIL_LINES)
    }
}

/// Last `count` non-empty lines of `text`.
pub fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Encoder progress reported on `-progress pipe:1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    /// Completed fraction of `expected_secs`, in `[0, 1]`.
    pub fn fraction(&self, expected_secs: f64) -> f64 {
        if self.complete {
            1.0
        } else if expected_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_secs).clamp(0.0, 1.0)
        }
    }
}

/// Run `program` to completion as a managed child.
///
/// Stderr is drained on a separate thread. When `on_progress` is given,
/// stdout is parsed as ffmpeg progress blocks. A non-zero exit is not an
/// error here; callers inspect [`ToolOutput::status`].
pub fn run_tool(
    program: &Path,
    args: &[String],
    registry: &ProcessRegistry,
    on_progress: Option<&dyn Fn(&ProgressState)>,
) -> ReelResult<ToolOutput> {
    let tool = program.display().to_string();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = ManagedChild::spawn(&mut command, registry).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReelError::ToolNotFound { tool: tool.clone() }
        } else {
            ReelError::Other(anyhow::anyhow!("failed to start {tool}: {e}"))
        }
    })?;
    tracing::debug!(pid = child.id(), tool = %tool, args = args.len(), "Process started");

    let stdout = child
        .take_stdout()
        .ok_or_else(|| ReelError::Other(anyhow::anyhow!("failed to capture {tool} stdout")))?;
    let stderr = child
        .take_stderr()
        .ok_or_else(|| ReelError::Other(anyhow::anyhow!("failed to capture {tool} stderr")))?;

    // Drain stderr concurrently so the child never blocks on a full pipe.
    let stderr_task = std::thread::spawn(move || -> String {
        let mut reader = BufReader::new(stderr);
        let mut output = Vec::new();
        match reader.read_to_end(&mut output) {
            Ok(_) => String::from_utf8_lossy(&output).into_owned(),
            Err(err) => format!("<failed to read stderr: {err}>"),
        }
    });

    let (stdout_text, status) = match read_stdout(stdout, on_progress) {
        Ok(text) => (text, child.wait()),
        Err(e) => {
            // Kill and reap so the stderr pipe closes before joining its reader.
            drop(child);
            (String::new(), Err(e))
        }
    };
    let stderr_text = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());
    let status = status?;

    tracing::debug!(tool = %tool, status = %status, "Process finished");
    Ok(ToolOutput {
        status,
        stdout: stdout_text,
        stderr: stderr_text,
    })
}

/// Read `stdout` to the end, feeding ffmpeg progress blocks to `on_progress`
/// when given and collecting the text otherwise. Invalid UTF-8 is replaced.
fn read_stdout(
    stdout: ChildStdout,
    on_progress: Option<&dyn Fn(&ProgressState)>,
) -> std::io::Result<String> {
    let mut reader = BufReader::new(stdout);
    let mut stdout_text = String::new();
    let mut buf = Vec::new();
    let mut progress = ProgressState::default();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        match on_progress {
            Some(callback) => {
                if let Some((key, value)) = line.trim().split_once('=') {
                    progress.update(key, value);
                    if key == "progress" {
                        callback(&progress);
                    }
                }
            }
            None => stdout_text.push_str(&line),
        }
    }
    Ok(stdout_text)
}

/// Resolve a tool name or path to an executable on this system.
pub fn find_tool(program: &Path) -> ReelResult<PathBuf> {
    which::which(program).map_err(|_| ReelError::ToolNotFound {
        tool: program.display().to_string(),
    })
}
