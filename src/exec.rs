//! Command execution seam.
//!
//! Runtime resolution and the build step shell out to host tools (`java`,
//! `apt-get`, `update-alternatives`, `mvn`). [`CommandRunner`] abstracts
//! those invocations so the decision logic can be tested against a scripted
//! [`MockRunner`] instead of a host with a particular JDK zoo installed.
//! Long-lived service processes are not run through this seam; the
//! supervisor owns those directly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::RwLock;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

/// Captured stdout or stderr is capped per stream. Build tools stream to the
/// console instead, so only short diagnostic commands go through capture.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// One command invocation: program, arguments, extra environment, and an
/// optional working directory.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Program and arguments joined for logging and mock lookup.
    pub fn rendered(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Result of a captured run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture both output streams. `java -version`
    /// writes to stderr, so callers get both.
    async fn run_capture(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;

    /// Run to completion with stdout/stderr inherited from the parent, for
    /// tools that report their own progress (Maven, apt).
    async fn run_streamed(&self, spec: &CommandSpec) -> Result<i32, ExecError>;
}

/// Runner backed by `tokio::process`.
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run_capture(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        debug!(command = %spec.rendered(), "running command");

        let mut cmd = Self::build_command(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        // Read both streams in tasks so `child.wait()` can hold the borrow.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        let status = child.wait().await.map_err(|source| ExecError::Wait {
            program: spec.program.clone(),
            source,
        })?;

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        })
    }

    async fn run_streamed(&self, spec: &CommandSpec) -> Result<i32, ExecError> {
        debug!(command = %spec.rendered(), "running command (streamed)");

        let mut cmd = Self::build_command(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let status = child.wait().await.map_err(|source| ExecError::Wait {
            program: spec.program.clone(),
            source,
        })?;

        Ok(status.code().unwrap_or(-1))
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_CAPTURE_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

/// Scripted runner for tests.
///
/// Responses are keyed by the rendered command line. Multiple responses for
/// the same key are consumed in order, with the last one repeating, so a
/// re-probe after an activation step can observe a changed answer. Commands
/// with no scripted response fail to spawn, which models a binary that is
/// not installed.
pub struct MockRunner {
    responses: RwLock<HashMap<String, Vec<CommandOutput>>>,
    cursor: RwLock<HashMap<String, usize>>,
    calls: RwLock<Vec<CommandSpec>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            cursor: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn add_response(&self, cmdline: &str, output: CommandOutput) {
        self.responses
            .write()
            .unwrap()
            .entry(cmdline.to_string())
            .or_default()
            .push(output);
    }

    /// Script a successful run with the given stdout.
    pub fn add_success(&self, cmdline: &str, stdout: &str) {
        self.add_response(
            cmdline,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Script a run that exits nonzero with the given stderr.
    pub fn add_failure(&self, cmdline: &str, exit_code: i32, stderr: &str) {
        self.add_response(
            cmdline,
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Rendered command lines in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().iter().map(CommandSpec::rendered).collect()
    }

    /// Full specs in invocation order, for asserting on env or cwd.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.read().unwrap().clone()
    }

    fn next_response(&self, key: &str) -> Option<CommandOutput> {
        let responses = self.responses.read().unwrap();
        let scripted = responses.get(key)?;
        let mut cursor = self.cursor.write().unwrap();
        let index = cursor.entry(key.to_string()).or_insert(0);
        let response = scripted.get(*index).or_else(|| scripted.last())?.clone();
        if *index + 1 < scripted.len() {
            *index += 1;
        }
        Some(response)
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run_capture(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let key = spec.rendered();
        self.calls.write().unwrap().push(spec.clone());

        self.next_response(&key).ok_or_else(|| ExecError::Spawn {
            program: spec.program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "command not scripted"),
        })
    }

    async fn run_streamed(&self, spec: &CommandSpec) -> Result<i32, ExecError> {
        self.run_capture(spec).await.map(|output| output.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_rendered() {
        let spec = CommandSpec::new("java").arg("-version");
        assert_eq!(spec.rendered(), "java -version");

        let spec = CommandSpec::new("mvn").args(["-DskipTests", "clean", "package"]);
        assert_eq!(spec.rendered(), "mvn -DskipTests clean package");

        let spec = CommandSpec::new("pkill");
        assert_eq!(spec.rendered(), "pkill");
    }

    #[test]
    fn test_command_spec_env_and_cwd() {
        let spec = CommandSpec::new("mvn")
            .env("JAVA_HOME", "/usr/lib/jvm/java-17")
            .cwd("/stack");

        assert_eq!(
            spec.env,
            vec![("JAVA_HOME".to_string(), "/usr/lib/jvm/java-17".to_string())]
        );
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/stack")));
    }

    #[tokio::test]
    async fn test_mock_runner_unscripted_fails_to_spawn() {
        let runner = MockRunner::new();
        let result = runner.run_capture(&CommandSpec::new("apt-get").arg("update")).await;

        match result {
            Err(ExecError::Spawn { program, .. }) => assert_eq!(program, "apt-get"),
            other => panic!("expected spawn error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_runner_scripted_response() {
        let runner = MockRunner::new();
        runner.add_success("java -version", "");

        let output = runner
            .run_capture(&CommandSpec::new("java").arg("-version"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(runner.calls(), vec!["java -version"]);
    }

    #[tokio::test]
    async fn test_mock_runner_sequences_responses_and_repeats_last() {
        let runner = MockRunner::new();
        runner.add_failure("java -version", 127, "not found");
        runner.add_success("java -version", "");

        let spec = CommandSpec::new("java").arg("-version");
        assert_eq!(runner.run_capture(&spec).await.unwrap().exit_code, 127);
        assert_eq!(runner.run_capture(&spec).await.unwrap().exit_code, 0);
        // Last response is sticky.
        assert_eq!(runner.run_capture(&spec).await.unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_mock_runner_streamed_uses_exit_code() {
        let runner = MockRunner::new();
        runner.add_failure("mvn clean", 1, "build error");

        let code = runner
            .run_streamed(&CommandSpec::new("mvn").arg("clean"))
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let runner = SystemRunner::new();
        let output = runner
            .run_capture(&CommandSpec::new("/bin/sh").args(["-c", "echo hello"]))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_stderr_and_exit_code() {
        let runner = SystemRunner::new();
        let output = runner
            .run_capture(&CommandSpec::new("/bin/sh").args(["-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_missing_binary_is_spawn_error() {
        let runner = SystemRunner::new();
        let result = runner
            .run_capture(&CommandSpec::new("/nonexistent/definitely-not-a-binary"))
            .await;

        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_applies_env() {
        let runner = SystemRunner::new();
        let output = runner
            .run_capture(
                &CommandSpec::new("/bin/sh")
                    .args(["-c", "printf '%s' \"$STACKUP_TEST_MARKER\""])
                    .env("STACKUP_TEST_MARKER", "present"),
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "present");
    }
}
