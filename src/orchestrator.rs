//! Run orchestration
//!
//! Drives the stages of one stack run in order: configuration, runtime
//! resolution, extractor build, service launch, readiness gating, and the
//! single pipeline submission. Stage failures that make later stages
//! meaningless (no runtime, no artifact) abort before any service is
//! launched; readiness timeouts only warn; a failed submission is recorded
//! in the report with pointers at both service logs. Whatever happens
//! after launch, the supervisor's shutdown runs before this returns.

use crate::build::BuildManager;
use crate::config::StackConfig;
use crate::exec::{CommandRunner, CommandSpec};
use crate::fs::FileSystem;
use crate::probe::{ProbeConfig, ProbeOutcome, ReadinessProber};
use crate::runtime::{Resolution, RuntimeResolver};
use crate::submit::PipelineInvoker;
use crate::supervisor::{ServiceProcess, ServiceSpec, Supervisor};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

const EXTRACTOR_HEALTH_URL: &str = "http://localhost:8080/actuator/health";
const PROCESSOR_READY_URL: &str = "http://localhost:8000/docs";
const PROCESSOR_ENDPOINT: &str = "http://localhost:8000/process-pdf";

const EXTRACTOR_LOG: &str = "java.log";
const PROCESSOR_DIR: &str = "python-server";
const PROCESSOR_LOG: &str = "python-server/python.log";

/// What one invocation of the orchestrator should do.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Input document to drive through the pipeline.
    pub input: PathBuf,

    /// Stack checkout root: `pom.xml` and `python-server/` live here.
    pub stack_root: PathBuf,

    /// Environment file; defaults to `.env` under the stack root.
    pub env_file: Option<PathBuf>,

    /// Skip building and launching the extractor and target an already
    /// running instance instead.
    pub skip_extractor: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub service: String,
    pub outcome: ProbeOutcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Saved {
        output: PathBuf,
        bytes: u64,
        status: u16,
    },
    Failed {
        error: String,
        logs: Vec<PathBuf>,
    },
}

/// Terminal record of one run, rendered by the CLI as human text or JSON.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub input: PathBuf,
    pub config: BTreeMap<String, String>,
    pub runtime: Option<String>,
    pub artifact: Option<PathBuf>,
    pub services: Vec<ServiceProcess>,
    pub readiness: Vec<ReadinessReport>,
    pub submission: SubmissionOutcome,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.submission, SubmissionOutcome::Saved { .. })
    }

    /// A failed submission is the one post-launch condition that turns
    /// into a nonzero exit; readiness timeouts do not.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

pub struct Orchestrator<'a> {
    fs: &'a dyn FileSystem,
    runner: &'a dyn CommandRunner,
    probe_config: ProbeConfig,
    processor_endpoint: String,
}

impl<'a> Orchestrator<'a> {
    pub fn new(fs: &'a dyn FileSystem, runner: &'a dyn CommandRunner) -> Self {
        Self {
            fs,
            runner,
            probe_config: ProbeConfig::default(),
            processor_endpoint: PROCESSOR_ENDPOINT.to_string(),
        }
    }

    pub fn with_probe_config(mut self, config: ProbeConfig) -> Self {
        self.probe_config = config;
        self
    }

    pub fn with_processor_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.processor_endpoint = endpoint.into();
        self
    }

    pub async fn run(&self, opts: &RunOptions) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, input = %opts.input.display(), "starting stack run");

        if !self.fs.is_file(&opts.input) {
            bail!("input document not found: {}", opts.input.display());
        }

        let env_file = opts
            .env_file
            .clone()
            .unwrap_or_else(|| opts.stack_root.join(".env"));
        let config = StackConfig::from_host(self.fs, &env_file)
            .context("loading environment configuration")?;
        config.log_summary();

        let mut runtime_display = None;
        let mut artifact = None;
        if !opts.skip_extractor {
            let resolver = RuntimeResolver::new(self.fs, self.runner);
            let resolution = resolver.resolve().await;
            runtime_display = Some(resolution.to_string());

            let active = match resolution {
                Resolution::Active(active) => active,
                Resolution::Unresolved { .. } => {
                    bail!(
                        "{}; refusing to build the extractor",
                        runtime_display.as_deref().unwrap_or_default()
                    );
                }
            };

            let jar = BuildManager::new(self.fs, self.runner, &opts.stack_root)
                .build(&active)
                .await
                .context("building the extractor")?;
            artifact = Some(jar);
        } else {
            info!("skipping extractor build and launch");
        }

        let mut supervisor = Supervisor::new();
        let driven = self
            .drive(&mut supervisor, opts, &config, artifact.as_deref())
            .await;
        supervisor.shutdown().await;
        let (services, readiness, submission) = driven?;

        let report = RunReport {
            run_id: run_id.clone(),
            timestamp: chrono::Utc::now(),
            input: opts.input.clone(),
            config: config.to_display_map(),
            runtime: runtime_display,
            artifact,
            services,
            readiness,
            submission,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            run_id = %run_id,
            elapsed_ms = report.elapsed_ms,
            succeeded = report.succeeded(),
            "run complete"
        );
        Ok(report)
    }

    /// Stages that run with services recorded in the supervisor. The
    /// caller shuts the supervisor down whether this returns Ok or Err.
    async fn drive(
        &self,
        supervisor: &mut Supervisor,
        opts: &RunOptions,
        config: &StackConfig,
        jar: Option<&Path>,
    ) -> Result<(Vec<ServiceProcess>, Vec<ReadinessReport>, SubmissionOutcome)> {
        // The extractor launches first; if it cannot start, the processor
        // is never launched at all.
        if let Some(jar) = jar {
            let spec = ServiceSpec::new("extractor", "java", opts.stack_root.join(EXTRACTOR_LOG))
                .args(["-jar".to_string(), jar.to_string_lossy().into_owned()])
                .env_vars(config.child_env())
                .health_url(EXTRACTOR_HEALTH_URL);
            supervisor
                .launch(spec)
                .await
                .context("launching the extractor")?;
        }

        self.reap_stale_processor().await;

        let spec = ServiceSpec::new(
            "processor",
            self.processor_interpreter(&opts.stack_root),
            opts.stack_root.join(PROCESSOR_LOG),
        )
        .args(["-m", "uvicorn", "main:app", "--host", "0.0.0.0", "--port", "8000"])
        .cwd(opts.stack_root.join(PROCESSOR_DIR))
        .env_vars(config.child_env())
        .health_url(PROCESSOR_READY_URL);
        supervisor
            .launch(spec)
            .await
            .context("launching the processor")?;

        let prober =
            ReadinessProber::new(self.probe_config.clone()).context("building the readiness prober")?;
        let mut readiness = Vec::new();
        for service in supervisor.services() {
            if let Some(url) = &service.health_url {
                let outcome = prober.wait_ready(&service.name, url).await;
                readiness.push(ReadinessReport {
                    service: service.name.clone(),
                    outcome,
                });
            }
        }

        let invoker = PipelineInvoker::new(&self.processor_endpoint)
            .context("building the pipeline client")?;
        let submission = match invoker.submit(&opts.input, &opts.stack_root).await {
            Ok(receipt) => {
                info!(
                    output = %receipt.output_path.display(),
                    bytes = receipt.bytes_written,
                    "pipeline response saved"
                );
                SubmissionOutcome::Saved {
                    output: receipt.output_path,
                    bytes: receipt.bytes_written,
                    status: receipt.status,
                }
            }
            Err(e) => {
                let logs: Vec<PathBuf> = supervisor
                    .services()
                    .iter()
                    .map(|s| s.log_file.clone())
                    .collect();
                error!(error = %e, "pipeline submission failed; inspect the service logs");
                for log in &logs {
                    error!(log = %log.display(), "service log");
                }
                SubmissionOutcome::Failed {
                    error: e.to_string(),
                    logs,
                }
            }
        };

        Ok((supervisor.services(), readiness, submission))
    }

    /// The processor prefers the stack's own venv interpreter when one
    /// exists, matching how its dependencies are installed.
    fn processor_interpreter(&self, stack_root: &Path) -> String {
        let venv_python = stack_root.join(PROCESSOR_DIR).join(".venv/bin/python");
        if self.fs.is_file(&venv_python) {
            venv_python.to_string_lossy().into_owned()
        } else {
            "python3".to_string()
        }
    }

    /// A processor left over from a previous run would still hold port
    /// 8000. Best-effort; a host without pkill just skips this.
    async fn reap_stale_processor(&self) {
        let spec = CommandSpec::new("pkill").args(["-f", "uvicorn"]);
        match self.runner.run_capture(&spec).await {
            Ok(output) => debug!(code = output.exit_code, "reaped stale processor instances"),
            Err(e) => debug!(error = %e, "pkill unavailable; skipping stale-process reap"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockRunner;
    use crate::fs::MockFileSystem;
    use std::time::Duration;

    const JAVA_17_BANNER: &str = "openjdk version \"17.0.8\" 2023-07-18";

    fn options(input: &str, stack_root: &str) -> RunOptions {
        RunOptions {
            input: PathBuf::from(input),
            stack_root: PathBuf::from(stack_root),
            env_file: None,
            skip_extractor: false,
        }
    }

    #[tokio::test]
    async fn test_missing_input_aborts_before_anything_runs() {
        let fs = MockFileSystem::new();
        let runner = MockRunner::new();
        let orchestrator = Orchestrator::new(&fs, &runner);

        let err = orchestrator
            .run(&options("/stack/missing.pdf", "/stack"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("input document not found"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_runtime_aborts_before_any_launch() {
        let fs = MockFileSystem::new();
        fs.add_file("/stack/input.pdf", "%PDF");
        fs.add_file("/stack/pom.xml", "<project/>");

        let runner = MockRunner::new();
        runner.add_success("id -u", "0\n");
        runner.add_success("apt-get update", "");
        runner.add_success("apt-get install -y openjdk-17-jdk", "");

        let orchestrator = Orchestrator::new(&fs, &runner);
        let err = orchestrator
            .run(&options("/stack/input.pdf", "/stack"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no JDK >= 17"));
        // The stale-process reap precedes every launch; its absence shows
        // the run never reached the supervisor.
        assert!(!runner.calls().iter().any(|c| c.starts_with("pkill")));
    }

    #[tokio::test]
    async fn test_build_failure_aborts_before_any_launch() {
        let fs = MockFileSystem::new();
        fs.add_file("/stack/input.pdf", "%PDF");
        fs.add_file(
            "/stack/pom.xml",
            "<project><artifactId>x</artifactId></project>",
        );

        let runner = MockRunner::new();
        runner.add_response(
            "java -version",
            crate::exec::CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: JAVA_17_BANNER.to_string(),
            },
        );
        runner.add_failure("mvn -DskipTests clean package", 1, "compilation error");

        let orchestrator = Orchestrator::new(&fs, &runner);
        let err = orchestrator
            .run(&options("/stack/input.pdf", "/stack"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("building the extractor"));
        assert!(!runner.calls().iter().any(|c| c.starts_with("pkill")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_degraded_run_with_skipped_extractor() {
        use std::os::unix::fs::PermissionsExt;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("python-server/.venv/bin")).unwrap();

        // Fake venv interpreter that just stays alive.
        let interpreter = root.join("python-server/.venv/bin/python");
        std::fs::write(&interpreter, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&interpreter).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&interpreter, perms).unwrap();

        let input = root.join("My Report v2.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        // Stand-in processor endpoint answering one submission.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 65536];
            let mut seen = Vec::new();
            loop {
                let Ok(n) = stream.read(&mut buf).await else {
                    return;
                };
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if let Some(pos) = seen.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&seen[..pos]);
                    if let Some(len) = headers.lines().find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    }) {
                        if seen.len() >= pos + 4 + len {
                            break;
                        }
                    }
                }
            }
            let body = r#"{"ok":true}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });

        let fs = crate::fs::RealFileSystem::new();
        let runner = MockRunner::new();
        runner.add_success("pkill -f uvicorn", "");

        let orchestrator = Orchestrator::new(&fs, &runner)
            .with_probe_config(ProbeConfig {
                interval: Duration::from_millis(20),
                max_attempts: 2,
                request_timeout: Duration::from_millis(200),
            })
            .with_processor_endpoint(format!("http://{}/process-pdf", addr));

        let opts = RunOptions {
            input: input.clone(),
            stack_root: root.to_path_buf(),
            env_file: None,
            skip_extractor: true,
        };
        let report = orchestrator.run(&opts).await.unwrap();

        // The fake processor never exposes /docs on 8000; the timeout is a
        // warning and the submission still runs.
        assert_eq!(report.readiness.len(), 1);
        assert!(!report.readiness[0].outcome.is_ready());
        assert!(report.succeeded());
        assert_eq!(report.exit_code(), 0);
        assert!(report.runtime.is_none());
        assert_eq!(report.services.len(), 1);
        assert_eq!(report.services[0].name, "processor");

        let saved = std::fs::read_to_string(root.join("My_Report_v2.json")).unwrap();
        assert_eq!(saved, r#"{"ok":true}"#);
        assert!(root.join("python-server/python.log").exists());
        assert!(!root.join("java.log").exists());
    }

    #[test]
    fn test_report_exit_codes() {
        let saved = RunReport {
            run_id: "r".to_string(),
            timestamp: chrono::Utc::now(),
            input: PathBuf::from("a.pdf"),
            config: BTreeMap::new(),
            runtime: Some("java 17.0.8 (system default)".to_string()),
            artifact: None,
            services: Vec::new(),
            readiness: Vec::new(),
            submission: SubmissionOutcome::Saved {
                output: PathBuf::from("a.json"),
                bytes: 2,
                status: 200,
            },
            elapsed_ms: 1,
        };
        assert_eq!(saved.exit_code(), 0);
        assert!(saved.succeeded());

        let failed = RunReport {
            submission: SubmissionOutcome::Failed {
                error: "transfer failed".to_string(),
                logs: vec![PathBuf::from("java.log")],
            },
            ..saved
        };
        assert_eq!(failed.exit_code(), 1);
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = RunReport {
            run_id: "run-1".to_string(),
            timestamp: chrono::Utc::now(),
            input: PathBuf::from("My_Report.pdf"),
            config: BTreeMap::from([("GEMINI_API_KEY".to_string(), "set".to_string())]),
            runtime: None,
            artifact: None,
            services: Vec::new(),
            readiness: vec![ReadinessReport {
                service: "processor".to_string(),
                outcome: ProbeOutcome::TimedOut { attempts: 30 },
            }],
            submission: SubmissionOutcome::Failed {
                error: "transfer failed".to_string(),
                logs: vec![PathBuf::from("python-server/python.log")],
            },
            elapsed_ms: 42,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["readiness"][0]["outcome"]["state"], "timed_out");
        assert_eq!(json["submission"]["result"], "failed");
    }
}
