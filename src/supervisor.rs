//! Background service supervision
//!
//! The extractor and processor run as detached OS processes with their
//! output redirected to per-service log files. The [`Supervisor`] owns
//! every child it launches and guarantees exactly one termination attempt
//! per recorded process when the run ends: [`Supervisor::shutdown`] covers
//! normal completion and fatal errors after launch, and the `Drop` impl
//! covers paths that never reach it, such as an interrupt cancelling the
//! run mid-stage. Children are additionally spawned with
//! `kill_on_drop(true)` so the kernel-side handle cannot outlive this
//! process even if the drop glue is skipped by an abort.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Bound on waiting for a killed child to be reaped.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SuperviseError {
    #[error("failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Launch description for one service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    name: String,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    log_file: PathBuf,
    health_url: Option<String>,
}

impl ServiceSpec {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        log_file: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            log_file: log_file.as_ref().to_path_buf(),
            health_url: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Variables applied on top of the inherited environment.
    pub fn env_vars(mut self, vars: Vec<(String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    fn rendered(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// A recorded background process. Read-only view handed to the prober
/// and the run report; the supervisor alone may terminate it.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceProcess {
    pub name: String,
    pub pid: u32,
    pub log_file: PathBuf,
    pub health_url: Option<String>,
    pub command: String,
}

struct Entry {
    process: ServiceProcess,
    child: Child,
    terminated: bool,
}

/// Owner of the supervised children for one run.
pub struct Supervisor {
    entries: Vec<Entry>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Starts the service in the background with stdout/stderr appended to
    /// its log file and records it for cleanup.
    pub async fn launch(&mut self, spec: ServiceSpec) -> Result<ServiceProcess, SuperviseError> {
        if let Some(parent) = spec.log_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| SuperviseError::LogFile {
                    path: spec.log_file.clone(),
                    source,
                })?;
            }
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_file)
            .map_err(|source| SuperviseError::LogFile {
                path: spec.log_file.clone(),
                source,
            })?;
        let log_err = log.try_clone().map_err(|source| SuperviseError::LogFile {
            path: spec.log_file.clone(),
            source,
        })?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| SuperviseError::Spawn {
            name: spec.name.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        info!(
            service = %spec.name,
            pid,
            log = %spec.log_file.display(),
            "started service"
        );

        let process = ServiceProcess {
            name: spec.name.clone(),
            pid,
            log_file: spec.log_file.clone(),
            health_url: spec.health_url.clone(),
            command: spec.rendered(),
        };
        self.entries.push(Entry {
            process: process.clone(),
            child,
            terminated: false,
        });
        Ok(process)
    }

    /// Read-only views of every recorded process, in launch order.
    pub fn services(&self) -> Vec<ServiceProcess> {
        self.entries.iter().map(|e| e.process.clone()).collect()
    }

    /// Number of processes a termination attempt has been issued for.
    pub fn termination_attempts(&self) -> usize {
        self.entries.iter().filter(|e| e.terminated).count()
    }

    /// Terminates every recorded process that has not already had its
    /// termination attempt. A child that exited on its own is tolerated;
    /// calling shutdown again is a no-op.
    pub async fn shutdown(&mut self) {
        for entry in &mut self.entries {
            if entry.terminated {
                continue;
            }
            entry.terminated = true;

            match entry.child.start_kill() {
                Ok(()) => debug!(service = %entry.process.name, "kill requested"),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                    debug!(service = %entry.process.name, "service already exited");
                }
                Err(e) => {
                    warn!(service = %entry.process.name, error = %e, "kill request failed");
                }
            }

            match tokio::time::timeout(SHUTDOWN_WAIT, entry.child.wait()).await {
                Ok(Ok(status)) => info!(
                    service = %entry.process.name,
                    code = status.code().unwrap_or(-1),
                    "service terminated"
                ),
                Ok(Err(e)) => {
                    warn!(service = %entry.process.name, error = %e, "wait after kill failed");
                }
                Err(_) => warn!(
                    service = %entry.process.name,
                    "service did not exit within the shutdown wait"
                ),
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for entry in &mut self.entries {
            if entry.terminated {
                continue;
            }
            entry.terminated = true;
            let _ = entry.child.start_kill();
            warn!(
                service = %entry.process.name,
                pid = entry.process.pid,
                "killed service while unwinding the run"
            );
        }
    }
}
