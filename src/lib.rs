//! stackup - local orchestrator for the PDF-processing stack
//!
//! This library bootstraps, launches, and coordinates the two services
//! forming the local PDF pipeline: the Maven-built extractor (Spring,
//! port 8080) and the uvicorn-served processor (FastAPI, port 8000). It
//! then drives one document through the pipeline and persists the result.
//!
//! # Core Concepts
//!
//! - **Runtime resolution**: finding, activating, or installing a JDK at
//!   or above the required feature release before the extractor builds
//! - **Supervision**: both services run as background processes whose
//!   logs are captured per service and whose termination is guaranteed on
//!   every exit path
//! - **Readiness gating**: bounded health polling that warns rather than
//!   aborts, so a missing health surface never blocks the real work
//!
//! # Example Usage
//!
//! ```no_run
//! use stackup::exec::SystemRunner;
//! use stackup::fs::RealFileSystem;
//! use stackup::orchestrator::{Orchestrator, RunOptions};
//! use std::path::PathBuf;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let fs = RealFileSystem::new();
//! let runner = SystemRunner::new();
//! let orchestrator = Orchestrator::new(&fs, &runner);
//!
//! let report = orchestrator
//!     .run(&RunOptions {
//!         input: PathBuf::from("My Report v2.pdf"),
//!         stack_root: PathBuf::from("."),
//!         env_file: None,
//!         skip_extractor: false,
//!     })
//!     .await?;
//! std::process::exit(report.exit_code());
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`config`]: immutable merged environment configuration
//! - [`runtime`]: JDK discovery, activation, and install fallback
//! - [`build`]: the Maven build of the extractor artifact
//! - [`supervisor`]: background process launch and guaranteed cleanup
//! - [`probe`]: bounded readiness polling
//! - [`submit`]: the single pipeline invocation
//! - [`orchestrator`]: the sequential control flow tying it together

// Public modules
pub mod build;
pub mod cli;
pub mod config;
pub mod exec;
pub mod fs;
pub mod orchestrator;
pub mod probe;
pub mod runtime;
pub mod submit;
pub mod supervisor;
pub mod util;

// Re-export key types for convenient access
pub use build::{BuildError, BuildManager};
pub use config::StackConfig;
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
pub use probe::{ProbeConfig, ProbeOutcome, ReadinessProber};
pub use runtime::{JavaVersion, Resolution, RuntimeResolver};
pub use submit::{PipelineInvoker, SubmitError};
pub use supervisor::{ServiceProcess, ServiceSpec, Supervisor};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
