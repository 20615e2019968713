//! JDK runtime resolution
//!
//! The extractor build needs a JDK at or above the floor. Resolution runs
//! in fallback order: probe the active `java`, scan well-known install
//! roots for a usable candidate, and as a last resort install the distro
//! package and rescan. Activation registers the candidate as an
//! alternative for `java` and `javac` rather than overwriting the system
//! default, and repeated runs converge on the same candidate because the
//! scan is deterministic (highest usable major, directory name as
//! tie-break).
//!
//! The outcome is a typed [`Resolution`]; deciding whether an unresolved
//! runtime aborts the run is the caller's business.

pub mod version;

pub use version::{JavaVersion, VersionError};

use crate::exec::{CommandRunner, CommandSpec};
use crate::fs::FileSystem;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Minimum feature release the extractor build requires.
pub const MIN_JAVA_MAJOR: u32 = 17;

const SEARCH_ROOTS: &[&str] = &["/usr/lib/jvm", "/usr/java"];
const RUNTIME_PACKAGE: &str = "openjdk-17-jdk";

/// A discovered JDK install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JdkCandidate {
    pub home: PathBuf,
    pub version: JavaVersion,
}

/// The runtime available for the build, if any.
#[derive(Debug, Clone)]
pub enum Resolution {
    Active(ActiveRuntime),
    Unresolved { searched: Vec<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct ActiveRuntime {
    pub version: JavaVersion,

    /// Install home to export as `JAVA_HOME` for the build. `None` when
    /// the system default already meets the floor.
    pub home: Option<PathBuf>,
}

impl Resolution {
    pub fn is_active(&self) -> bool {
        matches!(self, Resolution::Active(_))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Active(runtime) => match &runtime.home {
                Some(home) => write!(f, "java {} at {}", runtime.version, home.display()),
                None => write!(f, "java {} (system default)", runtime.version),
            },
            Resolution::Unresolved { searched } => {
                let roots: Vec<String> =
                    searched.iter().map(|p| p.display().to_string()).collect();
                write!(
                    f,
                    "no JDK >= {} found (searched {})",
                    MIN_JAVA_MAJOR,
                    roots.join(", ")
                )
            }
        }
    }
}

pub struct RuntimeResolver<'a> {
    fs: &'a dyn FileSystem,
    runner: &'a dyn CommandRunner,
    search_roots: Vec<PathBuf>,
}

impl<'a> RuntimeResolver<'a> {
    pub fn new(fs: &'a dyn FileSystem, runner: &'a dyn CommandRunner) -> Self {
        Self {
            fs,
            runner,
            search_roots: SEARCH_ROOTS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Resolves a runtime for this run. Never fails outright: every
    /// fallback step is best-effort and the terminal outcome is
    /// [`Resolution::Unresolved`].
    pub async fn resolve(&self) -> Resolution {
        match self.active_version().await {
            Some(version) if version.meets(MIN_JAVA_MAJOR) => {
                info!(%version, "active java meets the required major");
                return Resolution::Active(ActiveRuntime {
                    version,
                    home: None,
                });
            }
            Some(version) => {
                info!(%version, floor = MIN_JAVA_MAJOR, "active java is below the required major");
            }
            None => {
                info!("no usable java on PATH");
            }
        }

        if let Some(candidate) = self.best_candidate() {
            return Resolution::Active(self.activate(candidate).await);
        }

        self.install_runtime().await;

        match self.best_candidate() {
            Some(candidate) => Resolution::Active(self.activate(candidate).await),
            None => {
                warn!(floor = MIN_JAVA_MAJOR, "no usable JDK found or installed");
                Resolution::Unresolved {
                    searched: self.search_roots.clone(),
                }
            }
        }
    }

    /// Version of whatever `java` is on PATH, if it runs and reports one.
    async fn active_version(&self) -> Option<JavaVersion> {
        let spec = CommandSpec::new("java").arg("-version");
        let output = match self.runner.run_capture(&spec).await {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "java probe did not run");
                return None;
            }
        };

        // The version banner goes to stderr; some wrappers print to stdout.
        let combined = format!("{}\n{}", output.stderr, output.stdout);
        match JavaVersion::from_java_output(&combined) {
            Ok(version) => Some(version),
            Err(e) => {
                debug!(error = %e, "could not parse java version output");
                None
            }
        }
    }

    /// Scans the search roots for install directories whose name carries a
    /// usable major and which contain `bin/java`. Highest major wins;
    /// directory name breaks ties deterministically.
    fn best_candidate(&self) -> Option<JdkCandidate> {
        let mut candidates = Vec::new();

        for root in &self.search_roots {
            let entries = match self.fs.read_dir(root) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries {
                if !entry.is_dir() {
                    continue;
                }
                let Some(version) = version_from_install_name(entry.file_name()) else {
                    continue;
                };
                if !version.meets(MIN_JAVA_MAJOR) {
                    debug!(
                        dir = %entry.path().display(),
                        %version,
                        "skipping candidate below the required major"
                    );
                    continue;
                }
                if !self.fs.is_file(&entry.path().join("bin/java")) {
                    debug!(dir = %entry.path().display(), "skipping candidate without bin/java");
                    continue;
                }
                candidates.push(JdkCandidate {
                    home: entry.path().to_path_buf(),
                    version,
                });
            }
        }

        let chosen = candidates
            .into_iter()
            .max_by(|a, b| (a.version, &a.home).cmp(&(b.version, &b.home)));
        if let Some(candidate) = &chosen {
            info!(
                home = %candidate.home.display(),
                version = %candidate.version,
                "selected JDK candidate"
            );
        }
        chosen
    }

    /// Registers the candidate as the preferred alternative for `java`
    /// and `javac`, then re-probes to confirm. Registration is
    /// best-effort: the build exports `JAVA_HOME` explicitly, so a failed
    /// registration still leaves the candidate usable.
    async fn activate(&self, candidate: JdkCandidate) -> ActiveRuntime {
        let prefix = self.privilege_prefix().await;
        let priority = candidate.version.major * 100;

        for tool in ["java", "javac"] {
            let tool_path = candidate.home.join("bin").join(tool);
            let install = self.privileged(
                &prefix,
                "update-alternatives",
                &[
                    "--install",
                    &format!("/usr/bin/{}", tool),
                    tool,
                    &tool_path.to_string_lossy(),
                    &priority.to_string(),
                ],
            );
            self.run_best_effort(&install).await;

            let set = self.privileged(
                &prefix,
                "update-alternatives",
                &["--set", tool, &tool_path.to_string_lossy()],
            );
            self.run_best_effort(&set).await;
        }

        // Confirm what the probe now reports; the directory name only
        // carries the major.
        let version = match self.active_version().await {
            Some(version) if version.meets(MIN_JAVA_MAJOR) => {
                info!(%version, "activated JDK confirmed");
                version
            }
            probed => {
                warn!(
                    ?probed,
                    home = %candidate.home.display(),
                    "activation not reflected by the java probe; continuing via JAVA_HOME"
                );
                candidate.version
            }
        };

        ActiveRuntime {
            version,
            home: Some(candidate.home),
        }
    }

    /// Attempts the distro package install. Absence of apt or a failed
    /// install only warns; the caller rescans afterwards.
    async fn install_runtime(&self) {
        let prefix = self.privilege_prefix().await;

        let update = self.privileged(&prefix, "apt-get", &["update"]);
        info!(package = RUNTIME_PACKAGE, "attempting runtime package install");
        match self.runner.run_streamed(&update).await {
            Ok(0) => {}
            Ok(code) => warn!(code, "apt-get update exited nonzero"),
            Err(e) => {
                warn!(error = %e, "apt-get unavailable; skipping package install");
                return;
            }
        }

        let install = self.privileged(&prefix, "apt-get", &["install", "-y", RUNTIME_PACKAGE]);
        match self.runner.run_streamed(&install).await {
            Ok(0) => info!(package = RUNTIME_PACKAGE, "package install finished"),
            Ok(code) => warn!(code, "package install exited nonzero"),
            Err(e) => warn!(error = %e, "package install did not run"),
        }
    }

    /// `sudo` prefix for system-mutating commands when not running as
    /// root. If the uid probe fails the prefix is applied anyway and the
    /// worst case is the same warn-and-continue path.
    async fn privilege_prefix(&self) -> Vec<String> {
        let spec = CommandSpec::new("id").arg("-u");
        match self.runner.run_capture(&spec).await {
            Ok(output) if output.stdout.trim() == "0" => Vec::new(),
            _ => vec!["sudo".to_string()],
        }
    }

    fn privileged(&self, prefix: &[String], program: &str, args: &[&str]) -> CommandSpec {
        match prefix.first() {
            Some(wrapper) => CommandSpec::new(wrapper).arg(program).args(args.iter().copied()),
            None => CommandSpec::new(program).args(args.iter().copied()),
        }
    }

    async fn run_best_effort(&self, spec: &CommandSpec) {
        match self.runner.run_capture(spec).await {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(
                command = %spec.rendered(),
                code = output.exit_code,
                stderr = %output.stderr.trim(),
                "command exited nonzero"
            ),
            Err(e) => warn!(command = %spec.rendered(), error = %e, "command did not run"),
        }
    }
}

/// Extracts a version from a JDK install directory name, e.g.
/// `java-17-openjdk-amd64`, `temurin-21-jdk`, `java-1.8.0-openjdk-amd64`.
fn version_from_install_name(name: &str) -> Option<JavaVersion> {
    let re = Regex::new(r"(\d+(?:\.\d+)*)").expect("valid regex");
    let token = re.find(name)?;
    JavaVersion::parse(token.as_str()).ok()
}
