//! Extractor build step
//!
//! Validates that the stack root is a Maven project, runs
//! `mvn -DskipTests clean package` with the resolved runtime exported for
//! the child, and locates the single launchable jar under `target/`.
//! Zero or multiple jars is an error: the supervisor must not guess which
//! artifact to launch.

use crate::exec::{CommandRunner, CommandSpec};
use crate::fs::FileSystem;
use crate::runtime::ActiveRuntime;
use roxmltree::Document;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("stack root {} is not a Maven project (no pom.xml)", .0.display())]
    NotAMavenProject(PathBuf),

    #[error("failed to parse pom.xml: {0}")]
    InvalidPom(String),

    #[error(transparent)]
    MavenUnavailable(#[from] crate::exec::ExecError),

    #[error("maven build failed with exit code {0}")]
    BuildFailed(i32),

    #[error("no launchable jar under {} after build", .0.display())]
    ArtifactMissing(PathBuf),

    #[error(
        "multiple launchable jars under {}: {}; refusing to guess",
        .dir.display(),
        .names.join(", ")
    )]
    ArtifactAmbiguous { dir: PathBuf, names: Vec<String> },
}

pub struct BuildManager<'a> {
    fs: &'a dyn FileSystem,
    runner: &'a dyn CommandRunner,
    stack_root: PathBuf,
}

impl<'a> BuildManager<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        runner: &'a dyn CommandRunner,
        stack_root: impl AsRef<Path>,
    ) -> Self {
        Self {
            fs,
            runner,
            stack_root: stack_root.as_ref().to_path_buf(),
        }
    }

    /// Builds the extractor and returns the path to its jar.
    ///
    /// Taking [`ActiveRuntime`] by reference means a caller holding an
    /// unresolved runtime cannot reach this step at all.
    pub async fn build(&self, runtime: &ActiveRuntime) -> Result<PathBuf, BuildError> {
        self.validate_project()?;

        let mut spec = CommandSpec::new("mvn")
            .args(["-DskipTests", "clean", "package"])
            .cwd(&self.stack_root);

        if let Some(home) = &runtime.home {
            spec = spec
                .env("JAVA_HOME", home.to_string_lossy())
                .env("PATH", prepend_to_path(&home.join("bin")));
        }

        info!(
            root = %self.stack_root.display(),
            java = %runtime.version,
            "building extractor with maven"
        );
        let code = self.runner.run_streamed(&spec).await?;
        if code != 0 {
            return Err(BuildError::BuildFailed(code));
        }

        self.locate_artifact()
    }

    /// Requires a parseable pom.xml at the stack root. The artifact id is
    /// only informational; Maven resolves the effective model itself.
    fn validate_project(&self) -> Result<(), BuildError> {
        let pom_path = self.stack_root.join("pom.xml");
        if !self.fs.is_file(&pom_path) {
            return Err(BuildError::NotAMavenProject(self.stack_root.clone()));
        }

        let content = self
            .fs
            .read_to_string(&pom_path)
            .map_err(|e| BuildError::InvalidPom(e.to_string()))?;
        let doc = Document::parse(&content).map_err(|e| BuildError::InvalidPom(e.to_string()))?;

        // Only direct children of <project>; nested artifactIds belong to
        // dependencies and plugins.
        let mut artifact_id = None;
        for child in doc.root_element().children() {
            if child.has_tag_name("artifactId") && artifact_id.is_none() {
                artifact_id = child.text().map(|s| s.trim().to_string());
            }
        }

        match artifact_id {
            Some(id) => info!(artifact = %id, "validated Maven project"),
            None => debug!("pom.xml has no top-level artifactId"),
        }
        Ok(())
    }

    /// Exactly one `*.jar` must exist under `target/`. Spring Boot's
    /// repackaging leftover (`*.jar.original`) does not count.
    fn locate_artifact(&self) -> Result<PathBuf, BuildError> {
        let target_dir = self.stack_root.join("target");
        let entries = self
            .fs
            .read_dir(&target_dir)
            .map_err(|_| BuildError::ArtifactMissing(target_dir.clone()))?;

        let jars: Vec<_> = entries
            .into_iter()
            .filter(|e| !e.is_dir() && e.file_name().ends_with(".jar"))
            .collect();

        match jars.as_slice() {
            [] => Err(BuildError::ArtifactMissing(target_dir)),
            [jar] => {
                info!(jar = %jar.path().display(), "located build artifact");
                Ok(jar.path().to_path_buf())
            }
            many => Err(BuildError::ArtifactAmbiguous {
                dir: target_dir,
                names: many.iter().map(|e| e.file_name().to_string()).collect(),
            }),
        }
    }
}

fn prepend_to_path(dir: &Path) -> String {
    match std::env::var("PATH") {
        Ok(path) if !path.is_empty() => format!("{}:{}", dir.display(), path),
        _ => dir.display().to_string(),
    }
}
