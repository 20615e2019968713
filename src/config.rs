//! Stack configuration loading
//!
//! The stack keeps its per-checkout settings in a `.env` file at the stack
//! root. This module parses that file and merges it with the inherited
//! process environment into an immutable [`StackConfig`] built once at
//! startup. Precedence follows the usual dotenv rule: a variable already
//! present in the process environment wins, the file only fills gaps.
//!
//! The ambient process environment is never mutated. Supervised services
//! receive the file-contributed variables explicitly at spawn time, so the
//! merged view they observe is the same one this process reports.
//!
//! # Recognized variables
//!
//! - `GEMINI_API_KEY`: credential for the processor's image-analysis step.
//!   Treated as a secret: reported as set/unset, never echoed. Absence is
//!   not fatal, the processor degrades its own output.
//! - `JAVA_HEADINGS_URL`: endpoint the processor calls for chapter-heading
//!   detection - default: "http://localhost:8080/get/pdf-info/detect-chapter-headings"
//!
//! # Example
//!
//! ```no_run
//! use stackup::config::StackConfig;
//! use stackup::fs::RealFileSystem;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let fs = RealFileSystem::new();
//! let config = StackConfig::from_host(&fs, Path::new(".env"))?;
//! config.log_summary();
//! # Ok(())
//! # }
//! ```

use crate::fs::FileSystem;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Secret credential consumed by the processor service.
pub const KEY_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Heading-detection endpoint the processor calls on the extractor.
pub const KEY_HEADINGS_URL: &str = "JAVA_HEADINGS_URL";

const DEFAULT_HEADINGS_URL: &str = "http://localhost:8080/get/pdf-info/detect-chapter-headings";

/// Immutable merged configuration for one run.
///
/// Constructed once before any service launches and passed by reference
/// from then on.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Variables the env file contributed that the process environment did
    /// not already define. Spawned services get these on top of their
    /// inherited environment.
    overlay: BTreeMap<String, String>,

    /// Full merged view, process environment winning over the file.
    merged: BTreeMap<String, String>,

    /// The env file that was parsed, if one existed.
    env_file: Option<PathBuf>,
}

impl StackConfig {
    /// Loads configuration from `env_file` merged under a snapshot of the
    /// current process environment.
    pub fn from_host(fs: &dyn FileSystem, env_file: &Path) -> anyhow::Result<Self> {
        let process_env: BTreeMap<String, String> = std::env::vars().collect();
        Self::load(fs, env_file, process_env)
    }

    /// Loads configuration from `env_file` merged under the given
    /// environment snapshot. Loading is pure with respect to its inputs:
    /// loading twice yields the same merged configuration.
    pub fn load(
        fs: &dyn FileSystem,
        env_file: &Path,
        process_env: BTreeMap<String, String>,
    ) -> anyhow::Result<Self> {
        let (file_vars, parsed_file) = if fs.is_file(env_file) {
            let content = fs.read_to_string(env_file)?;
            (parse_env_file(&content), Some(env_file.to_path_buf()))
        } else {
            (BTreeMap::new(), None)
        };

        let mut overlay = BTreeMap::new();
        let mut merged = process_env;
        for (key, value) in file_vars {
            if !merged.contains_key(&key) {
                merged.insert(key.clone(), value.clone());
                overlay.insert(key, value);
            }
        }

        Ok(Self {
            overlay,
            merged,
            env_file: parsed_file,
        })
    }

    /// Looks up a variable in the merged view.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.merged.get(key).map(String::as_str)
    }

    pub fn gemini_api_key(&self) -> Option<&str> {
        self.get(KEY_GEMINI_API_KEY)
    }

    pub fn headings_url(&self) -> &str {
        self.get(KEY_HEADINGS_URL).unwrap_or(DEFAULT_HEADINGS_URL)
    }

    /// Variables to hand to spawned services on top of their inherited
    /// environment. Returns only what the file contributed; inherited
    /// variables reach children natively.
    pub fn child_env(&self) -> Vec<(String, String)> {
        self.overlay
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Logs where configuration came from and the state of the recognized
    /// keys. The secret is reported by presence only.
    pub fn log_summary(&self) {
        match &self.env_file {
            Some(path) => info!(
                file = %path.display(),
                vars = self.overlay.len(),
                "loaded environment file"
            ),
            None => debug!("no environment file present"),
        }

        if self.gemini_api_key().is_some() {
            info!("GEMINI_API_KEY is set");
        } else {
            warn!("GEMINI_API_KEY is not set; image analysis will run degraded");
        }
        info!(url = %self.headings_url(), "heading service endpoint");
    }

    /// Converts the recognized settings to a display map for the run
    /// report. Secret values are masked.
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();

        map.insert(
            "env_file".to_string(),
            self.env_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string()),
        );
        map.insert(
            KEY_GEMINI_API_KEY.to_string(),
            if self.gemini_api_key().is_some() {
                "set".to_string()
            } else {
                "unset".to_string()
            },
        );
        map.insert(KEY_HEADINGS_URL.to_string(), self.headings_url().to_string());

        map
    }
}

impl fmt::Display for StackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stack Configuration:")?;
        match &self.env_file {
            Some(path) => writeln!(f, "  Env File: {}", path.display())?,
            None => writeln!(f, "  Env File: (none)")?,
        }
        writeln!(
            f,
            "  {}: {}",
            KEY_GEMINI_API_KEY,
            if self.gemini_api_key().is_some() {
                "set"
            } else {
                "unset"
            }
        )?;
        writeln!(f, "  {}: {}", KEY_HEADINGS_URL, self.headings_url())?;
        Ok(())
    }
}

/// Parses `KEY=VALUE` lines. Blank lines, `#` comments, and lines without
/// `=` are skipped. Keys and values are trimmed; one pair of surrounding
/// double quotes is stripped from the value.
fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
