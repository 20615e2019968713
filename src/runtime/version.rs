//! Java version string parsing
//!
//! `java -version` reports its version on stderr in one of two schemes:
//! the modern `openjdk version "17.0.1"` form and the legacy
//! `java version "1.8.0_292"` form where the feature release hides in the
//! second component. Field-splitting that text is how orchestration scripts
//! usually get this wrong; [`JavaVersion`] parses both schemes into a typed
//! value with a typed failure.

use regex::Regex;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("no version token in java output")]
    TokenNotFound,

    #[error("malformed java version string: {0:?}")]
    Malformed(String),
}

/// A parsed Java version, normalized so `major` is always the feature
/// release (legacy `1.8.0_292` parses as major 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JavaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl JavaVersion {
    /// Parses a bare version string: `"17.0.1"`, `"21"`, `"1.8.0_292"`.
    /// Trailing build metadata (`_292`, `+35`, `-ea`) is ignored.
    pub fn parse(value: &str) -> Result<Self, VersionError> {
        let re = Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid regex");
        let caps = re
            .captures(value.trim())
            .ok_or_else(|| VersionError::Malformed(value.to_string()))?;

        let component = |index: usize| -> u32 {
            caps.get(index)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        let major = component(1);
        let minor = component(2);
        let patch = component(3);

        if major == 0 {
            return Err(VersionError::Malformed(value.to_string()));
        }

        // Legacy scheme: 1.x.y means feature release x.
        if major == 1 && caps.get(2).is_some() {
            if minor == 0 {
                return Err(VersionError::Malformed(value.to_string()));
            }
            return Ok(Self {
                major: minor,
                minor: patch,
                patch: 0,
            });
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// Extracts the quoted version from full `java -version` output.
    /// Callers pass stderr (optionally with stdout appended); the version
    /// line goes to stderr on every JDK that matters here.
    pub fn from_java_output(output: &str) -> Result<Self, VersionError> {
        let re = Regex::new(r#"version\s+"([^"]+)""#).expect("valid regex");
        let caps = re.captures(output).ok_or(VersionError::TokenNotFound)?;
        Self::parse(&caps[1])
    }

    pub fn meets(&self, minimum_major: u32) -> bool {
        self.major >= minimum_major
    }
}

impl fmt::Display for JavaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
