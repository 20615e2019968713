//! FileSystem abstraction for testable file operations

mod mock;
mod real;

pub use mock::MockFileSystem;
pub use real::RealFileSystem;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Type of file system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// A directory entry returned by read_dir
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Abstraction over the file system operations the orchestrator needs.
///
/// Runtime discovery and stack validation walk real directories in
/// production and in-memory maps in tests.
pub trait FileSystem: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// List directory contents, sorted by name so scans are deterministic
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Canonicalize a path
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entry_accessors() {
        let entry = DirEntry {
            path: PathBuf::from("/usr/lib/jvm/java-17-openjdk-amd64"),
            name: "java-17-openjdk-amd64".to_string(),
            file_type: FileType::Directory,
        };
        assert_eq!(entry.path(), Path::new("/usr/lib/jvm/java-17-openjdk-amd64"));
        assert_eq!(entry.file_name(), "java-17-openjdk-amd64");
        assert!(entry.is_dir());
    }

    #[test]
    fn test_dir_entry_file_is_not_dir() {
        let entry = DirEntry {
            path: PathBuf::from("/stack/target/app.jar"),
            name: "app.jar".to_string(),
            file_type: FileType::File,
        };
        assert!(!entry.is_dir());
    }
}
