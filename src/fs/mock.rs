use super::{DirEntry, FileSystem, FileType};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone)]
enum MockEntry {
    File(String),
    Dir,
}

/// In-memory file system for resolver and build tests.
///
/// Parent directories are created implicitly, mirroring how fixtures are
/// laid out on a real host.
pub struct MockFileSystem {
    entries: RwLock<BTreeMap<PathBuf, MockEntry>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.entries.write().unwrap();

        if let Some(parent) = path.parent() {
            Self::ensure_parents(&mut entries, parent);
        }

        entries.insert(path, MockEntry::File(content.to_string()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.entries.write().unwrap();

        Self::ensure_parents(&mut entries, &path);
        entries.insert(path, MockEntry::Dir);
    }

    fn ensure_parents(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            entries.entry(current.clone()).or_insert(MockEntry::Dir);
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.entries.read().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.entries.read().unwrap().get(path),
            Some(MockEntry::Dir)
        )
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(
            self.entries.read().unwrap().get(path),
            Some(MockEntry::File(_))
        )
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.entries.read().unwrap().get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir) => Err(anyhow!("Not a file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let entries = self.entries.read().unwrap();

        if !matches!(entries.get(path), Some(MockEntry::Dir)) {
            return Err(anyhow!("Directory not found: {:?}", path));
        }

        // BTreeMap iteration keeps entries name-sorted, matching the
        // ordering contract of the real implementation.
        let mut result = Vec::new();
        for (entry_path, entry) in entries.iter() {
            if entry_path.parent() == Some(path) {
                let name = entry_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("")
                    .to_string();

                result.push(DirEntry {
                    path: entry_path.clone(),
                    name,
                    file_type: match entry {
                        MockEntry::File(_) => FileType::File,
                        MockEntry::Dir => FileType::Directory,
                    },
                });
            }
        }

        Ok(result)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        if self.entries.read().unwrap().contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("Path not found: {:?}", path))
        }
    }
}
