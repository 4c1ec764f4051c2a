//! Storage backends the record store persists through.
//!
//! The store only ever needs whole-file reads and whole-file writes by name,
//! so that is the entire contract. `DirStorage` keeps one file per collection
//! in a directory; `MemoryStorage` keeps them in a map (tests, and the
//! degraded no-storage mode at boot).

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait Storage: Send + Sync {
    /// Short backend name for diagnostics (`directory`, `memory`).
    fn kind(&self) -> &'static str;

    /// Where the files live, for diagnostics.
    fn location(&self) -> String;

    /// Read a whole file. `Ok(None)` when it does not exist.
    fn read(&self, name: &str) -> io::Result<Option<String>>;

    /// Replace a whole file.
    fn write(&self, name: &str, contents: &str) -> io::Result<()>;

    /// Names of the files currently stored, sorted.
    fn list(&self) -> io::Result<Vec<String>>;
}

// ═══════════════════════════════════════════════════════════
// DirStorage
// ═══════════════════════════════════════════════════════════

/// One file per collection inside a root directory.
#[derive(Debug)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Open (creating if needed) the storage directory.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::info!(path = %root.display(), "Directory storage ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage file name: {name}"),
            ));
        }
        Ok(self.root.join(name))
    }
}

impl Storage for DirStorage {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn read(&self, name: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(name)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write to a sibling temp file, then rename over the target so a crash
    /// mid-write leaves the previous version intact.
    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        let target = self.path_for(name)?;
        let staging = self.root.join(format!(".{name}.tmp"));
        let staged = std::fs::write(&staging, contents)
            .and_then(|()| std::fs::rename(&staging, &target));
        if staged.is_err() {
            let _ = std::fs::remove_file(&staging);
        }
        staged
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

// ═══════════════════════════════════════════════════════════
// MemoryStorage
// ═══════════════════════════════════════════════════════════

/// Files held in memory only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.files
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn location(&self) -> String {
        "in-memory".into()
    }

    fn read(&self, name: &str) -> io::Result<Option<String>> {
        Ok(self.files()?.get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        self.files()?.insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = self.files()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_storage_round_trips_files() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DirStorage::open(tmp.path().join("data")).unwrap();

        assert_eq!(storage.read("users.csv").unwrap(), None);
        storage.write("users.csv", "UserID\n1\n").unwrap();
        assert_eq!(storage.read("users.csv").unwrap().as_deref(), Some("UserID\n1\n"));

        storage.write("users.csv", "UserID\n").unwrap();
        assert_eq!(storage.read("users.csv").unwrap().as_deref(), Some("UserID\n"));
        assert_eq!(storage.list().unwrap(), vec!["users.csv".to_string()]);
    }

    #[test]
    fn dir_storage_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DirStorage::open(tmp.path()).unwrap();
        assert!(storage.write("../escape.csv", "x").is_err());
        assert!(storage.read("nested/file.csv").is_err());
    }

    #[test]
    fn failed_rename_leaves_no_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DirStorage::open(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("users.csv")).unwrap();

        assert!(storage.write("users.csv", "UserID\n").is_err());
        assert!(!tmp.path().join(".users.csv.tmp").exists());
    }

    #[test]
    fn memory_storage_round_trips_files() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("a.csv").unwrap(), None);
        storage.write("b.csv", "2").unwrap();
        storage.write("a.csv", "1").unwrap();
        assert_eq!(storage.read("a.csv").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.list().unwrap(), vec!["a.csv".to_string(), "b.csv".to_string()]);
        assert_eq!(storage.kind(), "memory");
    }
}
