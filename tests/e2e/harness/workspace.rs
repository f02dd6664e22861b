use anyhow::{Context, Result};
use privmap_core::Store;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated scratch space: a host tree to collect from and a staging directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        fs::create_dir_all(dir.path().join("host"))?;
        fs::create_dir_all(dir.path().join("staging"))?;
        Ok(Self { dir })
    }

    /// Workspace root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Root of the fake host filesystem
    pub fn host_root(&self) -> PathBuf {
        self.path().join("host")
    }

    /// Staging directory
    pub fn staging_dir(&self) -> PathBuf {
        self.path().join("staging")
    }

    /// Write a file under the host root, creating parents
    pub fn write_host_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.host_root().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }
        fs::write(&full_path, content)
            .with_context(|| format!("Failed to write file: {}", path))?;
        Ok(())
    }

    /// Append raw bytes to a staging store, bypassing the writer
    pub fn append_raw(&self, store: Store, bytes: &[u8]) -> Result<()> {
        let path = self.staging_dir().join(store.file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(bytes)?;
        Ok(())
    }
}
