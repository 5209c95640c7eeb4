//! Scoped temporary directories for byte-buffer transcoding.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{MediaError, MediaResult};

/// A private working directory removed when dropped.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new() -> MediaResult<Self> {
        let dir = tempfile::Builder::new().prefix("shortify-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `bytes` to `name` inside the directory.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> MediaResult<PathBuf> {
        let path = self.file(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read a produced file, failing if it is missing or empty.
    pub async fn read_output(&self, path: &Path) -> MediaResult<Vec<u8>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::EmptyOutput(format!(
                    "{} was not created",
                    display_name(path)
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Err(MediaError::EmptyOutput(format!(
                "{} is empty",
                display_name(path)
            )));
        }
        Ok(bytes)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
