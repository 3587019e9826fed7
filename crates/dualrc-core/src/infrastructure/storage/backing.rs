//! Where a store's bytes live.
//!
//! [`Backing`] is the seam between the store and the file system: the store
//! only ever reads the whole file or writes the whole file.  Unit tests swap
//! in a mock to count reads or force write failures.

use std::path::PathBuf;

use async_trait::async_trait;

use super::StorageError;

/// Whole-file read/write access to a config location.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backing: Send + Sync {
    /// Path reported in log messages and errors.
    fn location(&self) -> PathBuf;

    /// Reads the full contents; `Ok(None)` when nothing exists yet.
    async fn read(&self) -> Result<Option<String>, StorageError>;

    /// Replaces the full contents.
    async fn write(&self, contents: String) -> Result<(), StorageError>;
}

/// A config file on the local file system.
#[derive(Debug, Clone)]
pub struct FileBacking {
    path: PathBuf,
}

impl FileBacking {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Backing for FileBacking {
    fn location(&self) -> PathBuf {
        self.path.clone()
    }

    /// Invalid UTF-8 is decoded lossily so the text around it survives.
    async fn read(&self) -> Result<Option<String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write(&self, contents: String) -> Result<(), StorageError> {
        // A bare file name has an empty parent; nothing to create then.
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dualrc_backing_{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let backing = FileBacking::new(temp_dir().join("absent.rc"));
        let content = backing.read().await.expect("missing file is not an error");
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs_and_reads_back() {
        // Arrange
        let dir = temp_dir();
        let backing = FileBacking::new(dir.join("nested").join("config.rc"));

        // Act
        backing.write("{\"a\": 1}".to_string()).await.unwrap();
        let content = backing.read().await.unwrap();

        // Assert
        assert_eq!(content.as_deref(), Some("{\"a\": 1}"));

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_read_decodes_invalid_utf8_lossily() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("latin1.rc");
        std::fs::write(&path, b"// caf\xE9\nlet x = 1;\n").unwrap();

        let content = FileBacking::new(&path).read().await.unwrap().unwrap();

        assert_eq!(content, "// caf\u{FFFD}\nlet x = 1;\n");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_read_directory_is_io_error_with_path() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let backing = FileBacking::new(&dir);

        let err = backing.read().await.expect_err("a directory is not a file");
        assert!(err.to_string().contains(&dir.display().to_string()));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_location_is_the_configured_path() {
        let backing = FileBacking::new("/tmp/x.rc");
        assert_eq!(backing.location(), PathBuf::from("/tmp/x.rc"));
    }
}
