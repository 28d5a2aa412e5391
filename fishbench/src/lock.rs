use crate::error::Error;
use crate::error::Result;
use std::fs::remove_file;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use tracing::warn;

/// Marker file held for as long as this value is alive. Removed on drop, which includes unwinding; only a killed process leaks one.
#[derive(Debug)]
pub struct LockFile {
  path: PathBuf,
}

impl LockFile {
  /// Returns `None` if someone else already holds the lock (or leaked it).
  pub fn acquire(path: &Path) -> Result<Option<LockFile>> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
      Ok(file) => file,
      Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(None),
      Err(source) => {
        return Err(Error::Io {
          path: path.to_path_buf(),
          source,
        })
      }
    };
    let lock = LockFile {
      path: path.to_path_buf(),
    };
    // Informational only, for whoever finds a leaked lock.
    writeln!(file, "{}", process::id()).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Some(lock))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for LockFile {
  fn drop(&mut self) {
    if let Err(err) = remove_file(&self.path) {
      warn!(path = %self.path.display(), error = %err, "failed to release lock");
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_lock_is_exclusive_and_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c2-standard-8.lock");

    let lock = LockFile::acquire(&path).unwrap().expect("lock is free");
    assert!(path.exists());
    assert_eq!(lock.path(), path);
    assert!(LockFile::acquire(&path).unwrap().is_none());

    drop(lock);
    assert!(!path.exists());
    assert!(LockFile::acquire(&path).unwrap().is_some());
  }

  #[test]
  fn test_missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = LockFile::acquire(&dir.path().join("nope/x.lock")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
  }
}
