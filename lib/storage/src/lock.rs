use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = ".fraudx.lock";

/// Exclusive claim on a data directory, released on drop.
///
/// A server holds it for its lifetime so that an offline `fit` cannot
/// rewrite the case log underneath it.
#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
}

impl DataDirLock {
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let path = data_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                debug!(path = %path.display(), "Acquired data directory lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default();
                bail!(
                    "data directory {} is in use by process {}; remove {} if that process is gone",
                    data_dir.display(),
                    owner.trim(),
                    path.display()
                )
            }
            Err(e) => Err(e).with_context(|| format!("creating lock file {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to release data directory lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = TempDir::new().unwrap();
        let lock = DataDirLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());

        let err = DataDirLock::acquire(dir.path()).unwrap_err();
        assert!(err.to_string().contains("in use by process"));

        drop(lock);
        assert!(DataDirLock::acquire(dir.path()).is_ok());
    }
}
