use anyhow::{anyhow, Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use fraudx_core::StoredCase;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Byte sink under a [`CaseLog`].
///
/// Besides appending, the log needs to make writes durable and to cut a
/// failed write back off the end.
pub trait LogFile: Write + Send {
    fn size(&mut self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append-only log of stored cases, one JSON document per line.
///
/// Every append is written as one line and synced before it returns, so a
/// case that was acknowledged survives a crash. A failed append is cut back
/// off the file, so it never leaves a partial line for the next append to
/// land after. Replay rebuilds the in-memory store.
pub struct CaseLog<F: LogFile = File> {
    file: Mutex<F>,
    path: PathBuf,
}

impl CaseLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening case log {}", path.display()))?;

        Ok(Self::with_file(file, path))
    }

    /// Every case in the log, in append order.
    ///
    /// A torn final line from an interrupted append is skipped; corruption
    /// anywhere else is an error.
    pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<StoredCase>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
        let last = lines.len().saturating_sub(1);

        let mut cases = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredCase>(line) {
                Ok(case) => cases.push(case),
                Err(e) if i == last => {
                    warn!(line = i + 1, error = %e, "Skipping torn case log entry");
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("corrupt case log {} at line {}", path.display(), i + 1)
                    });
                }
            }
        }
        Ok(cases)
    }

    /// Replace the whole log atomically.
    ///
    /// Open handles keep pointing at the replaced file, so callers must
    /// reopen their log afterwards.
    pub fn rewrite<P: AsRef<Path>>(path: P, cases: &[StoredCase]) -> Result<()> {
        let path = path.as_ref();
        let mut buf = Vec::new();
        for case in cases {
            serde_json::to_writer(&mut buf, case)?;
            buf.push(b'\n');
        }
        AtomicFile::new(path, AllowOverwrite)
            .write(|f| f.write_all(&buf))
            .map_err(|e| anyhow!("Failed to rewrite case log {}: {}", path.display(), e))?;
        Ok(())
    }
}

impl<F: LogFile> CaseLog<F> {
    pub fn with_file(file: F, path: PathBuf) -> Self {
        Self {
            file: Mutex::new(file),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, case: &StoredCase) -> Result<()> {
        let mut line = serde_json::to_vec(case)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        let start = file.size()?;
        if let Err(e) = write_synced(&mut *file, &line) {
            if let Err(cut) = file.truncate(start) {
                error!(
                    path = %self.path.display(),
                    error = %cut,
                    "Failed to roll back partial case log entry"
                );
            }
            return Err(e)
                .with_context(|| format!("appending to case log {}", self.path.display()));
        }

        debug!(merchant_id = %case.merchant_id, "Appended case to log");
        Ok(())
    }
}

fn write_synced<F: LogFile>(file: &mut F, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.flush()?;
    file.sync()
}
