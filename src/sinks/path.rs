use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, warn};

use crate::downloader::error::DownloadError;
use crate::handler::DownloadHandler;

/// Writes a download into a file, placing every chunk at its offset.
///
/// The file is created (or truncated) on `started` and closed on the
/// terminal event.
pub struct PathSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl PathSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) -> io::Result<()> {
        match self.lock().take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }
}

impl DownloadHandler for PathSink {
    fn started(&self, size: i64) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        if size > 0 {
            file.set_len(size as u64)?;
        }
        *self.lock() = Some(file);
        Ok(())
    }

    fn updated(&self, bytes: &[u8], offset: i64, _total: i64) -> io::Result<()> {
        let offset = u64::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative offset"))?;
        let mut guard = self.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("output file is not open"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)
    }

    fn completed(&self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to flush output file");
        }
    }

    fn failed(&self, cause: DownloadError) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to flush output file");
        }
        error!(path = %self.path.display(), error = %cause, "download failed");
    }
}
