use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tracing::{error, info};

use crate::downloader::error::DownloadError;
use crate::handler::DownloadHandler;
use crate::sinks::PathSink;

const BUFFER_SIZE: usize = 64 * 1024;

/// A [`PathSink`] that checks the finished file against an MD5 digest.
pub struct Md5CheckedSink {
    inner: PathSink,
    expected: String,
    verdict: Mutex<Option<bool>>,
}

impl Md5CheckedSink {
    pub fn new(inner: PathSink, expected: impl Into<String>) -> Self {
        Self {
            inner,
            expected: expected.into().trim().to_ascii_lowercase(),
            verdict: Mutex::new(None),
        }
    }

    /// `None` until the download completed, then whether the digest matched.
    pub fn verdict(&self) -> Option<bool> {
        *self.verdict.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_verdict(&self, matched: bool) {
        *self.verdict.lock().unwrap_or_else(PoisonError::into_inner) = Some(matched);
    }
}

fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0; BUFFER_SIZE];
    let mut ctx = md5::Context::new();
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

impl DownloadHandler for Md5CheckedSink {
    fn started(&self, size: i64) -> io::Result<()> {
        self.inner.started(size)
    }

    fn updated(&self, bytes: &[u8], offset: i64, total: i64) -> io::Result<()> {
        self.inner.updated(bytes, offset, total)
    }

    fn completed(&self) {
        self.inner.completed();
        let path = self.inner.path();
        match file_md5(path) {
            Ok(actual) if actual == self.expected => {
                info!(path = %path.display(), md5 = %actual, "checksum verified");
                self.set_verdict(true);
            }
            Ok(actual) => {
                error!(path = %path.display(), expected = %self.expected, actual = %actual, "checksum mismatch");
                self.set_verdict(false);
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "could not hash downloaded file");
                self.set_verdict(false);
            }
        }
    }

    fn failed(&self, cause: DownloadError) {
        self.inner.failed(cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_through(sink: &Md5CheckedSink, data: &[u8]) {
        sink.started(data.len() as i64).unwrap();
        sink.updated(data, 0, data.len() as i64).unwrap();
        sink.completed();
    }

    #[test]
    fn test_matching_digest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Md5CheckedSink::new(
            PathSink::new(dir.path().join("hello.txt")),
            "5EB63BBBE01EEED093CB22BB8F5ACDC3\n",
        );
        assert_eq!(sink.verdict(), None);
        write_through(&sink, b"hello world");
        assert_eq!(sink.verdict(), Some(true));
    }

    #[test]
    fn test_mismatching_digest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Md5CheckedSink::new(
            PathSink::new(dir.path().join("hello.txt")),
            "00000000000000000000000000000000",
        );
        write_through(&sink, b"hello world");
        assert_eq!(sink.verdict(), Some(false));
    }

    #[test]
    fn test_failed_download_has_no_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Md5CheckedSink::new(PathSink::new(dir.path().join("x")), "abc");
        sink.started(-1).unwrap();
        sink.failed(DownloadError::Cancelled);
        assert_eq!(sink.verdict(), None);
    }
}
