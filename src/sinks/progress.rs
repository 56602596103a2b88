use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::downloader::error::DownloadError;
use crate::handler::DownloadHandler;

/// How a download ended, as seen by a [`ProgressSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

/// Logs progress in 10% steps and remembers the outcome, forwarding every
/// event to `inner`.
pub struct ProgressSink {
    name: String,
    inner: Arc<dyn DownloadHandler>,
    size: AtomicI64,
    reported_step: AtomicI64,
    outcome: Mutex<Option<Outcome>>,
}

impl ProgressSink {
    pub fn new(name: impl Into<String>, inner: Arc<dyn DownloadHandler>) -> Self {
        Self {
            name: name.into(),
            inner,
            size: AtomicI64::new(-1),
            reported_step: AtomicI64::new(0),
            outcome: Mutex::new(None),
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish(&self, outcome: Outcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}

impl DownloadHandler for ProgressSink {
    fn started(&self, size: i64) -> io::Result<()> {
        self.size.store(size, Ordering::SeqCst);
        if size >= 0 {
            info!(name = %self.name, "starting download, size is {:.1}KB", size as f64 / 1024.0);
        } else {
            info!(name = %self.name, "starting download of unknown size");
        }
        self.inner.started(size)
    }

    fn updated(&self, bytes: &[u8], offset: i64, total: i64) -> io::Result<()> {
        self.inner.updated(bytes, offset, total)?;

        let size = self.size.load(Ordering::SeqCst);
        if size > 0 {
            let step = total.saturating_mul(10) / size;
            // several workers may cross a step at once; only one logs it
            if self.reported_step.fetch_max(step, Ordering::SeqCst) < step {
                info!(
                    name = %self.name,
                    "{:3}% complete ({:.1}KB / {:.1}KB)",
                    step * 10,
                    total as f64 / 1024.0,
                    size as f64 / 1024.0
                );
            }
        }
        Ok(())
    }

    fn completed(&self) {
        info!(name = %self.name, "download completed");
        self.inner.completed();
        self.finish(Outcome::Completed);
    }

    fn failed(&self, error: DownloadError) {
        let message = error.to_string();
        self.inner.failed(error);
        self.finish(Outcome::Failed(message));
    }
}
