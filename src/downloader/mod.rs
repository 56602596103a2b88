pub mod config;
mod coordinator;
pub mod error;
mod executor;
pub mod planer;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::handler::DownloadHandler;
use config::{DEFAULT_BUFFER_SIZE, DownloadConfig, ProxyAddr};
use coordinator::Coordinator;
use error::{ConfigError, SystemError};

/// Runs downloads on a shared worker pool.
///
/// Settings changed through the setters apply to downloads added afterwards;
/// each download keeps the settings that were current when it was added.
/// `drain` must be called from outside the pool's runtime, and the system
/// must not be dropped from inside an async context.
pub struct DownloadSystem {
    runtime: Runtime,
    defaults: Mutex<DownloadConfig>,
    pending: Mutex<VecDeque<JoinHandle<()>>>,
}

impl DownloadSystem {
    pub fn new() -> Result<Self, SystemError> {
        Self::with_config(DownloadConfig::default())
    }

    pub fn with_config(config: DownloadConfig) -> Result<Self, SystemError> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("dlsys-worker")
            .build()?;
        Ok(Self {
            runtime,
            defaults: Mutex::new(config),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    /// Queues a download of `url` and returns without waiting for it.
    pub fn add_download(
        &self,
        url: impl Into<String>,
        handler: Arc<dyn DownloadHandler>,
    ) -> &Self {
        let url = url.into();
        let config = self.defaults();
        debug!(url = %url, buffer_size = config.buffer_size, proxy = ?config.proxy, "queueing download");

        let coordinator = Coordinator::new(url, config, handler);
        let handle = self.runtime.spawn(coordinator.run());
        self.lock_pending().push_back(handle);
        self
    }

    pub fn set_proxy(&self, proxy: Option<ProxyAddr>) -> &Self {
        self.lock_defaults().proxy = proxy;
        self
    }

    pub fn no_proxy(&self) -> &Self {
        self.set_proxy(None)
    }

    /// Sets the read buffer size, which is also the segment size.
    pub fn set_buffer_size(&self, buffer_size: usize) -> Result<&Self, ConfigError> {
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        self.lock_defaults().buffer_size = buffer_size;
        Ok(self)
    }

    pub fn default_buffer_size(&self) -> &Self {
        self.lock_defaults().buffer_size = DEFAULT_BUFFER_SIZE;
        self
    }

    /// Read every download over a single connection.
    pub fn force_contiguous(&self) -> &Self {
        self.lock_defaults().force_contiguous = true;
        self
    }

    /// Split downloads into ranged segments when the server allows it.
    pub fn allow_segmented(&self) -> &Self {
        self.lock_defaults().force_contiguous = false;
        self
    }

    pub fn set_max_concurrent_fetches(&self, limit: Option<usize>) -> &Self {
        self.lock_defaults().max_concurrent_fetches = limit;
        self
    }

    /// A copy of the settings the next added download will use.
    pub fn defaults(&self) -> DownloadConfig {
        self.lock_defaults().clone()
    }

    /// Number of downloads not yet collected by `drain`.
    pub fn pending(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Blocks until every queued download has finished, including ones added
    /// while draining. Outcomes were already delivered to the handlers, so
    /// task failures are only logged here.
    #[doc(alias = "run")]
    pub fn drain(&self) {
        while let Some(handle) = self.pop_pending() {
            if let Err(err) = self.runtime.block_on(handle) {
                debug!(error = %err, "download task ended abnormally");
            }
        }
    }

    fn pop_pending(&self) -> Option<JoinHandle<()>> {
        self.lock_pending().pop_front()
    }

    fn lock_defaults(&self) -> MutexGuard<'_, DownloadConfig> {
        self.defaults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
