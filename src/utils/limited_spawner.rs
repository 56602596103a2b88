use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Spawns tasks onto the current runtime, optionally capping how many run
/// their body at once.
///
/// The permit is taken inside the spawned task, so `spawn` never waits.
#[derive(Debug, Clone)]
pub struct LimitedSpawner {
    semaphore: Option<Arc<Semaphore>>,
}

impl LimitedSpawner {
    /// `None` or `Some(0)` means no limit.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            semaphore: max_concurrent
                .filter(|n| *n > 0)
                .map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    pub fn spawn<F>(&self, f: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            // the semaphore is never closed, so a failed acquire just runs unthrottled
            let _permit = match semaphore {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            f.await
        })
    }
}
