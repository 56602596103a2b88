use std::sync::Arc;
use std::sync::atomic::AtomicI64;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use reqwest::header::ACCEPT_RANGES;
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::downloader::config::DownloadConfig;
use crate::downloader::error::DownloadError;
use crate::downloader::executor::{self, FetchContext};
use crate::downloader::planer::{self, TransferMode};
use crate::handler::DownloadHandler;
use crate::utils::limited_spawner::LimitedSpawner;

/// What the first response told us about the resource.
struct Probe {
    client: Client,
    response: Response,
    size: i64,
    accepts_ranges: bool,
}

/// Drives one download from probe to its terminal event.
pub(crate) struct Coordinator {
    url: String,
    config: DownloadConfig,
    handler: Arc<dyn DownloadHandler>,
}

impl Coordinator {
    pub fn new(url: String, config: DownloadConfig, handler: Arc<dyn DownloadHandler>) -> Self {
        Self {
            url,
            config,
            handler,
        }
    }

    /// Runs the download and delivers exactly one of `completed`/`failed`.
    pub async fn run(self) {
        match self.transfer().await {
            Ok(()) => {
                info!(url = %self.url, "download completed");
                self.handler.completed();
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "download failed");
                self.handler.failed(err);
            }
        }
    }

    async fn transfer(&self) -> Result<(), DownloadError> {
        let cancel = CancellationToken::new();
        let probe = self.probe(&cancel).await;

        // started fires even when the probe failed, so failed is never first
        let size = probe.as_ref().map_or(-1, |p| p.size);
        self.handler.started(size).map_err(DownloadError::Sink)?;
        let Probe {
            client,
            response,
            size,
            accepts_ranges,
        } = probe?;

        let plan = planer::select(
            size,
            accepts_ranges,
            self.config.buffer_size as u64,
            self.config.force_contiguous,
        );
        info!(
            url = %self.url,
            size,
            accepts_ranges,
            segmented = plan.is_segmented(),
            tasks = plan.task_count(),
            "download started"
        );

        let ctx = Arc::new(FetchContext {
            url: self.url.clone(),
            client,
            buffer_size: self.config.buffer_size,
            handler: Arc::clone(&self.handler),
            total: AtomicI64::new(0),
            cancel,
        });
        let spawner = LimitedSpawner::new(self.config.max_concurrent_fetches);

        match plan.mode {
            TransferMode::Contiguous => {
                let expected = u64::try_from(size).ok();
                let task_ctx = Arc::clone(&ctx);
                spawner
                    .spawn(async move {
                        executor::stream(&task_ctx, response, 0, expected)
                            .await
                            .map(|_| ())
                    })
                    .await?
            }
            TransferMode::Segmented { .. } => {
                // segments each open their own ranged connection
                drop(response);
                self.fetch_segments(&ctx, &spawner, plan.segments()).await
            }
        }
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<Probe, DownloadError> {
        let client = self
            .config
            .build_client()
            .map_err(|source| DownloadError::Connection {
                url: self.url.clone(),
                source,
            })?;
        let response = executor::open(&client, &self.url, None, cancel).await?;

        let size = response
            .content_length()
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(-1);
        let accepts_ranges = response
            .headers()
            .get_all(ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        debug!(url = %self.url, size, accepts_ranges, "probed resource");

        Ok(Probe {
            client,
            response,
            size,
            accepts_ranges,
        })
    }

    /// Runs every segment on the pool and waits for all of them. The first
    /// error observed wins and cancels the rest; later errors are logged.
    async fn fetch_segments(
        &self,
        ctx: &Arc<FetchContext>,
        spawner: &LimitedSpawner,
        segments: Vec<planer::Segment>,
    ) -> Result<(), DownloadError> {
        let mut tasks = segments
            .into_iter()
            .map(|segment| spawner.spawn(executor::fetch_segment(Arc::clone(ctx), segment)))
            .collect::<FuturesUnordered<_>>();

        let mut first_error: Option<DownloadError> = None;
        while let Some(joined) = tasks.next().await {
            let Err(err) = joined.map_err(DownloadError::from).and_then(|r| r) else {
                continue;
            };
            if first_error.is_none() {
                ctx.cancel.cancel();
                first_error = Some(err);
            } else if !err.is_cancelled() {
                warn!(url = %self.url, error = %err, "dropping error from sibling segment");
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
