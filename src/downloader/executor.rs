use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::downloader::error::DownloadError;
use crate::downloader::planer::Segment;
use crate::handler::DownloadHandler;

/// State shared by every fetch task of one download.
pub(crate) struct FetchContext {
    pub url: String,
    pub client: Client,
    pub buffer_size: usize,
    pub handler: Arc<dyn DownloadHandler>,
    /// Bytes received so far across all segments.
    pub total: AtomicI64,
    pub cancel: CancellationToken,
}

/// Sends one GET, ranged when `segment` is given, and checks the status.
pub(crate) async fn open(
    client: &Client,
    url: &str,
    segment: Option<&Segment>,
    cancel: &CancellationToken,
) -> Result<Response, DownloadError> {
    let mut request = client.get(url);
    if let Some(segment) = segment {
        request = request.header(RANGE, segment.range_header());
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        sent = request.send() => sent.map_err(|source| DownloadError::Connection {
            url: url.to_string(),
            source,
        })?,
    };

    let status = response.status();
    match segment {
        Some(segment) if status != StatusCode::PARTIAL_CONTENT => Err(DownloadError::protocol(
            url,
            format!(
                "expected 206 Partial Content for {}, got {}",
                segment.range_header(),
                status
            ),
        )),
        Some(segment) => match content_range(&response) {
            Some(range) if range == (segment.start, segment.end()) => Ok(response),
            other => Err(DownloadError::protocol(
                url,
                format!(
                    "asked for {}, server sent range {:?}",
                    segment.range_header(),
                    other
                ),
            )),
        },
        None if !status.is_success() => {
            Err(DownloadError::protocol(url, format!("status {}", status)))
        }
        None => Ok(response),
    }
}

/// First and last byte of a `Content-Range: bytes a-b/total` header.
fn content_range(response: &Response) -> Option<(u64, u64)> {
    let value = response.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    let (range, _total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
    let (first, last) = range.split_once('-')?;
    Some((first.trim().parse().ok()?, last.trim().parse().ok()?))
}

/// Reads `response` to the end, reporting every piece of at most
/// `buffer_size` bytes at its absolute offset. Returns the bytes read.
///
/// With `expected` set the body must be exactly that long.
pub(crate) async fn stream(
    ctx: &FetchContext,
    mut response: Response,
    start: u64,
    expected: Option<u64>,
) -> Result<u64, DownloadError> {
    let mut read: u64 = 0;

    loop {
        let chunk: Option<Bytes> = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
            chunk = response.chunk() => chunk.map_err(DownloadError::from_body)?,
        };
        let Some(mut chunk) = chunk else {
            break;
        };

        while !chunk.is_empty() {
            let piece = chunk.split_to(chunk.len().min(ctx.buffer_size));
            let len = piece.len() as u64;
            if let Some(limit) = expected {
                if read + len > limit {
                    return Err(DownloadError::protocol(
                        &ctx.url,
                        format!("body at offset {} longer than {} bytes", start, limit),
                    ));
                }
            }
            if ctx.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let total = ctx.total.fetch_add(len as i64, Ordering::SeqCst) + len as i64;
            ctx.handler
                .updated(&piece, (start + read) as i64, total)
                .map_err(DownloadError::Sink)?;
            read += len;
        }
    }

    if let Some(expected) = expected {
        if read < expected {
            return Err(DownloadError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "body at offset {} ended after {} of {} bytes",
                    start, read, expected
                ),
            )));
        }
    }
    Ok(read)
}

/// Fetches one segment over its own connection.
pub(crate) async fn fetch_segment(
    ctx: Arc<FetchContext>,
    segment: Segment,
) -> Result<(), DownloadError> {
    debug!(url = %ctx.url, segment = segment.index, range = %segment.range_header(), "fetching segment");
    let response = open(&ctx.client, &ctx.url, Some(&segment), &ctx.cancel).await?;
    let result = stream(&ctx, response, segment.start, Some(segment.len)).await;
    if let Err(err) = &result {
        debug!(url = %ctx.url, segment = segment.index, error = %err, "segment stopped");
    }
    result.map(|_| ())
}
