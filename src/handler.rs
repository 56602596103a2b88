use std::io;

use crate::downloader::error::DownloadError;

/// Receives the events of a single download.
///
/// Every download produces `started` once, then any number of `updated`
/// calls, then exactly one of `completed` or `failed`. In segmented mode
/// `updated` is called concurrently from several worker threads and offsets
/// arrive out of order, so implementations place bytes by `offset` and must
/// synchronise internally.
pub trait DownloadHandler: Send + Sync {
    /// `size` is -1 when the server did not report a length.
    fn started(&self, size: i64) -> io::Result<()>;

    /// `bytes` starts at absolute file `offset`; `total` is the number of
    /// bytes received so far across the whole download.
    fn updated(&self, bytes: &[u8], offset: i64, total: i64) -> io::Result<()>;

    fn completed(&self);

    fn failed(&self, error: DownloadError);
}
