//! Asynchronous HTTP downloads that split large resources into concurrently
//! fetched byte ranges when the server supports it.

pub mod downloader;
pub mod handler;
pub mod logging;
pub mod sinks;
mod utils;

#[cfg(test)]
mod test_support;

pub use downloader::DownloadSystem;
pub use downloader::config::{DownloadConfig, ProxyAddr};
pub use downloader::error::{ConfigError, DownloadError, SystemError};
pub use downloader::planer::{Segment, TransferMode, TransferPlan};
pub use handler::DownloadHandler;
