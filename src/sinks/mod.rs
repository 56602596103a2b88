//! Ready-made [`DownloadHandler`](crate::DownloadHandler) implementations.

mod checksum;
mod path;
mod progress;

pub use checksum::Md5CheckedSink;
pub use path::PathSink;
pub use progress::{Outcome, ProgressSink};
