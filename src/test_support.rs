//! Mock HTTP file server and a recording handler shared by the unit tests.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use crate::downloader::error::DownloadError;
use crate::handler::DownloadHandler;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started(i64),
    Updated { offset: i64, len: usize, total: i64 },
    Completed,
    Failed(String),
}

/// Handler that records every event and assembles the bytes by offset.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    data: Mutex<Vec<u8>>,
    error: Mutex<Option<DownloadError>>,
    reject_updates: bool,
}

impl Recorder {
    pub fn rejecting_updates() -> Self {
        Self {
            reject_updates: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// `(offset, len, total)` of every `updated` call, in arrival order.
    pub fn updates(&self) -> Vec<(i64, usize, i64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Updated { offset, len, total } => Some((offset, len, total)),
                _ => None,
            })
            .collect()
    }

    pub fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn take_error(&self) -> Option<DownloadError> {
        self.error.lock().unwrap().take()
    }

    /// Started exactly once and first, exactly one terminal event and it is last.
    pub fn assert_well_formed(&self) {
        let events = self.events();
        assert!(
            matches!(events.first(), Some(Event::Started(_))),
            "first event must be started: {:?}",
            events
        );
        let starts = events
            .iter()
            .filter(|e| matches!(e, Event::Started(_)))
            .count();
        assert_eq!(starts, 1, "started fired {} times", starts);

        let terminals = events
            .iter()
            .filter(|e| matches!(e, Event::Completed | Event::Failed(_)))
            .count();
        assert_eq!(terminals, 1, "terminal events: {:?}", events);
        assert!(matches!(
            events.last(),
            Some(Event::Completed | Event::Failed(_))
        ));
    }

    pub fn is_completed(&self) -> bool {
        self.events().last() == Some(&Event::Completed)
    }
}

impl DownloadHandler for Recorder {
    fn started(&self, size: i64) -> io::Result<()> {
        self.events.lock().unwrap().push(Event::Started(size));
        Ok(())
    }

    fn updated(&self, bytes: &[u8], offset: i64, total: i64) -> io::Result<()> {
        if self.reject_updates {
            return Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
        }
        {
            let mut data = self.data.lock().unwrap();
            let end = offset as usize + bytes.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(bytes);
        }
        self.events.lock().unwrap().push(Event::Updated {
            offset,
            len: bytes.len(),
            total,
        });
        Ok(())
    }

    fn completed(&self) {
        self.events.lock().unwrap().push(Event::Completed);
    }

    fn failed(&self, error: DownloadError) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Failed(error.to_string()));
        *self.error.lock().unwrap() = Some(error);
    }
}

/// A file served under `/files/{name}`, with configurable range behaviour.
#[derive(Clone)]
pub struct MockFile {
    body: Arc<Vec<u8>>,
    ranges: bool,
    chunked: bool,
    truncate_at: Option<u64>,
    misplaced: bool,
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl MockFile {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            ranges: true,
            chunked: false,
            truncate_at: None,
            misplaced: false,
            requests: Arc::default(),
        }
    }

    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Ignore `Range` and never advertise `Accept-Ranges`.
    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    /// Stream the body without a `Content-Length`.
    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    /// Send only half of the range that starts at `start`.
    pub fn truncate_range_at(mut self, start: u64) -> Self {
        self.truncate_at = Some(start);
        self
    }

    /// Answer every range with a window of the right length starting at 0.
    pub fn misplace_ranges(mut self) -> Self {
        self.misplaced = true;
        self
    }

    /// Number of ranged requests made for `path`.
    pub fn range_requests(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, range)| p == path && range.is_some())
            .count()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/files/{name}", get(serve_file))
            .with_state(self.clone())
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn serve_file(State(file): State<MockFile>, uri: Uri, headers: HeaderMap) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    file.requests
        .lock()
        .unwrap()
        .push((uri.path().to_string(), range.clone()));

    if file.chunked {
        let chunks = file
            .body
            .chunks(1000)
            .map(|c| Ok::<_, io::Error>(Bytes::copy_from_slice(c)))
            .collect::<Vec<_>>();
        return Body::from_stream(futures::stream::iter(chunks)).into_response();
    }

    let parsed = range
        .as_deref()
        .filter(|_| file.ranges)
        .and_then(parse_range);
    let Some((start, end)) = parsed else {
        let mut response = file.body.to_vec().into_response();
        if file.ranges {
            response
                .headers_mut()
                .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }
        return response;
    };

    let len = file.body.len() as u64;
    if start >= len {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }
    let end = end.min(len - 1);
    let (start, end) = if file.misplaced {
        (0, end - start)
    } else {
        (start, end)
    };
    let mut slice = file.body[start as usize..=end as usize].to_vec();
    if file.truncate_at == Some(start) {
        slice.truncate(slice.len() / 2);
    }

    let mut response = (StatusCode::PARTIAL_CONTENT, slice).into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_RANGE,
        HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, len)).unwrap(),
    );
    response
}

/// Serves `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Like [`serve`], for tests running outside the runtime.
pub fn serve_on(handle: &Handle, router: Router) -> SocketAddr {
    handle.block_on(serve(router))
}
