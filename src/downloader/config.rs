use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::downloader::error::ConfigError;

pub const DEFAULT_BUFFER_SIZE: usize = 0x8000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// A `host:port` HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyAddr {
    pub host: String,
    pub port: u16,
}

impl ProxyAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn to_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ProxyAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidProxy(s.to_string()))?;
        if host.is_empty() {
            return Err(ConfigError::InvalidProxy(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidProxy(s.to_string()))?;
        Ok(ProxyAddr::new(host, port))
    }
}

impl TryFrom<String> for ProxyAddr {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProxyAddr> for String {
    fn from(value: ProxyAddr) -> Self {
        value.to_string()
    }
}

/// Settings a download runs with. The system keeps one of these as its
/// current defaults and hands each new download its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub proxy: Option<ProxyAddr>,
    /// Read buffer size, which doubles as the segment size.
    pub buffer_size: usize,
    pub force_contiguous: bool,
    /// Upper bound on fetch tasks of one download reading at once.
    pub max_concurrent_fetches: Option<usize>,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            force_contiguous: false,
            max_concurrent_fetches: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            user_agent: concat!("dlsys/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Builds the HTTP client a single download uses for all of its requests.
    pub(crate) fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout())
            .user_agent(self.user_agent.as_str());
        builder = match &self.proxy {
            Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy.to_url())?),
            None => builder.no_proxy(),
        };
        builder.build()
    }
}
