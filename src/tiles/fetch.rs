use crate::core::constants::{DEFAULT_REQUEST_TIMEOUT_MS, USER_AGENT};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use std::time::Duration;

/// Client with the default timeout, shared by every map that uses it.
static DEFAULT_CLIENT: OnceCell<Client> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server could not be reached or did not answer in time
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl FetchError {
    /// Only connection failures can succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Connection(_))
    }
}

/// Anything able to download raw tile bytes for a URL.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher shared by every loader worker and the prefetcher.
///
/// One client means one connection pool; public tile servers reject requests
/// without a User-Agent, so one is always set.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    /// Fetcher on the process-wide client with the default timeout
    pub fn shared() -> crate::Result<Self> {
        let client = DEFAULT_CLIENT
            .get_or_try_init(|| build_client(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)))?;
        Ok(Self {
            client: client.clone(),
        })
    }
}

fn build_client(timeout: Duration) -> crate::Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).timeout(timeout).build()?)
}

impl TileFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().map_err(|e| FetchError::Body(e.to_string()))?;
        log::trace!("downloaded {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
