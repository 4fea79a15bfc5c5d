//! Common HTTP code

use std::{
    io::{self, Write},
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use const_format::formatcp;
use futures_util::StreamExt as _;
use parking_lot::Mutex;
use reqwest::{StatusCode, Url, header::HeaderMap};

/// User agent for all requests
pub(crate) const USER_AGENT: &str = formatcp!(
    "{}/{} (+https://crates.io/crates/{})",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION"),
    env!("CARGO_PKG_NAME"),
);

/// How to rate limit the requests sent by a client
pub(crate) struct RateLimit {
    /// Duration on which to apply the limit
    pub time: Duration,
    /// Maximum count of request during the time window
    pub max_count: NonZeroUsize,
}

/// Error when fetching a resource
#[derive(thiserror::Error, Debug)]
pub(crate) enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Request failed with status: {0}")]
    Status(StatusCode),
    #[error("Response is larger than {max} bytes")]
    TooLarge { max: u64 },
    #[error("Failed to write response: {0}")]
    Write(#[from] io::Error),
}

/// HTTP interface, with optional client side rate limiting
pub(crate) struct HttpClient {
    /// Client
    client: reqwest::Client,
    /// Rate limit state
    rate_limit: RateLimitState,
}

impl HttpClient {
    /// Create a new HTTP client
    pub(crate) fn new(
        timeout: Duration,
        headers: HeaderMap,
        rate_limit: Option<&RateLimit>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limit_state = match rate_limit {
            Some(RateLimit { time, max_count }) => {
                RateLimitState::Window(Mutex::new(RateLimitWindow {
                    start: Instant::now(),
                    length: *time,
                    count: 0,
                    limit: *max_count,
                }))
            }
            None => RateLimitState::None,
        };

        Ok(Self {
            client,
            rate_limit: rate_limit_state,
        })
    }

    /// Wait if needed to respect rate limit
    async fn wait(&self) {
        while let Some(time_to_sleep) = self.rate_limit.wait_for() {
            log::debug!(
                "Waiting for {:.3}s because of rate limit",
                time_to_sleep.as_secs_f64()
            );
            tokio::time::sleep(time_to_sleep).await;
        }
    }

    /// Send a GET request, return status and body whatever the status is
    pub(crate) async fn get(&self, url: Url) -> reqwest::Result<(StatusCode, Vec<u8>)> {
        self.wait().await;
        // query is not logged, it can contain credentials
        log::trace!("GET {}{}", url.host_str().unwrap_or_default(), url.path());
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let data = response.bytes().await?;
        log::trace!("{status} {}", String::from_utf8_lossy(&data));
        Ok((status, data.into()))
    }

    /// Download a resource into writer, failing on error status or if it exceeds `max_size` bytes.
    /// Return the count of bytes written.
    pub(crate) async fn download<W>(
        &self,
        url: Url,
        mut writer: W,
        max_size: u64,
    ) -> Result<u64, FetchError>
    where
        W: Write,
    {
        self.wait().await;

        log::debug!("Downloading {url}...");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > max_size)
        {
            return Err(FetchError::TooLarge { max: max_size });
        }

        let mut size: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            if size > max_size {
                return Err(FetchError::TooLarge { max: max_size });
            }
            writer.write_all(&chunk)?;
        }

        Ok(size)
    }
}

/// Current state of http rate limit
enum RateLimitState {
    /// No limit to enforce
    None,
    /// Current time window state and limits
    Window(Mutex<RateLimitWindow>),
}

/// Current rate limit state
struct RateLimitWindow {
    /// Start of the time window
    start: Instant,
    /// Duration of each time window
    length: Duration,
    /// Current count of requests made in the time window
    count: usize,
    /// Maximum request count to make in each time window
    limit: NonZeroUsize,
}

impl RateLimitState {
    /// Update rate limit state, and return None if request can be sent, or duration to wait
    /// If a duration is returned, this must be called again before sending any request
    fn wait_for(&self) -> Option<Duration> {
        match self {
            RateLimitState::None => None,
            RateLimitState::Window(state) => {
                let mut window_state = state.lock();
                let now = Instant::now();
                if now.saturating_duration_since(window_state.start) > window_state.length {
                    // Reset
                    window_state.start = now;
                    window_state.count = 1;
                    None
                } else if window_state.count < window_state.limit.get() {
                    window_state.count += 1;
                    None
                } else {
                    let time_to_wait = window_state.start + window_state.length - now;
                    Some(time_to_wait)
                }
            }
        }
    }
}
