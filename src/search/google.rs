//! Google Custom Search JSON API logo search

// See https://developers.google.com/custom-search/v1/reference/rest/v1/cse/list

use std::{num::NonZeroUsize, time::Duration};

use anyhow::Context as _;
use backon::{ExponentialBuilder, Retryable as _};
use reqwest::{
    StatusCode, Url,
    header::{self, HeaderMap, HeaderValue},
};

use crate::{
    config::Credentials,
    http::{HttpClient, RateLimit},
    logo::{Format, ImageCandidate, Metadata},
    search::{LogoSearch, SearchApiError, SearchQuery},
};

/// API endpoint
const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Maximum result count the API returns per request
const PAGE_SIZE: usize = 10;

/// Stop paging after inspecting this many raw results
const MAX_RAW_RESULTS: usize = 30;

/// Error reasons meaning the quota is exhausted
const QUOTA_REASONS: [&str; 4] = [
    "dailyLimitExceeded",
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

/// Error reasons meaning the credentials are refused
const AUTH_REASONS: [&str; 4] = ["keyInvalid", "keyExpired", "accessNotConfigured", "forbidden"];

#[derive(Debug, serde::Deserialize)]
struct Response {
    #[serde(default)]
    items: Vec<ResponseItem>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseItem {
    link: String,
    #[serde(default)]
    title: String,
    mime: Option<String>,
    file_format: Option<String>,
    image: Option<ResponseImage>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseImage {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, serde::Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Google Custom Search client
pub(crate) struct GoogleCustomSearch {
    /// API credentials
    credentials: Credentials,
    /// API endpoint
    endpoint: Url,
    /// HTTP client
    http: HttpClient,
    /// Retry strategy for transient errors
    backoff: ExponentialBuilder,
}

impl GoogleCustomSearch {
    /// Create a client for the public API
    pub(crate) fn new(credentials: Credentials) -> anyhow::Result<Self> {
        #[expect(clippy::unwrap_used)] // constant URL
        let endpoint = Url::parse(ENDPOINT).unwrap();
        Self::with_endpoint(credentials, endpoint)
    }

    /// Create a client for a given API endpoint
    pub(crate) fn with_endpoint(credentials: Credentials, endpoint: Url) -> anyhow::Result<Self> {
        let headers: HeaderMap = [(
            header::ACCEPT,
            HeaderValue::from_static("application/json"),
        )]
        .into_iter()
        .collect();
        // default per minute quota of the API
        let rate_limit = RateLimit {
            time: Duration::from_secs(60),
            #[expect(clippy::unwrap_used)]
            max_count: NonZeroUsize::new(100).unwrap(),
        };
        let http = HttpClient::new(Duration::from_secs(10), headers, Some(&rate_limit))
            .context("Failed to initialize search API HTTP client")?;
        Ok(Self {
            credentials,
            endpoint,
            http,
            backoff: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_times(3)
                .with_jitter(),
        })
    }

    /// Change retry strategy
    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build URL of a result page, `start` being the 1-based index of the first result
    fn page_url(&self, query: &SearchQuery, start: usize) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.credentials.api_key)
            .append_pair("cx", &self.credentials.search_engine_id)
            .append_pair("q", &query.query_string())
            .append_pair("searchType", "image")
            .append_pair("fileType", query.format.extension())
            .append_pair("imgSize", "large")
            .append_pair("safe", "active")
            .append_pair("num", &PAGE_SIZE.to_string())
            .append_pair("start", &start.to_string());
        url
    }

    /// Fetch and decode a single result page
    async fn fetch_page(&self, url: &Url) -> Result<Response, SearchApiError> {
        let (status, body) = self
            .http
            .get(url.clone())
            .await
            .map_err(|err| SearchApiError::Network(err.without_url().to_string()))?;
        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        serde_json::from_slice(&body).map_err(|err| SearchApiError::Decode(err.to_string()))
    }
}

/// Map an API error response to its error kind
fn classify_error(status: StatusCode, body: &[u8]) -> SearchApiError {
    let api_error = serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .map(|r| r.error);
    let message = api_error
        .as_ref()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());
    let has_reason = |reasons: &[&str]| {
        api_error.as_ref().is_some_and(|e| {
            e.errors
                .iter()
                .any(|d| reasons.contains(&d.reason.as_str()))
        })
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || api_error
            .as_ref()
            .is_some_and(|e| e.status == "RESOURCE_EXHAUSTED")
        || has_reason(&QUOTA_REASONS)
    {
        SearchApiError::Quota(message)
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || has_reason(&AUTH_REASONS)
        || message.contains("API key")
    {
        SearchApiError::Auth(message)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        SearchApiError::Network(message)
    } else {
        SearchApiError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// Build candidate from API result, if it matches wanted format
fn to_candidate(item: ResponseItem, rank: usize, wanted: Format) -> Option<ImageCandidate> {
    let url: Url = match item.link.parse() {
        Ok(url) => url,
        Err(err) => {
            log::debug!("Skipping result #{rank} with invalid URL {:?}: {err}", item.link);
            return None;
        }
    };
    let format = match (item.mime.as_deref(), item.file_format.as_deref()) {
        (None, None) => Metadata::uncertain(Format::from_url(&url)?),
        (mime, file_format) => {
            let declared = mime
                .and_then(Format::from_mime)
                .or_else(|| file_format.and_then(Format::from_mime));
            let Some(format) = declared else {
                log::debug!(
                    "Skipping result #{rank} {url} of unsupported type {:?}",
                    mime.or(file_format)
                );
                return None;
            };
            Metadata::known(format)
        }
    };
    if *format.value_hint() != wanted {
        log::debug!(
            "Skipping result #{rank} {url} of format {}, wanted {wanted}",
            format.value_hint()
        );
        return None;
    }
    let size_px = item.image.and_then(|i| match (i.width, i.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    });
    Some(ImageCandidate {
        url,
        format,
        size_px,
        rank,
        title: item.title,
    })
}

#[async_trait::async_trait]
impl LogoSearch for GoogleCustomSearch {
    async fn search(
        &self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<ImageCandidate>, SearchApiError> {
        log::debug!(
            "Searching {:?} for {} logos",
            query.query_string(),
            query.format
        );
        let mut results = Vec::new();
        let mut raw_count = 0;
        while (results.len() < max_results) && (raw_count < MAX_RAW_RESULTS) {
            let url = self.page_url(query, raw_count + 1);
            let page = (|| self.fetch_page(&url))
                .retry(self.backoff)
                .when(SearchApiError::is_retryable)
                .notify(|err, delay| {
                    log::warn!("{err}, retrying in {:.1}s", delay.as_secs_f64());
                })
                .await?;
            let page_len = page.items.len();
            for item in page.items {
                let rank = raw_count;
                raw_count += 1;
                if let Some(candidate) = to_candidate(item, rank, query.format) {
                    results.push(candidate);
                }
            }
            if page_len < PAGE_SIZE {
                break;
            }
        }
        results.truncate(max_results);
        log::debug!(
            "{} {} candidates for {:?}",
            results.len(),
            query.format,
            query.company
        );
        Ok(results)
    }
}
