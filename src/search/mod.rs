//! Logo image search

mod google;

use itertools::Itertools as _;

pub(crate) use self::google::GoogleCustomSearch;
use crate::logo::{Format, ImageCandidate};

/// A logo search query for a company and format
#[derive(Debug, Clone)]
pub(crate) struct SearchQuery {
    /// Company name
    pub company: String,
    /// Wanted format
    pub format: Format,
    /// Terms appended to the company name
    pub refinement_terms: Vec<&'static str>,
}

impl SearchQuery {
    /// Build query, targeting transparent logos when the format allows it
    pub(crate) fn new(company: &str, format: Format) -> Self {
        let mut refinement_terms = vec!["logo"];
        if format.supports_alpha() {
            refinement_terms.push("transparent");
        }
        Self {
            company: company.trim().to_owned(),
            format,
            refinement_terms,
        }
    }

    /// Full text query
    pub(crate) fn query_string(&self) -> String {
        std::iter::once(self.company.as_str())
            .chain(self.refinement_terms.iter().copied())
            .join(" ")
    }
}

/// Search API error
#[derive(thiserror::Error, Debug)]
pub enum SearchApiError {
    /// Credentials were refused
    #[error("Search API authentication failed: {0}")]
    Auth(String),
    /// Request quota is exhausted
    #[error("Search API quota exceeded: {0}")]
    Quota(String),
    /// Transient failure, connection error, timeout or server error
    #[error("Search API network error: {0}")]
    Network(String),
    /// The API refused this specific query
    #[error("Search API rejected query with status {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// API error message
        message: String,
    },
    /// Response could not be understood
    #[error("Failed to decode search API response: {0}")]
    Decode(String),
}

impl SearchApiError {
    /// Return true if error should stop the whole run
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Quota(_))
    }

    /// Return true if request can be retried
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Logo search backend
#[async_trait::async_trait]
pub(crate) trait LogoSearch: Sync + Send {
    /// Search for logos, and return at most `max_results` candidates matching the query format,
    /// in relevance order
    async fn search(
        &self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<ImageCandidate>, SearchApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_terms() {
        let query = SearchQuery::new(" Acme ", Format::Png);
        assert_eq!(query.query_string(), "Acme logo transparent");
        let query = SearchQuery::new("Acme", Format::Jpeg);
        assert_eq!(query.query_string(), "Acme logo");
    }

    #[test]
    fn error_policy() {
        assert!(SearchApiError::Auth(String::new()).is_fatal());
        assert!(SearchApiError::Quota(String::new()).is_fatal());
        assert!(!SearchApiError::Network(String::new()).is_fatal());
        assert!(SearchApiError::Network(String::new()).is_retryable());
        assert!(!SearchApiError::Quota(String::new()).is_retryable());
        assert!(
            !SearchApiError::Rejected {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
    }
}
