pub mod file;
pub mod http;

pub use file::FileFetcher;
pub use http::HttpFetcher;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// What the status page asks for to look up a submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCredentials {
    pub manuscript_number: String,
    pub last_name: String,
    pub first_name: String,
}

/// Source of the raw status page
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self) -> Result<String, FetchError>;
}

/// Fetcher chosen at runtime
pub enum PageSource {
    Http(HttpFetcher),
    File(FileFetcher),
}

impl Fetcher for PageSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        match self {
            PageSource::Http(fetcher) => fetcher.fetch().await,
            PageSource::File(fetcher) => fetcher.fetch().await,
        }
    }
}

const BLOCKED_MARKERS: [&str; 5] = ["验证码", "人机", "访问过于频繁", "captcha", "security check"];
const FORM_MARKERS: [&str; 3] = ["manuscript number", "last name", "first name"];

/// Reject pages that are not a query result: empty bodies, anti-bot
/// interstitials, and the bare query form. Fetchers return such pages as
/// they are so the caller can keep them for inspection.
pub fn check_page(body: &str) -> Result<(), FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::EmptyBody);
    }

    let lower = body.to_lowercase();

    if BLOCKED_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(FetchError::Blocked);
    }

    let form_hits = FORM_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    if form_hits >= 2 && (body.contains("条款") || lower.contains("terms")) {
        return Err(FetchError::NoResult);
    }

    Ok(())
}
