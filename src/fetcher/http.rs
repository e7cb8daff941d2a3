use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use super::{Fetcher, QueryCredentials};
use crate::error::FetchError;

/// Fetches the status page over HTTP
pub struct HttpFetcher {
    client: Client,
    url: String,
    credentials: QueryCredentials,
}

impl HttpFetcher {
    pub fn new(
        url: impl Into<String>,
        credentials: QueryCredentials,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(manuscript = %self.credentials.manuscript_number))]
    async fn fetch(&self) -> Result<String, FetchError> {
        info!(url = %self.url, "Querying status page");

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("manuscript_number", self.credentials.manuscript_number.as_str()),
                ("last_name", self.credentials.last_name.as_str()),
                ("first_name", self.credentials.first_name.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Status page request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "Fetched status page");

        Ok(body)
    }
}
