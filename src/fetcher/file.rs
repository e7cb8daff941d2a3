use std::path::{Path, PathBuf};

use tracing::debug;

use super::Fetcher;
use crate::error::FetchError;

/// Reads a previously saved status page from disk
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Fetcher for FileFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::File {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), bytes = body.len(), "Read page file");

        Ok(body)
    }
}
