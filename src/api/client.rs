use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{FetchError, RemoteFetcher};
use crate::models::{CompetitionPayload, EventPayload, SportPayload};

/// HTTP client for the sports feed API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct FeedClient {
    http: Client,
    base_url: Url,
    events_path: String,
}

impl FeedClient {
    pub fn new(base_url: &str, events_path: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid feed URL: {}", base_url))?;
        // Url::join drops the last path segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(FeedClient {
            http,
            base_url,
            events_path: events_path.trim_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Transport(format!("bad endpoint '{}': {}", path, e)))
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, FetchError> {
        let url = self.endpoint(path)?;
        debug!("Fetching {}", url);

        let resp = self.http.get(url.clone()).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        // Read the body first so a dropped connection stays a transport error
        // and only a malformed body is reported as a decode error.
        let body = resp.bytes().await?;
        let items: Vec<T> = serde_json::from_slice(&body)?;
        debug!("Fetched {} items from {}", items.len(), url);
        Ok(items)
    }
}

#[async_trait]
impl RemoteFetcher for FeedClient {
    fn name(&self) -> &str {
        "FeedClient"
    }

    async fn fetch_sports(&self) -> Result<Vec<SportPayload>, FetchError> {
        self.get_list("sports").await
    }

    async fn fetch_competitions(&self) -> Result<Vec<CompetitionPayload>, FetchError> {
        self.get_list("competitions").await
    }

    async fn fetch_events(&self) -> Result<Vec<EventPayload>, FetchError> {
        self.get_list(&self.events_path).await
    }
}
