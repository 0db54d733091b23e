//! HTTP pull endpoints: full snapshot fallback plus auxiliary status / sentiment

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use super::config::SyncConfig;
use super::error::SyncError;
use super::types::{SentimentCounts, Snapshot, StatusReport};

/// Full-universe snapshot source used in poll fallback
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError>;
}

/// Auxiliary status and sentiment source
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<StatusReport, SyncError>;

    /// Labels of the sentiment feeds served by this source
    fn sentiment_feeds(&self) -> Vec<String>;

    async fn fetch_sentiment(&self, feed: &str) -> Result<SentimentCounts, SyncError>;
}

/// reqwest-backed client for every pull endpoint
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    client: Client,
    snapshot_url: Url,
    status_url: Url,
    sentiment_urls: Vec<(String, Url)>,
}

impl HttpFeedClient {
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::fetch("client", e))?;

        Ok(Self {
            client,
            snapshot_url: config.snapshot_endpoint()?,
            status_url: config.status_endpoint()?,
            sentiment_urls: config.sentiment_endpoints()?,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SyncError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SyncError::fetch(url, e))?;

        if let Err(status_err) = response.error_for_status_ref() {
            return Err(SyncError::fetch(url, status_err));
        }

        response.json::<T>().await.map_err(|e| SyncError::fetch(url, e))
    }
}

#[async_trait]
impl SnapshotSource for HttpFeedClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError> {
        self.get_json(&self.snapshot_url).await
    }
}

#[async_trait]
impl StatusSource for HttpFeedClient {
    async fn fetch_status(&self) -> Result<StatusReport, SyncError> {
        self.get_json(&self.status_url).await
    }

    fn sentiment_feeds(&self) -> Vec<String> {
        self.sentiment_urls
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    async fn fetch_sentiment(&self, feed: &str) -> Result<SentimentCounts, SyncError> {
        let url = self
            .sentiment_urls
            .iter()
            .find(|(label, _)| label == feed)
            .map(|(_, url)| url)
            .ok_or_else(|| SyncError::fetch(feed, "unknown sentiment feed"))?;

        self.get_json(url).await
    }
}
