/// Client configuration
///
/// Defaults match the production feed server; every field can be
/// overridden through the builder methods or `MARKET_*` env vars.

use std::time::Duration;

use tracing::warn;
use url::Url;

use super::error::SyncError;

/// Exponential backoff parameters for push reconnects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay unit, doubled per attempt
    pub base: Duration,
    /// Hard cap on the pre-jitter delay
    pub max: Duration,
    /// Exponent stops growing past this attempt
    pub max_exponent: u32,
    /// Upper bound (exclusive) of the random jitter added to every delay
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_millis(10_000),
            max_exponent: 5,
            jitter: Duration::from_millis(250),
        }
    }
}

/// Market sync client configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Push feed WebSocket URL
    pub push_url: String,
    /// Full snapshot endpoint for poll fallback (derived from `push_url` when unset)
    pub snapshot_url: Option<String>,
    /// Auxiliary status endpoint (derived from `push_url` when unset)
    pub status_url: Option<String>,
    /// Labelled sentiment endpoints (a single derived feed when empty)
    pub sentiment_urls: Vec<(String, String)>,
    /// Exchange used for records that carry none
    pub default_exchange: String,
    /// Poll fallback fetch interval
    pub poll_interval: Duration,
    /// Coalescer flush period
    pub coalesce_interval: Duration,
    /// Auxiliary status fetch interval
    pub status_interval: Duration,
    /// Consecutive transport failures before falling back to polling
    pub failure_threshold: u32,
    pub backoff: BackoffConfig,
    /// Maximum retained alert entries
    pub alert_capacity: usize,
    /// Transport -> ingestion channel buffer size
    pub channel_buffer_size: usize,
    /// Optional per-request timeout for HTTP fetches (none by default)
    pub request_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_url: "ws://127.0.0.1:9001/ws".to_string(),
            snapshot_url: None,
            status_url: None,
            sentiment_urls: Vec::new(),
            default_exchange: "binance".to_string(),
            poll_interval: Duration::from_millis(5_000),
            coalesce_interval: Duration::from_millis(500),
            status_interval: Duration::from_millis(5_000),
            failure_threshold: 3,
            backoff: BackoffConfig::default(),
            alert_capacity: 200,
            channel_buffer_size: 1000,
            request_timeout: None,
        }
    }
}

impl SyncConfig {
    /// Create a new configuration with custom push URL
    pub fn new(push_url: impl Into<String>) -> Self {
        Self {
            push_url: push_url.into(),
            ..Default::default()
        }
    }

    /// Load from environment with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("MARKET_WS_URL") {
            config.push_url = v;
        }
        if let Ok(v) = std::env::var("MARKET_SNAPSHOT_URL") {
            config.snapshot_url = Some(v);
        }
        if let Ok(v) = std::env::var("MARKET_STATUS_URL") {
            config.status_url = Some(v);
        }
        if let Ok(v) = std::env::var("MARKET_SENTIMENT_URLS") {
            config.sentiment_urls = parse_labelled_urls(&v);
        }
        if let Ok(v) = std::env::var("MARKET_DEFAULT_EXCHANGE") {
            config.default_exchange = v;
        }
        if let Ok(v) = std::env::var("MARKET_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_timeout_ms(&v);
        }

        config
    }

    /// Override the push URL
    pub fn with_push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = url.into();
        self
    }

    pub fn with_snapshot_url(mut self, url: impl Into<String>) -> Self {
        self.snapshot_url = Some(url.into());
        self
    }

    pub fn with_status_url(mut self, url: impl Into<String>) -> Self {
        self.status_url = Some(url.into());
        self
    }

    pub fn with_sentiment_url(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.sentiment_urls.push((label.into(), url.into()));
        self
    }

    pub fn with_default_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.default_exchange = exchange.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_coalesce_interval(mut self, interval: Duration) -> Self {
        self.coalesce_interval = interval;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validated push URL (ws / wss only)
    pub fn push_endpoint(&self) -> Result<Url, SyncError> {
        let url = parse_url(&self.push_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(SyncError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Poll fallback endpoint
    ///
    /// A push URL whose last path segment is `all` selects the all-exchanges
    /// snapshot; anything else selects the single-exchange snapshot for the
    /// push URL's `exchange` query parameter (or the default exchange).
    pub fn snapshot_endpoint(&self) -> Result<Url, SyncError> {
        if let Some(url) = &self.snapshot_url {
            return parse_url(url);
        }

        let push = self.push_endpoint()?;
        let mut url = self.http_origin()?;

        let all_exchanges = push
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            == Some("all");

        if all_exchanges {
            url.set_path("/api/snapshot/all");
        } else {
            let exchange = push
                .query_pairs()
                .find(|(key, _)| key == "exchange")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_else(|| self.default_exchange.clone());
            url.set_path("/api/snapshot");
            url.query_pairs_mut().append_pair("exchange", &exchange);
        }

        Ok(url)
    }

    pub fn status_endpoint(&self) -> Result<Url, SyncError> {
        match &self.status_url {
            Some(url) => parse_url(url),
            None => {
                let mut url = self.http_origin()?;
                url.set_path("/api/status");
                Ok(url)
            }
        }
    }

    pub fn sentiment_endpoints(&self) -> Result<Vec<(String, Url)>, SyncError> {
        if self.sentiment_urls.is_empty() {
            let mut url = self.http_origin()?;
            url.set_path("/api/sentiment");
            return Ok(vec![("market".to_string(), url)]);
        }

        self.sentiment_urls
            .iter()
            .map(|(label, url)| Ok((label.clone(), parse_url(url)?)))
            .collect()
    }

    /// Same-origin HTTP base of the push URL
    fn http_origin(&self) -> Result<Url, SyncError> {
        let mut url = self.push_endpoint()?;
        let scheme = if url.scheme() == "wss" { "https" } else { "http" };

        url.set_scheme(scheme)
            .map_err(|_| SyncError::UnsupportedScheme(url.scheme().to_string()))?;
        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

fn parse_url(raw: &str) -> Result<Url, SyncError> {
    Url::parse(raw).map_err(|e| SyncError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parse `label=url,label=url`; an entry without a label is labelled by its URL
/// Milliseconds to a request timeout; unparseable values are logged and ignored
fn parse_timeout_ms(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            warn!(
                value = raw,
                error = %e,
                "Ignoring invalid MARKET_REQUEST_TIMEOUT_MS, no request timeout applied"
            );
            None
        }
    }
}

fn parse_labelled_urls(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((label, url)) if !label.contains(':') => {
                (label.trim().to_string(), url.trim().to_string())
            }
            _ => (entry.to_string(), entry.to_string()),
        })
        .collect()
}
