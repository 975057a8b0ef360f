// Sync Configuration
//
// Configuration for the store, poll scheduler, HTTP client and push
// transport, loaded from environment variables or assembled with builders.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::poller::PollerConfig;
use crate::store::{StoreConfig, DEFAULT_NEW_HIGHLIGHT, DEFAULT_PER_PAGE};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Top-level configuration for one synchronized feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the notification routes, e.g. `https://app.test/notification`
    pub api_url: String,

    pub per_page: u32,

    pub enable_polling: bool,

    pub poll: PollerConfig,

    #[serde(with = "duration_millis")]
    pub new_highlight: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,

    /// Push channel name, e.g. `private-App.Model.Users.42`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcaster: Option<BroadcasterConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            per_page: DEFAULT_PER_PAGE,
            enable_polling: true,
            poll: PollerConfig::default(),
            new_highlight: DEFAULT_NEW_HIGHLIGHT,
            csrf_token: None,
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            channel: None,
            broadcaster: None,
        }
    }
}

impl SyncConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `BELLSYNC_API_URL`: base URL of the notification routes
    /// - `BELLSYNC_PER_PAGE`: page size for list loads (default: 10)
    /// - `BELLSYNC_ENABLE_POLLING`: `true`/`false` (default: true)
    /// - `BELLSYNC_POLL_INTERVAL_MS`: poll interval, 0 disables (default: 30000)
    /// - `BELLSYNC_POLL_WINDOW`: records requested per poll (default: 50)
    /// - `BELLSYNC_CSRF_TOKEN`, `BELLSYNC_AUTH_TOKEN`: request credentials
    /// - `BELLSYNC_TIMEOUT_MS`: HTTP request timeout (default: 30000)
    /// - `BELLSYNC_CHANNEL`: push channel name
    /// - `BELLSYNC_BROADCASTER`: `pusher` or `mercure`, see [`BroadcasterConfig`]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_url = lookup("BELLSYNC_API_URL").unwrap_or_default();
        let per_page = parse_var(&lookup, "BELLSYNC_PER_PAGE")?.unwrap_or(defaults.per_page);
        let enable_polling = lookup("BELLSYNC_ENABLE_POLLING")
            .map(|v| is_truthy(&v))
            .unwrap_or(defaults.enable_polling);

        let mut poll = defaults.poll.clone();
        let interval_ms: Option<u64> = parse_var(&lookup, "BELLSYNC_POLL_INTERVAL_MS")?;
        if let Some(ms) = interval_ms {
            poll = poll.with_interval(Duration::from_millis(ms));
        }
        if let Some(window) = parse_var(&lookup, "BELLSYNC_POLL_WINDOW")? {
            poll = poll.with_window(window);
        }

        let timeout_ms: Option<u64> = parse_var(&lookup, "BELLSYNC_TIMEOUT_MS")?;
        let request_timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);

        Ok(Self {
            api_url,
            per_page,
            enable_polling,
            poll,
            new_highlight: defaults.new_highlight,
            csrf_token: non_empty(lookup("BELLSYNC_CSRF_TOKEN")),
            auth_token: non_empty(lookup("BELLSYNC_AUTH_TOKEN")),
            request_timeout,
            channel: non_empty(lookup("BELLSYNC_CHANNEL")),
            broadcaster: BroadcasterConfig::from_lookup(&lookup)?,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_polling(mut self, enabled: bool) -> Self {
        self.enable_polling = enabled;
        self
    }

    pub fn with_poll(mut self, poll: PollerConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_new_highlight(mut self, highlight: Duration) -> Self {
        self.new_highlight = highlight;
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: BroadcasterConfig) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Polling runs only when enabled, configured with a non-zero interval
    /// and pointed at an API
    pub fn polling_enabled(&self) -> bool {
        self.enable_polling && self.poll.is_enabled() && !self.api_url.is_empty()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_per_page(self.per_page)
            .with_new_highlight(self.new_highlight)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(SyncError::config("api_url is required"));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(SyncError::config(format!(
                "api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if self.per_page == 0 {
            return Err(SyncError::config("per_page must be at least 1"));
        }
        if let Some(broadcaster) = &self.broadcaster {
            if self.channel.is_none() {
                return Err(SyncError::config(format!(
                    "{} broadcaster configured without a channel",
                    broadcaster.name()
                )));
            }
            broadcaster.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Broadcasters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum BroadcasterConfig {
    Pusher(PusherConfig),
    Mercure(MercureConfig),
}

impl BroadcasterConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BroadcasterConfig::Pusher(_) => "pusher",
            BroadcasterConfig::Mercure(_) => "mercure",
        }
    }

    /// Read `BELLSYNC_BROADCASTER` and the matching driver variables.
    /// Returns `None` when no broadcaster is selected.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(driver) = non_empty(lookup("BELLSYNC_BROADCASTER")) else {
            return Ok(None);
        };

        match driver.to_lowercase().as_str() {
            "pusher" => {
                let key = lookup("BELLSYNC_PUSHER_KEY").unwrap_or_default();
                let mut config = PusherConfig::new(key);
                if let Some(host) = non_empty(lookup("BELLSYNC_PUSHER_HOST")) {
                    config.host = host;
                }
                if let Some(port) = parse_var(lookup, "BELLSYNC_PUSHER_PORT")? {
                    config.port = Some(port);
                }
                if let Some(tls) = lookup("BELLSYNC_PUSHER_TLS") {
                    config.tls = is_truthy(&tls);
                }
                config.cluster = non_empty(lookup("BELLSYNC_PUSHER_CLUSTER"));
                config.auth_endpoint = non_empty(lookup("BELLSYNC_PUSHER_AUTH_ENDPOINT"));
                Ok(Some(BroadcasterConfig::Pusher(config)))
            }
            "mercure" => {
                let hub_url = lookup("BELLSYNC_MERCURE_URL").unwrap_or_default();
                let mut config = MercureConfig::new(hub_url);
                config.token = non_empty(lookup("BELLSYNC_MERCURE_TOKEN"));
                Ok(Some(BroadcasterConfig::Mercure(config)))
            }
            other => Err(SyncError::config(format!(
                "unknown broadcaster '{}', expected pusher or mercure",
                other
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            BroadcasterConfig::Pusher(config) if config.key.is_empty() => {
                Err(SyncError::config("pusher app key is required"))
            }
            BroadcasterConfig::Mercure(config) if config.hub_url.is_empty() => {
                Err(SyncError::config("mercure hub url is required"))
            }
            _ => Ok(()),
        }
    }
}

/// WebSocket pub/sub server speaking the Pusher channels protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherConfig {
    pub key: String,
    /// Host of a self-hosted server; ignored when `cluster` is set
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Endpoint that signs private/presence channel subscriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_endpoint: Option<String>,
}

impl PusherConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            host: "127.0.0.1".to_string(),
            port: None,
            tls: true,
            cluster: None,
            auth_endpoint: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = Some(port);
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_auth_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.auth_endpoint = Some(endpoint.into());
        self
    }

    /// Host to dial, honouring `cluster`
    pub fn effective_host(&self) -> String {
        match &self.cluster {
            Some(cluster) => format!("ws-{}.pusher.com", cluster),
            None => self.host.clone(),
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls { 443 } else { 80 })
    }
}

/// SSE hub speaking the Mercure protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MercureConfig {
    pub hub_url: String,
    /// Subscriber JWT sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl MercureConfig {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SyncError::config(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
