// Backend selection from configuration

use std::time::Duration;

use bellsync_core::{BroadcasterConfig, NotificationStore, SyncConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tracing::info;

use crate::adapter::{ChannelIdentity, TransportAdapter, TransportBackend, TransportHandle};
use crate::error::TransportError;
use crate::mercure::MercureBackend;
use crate::pusher::PusherBackend;
use crate::retry::ReconnectPolicy;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend for the configured broadcaster, or `None` when push is off
pub fn backend_from_config(
    config: &SyncConfig,
) -> Result<Option<Box<dyn TransportBackend>>, TransportError> {
    let Some(broadcaster) = &config.broadcaster else {
        return Ok(None);
    };

    let backend: Box<dyn TransportBackend> = match broadcaster {
        BroadcasterConfig::Pusher(pusher) => {
            // Channel authorization goes through the application, so it
            // carries the same session headers as the REST calls.
            let http = reqwest::Client::builder()
                .default_headers(session_headers(config)?)
                .timeout(config.request_timeout)
                .build()?;
            Box::new(PusherBackend::new(pusher.clone()).with_http_client(http))
        }
        BroadcasterConfig::Mercure(mercure) => {
            // No overall timeout: the response body is the event stream.
            let http = reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()?;
            Box::new(MercureBackend::new(mercure.clone()).with_http_client(http))
        }
    };

    Ok(Some(backend))
}

/// Start the configured push transport feeding `store`.
///
/// Returns `Ok(None)` when no broadcaster or channel is configured.
pub fn start_from_config(
    config: &SyncConfig,
    store: NotificationStore,
    policy: ReconnectPolicy,
) -> Result<Option<TransportHandle>, TransportError> {
    let Some(channel) = config.channel.as_deref() else {
        return Ok(None);
    };
    let Some(backend) = backend_from_config(config)? else {
        return Ok(None);
    };

    info!(backend = backend.name(), channel, "Starting push transport");
    let adapter = TransportAdapter::new(backend, store, ChannelIdentity::new(channel))
        .with_policy(policy);
    Ok(Some(adapter.start()))
}

fn session_headers(config: &SyncConfig) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    if let Some(token) = &config.csrf_token {
        headers.insert(HeaderName::from_static("x-csrf-token"), sensitive(token)?);
    }
    if let Some(token) = &config.auth_token {
        headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {}", token))?);
    }
    Ok(headers)
}

fn sensitive(raw: &str) -> Result<HeaderValue, TransportError> {
    let mut value = HeaderValue::from_str(raw)
        .map_err(|_| TransportError::auth("token contains invalid header characters"))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellsync_core::{InMemoryNotificationApi, MercureConfig, PusherConfig};
    use std::sync::Arc;

    #[test]
    fn test_no_broadcaster() {
        let config = SyncConfig::new("https://app.test");
        assert!(backend_from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_selects_backend() {
        let pusher = SyncConfig::new("https://app.test")
            .with_broadcaster(BroadcasterConfig::Pusher(PusherConfig::new("key")));
        assert_eq!(backend_from_config(&pusher).unwrap().unwrap().name(), "pusher");

        let mercure = SyncConfig::new("https://app.test").with_broadcaster(
            BroadcasterConfig::Mercure(MercureConfig::new("https://hub.test/.well-known/mercure")),
        );
        assert_eq!(backend_from_config(&mercure).unwrap().unwrap().name(), "mercure");
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let config = SyncConfig::new("https://app.test")
            .with_csrf_token("bad\ntoken")
            .with_broadcaster(BroadcasterConfig::Pusher(PusherConfig::new("key")));
        assert!(backend_from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_start_requires_channel() {
        let store = NotificationStore::new(Arc::new(InMemoryNotificationApi::new()));
        let config = SyncConfig::new("https://app.test")
            .with_broadcaster(BroadcasterConfig::Pusher(PusherConfig::new("key")));

        let handle = start_from_config(&config, store, ReconnectPolicy::never()).unwrap();
        assert!(handle.is_none());
    }
}
