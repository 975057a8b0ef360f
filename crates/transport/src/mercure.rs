// Mercure-protocol SSE backend
//
// Subscribes to one topic on a Mercure hub. Events either carry their name
// in the SSE `event:` field, or arrive as unnamed `message` events whose
// data is an envelope `{"event": name, "data": payload}`.

use std::sync::Arc;

use async_trait::async_trait;
use bellsync_core::MercureConfig;
use bellsync_schemas::{DecodeError, RawPayload};
use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::adapter::{ChannelIdentity, RawEvent, RawEventStream, TransportBackend};
use crate::error::TransportError;

pub struct MercureBackend {
    config: MercureConfig,
    http: reqwest::Client,
    /// Id of the last event seen, replayed as `Last-Event-ID` on reconnect
    last_event_id: Arc<Mutex<Option<String>>>,
}

impl MercureBackend {
    pub fn new(config: MercureConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            last_event_id: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &MercureConfig {
        &self.config
    }

    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().clone()
    }
}

#[async_trait]
impl TransportBackend for MercureBackend {
    fn name(&self) -> &'static str {
        "mercure"
    }

    #[instrument(skip(self), fields(channel = %channel))]
    async fn connect(&self, channel: &ChannelIdentity) -> Result<RawEventStream, TransportError> {
        let mut request = self
            .http
            .get(&self.config.hub_url)
            .query(&[("topic", channel.name())])
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");

        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        if let Some(id) = self.last_event_id() {
            debug!(last_event_id = %id, "Resuming from last event");
            request = request.header("Last-Event-ID", id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TransportError::auth(format!(
                "hub refused subscription ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::connect(format!(
                "hub returned {}: {}",
                status, body
            )));
        }

        info!("Subscribed to hub");

        let last_event_id = Arc::clone(&self.last_event_id);
        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(move |result| {
                let last_event_id = Arc::clone(&last_event_id);
                async move {
                    match result {
                        Ok(event) => {
                            if !event.id.is_empty() {
                                *last_event_id.lock() = Some(event.id.clone());
                            }
                            into_raw_event(event).map(|r| r.map_err(TransportError::from))
                        }
                        Err(e) => Some(Err(TransportError::protocol(e.to_string()))),
                    }
                }
            });

        Ok(Box::pin(stream))
    }
}

/// Map one SSE event to a raw event. Keep-alive events with no data yield
/// nothing.
fn into_raw_event(event: Event) -> Option<Result<RawEvent, DecodeError>> {
    if event.data.trim().is_empty() {
        return None;
    }

    if !event.event.is_empty() && event.event != "message" {
        return Some(Ok(RawEvent::new(event.event, event.data)));
    }

    Some(unwrap_envelope(&event.data))
}

fn unwrap_envelope(data: &str) -> Result<RawEvent, DecodeError> {
    let value: Value = serde_json::from_str(data)?;
    let Value::Object(mut envelope) = value else {
        return Err(DecodeError::NotAnObject {
            event: "message".to_string(),
        });
    };

    let name = match envelope.remove("event") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => {
            return Err(DecodeError::MissingField {
                event: "message".to_string(),
                field: "event",
            })
        }
    };

    let payload = match envelope.remove("data") {
        Some(Value::String(text)) => RawPayload::Text(text),
        Some(other) => RawPayload::Json(other),
        None => RawPayload::Json(Value::Object(envelope)),
    };

    Ok(RawEvent::new(name, payload))
}
