// Pusher-protocol WebSocket backend
//
// Speaks protocol 7 of the Pusher channels wire format (also served by
// soketi, Laravel Reverb and friends). Frames are JSON envelopes
// `{event, channel, data}` where `data` is usually a JSON string.

use std::time::Duration;

use async_trait::async_trait;
use bellsync_core::PusherConfig;
use bellsync_schemas::{DecodeError, RawPayload};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use crate::adapter::{ChannelIdentity, RawEvent, RawEventStream, TransportBackend};
use crate::error::TransportError;

pub const PROTOCOL_VERSION: u8 = 7;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Wire envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl Frame {
    fn parse(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `data` decoded one level when it is a JSON string
    fn data_object(&self) -> Option<Value> {
        match self.data.as_ref()? {
            Value::String(s) => serde_json::from_str(s).ok(),
            other => Some(other.clone()),
        }
    }

    fn into_payload(self) -> RawPayload {
        match self.data {
            Some(Value::String(s)) => RawPayload::Text(s),
            Some(other) => RawPayload::Json(other),
            None => RawPayload::Json(Value::Null),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelAuth {
    auth: String,
    #[serde(default)]
    channel_data: Option<String>,
}

pub struct PusherBackend {
    config: PusherConfig,
    http: reqwest::Client,
    handshake_timeout: Duration,
}

impl PusherBackend {
    pub fn new(config: PusherConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// HTTP client used for channel authorization; carry session headers
    /// (CSRF token, bearer token) as its defaults.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn config(&self) -> &PusherConfig {
        &self.config
    }

    pub fn socket_url(&self) -> String {
        let scheme = if self.config.tls { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/app/{}?protocol={}&client=bellsync&version={}",
            scheme,
            self.config.effective_host(),
            self.config.effective_port(),
            self.config.key,
            PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION"),
        )
    }

    /// Read frames until the server hands out our socket id
    async fn await_established(&self, source: &mut WsSource) -> Result<String, TransportError> {
        let wait = async {
            while let Some(message) = source.next().await {
                let Message::Text(text) = message? else {
                    continue;
                };
                let frame = Frame::parse(&text)?;
                match frame.event.as_str() {
                    "pusher:connection_established" => {
                        return frame
                            .data_object()
                            .and_then(|d| d.get("socket_id")?.as_str().map(str::to_string))
                            .ok_or_else(|| TransportError::protocol("handshake without socket_id"));
                    }
                    "pusher:error" => {
                        return Err(TransportError::connect(format!(
                            "server refused connection: {}",
                            frame.data_object().unwrap_or(Value::Null)
                        )));
                    }
                    other => debug!(event = other, "Ignoring frame before handshake"),
                }
            }
            Err(TransportError::connect("connection closed during handshake"))
        };

        tokio::time::timeout(self.handshake_timeout, wait)
            .await
            .map_err(|_| TransportError::connect("handshake timed out"))?
    }

    /// Ask the application to sign a private channel subscription
    #[instrument(skip(self), fields(channel = %channel))]
    async fn authorize(
        &self,
        socket_id: &str,
        channel: &ChannelIdentity,
    ) -> Result<ChannelAuth, TransportError> {
        let endpoint = self.config.auth_endpoint.as_deref().ok_or_else(|| {
            TransportError::auth(format!("{} is private but no auth endpoint is set", channel))
        })?;

        let response = self
            .http
            .post(endpoint)
            .header("Accept", "application/json")
            .json(&json!({"socket_id": socket_id, "channel_name": channel.name()}))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TransportError::auth(format!(
                "channel authorization refused ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(TransportError::connect(format!(
                "channel authorization failed ({})",
                status
            )));
        }

        response
            .json::<ChannelAuth>()
            .await
            .map_err(|e| TransportError::protocol(format!("bad authorization response: {}", e)))
    }
}

#[async_trait]
impl TransportBackend for PusherBackend {
    fn name(&self) -> &'static str {
        "pusher"
    }

    #[instrument(skip(self), fields(channel = %channel))]
    async fn connect(&self, channel: &ChannelIdentity) -> Result<RawEventStream, TransportError> {
        let url = self.socket_url();
        debug!(%url, "Dialing WebSocket");

        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut source) = ws.split();

        let socket_id = self.await_established(&mut source).await?;

        let mut data = json!({"channel": channel.name()});
        if channel.requires_auth() {
            let auth = self.authorize(&socket_id, channel).await?;
            data["auth"] = Value::String(auth.auth);
            if let Some(channel_data) = auth.channel_data {
                data["channel_data"] = Value::String(channel_data);
            }
        }

        let subscribe = Frame {
            event: "pusher:subscribe".to_string(),
            channel: None,
            data: Some(data),
        };
        sink.send(Message::Text(serde_json::to_string(&subscribe).map_err(
            |e| TransportError::protocol(e.to_string()),
        )?))
        .await?;

        info!(%socket_id, "Subscribed");

        let state = (sink, source, channel.name().to_string());
        let stream = futures::stream::unfold(state, |(mut sink, mut source, channel)| async move {
            loop {
                let message = match source.next().await? {
                    Ok(message) => message,
                    Err(e) => return Some((Err(e.into()), (sink, source, channel))),
                };

                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => return None,
                    _ => continue,
                };

                let frame = match Frame::parse(&text) {
                    Ok(frame) => frame,
                    Err(e) => return Some((Err(e.into()), (sink, source, channel))),
                };

                match frame.event.as_str() {
                    "pusher:ping" => {
                        let pong = json!({"event": "pusher:pong", "data": {}}).to_string();
                        if let Err(e) = sink.send(Message::Text(pong)).await {
                            return Some((Err(e.into()), (sink, source, channel)));
                        }
                        continue;
                    }
                    "pusher:error" => {
                        warn!(data = ?frame.data, "Server reported an error");
                        continue;
                    }
                    event if event.starts_with("pusher:") || event.starts_with("pusher_internal:") => {
                        debug!(event, "Protocol frame");
                        continue;
                    }
                    _ => {}
                }

                if frame.channel.as_deref() != Some(channel.as_str()) {
                    debug!(event = %frame.event, frame_channel = ?frame.channel, "Frame for another channel");
                    continue;
                }

                let name = frame.event.clone();
                let event = RawEvent::new(name, frame.into_payload());
                return Some((Ok(event), (sink, source, channel)));
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type ServerWs = WebSocketStream<TcpStream>;

    async fn spawn_server<F, Fut>(handler: F) -> (u16, JoinHandle<()>)
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        (port, task)
    }

    async fn send(ws: &mut ServerWs, value: Value) {
        ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    async fn next_frame(ws: &mut ServerWs) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    fn established() -> Value {
        json!({
            "event": "pusher:connection_established",
            "data": "{\"socket_id\":\"123.456\",\"activity_timeout\":120}"
        })
    }

    fn backend(port: u16) -> PusherBackend {
        PusherBackend::new(
            PusherConfig::new("app-key")
                .with_host("127.0.0.1", port)
                .with_tls(false),
        )
    }

    #[test]
    fn test_socket_url() {
        let local = PusherBackend::new(
            PusherConfig::new("key")
                .with_host("ws.local", 6001)
                .with_tls(false),
        );
        assert!(local
            .socket_url()
            .starts_with("ws://ws.local:6001/app/key?protocol=7&client=bellsync"));

        let hosted = PusherBackend::new(PusherConfig::new("key").with_cluster("eu"));
        assert!(hosted.socket_url().starts_with("wss://ws-eu.pusher.com:443/app/key"));
    }

    #[tokio::test]
    async fn test_streams_channel_events() {
        let (port, server) = spawn_server(|mut ws| async move {
            send(&mut ws, established()).await;

            let subscribe = next_frame(&mut ws).await;
            assert_eq!(subscribe["event"], "pusher:subscribe");
            assert_eq!(subscribe["data"]["channel"], "notifications");
            assert!(subscribe["data"].get("auth").is_none());

            send(&mut ws, json!({
                "event": "pusher_internal:subscription_succeeded",
                "channel": "notifications",
                "data": "{}"
            }))
            .await;

            send(&mut ws, json!({"event": "pusher:ping", "data": {}})).await;
            let pong = next_frame(&mut ws).await;
            assert_eq!(pong["event"], "pusher:pong");

            send(&mut ws, json!({
                "event": "notification.created",
                "channel": "someone-else",
                "data": "{\"id\":\"x\"}"
            }))
            .await;
            send(&mut ws, json!({
                "event": "notification.created",
                "channel": "notifications",
                "data": "{\"id\":\"n1\",\"title\":\"Hello\"}"
            }))
            .await;
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            send(&mut ws, json!({
                "event": "notification.marked-read",
                "channel": "notifications",
                "data": {"notification_id": "n1", "unread_count": 0}
            }))
            .await;
            ws.close(None).await.unwrap();
        })
        .await;

        let stream = backend(port)
            .connect(&ChannelIdentity::new("notifications"))
            .await
            .expect("connect should succeed");
        let items: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
            .await
            .expect("stream should end after close");

        assert_eq!(items.len(), 3);
        match &items[0] {
            Ok(event) => {
                assert_eq!(event.name, "notification.created");
                assert_eq!(
                    event.payload,
                    RawPayload::Text("{\"id\":\"n1\",\"title\":\"Hello\"}".to_string())
                );
            }
            Err(e) => panic!("unexpected error {}", e),
        }
        assert!(matches!(&items[1], Err(e) if e.is_decode()));
        match &items[2] {
            Ok(event) => {
                assert_eq!(event.name, "notification.marked-read");
                assert!(matches!(event.payload, RawPayload::Json(_)));
            }
            Err(e) => panic!("unexpected error {}", e),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_private_channel_is_authorized() {
        let auth = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/broadcasting/auth"))
            .and(body_json(json!({
                "socket_id": "123.456",
                "channel_name": "private-App.Model.Users.1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"auth": "app-key:sig"})))
            .expect(1)
            .mount(&auth)
            .await;

        let (port, server) = spawn_server(|mut ws| async move {
            send(&mut ws, established()).await;
            let subscribe = next_frame(&mut ws).await;
            assert_eq!(subscribe["data"]["channel"], "private-App.Model.Users.1");
            assert_eq!(subscribe["data"]["auth"], "app-key:sig");
            ws.close(None).await.unwrap();
        })
        .await;

        let backend = PusherBackend::new(
            PusherConfig::new("app-key")
                .with_host("127.0.0.1", port)
                .with_tls(false)
                .with_auth_endpoint(format!("{}/broadcasting/auth", auth.uri())),
        );

        let stream = backend
            .connect(&ChannelIdentity::for_owner("App.Model.Users", 1))
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;
        assert!(items.is_empty());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_authorization_is_fatal() {
        let auth = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&auth)
            .await;

        let (port, _server) = spawn_server(|mut ws| async move {
            send(&mut ws, established()).await;
            let _ = ws.next().await;
        })
        .await;

        let backend = PusherBackend::new(
            PusherConfig::new("app-key")
                .with_host("127.0.0.1", port)
                .with_tls(false)
                .with_auth_endpoint(auth.uri()),
        );

        let err = match backend
            .connect(&ChannelIdentity::for_owner("App.Model.Users", 1))
            .await
        {
            Ok(_) => panic!("expected authorization failure"),
            Err(e) => e,
        };
        assert!(matches!(err, TransportError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_private_channel_without_endpoint() {
        let (port, _server) = spawn_server(|mut ws| async move {
            send(&mut ws, established()).await;
            let _ = ws.next().await;
        })
        .await;

        let result = backend(port)
            .connect(&ChannelIdentity::new("private-feed"))
            .await;
        assert!(matches!(result, Err(TransportError::Auth(_))));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (port, _server) = spawn_server(|mut ws| async move {
            let _ = ws.next().await;
        })
        .await;

        let result = backend(port)
            .with_handshake_timeout(Duration::from_millis(100))
            .connect(&ChannelIdentity::new("notifications"))
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
