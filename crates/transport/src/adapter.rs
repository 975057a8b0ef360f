// Transport Adapter
//
// The single decode + dispatch path shared by every push backend. A backend
// only knows how to connect and yield raw `(name, payload)` events; the
// adapter owns the connection lifecycle, reconnects with backoff, decodes
// each event into a `CanonicalEvent` and hands it to the store.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bellsync_core::{Applied, NotificationStore, Subscription};
use bellsync_schemas::{CanonicalEvent, RawPayload};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::retry::ReconnectPolicy;

/// One event as delivered by a backend, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub payload: RawPayload,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, payload: impl Into<RawPayload>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of raw events for one connection; ends when the connection does
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, TransportError>> + Send>>;

// ============================================================================
// Channel identity
// ============================================================================

/// Name of the per-owner channel the server publishes on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIdentity {
    name: String,
}

impl ChannelIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Private channel for an owner tuple, e.g. `("App.Model.Users", 42)`
    /// becomes `private-App.Model.Users.42`
    pub fn for_owner(model: &str, foreign_key: impl fmt::Display) -> Self {
        Self::new(format!("private-{}.{}", model, foreign_key))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Private and presence channels need a signed subscription
    pub fn requires_auth(&self) -> bool {
        self.name.starts_with("private-") || self.name.starts_with("presence-")
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Backend trait
// ============================================================================

#[async_trait]
pub trait TransportBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a connection subscribed to `channel`
    async fn connect(&self, channel: &ChannelIdentity) -> Result<RawEventStream, TransportError>;

    /// Release backend resources after the stream is dropped
    async fn disconnect(&self) {}
}

#[async_trait]
impl<T: TransportBackend + ?Sized> TransportBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn connect(&self, channel: &ChannelIdentity) -> Result<RawEventStream, TransportError> {
        (**self).connect(channel).await
    }

    async fn disconnect(&self) {
        (**self).disconnect().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

pub struct TransportAdapter<B> {
    backend: Arc<B>,
    store: NotificationStore,
    channel: ChannelIdentity,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
}

impl<B: TransportBackend + 'static> TransportAdapter<B> {
    pub fn new(backend: B, store: NotificationStore, channel: ChannelIdentity) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            backend: Arc::new(backend),
            store,
            channel,
            policy: ReconnectPolicy::default(),
            state,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn channel(&self) -> &ChannelIdentity {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Decode one event and apply it to the store.
    ///
    /// Malformed payloads are logged and dropped; `None` tells the caller
    /// nothing was applied.
    pub fn handle_event(&self, name: &str, payload: RawPayload) -> Option<Applied> {
        match CanonicalEvent::decode(name, payload) {
            Ok(event) => {
                let applied = self.store.apply(event);
                debug!(
                    backend = self.backend.name(),
                    event = name,
                    ?applied,
                    "Push event applied"
                );
                Some(applied)
            }
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    event = name,
                    error = %e,
                    "Dropping malformed push payload"
                );
                None
            }
        }
    }

    /// Connection loop. Returns when `shutdown` flips (or its sender is
    /// dropped), on a fatal error, or when the reconnect budget runs out.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), TransportError> {
        let backend = self.backend.name();
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                result = self.backend.connect(&self.channel) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok(mut stream) => {
                    self.set_state(ConnectionState::Connected);
                    failures = 0;
                    info!(backend, channel = %self.channel, "Push transport connected");

                    loop {
                        tokio::select! {
                            item = stream.next() => match item {
                                Some(Ok(event)) => {
                                    self.handle_event(&event.name, event.payload);
                                }
                                Some(Err(e)) if e.is_decode() => {
                                    warn!(backend, error = %e, "Dropping undecodable frame");
                                }
                                Some(Err(e)) => {
                                    warn!(backend, error = %e, "Push stream failed");
                                    break;
                                }
                                None => {
                                    info!(backend, "Push stream ended");
                                    break;
                                }
                            },
                            _ = shutdown.changed() => {
                                drop(stream);
                                self.backend.disconnect().await;
                                self.set_state(ConnectionState::Disconnected);
                                info!(backend, "Push transport stopped");
                                return Ok(());
                            }
                        }
                    }

                    drop(stream);
                    self.backend.disconnect().await;
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e) if e.is_fatal() => {
                    self.set_state(ConnectionState::Disconnected);
                    error!(backend, channel = %self.channel, error = %e, "Push transport gave up");
                    return Err(e);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(backend, channel = %self.channel, error = %e, "Push connection failed");
                }
            }

            failures = failures.saturating_add(1);
            if !self.policy.has_attempts_remaining(failures) {
                let err = TransportError::RetriesExhausted { attempts: failures };
                error!(backend, error = %err, "Push transport gave up");
                return Err(err);
            }

            let delay = self.policy.delay_for_attempt(failures);
            debug!(
                backend,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(backend, "Push transport stopped");
        Ok(())
    }

    /// Spawn the connection loop
    pub fn start(self) -> TransportHandle {
        let name = self.backend.name();
        let state = self.watch_state();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { self.run(shutdown_rx).await });

        TransportHandle {
            name,
            shutdown_tx,
            state,
            task: Some(task),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Owns a running transport loop. Stops it on `stop()` or drop.
pub struct TransportHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<Result<(), TransportError>>>,
}

impl TransportHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Signal shutdown and wait for the loop to finish
    pub async fn shutdown(mut self) -> Result<(), TransportError> {
        let _ = self.shutdown_tx.send(true);
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| TransportError::protocol(format!("transport task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Wait for the loop to end on its own (fatal error or exhausted retries)
    pub async fn join(mut self) -> Result<(), TransportError> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| TransportError::protocol(format!("transport task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}

impl Subscription for TransportHandle {
    fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellsync_core::InMemoryNotificationApi;
    use bellsync_schemas::{Notification, NotificationId};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Session = Result<Vec<Result<RawEvent, TransportError>>, TransportError>;

    /// Each `connect` plays the next scripted session; once the script runs
    /// out the connection stays open forever.
    struct ScriptedBackend {
        sessions: Mutex<VecDeque<Session>>,
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
    }

    impl ScriptedBackend {
        fn new(sessions: Vec<Session>) -> Self {
            Self {
                sessions: Mutex::new(sessions.into()),
                connects: Arc::new(AtomicUsize::new(0)),
                disconnects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TransportBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn connect(&self, _channel: &ChannelIdentity) -> Result<RawEventStream, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.sessions.lock().pop_front() {
                Some(Ok(events)) => Ok(Box::pin(futures::stream::iter(events))),
                Some(Err(e)) => Err(e),
                None => Ok(Box::pin(futures::stream::pending())),
            }
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn store() -> NotificationStore {
        NotificationStore::new(Arc::new(InMemoryNotificationApi::new()))
    }

    fn created(id: &str) -> Result<RawEvent, TransportError> {
        Ok(RawEvent::new(
            "App.Notification.Created",
            json!({"id": id, "title": "Hi"}).to_string(),
        ))
    }

    fn channel() -> ChannelIdentity {
        ChannelIdentity::for_owner("App.Model.Users", 1)
    }

    #[test]
    fn test_channel_identity() {
        let channel = channel();
        assert_eq!(channel.name(), "private-App.Model.Users.1");
        assert!(channel.requires_auth());
        assert!(!ChannelIdentity::new("notifications").requires_auth());
    }

    #[tokio::test]
    async fn test_handle_event_dispatches_canonical_events() {
        let store = store();
        let adapter = TransportAdapter::new(ScriptedBackend::new(vec![]), store.clone(), channel());

        let applied = adapter.handle_event(
            "App.Notification.Created",
            RawPayload::from(r#"{"id": "n1", "title": "Hello"}"#),
        );
        assert_eq!(applied, Some(Applied::Added(NotificationId::from("n1"))));
        assert_eq!(store.unread_count(), 1);

        adapter.handle_event(
            "notification.marked-read",
            RawPayload::Json(json!({"notification_id": "n1", "unread_count": 0})),
        );
        assert_eq!(store.unread_count(), 0);
        assert!(store.items().is_empty());
    }

    #[tokio::test]
    async fn test_handle_event_drops_malformed_payload() {
        let store = store();
        store.add_notification(Notification::new("keep", "info"));
        let adapter = TransportAdapter::new(ScriptedBackend::new(vec![]), store.clone(), channel());

        assert!(adapter
            .handle_event("notification.marked-read", RawPayload::from("{not json"))
            .is_none());
        assert!(adapter
            .handle_event("notification.marked-read", RawPayload::from("[1, 2]"))
            .is_none());
        assert!(adapter
            .handle_event("notification.marked-read", RawPayload::from("{}"))
            .is_none());

        assert_eq!(store.items().len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_does_not_end_subscription() {
        let store = store();
        let backend = ScriptedBackend::new(vec![Ok(vec![
            created("a"),
            Ok(RawEvent::new("App.Notification.Created", "{oops")),
            created("b"),
        ])]);
        let connects = backend.connects.clone();

        let handle = TransportAdapter::new(backend, store.clone(), channel())
            .with_policy(ReconnectPolicy::fixed(Duration::from_millis(100), None))
            .start();

        let mut state = handle.watch_state();
        tokio::time::sleep(Duration::from_millis(50)).await;
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        let ids: Vec<String> = store.items().iter().map(|n| n.id.to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        // first session ended; the loop reconnected into the open-ended one
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), ConnectionState::Connected);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_connect_failure() {
        let store = store();
        let backend = ScriptedBackend::new(vec![
            Err(TransportError::connect("refused")),
            Err(TransportError::connect("refused")),
            Ok(vec![created("late")]),
        ]);
        let connects = backend.connects.clone();

        let handle = TransportAdapter::new(backend, store.clone(), channel())
            .with_policy(ReconnectPolicy::fixed(Duration::from_secs(1), Some(5)))
            .start();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(connects.load(Ordering::SeqCst) >= 4);
        assert!(store.contains(&NotificationId::from("late")));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_fatal() {
        let backend = ScriptedBackend::new(vec![Err(TransportError::auth("403"))]);
        let connects = backend.connects.clone();

        let handle = TransportAdapter::new(backend, store(), channel()).start();
        let result = handle.join().await;

        assert!(matches!(result, Err(TransportError::Auth(_))));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let backend = ScriptedBackend::new(vec![
            Err(TransportError::connect("down")),
            Err(TransportError::connect("down")),
            Err(TransportError::connect("down")),
        ]);

        let adapter = TransportAdapter::new(backend, store(), channel())
            .with_policy(ReconnectPolicy::fixed(Duration::from_millis(10), Some(2)));
        let (_tx, rx) = watch::channel(false);

        let result = adapter.run(rx).await;
        assert!(matches!(
            result,
            Err(TransportError::RetriesExhausted { attempts: 3 })
        ));
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disconnects() {
        let backend = ScriptedBackend::new(vec![]);
        let disconnects = backend.disconnects.clone();

        let mut handle = TransportAdapter::new(backend, store(), channel()).start();
        let mut state = handle.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        handle.stop();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(handle.name(), "scripted");
    }
}
