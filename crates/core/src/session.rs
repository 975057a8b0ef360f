// Sync Session
//
// Explicit lifecycle for one synchronized feed: the store, its poll loop and
// any push subscriptions. Dropping the session tears everything down.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::poller::PollScheduler;
use crate::store::NotificationStore;
use crate::traits::{NotificationApi, Subscription};

pub struct SyncSession {
    store: NotificationStore,
    subscriptions: Vec<Box<dyn Subscription>>,
    stopped: bool,
}

impl SyncSession {
    /// Build the store, run the initial load and start polling if enabled.
    ///
    /// A failed initial load is recorded in the store's error state and does
    /// not prevent the session from starting; the next poll or refresh
    /// retries.
    pub async fn start(config: &SyncConfig, api: Arc<dyn NotificationApi>) -> Self {
        let store = NotificationStore::with_config(api, config.store_config());
        let mut session = Self {
            store,
            subscriptions: Vec::new(),
            stopped: false,
        };

        if config.api_url.is_empty() {
            info!("No API configured, session runs on push and local events only");
            return session;
        }

        if let Err(e) = session.store.load_notifications().await {
            warn!(error = %e, "Initial notification load failed");
        }

        if config.polling_enabled() {
            if let Some(handle) = PollScheduler::new(session.store.clone(), config.poll.clone()).start()
            {
                session.attach(Box::new(handle));
            }
        }

        session
    }

    /// Session around an existing store, with nothing running yet
    pub fn from_store(store: NotificationStore) -> Self {
        Self {
            store,
            subscriptions: Vec::new(),
            stopped: false,
        }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Hand a running subscription to the session; it is stopped with it
    pub fn attach(&mut self, subscription: Box<dyn Subscription>) {
        info!(subscription = subscription.name(), "Subscription attached");
        self.subscriptions.push(subscription);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop every subscription. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        for subscription in self.subscriptions.iter_mut() {
            subscription.stop();
        }
        self.subscriptions.clear();
        self.stopped = true;
        info!("Sync session stopped");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.stop();
    }
}
