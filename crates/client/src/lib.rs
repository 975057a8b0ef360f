// Bellsync HTTP client
//
// Fetch Client for the notification REST collaborator. `NotificationsClient`
// implements `bellsync_core::NotificationApi`, so a store can be pointed at
// a real server by handing it this client.

pub mod client;
pub mod notifications;

pub use client::{ClientError, HttpClient, HttpClientBuilder};
pub use notifications::NotificationsClient;
