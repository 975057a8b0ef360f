pub mod notifications;
pub mod watch;
