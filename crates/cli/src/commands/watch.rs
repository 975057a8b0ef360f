// Watch command - follow the feed live
//
// Loads the first page, then keeps the store in sync through polling and the
// configured push transport, printing every store event until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use bellsync_client::NotificationsClient;
use bellsync_core::{StoreEvent, SyncConfig, SyncSession};
use bellsync_transport::{start_from_config, ConnectionState, ReconnectPolicy};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::output::{print_field, print_notification_row, print_table_header, OutputFormat, FEED_COLUMNS};

pub async fn run(config: SyncConfig, output: OutputFormat, quiet: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let client = NotificationsClient::from_config(&config).context("Failed to build HTTP client")?;
    let mut session = SyncSession::start(&config, Arc::new(client)).await;
    let store = session.store().clone();
    let mut events = store.events();

    let snapshot = store.snapshot();
    if output.is_text() {
        if let Some(error) = &snapshot.error {
            eprintln!("Initial load failed: {}", error);
        }
        if !snapshot.items.is_empty() {
            print_table_header(FEED_COLUMNS);
            for notification in &snapshot.items {
                print_notification_row(notification);
            }
        }
        if !quiet {
            print_field("Unread", &snapshot.unread_count.to_string());
        }
    } else {
        output.print_line(&snapshot)?;
    }

    let mut connection: Option<watch::Receiver<ConnectionState>> = None;
    match start_from_config(&config, store.clone(), ReconnectPolicy::default())
        .context("Failed to start push transport")?
    {
        Some(handle) => {
            connection = Some(handle.watch_state());
            session.attach(Box::new(handle));
        }
        None if !quiet => eprintln!("No broadcaster configured, relying on polling"),
        None => {}
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event, output, quiet)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind, some events were not printed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = wait_for_change(&mut connection) => match changed {
                Some(state) if !quiet && output.is_text() => eprintln!("[push] {}", state),
                Some(_) => {}
                None => connection = None,
            },
        }
    }

    session.stop();
    Ok(())
}

/// Next connection state, or `None` once the transport is gone. Pends
/// forever when there is no transport.
async fn wait_for_change(
    connection: &mut Option<watch::Receiver<ConnectionState>>,
) -> Option<ConnectionState> {
    match connection {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

fn print_event(event: &StoreEvent, output: OutputFormat, quiet: bool) -> Result<()> {
    if !output.is_text() {
        return output.print_line(event);
    }

    match event {
        StoreEvent::Added { notification } => print_notification_row(notification),
        StoreEvent::Removed { notification_id } if !quiet => println!("- {}", notification_id),
        StoreEvent::Changed { unread_count } => print_field("Unread", &unread_count.to_string()),
        StoreEvent::Loaded { page, inserted } if !quiet => {
            println!("Loaded page {} ({} notifications)", page, inserted)
        }
        StoreEvent::Error { message } => eprintln!("Error: {}", message),
        StoreEvent::AllMarkedRead { marked_count } if !quiet => {
            println!("Marked {} notifications as read", marked_count)
        }
        _ => {}
    }
    Ok(())
}

