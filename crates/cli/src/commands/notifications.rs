// One-shot notification commands

use anyhow::{anyhow, bail, Context, Result};
use bellsync_client::{ClientError, NotificationsClient};
use bellsync_schemas::{
    DeleteAllFilter, ListQuery, MarkAllReadFilter, NotificationId, StatusFilter,
};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde_json::json;

use crate::output::{print_field, print_notification_row, print_table_header, OutputFormat, FEED_COLUMNS};

#[derive(Subcommand)]
pub enum NotificationsCommand {
    /// List one page of notifications
    List {
        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Page size (defaults to BELLSYNC_PER_PAGE)
        #[arg(long)]
        limit: Option<u32>,

        /// Status filter
        #[arg(long, default_value = "all", value_parser = ["all", "unread", "read"])]
        status: String,

        /// Only notifications of this type
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// Mark one notification as read
    MarkRead {
        /// Notification ID
        id: String,
    },

    /// Mark every unread notification as read
    MarkAllRead {
        /// Only notifications of this type
        #[arg(long = "type")]
        kind: Option<String>,

        /// Only notifications created before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },

    /// Delete one notification
    Delete {
        /// Notification ID
        id: String,
    },

    /// Delete every matching notification
    DeleteAll {
        /// Status filter
        #[arg(long, value_parser = ["all", "unread", "read"])]
        status: Option<String>,

        /// Only notifications created before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },
}

pub async fn run(
    command: NotificationsCommand,
    client: &NotificationsClient,
    per_page: u32,
    output: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match command {
        NotificationsCommand::List {
            page,
            limit,
            status,
            kind,
        } => {
            let mut query = ListQuery::page(page, limit.unwrap_or(per_page))
                .with_status(parse_status(&status)?);
            if let Some(kind) = kind {
                query = query.with_kind(kind);
            }
            list(client, output, quiet, query).await
        }
        NotificationsCommand::MarkRead { id } => mark_read(client, output, quiet, id).await,
        NotificationsCommand::MarkAllRead { kind, before } => {
            mark_all_read(client, output, quiet, MarkAllReadFilter { kind, before }).await
        }
        NotificationsCommand::Delete { id } => delete(client, output, quiet, id).await,
        NotificationsCommand::DeleteAll { status, before } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            delete_all(client, output, quiet, DeleteAllFilter { status, before }).await
        }
    }
}

fn parse_status(raw: &str) -> Result<StatusFilter> {
    raw.parse::<StatusFilter>().map_err(|e| anyhow!(e))
}

async fn list(
    client: &NotificationsClient,
    output: OutputFormat,
    quiet: bool,
    query: ListQuery,
) -> Result<()> {
    let page_no = query.page;
    let page = client
        .fetch_page(&query)
        .await
        .context("Failed to load notifications")?;

    if !output.is_text() {
        return output.print_value(&page);
    }

    if page.items.is_empty() {
        println!("No notifications found");
        return Ok(());
    }

    print_table_header(FEED_COLUMNS);
    for notification in &page.items {
        print_notification_row(notification);
    }

    if !quiet {
        println!();
        if let Some(unread) = page.unread_count {
            print_field("Unread", &unread.to_string());
        }
        print_field("Page", &page_no.to_string());
        if page.has_more {
            println!("More available: --page {}", page_no + 1);
        }
    }

    Ok(())
}

async fn mark_read(
    client: &NotificationsClient,
    output: OutputFormat,
    quiet: bool,
    id: String,
) -> Result<()> {
    let id = NotificationId::new(id);
    let outcome = client.mark_read_strict(&id).await.map_err(|e| match e {
        ClientError::NotFound => anyhow!("Notification not found: {}", id),
        e => anyhow::Error::new(e).context("Failed to mark notification as read"),
    })?;

    if !outcome.success {
        bail!("Server refused to mark {} as read", id);
    }

    if output.is_text() {
        if !quiet {
            println!("Marked {} as read", id);
        }
        if let Some(unread) = outcome.unread_count {
            print_field("Unread", &unread.to_string());
        }
        Ok(())
    } else {
        output.print_value(&outcome)
    }
}

async fn mark_all_read(
    client: &NotificationsClient,
    output: OutputFormat,
    quiet: bool,
    filter: MarkAllReadFilter,
) -> Result<()> {
    let outcome = client
        .mark_all_read_filtered(&filter)
        .await
        .context("Failed to mark notifications as read")?;

    if !outcome.success {
        bail!("Server refused to mark notifications as read");
    }

    if output.is_text() {
        if quiet {
            println!("{}", outcome.marked_count);
        } else {
            println!("Marked {} notifications as read", outcome.marked_count);
        }
        Ok(())
    } else {
        output.print_value(&outcome)
    }
}

async fn delete(
    client: &NotificationsClient,
    output: OutputFormat,
    quiet: bool,
    id: String,
) -> Result<()> {
    let id = NotificationId::new(id);
    let deleted = client.delete_one(&id).await.map_err(|e| match e {
        ClientError::NotFound => anyhow!("Notification not found: {}", id),
        e => anyhow::Error::new(e).context("Failed to delete notification"),
    })?;

    if !deleted {
        bail!("Server refused to delete {}", id);
    }

    if output.is_text() {
        if !quiet {
            println!("Deleted {}", id);
        }
        Ok(())
    } else {
        output.print_value(&json!({"id": id, "deleted": true}))
    }
}

async fn delete_all(
    client: &NotificationsClient,
    output: OutputFormat,
    quiet: bool,
    filter: DeleteAllFilter,
) -> Result<()> {
    let deleted = client
        .delete_matching(&filter)
        .await
        .context("Failed to delete notifications")?;

    if output.is_text() {
        if quiet {
            println!("{}", deleted);
        } else {
            println!("Deleted {} notifications", deleted);
        }
        Ok(())
    } else {
        output.print_value(&json!({"deleted_count": deleted}))
    }
}
