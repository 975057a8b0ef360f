// Output formatting for CLI

use anyhow::Result;
use bellsync_schemas::{display, Notification};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    /// Print a structured value; text output is handled by each command
    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
            OutputFormat::Text => {}
        }
        Ok(())
    }

    /// One JSON document per line, for streaming output
    pub fn print_line<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
            OutputFormat::Yaml => println!("---\n{}", serde_yaml::to_string(value)?),
            OutputFormat::Text => {}
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

pub const FEED_COLUMNS: &[(&str, usize)] = &[("", 1), ("ID", 24), ("TITLE", 28), ("MESSAGE", 40), ("AGE", 10)];

pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row.trim_end());
}

/// One feed row: unread marker, id, title, message, age
pub fn print_notification_row(n: &Notification) {
    let marker = if n.is_new {
        "+"
    } else if n.is_unread() {
        "*"
    } else {
        " "
    };
    let id = n.id.to_string();
    let title = display::title(n);
    let message = display::message(n);
    let age = display::time_ago(n.created_at, Utc::now());

    print_table_row(&[
        (marker, FEED_COLUMNS[0].1),
        (&id, FEED_COLUMNS[1].1),
        (&title, FEED_COLUMNS[2].1),
        (&message, FEED_COLUMNS[3].1),
        (&age, FEED_COLUMNS[4].1),
    ]);
}

/// Cut `value` to `width` characters, ending in "..." when shortened
fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }
    let mut out: String = value.chars().take(width - 3).collect();
    out.push_str("...");
    out
}
