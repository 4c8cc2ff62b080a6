//! `figsync status`: last publish per configured document.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use figsync_core::{Config, DocumentConfig};
use figsync_sync::{FileSnapshotStore, PublishedSnapshot, SnapshotStore};

use super::load_config;

/// Arguments for `figsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let (home, config) = load_config()?;
        let store = FileSnapshotStore::new(&home);

        let mut rows = Vec::new();
        for doc in &config.documents {
            let snapshot = store
                .get(&doc.id)
                .with_context(|| format!("failed to read snapshot for '{}'", doc.id))?;
            rows.push(DocumentStatus::new(doc, snapshot));
        }

        if self.json {
            let payload = StatusJson {
                repository: format!("{}/{}", config.host.owner, config.host.repo),
                documents: rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&config, rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusJson {
    repository: String,
    documents: Vec<DocumentStatus>,
}

#[derive(Debug, Serialize)]
struct DocumentStatus {
    document: String,
    prefix: String,
    base_branch: String,
    published_at: Option<DateTime<Utc>>,
    branch: Option<String>,
    change_request: Option<u64>,
    change_request_url: Option<String>,
    files: usize,
}

impl DocumentStatus {
    fn new(doc: &DocumentConfig, snapshot: Option<PublishedSnapshot>) -> Self {
        let base_branch = snapshot
            .as_ref()
            .map(|s| s.base_branch.clone())
            .or_else(|| doc.base_branch.clone())
            .unwrap_or_else(|| "(default)".to_string());
        Self {
            document: doc.id.to_string(),
            prefix: doc.target_prefix.clone(),
            base_branch,
            published_at: snapshot.as_ref().map(|s| s.published_at),
            branch: snapshot.as_ref().map(|s| s.branch.clone()),
            change_request: snapshot
                .as_ref()
                .and_then(|s| s.change_request.as_ref())
                .map(|r| r.number),
            change_request_url: snapshot
                .as_ref()
                .and_then(|s| s.change_request.as_ref())
                .map(|r| r.url.clone()),
            files: snapshot.as_ref().map(|s| s.files.len()).unwrap_or(0),
        }
    }
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "document")]
    document: String,
    #[tabled(rename = "prefix")]
    prefix: String,
    #[tabled(rename = "last publish")]
    last_publish: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "request")]
    request: String,
}

fn print_table(config: &Config, rows: Vec<DocumentStatus>) {
    println!(
        "figsync v{} | {}/{} | {} documents",
        env!("CARGO_PKG_VERSION"),
        config.host.owner,
        config.host.repo,
        rows.len()
    );
    if rows.is_empty() {
        println!("No documents configured.");
        return;
    }

    let never = rows.iter().filter(|r| r.published_at.is_none()).count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            last_publish: row
                .published_at
                .map(format_age)
                .unwrap_or_else(|| "never".to_string()),
            branch: row.branch.unwrap_or_else(|| "-".to_string()),
            request: row
                .change_request
                .map(|n| format!("#{n}"))
                .unwrap_or_else(|| "-".to_string()),
            document: row.document,
            prefix: row.prefix,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if never > 0 {
        println!(
            "{} {never} never published. Run 'figsync sync --all' to publish.",
            "■".bright_black().bold()
        );
    }
}

fn format_age(at: DateTime<Utc>) -> String {
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ages_are_coarse() {
        let now = Utc::now();
        assert_eq!(format_age(now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5)), "5m ago");
        assert_eq!(format_age(now - Duration::hours(3)), "3h ago");
        assert_eq!(format_age(now - Duration::days(2)), "2d ago");
    }
}
