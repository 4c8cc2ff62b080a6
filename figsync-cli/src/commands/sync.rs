//! `figsync sync`: publish a configured document as a change request.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use figsync_core::DocumentId;
use figsync_sync::{NoOpReason, SyncOutcome, SyncPlan, Synchronizer};

use super::load_config;

/// Arguments for `figsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Design document id (omit when using `--all`).
    pub document: Option<String>,

    /// Sync every configured document.
    #[arg(long, conflicts_with = "document")]
    pub all: bool,

    /// Show what would be published without touching the host.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub async fn run(self) -> Result<()> {
        let (home, config) = load_config()?;
        let ids: Vec<DocumentId> = if self.all {
            config.documents.iter().map(|d| d.id.clone()).collect()
        } else {
            let id = self
                .document
                .clone()
                .context("provide a document id or use --all")?;
            vec![DocumentId::from(id.as_str())]
        };
        if ids.is_empty() {
            println!("No documents configured. Add one to the config file or run `figsync init --document <id>`.");
            return Ok(());
        }

        let sync = Synchronizer::from_config(&config, &home).context("invalid configuration")?;
        for id in &ids {
            if self.dry_run {
                let plan = sync
                    .plan(id)
                    .await
                    .with_context(|| format!("dry run failed for '{id}'"))?;
                print_plan(&plan);
            } else {
                let outcome = sync
                    .synchronize(id)
                    .await
                    .with_context(|| format!("sync failed for '{id}'"))?;
                print_outcome(&outcome);
            }
        }
        Ok(())
    }
}

fn print_plan(plan: &SyncPlan) {
    let id = &plan.document;
    if plan.delta.is_no_op() {
        println!("[dry-run] ✓ '{id}' nothing to publish");
        return;
    }
    println!("[dry-run] ✓ '{id}' would publish ({})", plan.delta.summary());
    print_paths(&plan.delta);
}

fn print_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::NoOp(report) => {
            let why = match report.reason {
                NoOpReason::Unchanged => "unchanged since last publish",
                NoOpReason::AlreadyOnBase => "base branch already up to date",
            };
            println!("✓ '{}' nothing to publish ({why})", report.document);
        }
        SyncOutcome::Published(report) => {
            println!(
                "✓ '{}' published ({})",
                report.document,
                report.delta.summary()
            );
            print_paths(&report.delta);
            let request = &report.change_request;
            println!("  branch:  {} → {}", report.branch, report.base_branch);
            println!("  request: #{} {}", request.number, request.url);
            if let Some(previous) = request.superseded {
                println!("  updates: #{previous}");
            }
            if let Some(moved) = &report.base_moved {
                println!(
                    "  {} {} moved {} → {} during publish; review before merging",
                    "warning:".yellow().bold(),
                    report.base_branch,
                    short(&moved.from),
                    short(&moved.to)
                );
            }
        }
    }
}

fn print_paths(delta: &figsync_sync::SnapshotDelta) {
    for path in &delta.added {
        println!("  {}  {path}", "+".green());
    }
    for path in &delta.modified {
        println!("  {}  {path}", "~".yellow());
    }
    for path in &delta.removed {
        println!("  {}  {path}", "-".red());
    }
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(8)]
}
