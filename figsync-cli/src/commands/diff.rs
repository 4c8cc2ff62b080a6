//! `figsync diff <document>`: unified diff against the last publish.

use anyhow::{Context, Result};
use clap::Args;

use figsync_core::DocumentId;
use figsync_sync::Synchronizer;

use super::load_config;

/// Arguments for `figsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Design document id to diff.
    pub document: String,
}

impl DiffArgs {
    pub async fn run(self) -> Result<()> {
        let (home, config) = load_config()?;
        let sync = Synchronizer::from_config(&config, &home).context("invalid configuration")?;
        let id = DocumentId::from(self.document.as_str());

        let plan = sync
            .plan(&id)
            .await
            .with_context(|| format!("diff failed for '{id}'"))?;
        let diffs = plan.diffs();
        if diffs.is_empty() {
            println!("No differences for '{id}'.");
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
