//! `figsync init --owner <owner> --repo <repo> [--document <id>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use figsync_core::{config, DocumentConfig, DocumentId};

/// Scaffold ~/.figsync/config.yaml.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Repository owner on the host.
    #[arg(long)]
    pub owner: String,

    /// Repository name on the host.
    #[arg(long)]
    pub repo: String,

    /// Design document id to configure.
    #[arg(long, short = 'd')]
    pub document: Option<String>,

    /// Repository path the generated files live under.
    #[arg(long, requires = "document", default_value = "generated/design")]
    pub prefix: String,

    /// Base branch for change requests (default: the repository's default branch).
    #[arg(long = "base", requires = "document")]
    pub base_branch: Option<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let document = self.document.map(|id| DocumentConfig {
            id: DocumentId::from(id.as_str()),
            target_prefix: self.prefix.clone(),
            base_branch: self.base_branch.clone(),
        });

        let existed = config::config_path_at(&home).exists();
        let config = config::init_at(&home, &self.owner, &self.repo, document).with_context(|| {
            format!("failed to init config for '{}/{}'", self.owner, self.repo)
        })?;

        if existed {
            println!("✓ Config already exists; left unchanged");
        } else {
            println!(
                "✓ Initialized figsync for '{}/{}'",
                config.host.owner, config.host.repo
            );
        }
        println!("  Config: {}", config::config_path_at(&home).display());
        for doc in &config.documents {
            println!("  Document: {} → {}", doc.id, doc.target_prefix);
        }
        if config.design.token.is_none() || config.host.token.is_none() {
            println!(
                "  Tokens: set {} and {} or add them to the config file",
                config::DESIGN_TOKEN_ENV,
                config::HOST_TOKEN_ENV
            );
        }
        Ok(())
    }
}
