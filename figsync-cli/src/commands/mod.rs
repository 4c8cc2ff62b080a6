pub mod diff;
pub mod generate;
pub mod init;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};

use figsync_core::{config, Config};

/// Home directory and the config loaded from it.
pub(crate) fn load_config() -> Result<(PathBuf, Config)> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    let config = config::load_at(&home).context("failed to load figsync config")?;
    tracing::debug!(
        repository = %format!("{}/{}", config.host.owner, config.host.repo),
        documents = config.documents.len(),
        "config loaded"
    );
    Ok((home, config))
}
