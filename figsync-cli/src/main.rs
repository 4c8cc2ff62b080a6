//! figsync: publish design documents as generated-code change requests.
//!
//! # Usage
//!
//! ```text
//! figsync init --owner <owner> --repo <repo> [--document <id>] [--prefix <path>] [--base <branch>]
//! figsync sync <document> [--dry-run]
//! figsync sync --all [--dry-run]
//! figsync generate --input <file.json> [--prefix <path>] [--out <dir>]
//! figsync diff <document>
//! figsync status [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs, generate::GenerateArgs, init::InitArgs, status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "figsync",
    version,
    about = "Turn design documents into reviewable generated-code change requests",
    long_about = None,
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scaffold ~/.figsync/config.yaml.
    Init(InitArgs),

    /// Fetch, generate and publish a configured document.
    Sync(SyncArgs),

    /// Generate files offline from an exported design document.
    Generate(GenerateArgs),

    /// Show a unified diff of freshly generated files against the last publish.
    Diff(DiffArgs),

    /// Show the last publish of every configured document.
    Status(StatusArgs),
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run().await,
        Commands::Generate(args) => args.run(),
        Commands::Diff(args) => args.run().await,
        Commands::Status(args) => args.run(),
    }
}
